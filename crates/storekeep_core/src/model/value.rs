//! Field values carried by persisted records.
//!
//! # Invariants
//! - Ordering mirrors SQLite's: `Null < numeric < Text < Blob`.
//! - `Bool` compares as the integer it is stored as.

use crate::db::schema::FieldType;
use crate::model::record::encode_bytes;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Store-agnostic value of one record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    Blob(Vec<u8>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Integer view; booleans read as 0/1 and whole reals narrow.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Bool(value) => Some(i64::from(*value)),
            Self::Real(value)
                if value.fract() == 0.0
                    && *value >= i64::MIN as f64
                    && *value < i64::MAX as f64 =>
            {
                Some(*value as i64)
            }
            _ => None,
        }
    }

    /// Floating point view; integers widen.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::Integer(value) => Some(*value != 0),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(value) => Some(value),
            _ => None,
        }
    }

    /// Returns whether this value may be stored in a column of `field_type`.
    ///
    /// `Null` fits everywhere.
    pub fn fits(&self, field_type: FieldType) -> bool {
        match self {
            Self::Null => true,
            Self::Integer(_) => matches!(
                field_type,
                FieldType::Integer | FieldType::Real | FieldType::Bool
            ),
            Self::Real(_) => field_type == FieldType::Real,
            Self::Text(_) => field_type == FieldType::Text,
            Self::Bool(_) => matches!(field_type, FieldType::Bool | FieldType::Integer),
            Self::Blob(_) => field_type == FieldType::Blob,
        }
    }

    /// Converts this value to the shape a `field_type` column reads back.
    ///
    /// Integers widen into `Real` columns, `0`/`1` become booleans and
    /// booleans stored in `Integer` columns become integers. Returns `None`
    /// when the value cannot be stored without changing it, including `NaN`,
    /// which the engine keeps as `NULL`.
    pub fn coerce(self, field_type: FieldType) -> Option<Self> {
        match (self, field_type) {
            (Self::Null, _) => Some(Self::Null),
            (Self::Integer(number), FieldType::Integer) => Some(Self::Integer(number)),
            (Self::Integer(number), FieldType::Real) => Some(Self::Real(number as f64)),
            (Self::Integer(number @ (0 | 1)), FieldType::Bool) => Some(Self::Bool(number == 1)),
            (Self::Bool(flag), FieldType::Bool) => Some(Self::Bool(flag)),
            (Self::Bool(flag), FieldType::Integer) => Some(Self::Integer(i64::from(flag))),
            (Self::Real(number), FieldType::Real) if !number.is_nan() => Some(Self::Real(number)),
            (Self::Text(text), FieldType::Text) => Some(Self::Text(text)),
            (Self::Blob(bytes), FieldType::Blob) => Some(Self::Blob(bytes)),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Integer(_) | Self::Real(_) | Self::Bool(_) => 1,
            Self::Text(_) => 2,
            Self::Blob(_) => 3,
        }
    }

    /// Total order used by `ORDER BY`; nulls sort first.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        let by_rank = self.type_rank().cmp(&other.type_rank());
        if by_rank != Ordering::Equal {
            return by_rank;
        }
        match (self, other) {
            (Self::Text(left), Self::Text(right)) => left.as_bytes().cmp(right.as_bytes()),
            (Self::Blob(left), Self::Blob(right)) => left.cmp(right),
            (Self::Null, Self::Null) => Ordering::Equal,
            _ => compare_numeric(self, other),
        }
    }

    /// Comparison used by predicates; any `Null` operand yields `None`.
    pub fn predicate_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        Some(self.sort_cmp(other))
    }

    /// Decodes one column value according to its declared field type.
    pub(crate) fn from_column(value: ValueRef<'_>, field_type: FieldType) -> Result<Self, String> {
        Ok(match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(number) if field_type == FieldType::Bool => Self::Bool(number != 0),
            ValueRef::Integer(number) => Self::Integer(number),
            ValueRef::Real(number) => Self::Real(number),
            ValueRef::Text(bytes) => Self::Text(
                String::from_utf8(bytes.to_vec())
                    .map_err(|_| "text column holds invalid UTF-8".to_string())?,
            ),
            ValueRef::Blob(bytes) => Self::Blob(bytes.to_vec()),
        })
    }

    /// Appends a type-tagged byte encoding that keeps every value distinct.
    ///
    /// Reals are encoded by their bit pattern, so infinities and signed
    /// zeros stay apart.
    pub(crate) fn encode_canonical(&self, out: &mut Vec<u8>) {
        match self {
            Self::Null => out.push(0),
            Self::Integer(number) => {
                out.push(1);
                out.extend_from_slice(&number.to_le_bytes());
            }
            Self::Real(number) => {
                out.push(2);
                out.extend_from_slice(&number.to_bits().to_le_bytes());
            }
            Self::Text(text) => {
                out.push(3);
                encode_bytes(out, text.as_bytes());
            }
            Self::Bool(flag) => {
                out.push(4);
                out.push(u8::from(*flag));
            }
            Self::Blob(bytes) => {
                out.push(5);
                encode_bytes(out, bytes);
            }
        }
    }

    pub(crate) fn to_sql_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Integer(number) => Value::Integer(*number),
            Self::Real(number) => Value::Real(*number),
            Self::Text(text) => Value::Text(text.clone()),
            Self::Bool(flag) => Value::Integer(i64::from(*flag)),
            Self::Blob(bytes) => Value::Blob(bytes.clone()),
        }
    }
}

fn compare_numeric(left: &FieldValue, right: &FieldValue) -> Ordering {
    match (left.as_integer(), right.as_integer()) {
        (Some(left), Some(right)) => left.cmp(&right),
        _ => {
            let left = left.as_real().or_else(|| left.as_integer().map(|v| v as f64));
            let right = right.as_real().or_else(|| right.as_integer().map(|v| v as f64));
            left.partial_cmp(&right).unwrap_or(Ordering::Equal)
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Integer(number) => ToSqlOutput::Owned(Value::Integer(*number)),
            Self::Real(number) => ToSqlOutput::Owned(Value::Real(*number)),
            Self::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
            Self::Bool(flag) => ToSqlOutput::Owned(Value::Integer(i64::from(*flag))),
            Self::Blob(bytes) => ToSqlOutput::Borrowed(ValueRef::Blob(bytes)),
        })
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
