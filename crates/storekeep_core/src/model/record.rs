//! Store-resident record representation.
//!
//! # Responsibility
//! - Hold the field map of one persisted entity plus its store identity.
//! - Derive identity from kind and contents when a record is staged.
//!
//! # Invariants
//! - Records are confined to the store executor: the type is `!Send`, so no
//!   record reference can leave the thread that owns the connection.
//! - Two records of one kind with equal fields receive the same identity.

use crate::model::value::FieldValue;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use uuid::Uuid;

/// Store-assigned record identity.
pub type RecordId = Uuid;

/// Namespace for content-derived record identities.
const RECORD_NAMESPACE: Uuid = Uuid::from_u128(0x5b0e_6f7a_3c1d_4e8a_9f21_7d44_c0a1_e3b6);

static NULL_FIELD: FieldValue = FieldValue::Null;

/// Mutable, store-resident record of one entity kind.
#[derive(Debug)]
pub struct PersistedRecord {
    id: RecordId,
    kind: String,
    fields: BTreeMap<String, FieldValue>,
    _confined: PhantomData<*const ()>,
}

impl PersistedRecord {
    pub(crate) fn blank(kind: &str) -> Self {
        Self::with_fields(Uuid::nil(), kind, BTreeMap::new())
    }

    pub(crate) fn with_fields(
        id: RecordId,
        kind: &str,
        fields: BTreeMap<String, FieldValue>,
    ) -> Self {
        Self {
            id,
            kind: kind.to_string(),
            fields,
            _confined: PhantomData,
        }
    }

    /// Store-assigned identity; nil until the record is staged.
    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the field value, `Null` when the field was never set.
    pub fn get(&self, field: &str) -> &FieldValue {
        self.fields.get(field).unwrap_or(&NULL_FIELD)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).as_text()
    }

    pub fn integer(&self, field: &str) -> Option<i64> {
        self.get(field).as_integer()
    }

    pub fn real(&self, field: &str) -> Option<f64> {
        self.get(field).as_real()
    }

    pub fn bool(&self, field: &str) -> Option<bool> {
        self.get(field).as_bool()
    }

    pub fn blob(&self, field: &str) -> Option<&[u8]> {
        self.get(field).as_blob()
    }

    /// Sets one field. Writing `Null` clears it.
    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) {
        match value.into() {
            FieldValue::Null => {
                self.fields.remove(field);
            }
            value => {
                self.fields.insert(field.to_string(), value);
            }
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Assigns the content-derived identity.
    pub(crate) fn seal(&mut self) {
        // BTreeMap keeps field order canonical, so equal contents hash equally.
        let mut canonical = Vec::new();
        encode_bytes(&mut canonical, self.kind.as_bytes());
        for (name, value) in &self.fields {
            encode_bytes(&mut canonical, name.as_bytes());
            value.encode_canonical(&mut canonical);
        }
        self.id = Uuid::new_v5(&RECORD_NAMESPACE, &canonical);
    }

    /// Detached copy for staging checkpoints and query snapshots.
    pub(crate) fn snapshot(&self) -> Self {
        Self::with_fields(self.id, &self.kind, self.fields.clone())
    }

    /// Replaces every field at once; used after values are conformed.
    pub(crate) fn replace_fields(&mut self, fields: BTreeMap<String, FieldValue>) {
        self.fields = fields;
    }
}

/// Length-prefixed so adjacent names and values cannot run together.
pub(crate) fn encode_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(bytes);
}
