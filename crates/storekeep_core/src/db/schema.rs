//! Entity kind registry and table bootstrap.
//!
//! # Responsibility
//! - Describe which entity kinds a store knows and their typed fields.
//! - Create missing tables and verify existing ones column by column.
//!
//! # Invariants
//! - Kind and field names are plain identifiers (`[A-Za-z_][A-Za-z0-9_]*`).
//! - `record_id` is reserved for store-assigned identity.

use crate::db::{DbError, DbResult};
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Column holding the store-assigned record identity.
pub const RECORD_ID_COLUMN: &str = "record_id";

/// Declared storage type of one entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Real,
    Text,
    /// Stored as INTEGER 0/1.
    Bool,
    Blob,
}

impl FieldType {
    /// SQL column type used in `CREATE TABLE`.
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Integer | Self::Bool => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
        }
    }
}

/// One typed field of an entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// One entity kind, persisted as one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityKind {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl EntityKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends one field declaration.
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
        });
        self
    }

    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    fn validate(&self) -> DbResult<()> {
        ensure_identifier(&self.name)?;
        let mut seen = BTreeSet::new();
        for field in &self.fields {
            ensure_identifier(&field.name)?;
            if field.name == RECORD_ID_COLUMN {
                return Err(DbError::InvalidSchema(format!(
                    "kind `{}` declares reserved field `{RECORD_ID_COLUMN}`",
                    self.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(DbError::InvalidSchema(format!(
                    "kind `{}` declares field `{}` twice",
                    self.name, field.name
                )));
            }
        }
        Ok(())
    }
}

/// Set of entity kinds known to one store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    kinds: Vec<EntityKind>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one kind declaration.
    pub fn with_kind(mut self, kind: EntityKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn kind(&self, name: &str) -> Option<&EntityKind> {
        self.kinds.iter().find(|kind| kind.name == name)
    }

    pub fn kinds(&self) -> &[EntityKind] {
        &self.kinds
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Checks identifier syntax and uniqueness of kinds and fields.
    pub fn validate(&self) -> DbResult<()> {
        let mut seen = BTreeSet::new();
        for kind in &self.kinds {
            kind.validate()?;
            if !seen.insert(kind.name.as_str()) {
                return Err(DbError::InvalidSchema(format!(
                    "kind `{}` declared twice",
                    kind.name
                )));
            }
        }
        Ok(())
    }
}

/// Returns whether `name` is usable as an unquoted SQL identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

pub(crate) fn ensure_identifier(name: &str) -> DbResult<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}

/// Quotes an already validated identifier.
pub(crate) fn quoted(name: &str) -> String {
    format!("\"{name}\"")
}

/// Creates missing entity tables and verifies existing ones.
///
/// Runs in one immediate transaction so a half-created schema never persists.
pub fn ensure_schema(conn: &mut Connection, schema: &Schema) -> DbResult<()> {
    schema.validate()?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    for kind in schema.kinds() {
        if table_exists(&tx, &kind.name)? {
            verify_table(&tx, kind)?;
        } else {
            tx.execute_batch(&create_table_sql(kind))?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn create_table_sql(kind: &EntityKind) -> String {
    let mut sql = format!(
        "CREATE TABLE {} (\n    {RECORD_ID_COLUMN} TEXT PRIMARY KEY NOT NULL",
        quoted(&kind.name)
    );
    for field in &kind.fields {
        sql.push_str(&format!(
            ",\n    {} {}",
            quoted(&field.name),
            field.field_type.sql_type()
        ));
    }
    sql.push_str("\n);");
    sql
}

fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn verify_table(conn: &Connection, kind: &EntityKind) -> DbResult<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", quoted(&kind.name)))?;
    let mut rows = stmt.query([])?;
    let mut columns: Vec<(String, String)> = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push((row.get(1)?, row.get(2)?));
    }

    let expected = std::iter::once((RECORD_ID_COLUMN, "TEXT")).chain(
        kind.fields
            .iter()
            .map(|field| (field.name.as_str(), field.field_type.sql_type())),
    );
    for (column, sql_type) in expected {
        let Some((_, actual)) = columns.iter().find(|(name, _)| name == column) else {
            return Err(DbError::MissingRequiredColumn {
                table: kind.name.clone(),
                column: column.to_string(),
            });
        };
        if !actual.eq_ignore_ascii_case(sql_type) {
            return Err(DbError::ColumnTypeMismatch {
                table: kind.name.clone(),
                column: column.to_string(),
                expected: sql_type,
                actual: actual.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ensure_schema, is_valid_identifier, EntityKind, FieldType, Schema};
    use crate::db::DbError;
    use rusqlite::Connection;

    fn note_schema() -> Schema {
        Schema::new().with_kind(EntityKind::new("note").field("title", FieldType::Text))
    }

    #[test]
    fn identifier_rules() {
        assert!(is_valid_identifier("note"));
        assert!(is_valid_identifier("_private2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2fast"));
        assert!(!is_valid_identifier("drop table;"));
        assert!(!is_valid_identifier("na\"me"));
    }

    #[test]
    fn validate_rejects_duplicates_and_reserved_names() {
        let duplicate_kind = note_schema().with_kind(EntityKind::new("note"));
        assert!(matches!(
            duplicate_kind.validate(),
            Err(DbError::InvalidSchema(_))
        ));

        let duplicate_field = Schema::new().with_kind(
            EntityKind::new("note")
                .field("title", FieldType::Text)
                .field("title", FieldType::Integer),
        );
        assert!(matches!(
            duplicate_field.validate(),
            Err(DbError::InvalidSchema(_))
        ));

        let reserved =
            Schema::new().with_kind(EntityKind::new("note").field("record_id", FieldType::Text));
        assert!(matches!(reserved.validate(), Err(DbError::InvalidSchema(_))));

        let bad_name = Schema::new().with_kind(EntityKind::new("no-te"));
        assert!(matches!(
            bad_name.validate(),
            Err(DbError::InvalidIdentifier(name)) if name == "no-te"
        ));
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure_schema(&mut conn, &note_schema()).unwrap();
        ensure_schema(&mut conn, &note_schema()).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM note;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn ensure_schema_rejects_missing_and_mistyped_columns() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure_schema(&mut conn, &note_schema()).unwrap();

        let extra_field = Schema::new().with_kind(
            EntityKind::new("note")
                .field("title", FieldType::Text)
                .field("rank", FieldType::Integer),
        );
        assert!(matches!(
            ensure_schema(&mut conn, &extra_field),
            Err(DbError::MissingRequiredColumn { column, .. }) if column == "rank"
        ));

        let retyped =
            Schema::new().with_kind(EntityKind::new("note").field("title", FieldType::Blob));
        assert!(matches!(
            ensure_schema(&mut conn, &retyped),
            Err(DbError::ColumnTypeMismatch { expected: "BLOB", .. })
        ));
    }
}
