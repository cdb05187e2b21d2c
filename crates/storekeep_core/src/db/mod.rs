//! SQLite storage bootstrap and schema enforcement entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections for one store.
//! - Create one table per entity kind and reject tables that disagree with
//!   the declared schema.
//!
//! # Invariants
//! - Every entity table carries a `record_id TEXT PRIMARY KEY` column.
//! - Existing tables are never altered; a mismatch is an error.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;
pub mod schema;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// Kind or field name is not a plain SQL identifier.
    InvalidIdentifier(String),
    /// Schema declaration is internally inconsistent.
    InvalidSchema(String),
    /// Existing table lacks a column declared by the schema.
    MissingRequiredColumn { table: String, column: String },
    /// Existing column has a different declared type than the schema.
    ColumnTypeMismatch {
        table: String,
        column: String,
        expected: &'static str,
        actual: String,
    },
    /// Stored row cannot be decoded into a record.
    InvalidRow(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::InvalidRow(message) => write!(f, "invalid stored row: {message}"),
            Self::InvalidIdentifier(name) => write!(f, "invalid identifier `{name}`"),
            Self::InvalidSchema(message) => write!(f, "invalid schema: {message}"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "table `{table}` is missing column `{column}`")
            }
            Self::ColumnTypeMismatch {
                table,
                column,
                expected,
                actual,
            } => write!(
                f,
                "column `{table}.{column}` has type `{actual}`, schema expects `{expected}`"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::InvalidIdentifier(_)
            | Self::InvalidRow(_)
            | Self::InvalidSchema(_)
            | Self::MissingRequiredColumn { .. }
            | Self::ColumnTypeMismatch { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl DbError {
    /// Returns whether the failure is transient engine contention or I/O.
    pub fn is_transient(&self) -> bool {
        use rusqlite::ErrorCode;

        match self {
            Self::Sqlite(err) => matches!(
                err.sqlite_error_code(),
                Some(
                    ErrorCode::DatabaseBusy
                        | ErrorCode::DatabaseLocked
                        | ErrorCode::SystemIoFailure
                        | ErrorCode::DiskFull
                        | ErrorCode::OutOfMemory
                )
            ),
            _ => false,
        }
    }
}
