//! Typed failures reported by the persistence client.
//!
//! # Invariants
//! - Every failure names the operation that failed.
//! - No failure terminates the process; callers decide to retry or surface.

use crate::config::ConfigError;
use crate::db::schema::FieldType;
use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StorageFailure>;

/// Store operation in flight when a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Open,
    Save,
    Query,
    Delete,
    DeleteAll,
    Commit,
    Close,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Save => "save",
            Self::Query => "query",
            Self::Delete => "delete",
            Self::DeleteAll => "delete_all",
            Self::Commit => "commit",
            Self::Close => "close",
        }
    }
}

/// Whether retrying the same call can succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Transient contention or I/O; the store state is unchanged.
    Retryable,
    /// Schema/model mismatch or programming error; retrying cannot help.
    Unrecoverable,
}

#[derive(Debug)]
pub enum FailureCause {
    Db(DbError),
    Config(ConfigError),
    /// Entity kind is not declared in the store schema.
    UnknownKind(String),
    /// Field is not declared for the kind.
    UnknownField { kind: String, field: String },
    /// Value cannot be stored in the field's declared type.
    FieldTypeMismatch {
        kind: String,
        field: String,
        expected: FieldType,
    },
    /// Work was submitted from inside the store executor.
    Reentrant,
    /// The executor thread could not be started.
    Executor(String),
    StoreClosed,
}

impl Display for FailureCause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::UnknownKind(kind) => write!(f, "unknown entity kind `{kind}`"),
            Self::UnknownField { kind, field } => {
                write!(f, "kind `{kind}` has no field `{field}`")
            }
            Self::FieldTypeMismatch {
                kind,
                field,
                expected,
            } => write!(
                f,
                "value for `{kind}.{field}` does not fit declared type {expected:?}"
            ),
            Self::Reentrant => write!(f, "store work submitted from the store executor"),
            Self::Executor(message) => write!(f, "store executor unavailable: {message}"),
            Self::StoreClosed => write!(f, "store is closed"),
        }
    }
}

impl From<DbError> for FailureCause {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for FailureCause {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ConfigError> for FailureCause {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// A store operation that the engine or the client rejected.
#[derive(Debug)]
pub struct StorageFailure {
    operation: Operation,
    cause: FailureCause,
}

impl StorageFailure {
    pub fn new(operation: Operation, cause: impl Into<FailureCause>) -> Self {
        Self {
            operation,
            cause: cause.into(),
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn cause(&self) -> &FailureCause {
        &self.cause
    }

    pub fn severity(&self) -> Severity {
        match &self.cause {
            FailureCause::Db(err) if err.is_transient() => Severity::Retryable,
            FailureCause::Executor(_) => Severity::Retryable,
            _ => Severity::Unrecoverable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.severity() == Severity::Retryable
    }

    /// Relabels a failure raised by a nested step with the outer operation.
    pub(crate) fn during(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }
}

impl Display for StorageFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.operation.as_str(), self.cause)
    }
}

impl Error for StorageFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            FailureCause::Db(err) => Some(err),
            FailureCause::Config(err) => Some(err),
            _ => None,
        }
    }
}

/// Builds a `map_err` adapter labelling errors with `operation`.
pub(crate) fn failed<E: Into<FailureCause>>(
    operation: Operation,
) -> impl FnOnce(E) -> StorageFailure {
    move |err| StorageFailure::new(operation, err)
}

#[cfg(test)]
mod tests {
    use super::{FailureCause, Operation, Severity, StorageFailure};
    use crate::db::DbError;
    use rusqlite::ffi;

    fn sqlite_error(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), Some("engine says no".into()))
    }

    #[test]
    fn busy_engine_is_retryable() {
        let failure = StorageFailure::new(Operation::Commit, sqlite_error(ffi::SQLITE_BUSY));
        assert_eq!(failure.severity(), Severity::Retryable);
        assert!(failure.to_string().starts_with("commit failed"));
    }

    #[test]
    fn schema_problems_are_unrecoverable() {
        let failure = StorageFailure::new(
            Operation::Open,
            DbError::MissingRequiredColumn {
                table: "note".into(),
                column: "title".into(),
            },
        );
        assert_eq!(failure.severity(), Severity::Unrecoverable);

        let unknown = StorageFailure::new(Operation::Query, FailureCause::UnknownKind("x".into()));
        assert!(!unknown.is_retryable());
        assert_eq!(
            StorageFailure::new(Operation::Query, sqlite_error(ffi::SQLITE_CONSTRAINT))
                .severity(),
            Severity::Unrecoverable
        );
    }

    #[test]
    fn during_relabels_operation() {
        let failure = StorageFailure::new(Operation::Commit, FailureCause::StoreClosed)
            .during(Operation::Save);
        assert_eq!(failure.operation(), Operation::Save);
    }
}
