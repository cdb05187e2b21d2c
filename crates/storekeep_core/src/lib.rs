//! Generic entity repositories over an embedded SQLite object store.
//! Entities never see records, contexts or SQL; those stay in `client`.

pub mod client;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;

pub use client::{
    CommitOutcome, ContextKind, FailureCause, Operation, PersistenceClient, Session, Severity,
    StorageFailure, StoreResult,
};
pub use config::{ConfigError, StoreConfig, StoreLocation};
pub use db::schema::{EntityKind, FieldSpec, FieldType, Schema};
pub use logging::{init_logging, logging_status, LogLevel, LoggingError};
pub use model::query::{CompareOp, PageSpec, Predicate, QueryRequest, SortKey, SortSpec};
pub use model::record::{PersistedRecord, RecordId};
pub use model::value::FieldValue;
pub use repo::any_repo::AnyRepository;
pub use repo::mapping::{round_trip, MappingContract};
pub use repo::repository::{BaseRepository, Repository, UpdateBlock};
pub use repo::{RepoError, RepoResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
