//! Entity-level repositories over the persistence client.
//!
//! # Responsibility
//! - Translate entity requests into store operations for one entity kind.
//! - Hide records and execution contexts from callers.
//!
//! # Invariants
//! - Mutations are one queue item each (convert + stage + commit).
//! - A repository only ever touches the kind its mapping declares.

pub mod any_repo;
pub mod mapping;
pub mod repository;

use crate::client::StorageFailure;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Error returned by repository operations.
#[derive(Debug)]
pub enum RepoError {
    Storage(StorageFailure),
    /// Operation is part of the surface but has no implementation.
    NotImplemented(&'static str),
}

impl RepoError {
    /// Underlying store failure, if any.
    pub fn storage(&self) -> Option<&StorageFailure> {
        match self {
            Self::Storage(failure) => Some(failure),
            Self::NotImplemented(_) => None,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(err) => write!(f, "{err}"),
            Self::NotImplemented(operation) => write!(f, "`{operation}` is not implemented"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::NotImplemented(_) => None,
        }
    }
}

impl From<StorageFailure> for RepoError {
    fn from(value: StorageFailure) -> Self {
        Self::Storage(value)
    }
}
