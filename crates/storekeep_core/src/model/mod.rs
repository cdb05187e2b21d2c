//! Store-agnostic data model shared by the client and repositories.
//!
//! # Responsibility
//! - Define persisted records, field values and query descriptions.
//! - Keep SQLite types out of caller-facing signatures.
//!
//! # Invariants
//! - Identity is assigned by the store, never by entities.

pub mod query;
pub mod record;
pub mod value;
