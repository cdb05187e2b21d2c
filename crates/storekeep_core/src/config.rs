//! Store configuration.
//!
//! # Responsibility
//! - Describe where a store lives and which entity kinds it holds.
//! - Load that description from JSON produced by the host application.
//!
//! # Invariants
//! - A validated config has a non-empty name, a valid schema and a
//!   non-zero fetch batch hint.

use crate::db::schema::Schema;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_FETCH_BATCH_HINT: usize = 20;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Where the store's database lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "path", rename_all = "snake_case")]
pub enum StoreLocation {
    /// Private database that disappears when the store closes.
    #[default]
    Memory,
    File(PathBuf),
}

/// Configuration for one persistent store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Human-readable store name, used for the executor thread and logs.
    pub name: String,
    #[serde(default)]
    pub location: StoreLocation,
    pub schema: Schema,
    #[serde(default = "default_fetch_batch_hint")]
    pub fetch_batch_hint: usize,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_fetch_batch_hint() -> usize {
    DEFAULT_FETCH_BATCH_HINT
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "cannot parse store config: {err}"),
            Self::Invalid(message) => write!(f, "invalid store config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl StoreConfig {
    pub fn in_memory(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            location: StoreLocation::Memory,
            schema,
            fetch_batch_hint: DEFAULT_FETCH_BATCH_HINT,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    pub fn at_path(name: impl Into<String>, path: impl Into<PathBuf>, schema: Schema) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            ..Self::in_memory(name, schema)
        }
    }

    pub fn with_fetch_batch_hint(mut self, hint: usize) -> Self {
        self.fetch_batch_hint = hint;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Parses and validates a JSON store description.
    ///
    /// # Errors
    /// - `Parse` when the text is not a valid config document.
    /// - `Invalid` when the document fails [`StoreConfig::validate`].
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("store name cannot be empty".to_string()));
        }
        if self.fetch_batch_hint == 0 {
            return Err(ConfigError::Invalid(
                "fetch_batch_hint must be greater than zero".to_string(),
            ));
        }
        if let StoreLocation::File(path) = &self.location {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("store path cannot be empty".to_string()));
            }
        }
        self.schema
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }
}
