//! Core runtime configuration.
//!
//! Resolved once at process startup and passed into the services that need it.
//! Nothing in this crate reads environment variables; front ends (the CLI, the
//! FFI host) are responsible for turning their own inputs into a `LabConfig`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of attempts at finding an unused accession code.
pub const DEFAULT_ACCESSION_ATTEMPTS: u32 = 16;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("database path cannot be empty")]
    EmptyDatabasePath,

    #[error("accession_attempts must be at least 1")]
    NoAccessionAttempts,

    #[error("unknown unmatched reading policy '{0}' (expected 'retain' or 'drop')")]
    UnknownPolicy(String),
}

/// What the reconciler does with a reading that matches no open request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReadingPolicy {
    /// Leave the reading active so a later request can pick it up.
    #[default]
    Retain,
    /// Consume the reading without producing a result.
    Drop,
}

impl UnmatchedReadingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnmatchedReadingPolicy::Retain => "retain",
            UnmatchedReadingPolicy::Drop => "drop",
        }
    }
}

impl fmt::Display for UnmatchedReadingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnmatchedReadingPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(UnmatchedReadingPolicy::Retain),
            "drop" => Ok(UnmatchedReadingPolicy::Drop),
            other => Err(ConfigError::UnknownPolicy(other.to_string())),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct LabConfig {
    database_path: PathBuf,
    unmatched_reading_policy: UnmatchedReadingPolicy,
    accession_attempts: u32,
}

impl LabConfig {
    /// Create a new `LabConfig`.
    pub fn new(
        database_path: PathBuf,
        unmatched_reading_policy: UnmatchedReadingPolicy,
        accession_attempts: u32,
    ) -> Result<Self, ConfigError> {
        if database_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if accession_attempts == 0 {
            return Err(ConfigError::NoAccessionAttempts);
        }

        Ok(Self {
            database_path,
            unmatched_reading_policy,
            accession_attempts,
        })
    }

    /// Configuration with defaults for everything but the database location.
    pub fn with_database(database_path: PathBuf) -> Result<Self, ConfigError> {
        Self::new(
            database_path,
            UnmatchedReadingPolicy::default(),
            DEFAULT_ACCESSION_ATTEMPTS,
        )
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn unmatched_reading_policy(&self) -> UnmatchedReadingPolicy {
        self.unmatched_reading_policy
    }

    pub fn accession_attempts(&self) -> u32 {
        self.accession_attempts
    }
}
