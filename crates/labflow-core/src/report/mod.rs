//! Patient reports, printed report tracking and lab statistics.

mod aggregator;
mod stats;

pub use aggregator::*;
pub use stats::*;

use thiserror::Error;

use crate::db::DbError;

/// Report errors.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Patient not found: {0}")]
    PatientNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ReportResult<T> = Result<T, ReportError>;
