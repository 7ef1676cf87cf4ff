//! Result engine.
//!
//! Flow: manual entry / device feed → Upsert → Reference range classification
//!       → Completion tracking
//!
//! Every public operation opens exactly one transaction on the shared
//! [`Database`](crate::db::Database). Internal helpers assume the caller holds it.

mod completion;
mod reconciler;
mod reference_range;
mod registry;
mod requests;
mod upsert;

pub use completion::*;
pub use reconciler::*;
pub use reference_range::*;
pub use registry::*;
pub use requests::*;
pub use upsert::*;

use thiserror::Error;

use crate::db::DbError;
use crate::models::ValidationError;

/// Engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid patient: {0}")]
    Patient(#[from] ValidationError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Database(DbError::Sqlite(err))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
