//! Database layer for labflow.

mod schema;
mod patients;
mod catalog;
mod requests;
mod results;
mod readings;
mod reports;

pub use schema::*;
#[allow(unused_imports)]
pub use patients::*;
#[allow(unused_imports)]
pub use catalog::*;
#[allow(unused_imports)]
pub use requests::*;
#[allow(unused_imports)]
pub use results::*;
pub use readings::*;
pub use reports::*;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// The lab result store: one SQLite connection with the schema applied.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the store at `path`, creating the file and schema when missing.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Throwaway store for tests and the FFI in-memory factory.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Underlying connection, for ad hoc queries.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction on a shared borrow.
    ///
    /// Every `Database` method issued while the returned guard is alive runs inside
    /// the transaction. Dropping the guard without `commit()` rolls back.
    pub fn begin(&self) -> DbResult<rusqlite::Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_open_file_reuses_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.db");

        {
            let db = Database::open(&path).unwrap();
            db.conn()
                .execute("INSERT INTO test_definitions (code, name) VALUES ('GLU', 'Glucose')", [])
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM test_definitions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        // Every table the store relies on
        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "patients",
            "test_definitions",
            "test_panels",
            "panel_members",
            "test_requests",
            "request_tests",
            "request_panels",
            "test_results",
            "panel_results",
            "device_readings",
            "printed_reports",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        {
            let _tx = db.begin().unwrap();
            db.conn()
                .execute("INSERT INTO test_definitions (code, name) VALUES ('GLU', 'Glucose')", [])
                .unwrap();
        }
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM test_definitions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
