//! Printed report tracking.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::{Database, DbResult};

/// One printed (or exported) copy of a patient report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrintedReport {
    pub report_id: String,
    pub accession_code: String,
    pub report_type: String,
    pub printed_by: Option<String>,
    pub notes: String,
    pub printed_at: DateTime<Utc>,
}

impl PrintedReport {
    pub fn new(accession_code: String, report_type: String, printed_by: Option<String>) -> Self {
        Self {
            report_id: uuid::Uuid::new_v4().to_string(),
            accession_code,
            report_type,
            printed_by,
            notes: String::new(),
            printed_at: Utc::now(),
        }
    }
}

impl Database {
    /// Record a printed report.
    pub fn insert_printed_report(&self, report: &PrintedReport) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO printed_reports (report_id, accession_code, report_type, printed_by, notes, printed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                report.report_id,
                report.accession_code,
                report.report_type,
                report.printed_by,
                report.notes,
                report.printed_at,
            ],
        )?;
        Ok(())
    }

    /// Printed reports for a patient, newest first.
    pub fn list_printed_reports(&self, accession_code: &str) -> DbResult<Vec<PrintedReport>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT report_id, accession_code, report_type, printed_by, notes, printed_at
            FROM printed_reports
            WHERE accession_code = ?
            ORDER BY printed_at DESC
            "#,
        )?;
        let rows = stmt.query_map([accession_code], printed_report_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Count printed reports across all patients.
    pub fn count_printed_reports(&self) -> DbResult<u32> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM printed_reports", [], |row| row.get(0))?;
        Ok(count as u32)
    }
}

fn printed_report_row(row: &Row<'_>) -> rusqlite::Result<PrintedReport> {
    Ok(PrintedReport {
        report_id: row.get(0)?,
        accession_code: row.get(1)?,
        report_type: row.get(2)?,
        printed_by: row.get(3)?,
        notes: row.get(4)?,
        printed_at: row.get(5)?,
    })
}
