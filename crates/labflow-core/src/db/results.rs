//! Result and panel result database operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{PanelResult, PanelStatus, ResultStatus, TestResult};

const RESULT_COLUMNS: &str = "tr.result_id, tr.request_id, tr.test_code, tr.value, tr.status, tr.notes, \
     tr.entered_by, tr.last_modified_by, tr.entered_at, tr.updated_at";

/// Result joined with the request it belongs to, for patient history.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientResultRow {
    pub result: TestResult,
    pub request_created_at: DateTime<Utc>,
}

impl Database {
    /// Get the result for a (request, test) pair.
    pub fn get_result(&self, request_id: &str, test_code: &str) -> DbResult<Option<TestResult>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM test_results tr WHERE tr.request_id = ?1 AND tr.test_code = ?2",
                    RESULT_COLUMNS
                ),
                params![request_id, test_code],
                result_row,
            )
            .optional()?
            .map(TryInto::try_into)
            .transpose()
    }

    /// List results for a request in display order.
    pub fn list_results_for_request(&self, request_id: &str) -> DbResult<Vec<TestResult>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM test_results tr
            LEFT JOIN test_definitions t ON t.code = tr.test_code
            WHERE tr.request_id = ?
            ORDER BY t.display_order, t.name
            "#,
            RESULT_COLUMNS
        ))?;
        let rows = stmt.query_map([request_id], result_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?.try_into()?);
        }
        Ok(results)
    }

    /// All results ever recorded for a patient, newest request first.
    pub fn list_results_for_accession(&self, accession_code: &str) -> DbResult<Vec<PatientResultRow>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}, r.created_at
            FROM test_results tr
            JOIN test_requests r ON r.request_id = tr.request_id
            WHERE r.accession_code = ?
            ORDER BY r.created_at DESC, tr.entered_at
            "#,
            RESULT_COLUMNS
        ))?;
        let rows = stmt.query_map([accession_code], |row| {
            Ok((result_row(row)?, row.get::<_, DateTime<Utc>>(10)?))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (result, request_created_at) = row?;
            results.push(PatientResultRow {
                result: result.try_into()?,
                request_created_at,
            });
        }
        Ok(results)
    }

    /// Atomically insert or update the result for `(request_id, test_code)`.
    ///
    /// `actor` becomes `entered_by` on a fresh insert and `last_modified_by` on
    /// conflict. An update only changes the value, status, notes and
    /// `updated_at`; `entered_by` and `entered_at` are never touched.
    pub fn upsert_result(&self, result: &TestResult, actor: Option<&str>) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO test_results (
                result_id, request_id, test_code, value, status, notes,
                entered_by, last_modified_by, entered_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?9)
            ON CONFLICT(request_id, test_code) DO UPDATE SET
                value = excluded.value,
                status = excluded.status,
                notes = excluded.notes,
                last_modified_by = ?10,
                updated_at = excluded.updated_at
            "#,
            params![
                result.result_id,
                result.request_id,
                result.test_code,
                result.value,
                result.status.as_str(),
                result.notes,
                actor,
                result.entered_at,
                result.updated_at,
                actor,
            ],
        )?;
        Ok(())
    }

    /// Overwrite the status of an existing result.
    pub fn set_result_status(
        &self,
        request_id: &str,
        test_code: &str,
        status: ResultStatus,
        actor: Option<&str>,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE test_results
            SET status = ?3, last_modified_by = ?4, updated_at = ?5
            WHERE request_id = ?1 AND test_code = ?2
            "#,
            params![request_id, test_code, status.as_str(), actor, Utc::now()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Insert or update the panel bookkeeping record for `(request_id, panel_code)`.
    pub fn upsert_panel_result(&self, panel_result: &PanelResult) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO panel_results (result_id, request_id, panel_code, status, notes, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(request_id, panel_code) DO UPDATE SET
                status = excluded.status,
                notes = excluded.notes,
                recorded_at = excluded.recorded_at
            "#,
            params![
                panel_result.result_id,
                panel_result.request_id,
                panel_result.panel_code,
                panel_result.status.as_str(),
                panel_result.notes,
                panel_result.recorded_at,
            ],
        )?;
        Ok(())
    }

    /// Get the panel record for a (request, panel) pair.
    pub fn get_panel_result(
        &self,
        request_id: &str,
        panel_code: &str,
    ) -> DbResult<Option<PanelResult>> {
        self.conn
            .query_row(
                r#"
                SELECT result_id, request_id, panel_code, status, notes, recorded_at
                FROM panel_results WHERE request_id = ?1 AND panel_code = ?2
                "#,
                params![request_id, panel_code],
                panel_result_row,
            )
            .optional()?
            .map(TryInto::try_into)
            .transpose()
    }

    /// List panel records for every request of a patient.
    pub fn list_panel_results_for_accession(&self, accession_code: &str) -> DbResult<Vec<PanelResult>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT pr.result_id, pr.request_id, pr.panel_code, pr.status, pr.notes, pr.recorded_at
            FROM panel_results pr
            JOIN test_requests r ON r.request_id = pr.request_id
            WHERE r.accession_code = ?
            ORDER BY r.created_at DESC, pr.recorded_at
            "#,
        )?;
        let rows = stmt.query_map([accession_code], panel_result_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?.try_into()?);
        }
        Ok(results)
    }

    /// Count stored results.
    pub fn count_results(&self) -> DbResult<u32> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM test_results", [], |row| row.get(0))?;
        Ok(count as u32)
    }
}

/// Intermediate row struct for database mapping.
struct ResultRow {
    result_id: String,
    request_id: String,
    test_code: String,
    value: String,
    status: String,
    notes: String,
    entered_by: Option<String>,
    last_modified_by: Option<String>,
    entered_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn result_row(row: &Row<'_>) -> rusqlite::Result<ResultRow> {
    Ok(ResultRow {
        result_id: row.get(0)?,
        request_id: row.get(1)?,
        test_code: row.get(2)?,
        value: row.get(3)?,
        status: row.get(4)?,
        notes: row.get(5)?,
        entered_by: row.get(6)?,
        last_modified_by: row.get(7)?,
        entered_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl TryFrom<ResultRow> for TestResult {
    type Error = DbError;

    fn try_from(row: ResultRow) -> Result<Self, Self::Error> {
        let status = ResultStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown result status: {}", row.status)))?;

        Ok(TestResult {
            result_id: row.result_id,
            request_id: row.request_id,
            test_code: row.test_code,
            value: row.value,
            status,
            notes: row.notes,
            entered_by: row.entered_by,
            last_modified_by: row.last_modified_by,
            entered_at: row.entered_at,
            updated_at: row.updated_at,
        })
    }
}

struct PanelResultRow {
    result_id: String,
    request_id: String,
    panel_code: String,
    status: String,
    notes: String,
    recorded_at: DateTime<Utc>,
}

fn panel_result_row(row: &Row<'_>) -> rusqlite::Result<PanelResultRow> {
    Ok(PanelResultRow {
        result_id: row.get(0)?,
        request_id: row.get(1)?,
        panel_code: row.get(2)?,
        status: row.get(3)?,
        notes: row.get(4)?,
        recorded_at: row.get(5)?,
    })
}

impl TryFrom<PanelResultRow> for PanelResult {
    type Error = DbError;

    fn try_from(row: PanelResultRow) -> Result<Self, Self::Error> {
        let status = PanelStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown panel status: {}", row.status)))?;

        Ok(PanelResult {
            result_id: row.result_id,
            request_id: row.request_id,
            panel_code: row.panel_code,
            status,
            notes: row.notes,
            recorded_at: row.recorded_at,
        })
    }
}
