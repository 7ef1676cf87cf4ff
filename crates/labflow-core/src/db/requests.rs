//! Test request database operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{Database, DbError, DbResult};
use crate::models::{RequestStatus, TestRequest};

const REQUEST_COLUMNS: &str =
    "r.request_id, r.accession_code, r.status, r.notes, r.created_by, r.created_at";

/// How often a test has been ordered, individually or through a panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPopularity {
    pub test_code: String,
    pub test_name: String,
    pub request_count: u32,
}

impl Database {
    /// Insert a new request with its test and panel sets.
    pub fn insert_request(&self, request: &TestRequest) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO test_requests (request_id, accession_code, status, notes, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                request.request_id,
                request.accession_code,
                request.status.as_str(),
                request.notes,
                request.created_by,
                request.created_at,
            ],
        )?;
        self.write_request_items(&request.request_id, &request.test_codes, &request.panel_codes)
    }

    /// Replace the ordered items and notes of a request. Status is left alone.
    pub fn replace_request_items(
        &self,
        request_id: &str,
        test_codes: &[String],
        panel_codes: &[String],
        notes: &str,
    ) -> DbResult<()> {
        let rows_affected = self.conn.execute(
            "UPDATE test_requests SET notes = ?2 WHERE request_id = ?1",
            params![request_id, notes],
        )?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("request {}", request_id)));
        }

        self.conn
            .execute("DELETE FROM request_tests WHERE request_id = ?", [request_id])?;
        self.conn
            .execute("DELETE FROM request_panels WHERE request_id = ?", [request_id])?;
        self.write_request_items(request_id, test_codes, panel_codes)?;

        // Results for tests that are no longer ordered would inflate the entered count
        self.conn.execute(
            r#"
            DELETE FROM test_results
            WHERE request_id = ?1
              AND test_code NOT IN (
                SELECT test_code FROM request_tests WHERE request_id = ?1
                UNION
                SELECT pm.test_code FROM request_panels rp
                JOIN panel_members pm ON pm.panel_code = rp.panel_code
                WHERE rp.request_id = ?1
              )
            "#,
            [request_id],
        )?;
        self.conn.execute(
            r#"
            DELETE FROM panel_results
            WHERE request_id = ?1
              AND panel_code NOT IN (SELECT panel_code FROM request_panels WHERE request_id = ?1)
            "#,
            [request_id],
        )?;
        Ok(())
    }

    fn write_request_items(
        &self,
        request_id: &str,
        test_codes: &[String],
        panel_codes: &[String],
    ) -> DbResult<()> {
        let mut stmt = self.conn.prepare(
            "INSERT OR IGNORE INTO request_tests (request_id, test_code) VALUES (?1, ?2)",
        )?;
        for code in test_codes {
            stmt.execute(params![request_id, code])?;
        }

        let mut stmt = self.conn.prepare(
            "INSERT OR IGNORE INTO request_panels (request_id, panel_code) VALUES (?1, ?2)",
        )?;
        for code in panel_codes {
            stmt.execute(params![request_id, code])?;
        }
        Ok(())
    }

    /// Get a request by ID, including its test and panel codes.
    pub fn get_request(&self, request_id: &str) -> DbResult<Option<TestRequest>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM test_requests r WHERE r.request_id = ?",
                    REQUEST_COLUMNS
                ),
                [request_id],
                request_row,
            )
            .optional()?;

        match row {
            Some(row) => Ok(Some(self.hydrate_request(row)?)),
            None => Ok(None),
        }
    }

    /// List a patient's requests, newest first.
    pub fn list_requests_for_accession(&self, accession_code: &str) -> DbResult<Vec<TestRequest>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM test_requests r
            WHERE r.accession_code = ?
            ORDER BY r.created_at DESC, r.rowid DESC
            "#,
            REQUEST_COLUMNS
        ))?;
        let rows = stmt.query_map([accession_code], request_row)?;
        self.collect_requests(rows)
    }

    /// List requests, optionally filtered by status and by a patient name or
    /// accession code substring. Newest first.
    pub fn list_requests(
        &self,
        status: Option<RequestStatus>,
        search: Option<&str>,
    ) -> DbResult<Vec<TestRequest>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM test_requests r
            JOIN patients p ON p.accession_code = r.accession_code
            WHERE (?1 IS NULL OR r.status = ?1)
              AND (?2 IS NULL OR p.full_name LIKE ?2 OR p.accession_code LIKE ?2)
            ORDER BY r.created_at DESC, r.rowid DESC
            "#,
            REQUEST_COLUMNS
        ))?;
        let rows = stmt.query_map(params![status.map(|s| s.as_str()), pattern], request_row)?;
        self.collect_requests(rows)
    }

    /// Most recent non-cancelled request for the patient that orders `test_code`,
    /// either individually or through one of its panels.
    pub fn find_request_for_reading(
        &self,
        accession_code: &str,
        test_code: &str,
    ) -> DbResult<Option<TestRequest>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    r#"
                    SELECT {}
                    FROM test_requests r
                    WHERE r.accession_code = ?1
                      AND r.status <> 'cancelled'
                      AND (
                        EXISTS (SELECT 1 FROM request_tests rt
                                WHERE rt.request_id = r.request_id AND rt.test_code = ?2)
                        OR EXISTS (SELECT 1 FROM request_panels rp
                                   JOIN panel_members pm ON pm.panel_code = rp.panel_code
                                   WHERE rp.request_id = r.request_id AND pm.test_code = ?2)
                      )
                    ORDER BY r.created_at DESC, r.rowid DESC
                    LIMIT 1
                    "#,
                    REQUEST_COLUMNS
                ),
                params![accession_code, test_code],
                request_row,
            )
            .optional()?;

        match row {
            Some(row) => Ok(Some(self.hydrate_request(row)?)),
            None => Ok(None),
        }
    }

    /// Persist only the status field of a request.
    pub fn set_request_status(&self, request_id: &str, status: RequestStatus) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE test_requests SET status = ?2 WHERE request_id = ?1",
            params![request_id, status.as_str()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Delete a request. Results, panel results and item rows cascade.
    pub fn delete_request(&self, request_id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM test_requests WHERE request_id = ?", [request_id])?;
        Ok(rows_affected > 0)
    }

    /// Whether the request orders the test individually or via a panel.
    pub fn request_contains_test(&self, request_id: &str, test_code: &str) -> DbResult<bool> {
        let found: bool = self.conn.query_row(
            r#"
            SELECT EXISTS (SELECT 1 FROM request_tests WHERE request_id = ?1 AND test_code = ?2)
                OR EXISTS (SELECT 1 FROM request_panels rp
                           JOIN panel_members pm ON pm.panel_code = rp.panel_code
                           WHERE rp.request_id = ?1 AND pm.test_code = ?2)
            "#,
            params![request_id, test_code],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Whether the request orders the panel.
    pub fn request_contains_panel(&self, request_id: &str, panel_code: &str) -> DbResult<bool> {
        let found: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM request_panels WHERE request_id = ?1 AND panel_code = ?2)",
            params![request_id, panel_code],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Individual tests plus the member count of every ordered panel.
    pub fn required_test_count(&self, request_id: &str) -> DbResult<u32> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT
                (SELECT COUNT(*) FROM request_tests WHERE request_id = ?1)
              + (SELECT COUNT(*) FROM request_panels rp
                 JOIN panel_members pm ON pm.panel_code = rp.panel_code
                 WHERE rp.request_id = ?1)
            "#,
            [request_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Stored results plus panel result records for the request.
    pub fn entered_result_count(&self, request_id: &str) -> DbResult<u32> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT
                (SELECT COUNT(*) FROM test_results WHERE request_id = ?1)
              + (SELECT COUNT(*) FROM panel_results WHERE request_id = ?1)
            "#,
            [request_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Individual test prices plus bundled panel prices.
    pub fn request_total_price(&self, request_id: &str) -> DbResult<f64> {
        let total: f64 = self.conn.query_row(
            r#"
            SELECT
                COALESCE((SELECT SUM(t.price) FROM request_tests rt
                          JOIN test_definitions t ON t.code = rt.test_code
                          WHERE rt.request_id = ?1), 0)
              + COALESCE((SELECT SUM(p.price) FROM request_panels rp
                          JOIN test_panels p ON p.code = rp.panel_code
                          WHERE rp.request_id = ?1), 0)
            "#,
            [request_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Total number of requests.
    pub fn count_requests(&self) -> DbResult<u32> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM test_requests", [], |row| row.get(0))?;
        Ok(count as u32)
    }

    /// Request count for every status, including zero counts.
    pub fn count_requests_by_status(&self) -> DbResult<Vec<(RequestStatus, u32)>> {
        let mut counts = Vec::new();
        for status in RequestStatus::all() {
            let count: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM test_requests WHERE status = ?",
                [status.as_str()],
                |row| row.get(0),
            )?;
            counts.push((status, count as u32));
        }
        Ok(counts)
    }

    /// Most frequently ordered tests, counting panel membership.
    pub fn popular_tests(&self, limit: usize) -> DbResult<Vec<TestPopularity>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.code, t.name, COUNT(DISTINCT ordered.request_id) AS n
            FROM (
                SELECT request_id, test_code FROM request_tests
                UNION ALL
                SELECT rp.request_id, pm.test_code
                FROM request_panels rp
                JOIN panel_members pm ON pm.panel_code = rp.panel_code
            ) ordered
            JOIN test_definitions t ON t.code = ordered.test_code
            GROUP BY t.code, t.name
            ORDER BY n DESC, t.name
            LIMIT ?
            "#,
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(TestPopularity {
                test_code: row.get(0)?,
                test_name: row.get(1)?,
                request_count: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn collect_requests(
        &self,
        rows: impl Iterator<Item = rusqlite::Result<RequestRow>>,
    ) -> DbResult<Vec<TestRequest>> {
        let rows = rows.collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(|row| self.hydrate_request(row)).collect()
    }

    fn hydrate_request(&self, row: RequestRow) -> DbResult<TestRequest> {
        let mut request = TestRequest::try_from(row)?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT rt.test_code FROM request_tests rt
            LEFT JOIN test_definitions t ON t.code = rt.test_code
            WHERE rt.request_id = ?
            ORDER BY t.display_order, rt.rowid
            "#,
        )?;
        request.test_codes = stmt
            .query_map([&request.request_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT panel_code FROM request_panels WHERE request_id = ? ORDER BY rowid",
        )?;
        request.panel_codes = stmt
            .query_map([&request.request_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(request)
    }
}

/// Intermediate row struct for database mapping.
struct RequestRow {
    request_id: String,
    accession_code: String,
    status: String,
    notes: String,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
}

fn request_row(row: &Row<'_>) -> rusqlite::Result<RequestRow> {
    Ok(RequestRow {
        request_id: row.get(0)?,
        accession_code: row.get(1)?,
        status: row.get(2)?,
        notes: row.get(3)?,
        created_by: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl TryFrom<RequestRow> for TestRequest {
    type Error = DbError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let status = RequestStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown request status: {}", row.status)))?;

        Ok(TestRequest {
            request_id: row.request_id,
            accession_code: row.accession_code,
            test_codes: Vec::new(),
            panel_codes: Vec::new(),
            status,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}
