//! Device feed database operations.
//!
//! The feed is append-only: rows are inserted by instrument adapters and the
//! only permitted change afterwards is clearing the `active` flag.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::{DeviceReading, NewDeviceReading};

const READING_COLUMNS: &str =
    "reading_id, instrument, accession_code, test_code, value, recorded_at, active";

impl Database {
    /// Append a reading to the feed. Returns its feed ID.
    pub fn append_device_reading(&self, reading: &NewDeviceReading) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO device_readings (instrument, accession_code, test_code, value, recorded_at, active)
            VALUES (?1, ?2, ?3, ?4, ?5, 1)
            "#,
            params![
                reading.instrument,
                reading.accession_code.trim(),
                reading.test_code.trim(),
                reading.value,
                reading.recorded_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Active readings, oldest first. Ties on timestamp fall back to append order.
    pub fn list_active_readings(&self) -> DbResult<Vec<DeviceReading>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM device_readings WHERE active = 1 ORDER BY recorded_at, reading_id",
            READING_COLUMNS
        ))?;
        let rows = stmt.query_map([], reading_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Get a reading by feed ID.
    pub fn get_device_reading(&self, reading_id: i64) -> DbResult<Option<DeviceReading>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM device_readings WHERE reading_id = ?",
                    READING_COLUMNS
                ),
                [reading_id],
                reading_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Mark a reading consumed. Returns false if it was already inactive.
    pub fn deactivate_reading(&self, reading_id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE device_readings SET active = 0 WHERE reading_id = ? AND active = 1",
            [reading_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Count readings still waiting to be reconciled.
    pub fn count_active_readings(&self) -> DbResult<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM device_readings WHERE active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }
}

fn reading_row(row: &Row<'_>) -> rusqlite::Result<DeviceReading> {
    Ok(DeviceReading {
        reading_id: row.get(0)?,
        instrument: row.get(1)?,
        accession_code: row.get(2)?,
        test_code: row.get(3)?,
        value: row.get(4)?,
        recorded_at: row.get(5)?,
        active: row.get(6)?,
    })
}
