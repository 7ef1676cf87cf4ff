//! SQLite schema definition.

/// Complete database schema for labflow.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    patient_id TEXT PRIMARY KEY,
    accession_code TEXT NOT NULL UNIQUE,         -- printed on labels, joins the device feed
    full_name TEXT NOT NULL,
    sex TEXT NOT NULL CHECK (sex IN ('M', 'F')),
    date_of_birth TEXT,
    age INTEGER,
    phone_number TEXT,
    address TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(full_name);

-- Accession codes are assigned once and never rewritten
CREATE TRIGGER IF NOT EXISTS patients_accession_immutable
BEFORE UPDATE OF accession_code ON patients
WHEN new.accession_code <> old.accession_code
BEGIN
    SELECT RAISE(ABORT, 'Accession code is immutable');
END;

-- ============================================================================
-- Test Catalog (shared reference data)
-- ============================================================================

CREATE TABLE IF NOT EXISTS test_definitions (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT '',
    subcategory TEXT,
    unit TEXT NOT NULL DEFAULT '',
    price REAL NOT NULL DEFAULT 0 CHECK (price >= 0),
    active INTEGER NOT NULL DEFAULT 1,
    display_order INTEGER NOT NULL DEFAULT 0,
    male_min REAL,
    male_max REAL,
    male_range_text TEXT,
    female_min REAL,
    female_max REAL,
    female_range_text TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_tests_order ON test_definitions(display_order, name);

CREATE TABLE IF NOT EXISTS test_panels (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT,
    price REAL NOT NULL DEFAULT 0 CHECK (price >= 0),
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS panel_members (
    panel_code TEXT NOT NULL REFERENCES test_panels(code) ON DELETE CASCADE,
    test_code TEXT NOT NULL REFERENCES test_definitions(code),
    position INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (panel_code, test_code)
);

-- ============================================================================
-- Test Requests
-- ============================================================================

CREATE TABLE IF NOT EXISTS test_requests (
    request_id TEXT PRIMARY KEY,
    accession_code TEXT NOT NULL
        REFERENCES patients(accession_code) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'in_progress', 'completed', 'cancelled')),
    notes TEXT NOT NULL DEFAULT '',
    created_by TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_requests_accession ON test_requests(accession_code, created_at);
CREATE INDEX IF NOT EXISTS idx_requests_status ON test_requests(status);

CREATE TABLE IF NOT EXISTS request_tests (
    request_id TEXT NOT NULL REFERENCES test_requests(request_id) ON DELETE CASCADE,
    test_code TEXT NOT NULL REFERENCES test_definitions(code),
    PRIMARY KEY (request_id, test_code)
);

CREATE TABLE IF NOT EXISTS request_panels (
    request_id TEXT NOT NULL REFERENCES test_requests(request_id) ON DELETE CASCADE,
    panel_code TEXT NOT NULL REFERENCES test_panels(code),
    PRIMARY KEY (request_id, panel_code)
);

-- ============================================================================
-- Results
-- ============================================================================

CREATE TABLE IF NOT EXISTS test_results (
    result_id TEXT PRIMARY KEY,
    request_id TEXT NOT NULL REFERENCES test_requests(request_id) ON DELETE CASCADE,
    test_code TEXT NOT NULL REFERENCES test_definitions(code),
    value TEXT NOT NULL,
    status TEXT NOT NULL
        CHECK (status IN ('normal', 'high', 'low', 'abnormal', 'not_applicable')),
    notes TEXT NOT NULL DEFAULT '',
    entered_by TEXT,
    last_modified_by TEXT,
    entered_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (request_id, test_code)
);

CREATE TABLE IF NOT EXISTS panel_results (
    result_id TEXT PRIMARY KEY,
    request_id TEXT NOT NULL REFERENCES test_requests(request_id) ON DELETE CASCADE,
    panel_code TEXT NOT NULL REFERENCES test_panels(code),
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'completed')),
    notes TEXT NOT NULL DEFAULT '',
    recorded_at TEXT NOT NULL,
    UNIQUE (request_id, panel_code)
);

-- ============================================================================
-- Device Feed (Append-Only - rows are only ever deactivated)
-- ============================================================================

CREATE TABLE IF NOT EXISTS device_readings (
    reading_id INTEGER PRIMARY KEY AUTOINCREMENT,
    instrument TEXT NOT NULL,
    accession_code TEXT NOT NULL,                -- no FK: the feed may run ahead of registration
    test_code TEXT NOT NULL,
    value REAL NOT NULL,
    recorded_at TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_readings_active ON device_readings(active, recorded_at);

CREATE TRIGGER IF NOT EXISTS device_readings_no_reactivate
BEFORE UPDATE OF active ON device_readings
WHEN old.active = 0 AND new.active <> 0
BEGIN
    SELECT RAISE(ABORT, 'Consumed readings cannot be reactivated');
END;

CREATE TRIGGER IF NOT EXISTS device_readings_immutable
BEFORE UPDATE OF instrument, accession_code, test_code, value, recorded_at ON device_readings
BEGIN
    SELECT RAISE(ABORT, 'Device readings are append-only');
END;

-- ============================================================================
-- Printed Reports
-- ============================================================================

CREATE TABLE IF NOT EXISTS printed_reports (
    report_id TEXT PRIMARY KEY,
    accession_code TEXT NOT NULL
        REFERENCES patients(accession_code) ON DELETE CASCADE,
    report_type TEXT NOT NULL DEFAULT 'patient_report',
    printed_by TEXT,
    notes TEXT NOT NULL DEFAULT '',
    printed_at TEXT NOT NULL
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn
    }

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = setup_conn();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_accession_code_immutable() {
        let conn = setup_conn();
        conn.execute(
            "INSERT INTO patients (patient_id, accession_code, full_name, sex, created_at, updated_at)
             VALUES ('p1', '2401011234', 'Sara', 'F', 'now', 'now')",
            [],
        )
        .unwrap();

        // Rewriting the code should fail
        let result = conn.execute(
            "UPDATE patients SET accession_code = '2401019999' WHERE patient_id = 'p1'",
            [],
        );
        assert!(result.is_err());

        // Other fields remain editable
        let result = conn.execute(
            "UPDATE patients SET full_name = 'Sara Ali' WHERE patient_id = 'p1'",
            [],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_reading_cannot_be_reactivated() {
        let conn = setup_conn();
        conn.execute(
            "INSERT INTO device_readings (instrument, accession_code, test_code, value, recorded_at)
             VALUES ('cobas', '2401011234', 'GLU', 5.5, '2024-01-01 10:00:00+00:00')",
            [],
        )
        .unwrap();

        conn.execute("UPDATE device_readings SET active = 0", []).unwrap();

        let result = conn.execute("UPDATE device_readings SET active = 1", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_reading_payload_immutable() {
        let conn = setup_conn();
        conn.execute(
            "INSERT INTO device_readings (instrument, accession_code, test_code, value, recorded_at)
             VALUES ('cobas', '2401011234', 'GLU', 5.5, '2024-01-01 10:00:00+00:00')",
            [],
        )
        .unwrap();

        let result = conn.execute("UPDATE device_readings SET value = 9.9", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_result_unique_per_request_and_test() {
        let conn = setup_conn();
        conn.execute_batch(
            "INSERT INTO patients (patient_id, accession_code, full_name, sex, created_at, updated_at)
                VALUES ('p1', 'A1', 'Sara', 'F', 'now', 'now');
             INSERT INTO test_definitions (code, name) VALUES ('GLU', 'Glucose');
             INSERT INTO test_requests (request_id, accession_code, created_at) VALUES ('r1', 'A1', 'now');
             INSERT INTO test_results (result_id, request_id, test_code, value, status, entered_at, updated_at)
                VALUES ('x1', 'r1', 'GLU', '90', 'normal', 'now', 'now');",
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO test_results (result_id, request_id, test_code, value, status, entered_at, updated_at)
             VALUES ('x2', 'r1', 'GLU', '95', 'normal', 'now', 'now')",
            [],
        );
        assert!(result.is_err());
    }
}
