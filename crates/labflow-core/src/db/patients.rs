//! Patient database operations.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{Patient, Sex};

const PATIENT_COLUMNS: &str = "patient_id, accession_code, full_name, sex, date_of_birth, age, \
     phone_number, address, created_at, updated_at";

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO patients (
                patient_id, accession_code, full_name, sex, date_of_birth, age,
                phone_number, address, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                patient.patient_id,
                patient.accession_code,
                patient.full_name,
                patient.sex.as_code(),
                patient.date_of_birth,
                patient.age,
                patient.phone_number,
                patient.address,
                patient.created_at,
                patient.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing patient. The accession code is never written.
    pub fn update_patient(&self, patient: &Patient) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                full_name = ?2,
                sex = ?3,
                date_of_birth = ?4,
                age = ?5,
                phone_number = ?6,
                address = ?7,
                updated_at = ?8
            WHERE patient_id = ?1
            "#,
            params![
                patient.patient_id,
                patient.full_name,
                patient.sex.as_code(),
                patient.date_of_birth,
                patient.age,
                patient.phone_number,
                patient.address,
                Utc::now(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by internal ID.
    pub fn get_patient(&self, patient_id: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM patients WHERE patient_id = ?", PATIENT_COLUMNS),
                [patient_id],
                patient_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get a patient by accession code.
    pub fn get_patient_by_accession(&self, accession_code: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM patients WHERE accession_code = ?",
                    PATIENT_COLUMNS
                ),
                [accession_code],
                patient_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Check whether an accession code is already taken.
    pub fn accession_code_exists(&self, accession_code: &str) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM patients WHERE accession_code = ?",
            [accession_code],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Search patients by name, phone number or accession code (substring match).
    pub fn search_patients(&self, query: &str, limit: usize) -> DbResult<Vec<Patient>> {
        let pattern = format!("%{}%", query.trim());
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM patients
            WHERE full_name LIKE ?1 OR phone_number LIKE ?1 OR accession_code LIKE ?1
            ORDER BY full_name
            LIMIT ?2
            "#,
            PATIENT_COLUMNS
        ))?;

        let rows = stmt.query_map(params![pattern, limit as i64], patient_row)?;

        let mut patients = Vec::new();
        for row in rows {
            patients.push(row?.try_into()?);
        }
        Ok(patients)
    }

    /// List all patients, newest first.
    pub fn list_patients(&self) -> DbResult<Vec<Patient>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM patients ORDER BY created_at DESC, full_name",
            PATIENT_COLUMNS
        ))?;

        let rows = stmt.query_map([], patient_row)?;

        let mut patients = Vec::new();
        for row in rows {
            patients.push(row?.try_into()?);
        }
        Ok(patients)
    }

    /// Count registered patients.
    pub fn count_patients(&self) -> DbResult<u32> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
        Ok(count as u32)
    }

    /// Delete a patient. Requests, results and printed reports cascade.
    pub fn delete_patient(&self, patient_id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM patients WHERE patient_id = ?", [patient_id])?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct PatientRow {
    patient_id: String,
    accession_code: String,
    full_name: String,
    sex: String,
    date_of_birth: Option<NaiveDate>,
    age: Option<u32>,
    phone_number: Option<String>,
    address: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn patient_row(row: &Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok(PatientRow {
        patient_id: row.get(0)?,
        accession_code: row.get(1)?,
        full_name: row.get(2)?,
        sex: row.get(3)?,
        date_of_birth: row.get(4)?,
        age: row.get(5)?,
        phone_number: row.get(6)?,
        address: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl TryFrom<PatientRow> for Patient {
    type Error = DbError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        let sex = Sex::from_code(&row.sex)
            .ok_or_else(|| DbError::Constraint(format!("Unknown sex code: {}", row.sex)))?;

        Ok(Patient {
            patient_id: row.patient_id,
            accession_code: row.accession_code,
            full_name: row.full_name,
            sex,
            date_of_birth: row.date_of_birth,
            age: row.age,
            phone_number: row.phone_number,
            address: row.address,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
