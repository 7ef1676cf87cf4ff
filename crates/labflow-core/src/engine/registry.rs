//! Patient registration and maintenance.

use chrono::NaiveDate;
use rand::Rng;

use super::{EngineError, EngineResult};
use crate::db::Database;
use crate::models::{generate_accession_code, Patient};

/// Registers patients and keeps their demographics consistent.
pub struct PatientRegistry<'a> {
    db: &'a Database,
    accession_attempts: u32,
}

impl<'a> PatientRegistry<'a> {
    pub fn new(db: &'a Database, accession_attempts: u32) -> Self {
        Self {
            db,
            accession_attempts: accession_attempts.max(1),
        }
    }

    /// Validate, reconcile demographics and assign a fresh accession code.
    pub fn register_patient(&self, draft: Patient, today: NaiveDate) -> EngineResult<Patient> {
        self.register_patient_with_rng(draft, today, &mut rand::thread_rng())
    }

    /// Registration with a caller-supplied random source.
    pub fn register_patient_with_rng<R: Rng + ?Sized>(
        &self,
        mut patient: Patient,
        today: NaiveDate,
        rng: &mut R,
    ) -> EngineResult<Patient> {
        patient.full_name = patient.full_name.trim().to_string();
        patient.reconcile_demographics(today)?;

        let tx = self.db.begin()?;
        patient.accession_code = self.allocate_accession_code(today, rng)?;
        self.db.insert_patient(&patient)?;
        tx.commit()?;

        tracing::info!(
            patient_id = %patient.patient_id,
            accession_code = %patient.accession_code,
            "Patient registered"
        );
        Ok(patient)
    }

    /// Update demographics and contact details. The accession code cannot change.
    pub fn update_patient(&self, mut patient: Patient, today: NaiveDate) -> EngineResult<Patient> {
        let tx = self.db.begin()?;
        let existing = self
            .db
            .get_patient(&patient.patient_id)?
            .ok_or_else(|| EngineError::NotFound(format!("patient {}", patient.patient_id)))?;

        if patient.accession_code != existing.accession_code {
            return Err(EngineError::InvalidState(format!(
                "accession code of patient {} is immutable",
                patient.patient_id
            )));
        }

        patient.full_name = patient.full_name.trim().to_string();
        patient.reconcile_demographics(today)?;
        self.db.update_patient(&patient)?;

        let updated = self
            .db
            .get_patient(&patient.patient_id)?
            .ok_or_else(|| EngineError::NotFound(format!("patient {}", patient.patient_id)))?;
        tx.commit()?;
        Ok(updated)
    }

    pub fn get_patient(&self, patient_id: &str) -> EngineResult<Patient> {
        self.db
            .get_patient(patient_id)?
            .ok_or_else(|| EngineError::NotFound(format!("patient {}", patient_id)))
    }

    pub fn get_patient_by_accession(&self, accession_code: &str) -> EngineResult<Patient> {
        self.db
            .get_patient_by_accession(accession_code)?
            .ok_or_else(|| EngineError::NotFound(format!("patient {}", accession_code)))
    }

    pub fn search_patients(&self, query: &str, limit: usize) -> EngineResult<Vec<Patient>> {
        Ok(self.db.search_patients(query, limit)?)
    }

    pub fn list_patients(&self) -> EngineResult<Vec<Patient>> {
        Ok(self.db.list_patients()?)
    }

    /// Delete a patient together with their requests and results.
    pub fn delete_patient(&self, patient_id: &str) -> EngineResult<()> {
        if !self.db.delete_patient(patient_id)? {
            return Err(EngineError::NotFound(format!("patient {}", patient_id)));
        }
        tracing::info!(patient_id, "Patient deleted");
        Ok(())
    }

    fn allocate_accession_code<R: Rng + ?Sized>(
        &self,
        today: NaiveDate,
        rng: &mut R,
    ) -> EngineResult<String> {
        for attempt in 1..=self.accession_attempts {
            let code = generate_accession_code(today, rng);
            if !self.db.accession_code_exists(&code)? {
                return Ok(code);
            }
            tracing::debug!(attempt, code = %code, "Accession code collision");
        }
        Err(EngineError::InvalidState(format!(
            "no free accession code after {} attempts",
            self.accession_attempts
        )))
    }
}
