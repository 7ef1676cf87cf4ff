//! Device result reconciliation.
//!
//! Folds active instrument readings into the result store, oldest first, so a
//! later reading for the same test supersedes an earlier one within one pass.
//! Each reading runs in its own transaction: the result write and the reading's
//! deactivation commit together, and a failing reading never aborts the batch.

use serde::{Deserialize, Serialize};

use super::{EngineError, EngineResult, ResultRecorder};
use crate::config::UnmatchedReadingPolicy;
use crate::db::Database;
use crate::models::DeviceReading;

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    /// Active readings examined
    pub processed: u32,
    /// Results created or updated
    pub affected: u32,
    /// Readings older than the stored result (consumed, no write)
    pub stale: u32,
    /// Readings with no open request that qualifies
    pub unmatched: u32,
    /// Unmatched readings consumed under the drop policy
    pub dropped: u32,
    /// Readings that errored and were left active
    pub failed: u32,
}

/// What happened to a single reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadingOutcome {
    Written { request_id: String },
    Stale { request_id: String },
    Unmatched { dropped: bool },
}

/// Polls the device feed and applies readings to matching requests.
pub struct DeviceReconciler<'a> {
    db: &'a Database,
    policy: UnmatchedReadingPolicy,
}

impl<'a> DeviceReconciler<'a> {
    pub fn new(db: &'a Database, policy: UnmatchedReadingPolicy) -> Self {
        Self { db, policy }
    }

    /// Run one pass over every active reading.
    pub fn reconcile(&self, actor: Option<&str>) -> EngineResult<ReconcileSummary> {
        let readings = self.db.list_active_readings()?;
        let mut summary = ReconcileSummary::default();

        for reading in &readings {
            summary.processed += 1;
            match self.apply(reading, actor) {
                Ok(ReadingOutcome::Written { .. }) => summary.affected += 1,
                Ok(ReadingOutcome::Stale { request_id }) => {
                    tracing::debug!(
                        reading_id = reading.reading_id,
                        request_id = %request_id,
                        test = %reading.test_code,
                        "Reading older than stored result"
                    );
                    summary.stale += 1;
                }
                Ok(ReadingOutcome::Unmatched { dropped }) => {
                    tracing::warn!(
                        reading_id = reading.reading_id,
                        accession_code = %reading.accession_code,
                        test = %reading.test_code,
                        dropped,
                        "No open request for reading"
                    );
                    summary.unmatched += 1;
                    if dropped {
                        summary.dropped += 1;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        reading_id = reading.reading_id,
                        error = %err,
                        "Failed to reconcile reading"
                    );
                    summary.failed += 1;
                }
            }
        }

        if summary.processed > 0 {
            tracing::info!(
                processed = summary.processed,
                affected = summary.affected,
                stale = summary.stale,
                unmatched = summary.unmatched,
                dropped = summary.dropped,
                failed = summary.failed,
                "Device reconciliation finished"
            );
        }
        Ok(summary)
    }

    /// Apply one reading inside its own transaction.
    pub fn apply(
        &self,
        reading: &DeviceReading,
        actor: Option<&str>,
    ) -> EngineResult<ReadingOutcome> {
        let tx = self.db.begin()?;

        let Some(request) = self
            .db
            .find_request_for_reading(&reading.accession_code, &reading.test_code)?
        else {
            let dropped = match self.policy {
                UnmatchedReadingPolicy::Retain => false,
                UnmatchedReadingPolicy::Drop => self.db.deactivate_reading(reading.reading_id)?,
            };
            tx.commit()?;
            return Ok(ReadingOutcome::Unmatched { dropped });
        };

        if let Some(existing) = self.db.get_result(&request.request_id, &reading.test_code)? {
            if existing.updated_at > reading.recorded_at {
                self.db.deactivate_reading(reading.reading_id)?;
                tx.commit()?;
                return Ok(ReadingOutcome::Stale {
                    request_id: request.request_id,
                });
            }
        }

        let definition = self
            .db
            .get_test_definition(&reading.test_code)?
            .ok_or_else(|| EngineError::NotFound(format!("test {}", reading.test_code)))?;

        let recorder = ResultRecorder::new(self.db);
        let sex = recorder.patient_sex(&request)?;
        recorder.write_value(
            &request,
            &definition,
            sex,
            &reading.value_text(),
            None,
            actor,
            reading.recorded_at,
        )?;

        self.db.deactivate_reading(reading.reading_id)?;
        tx.commit()?;
        Ok(ReadingOutcome::Written {
            request_id: request.request_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewDeviceReading, Patient, Sex, TestDefinition, TestRequest};
    use chrono::{Duration, Utc};

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        let mut patient = Patient::new("Sara".into(), Sex::Female);
        patient.accession_code = "2401011234".into();
        patient.age = Some(30);
        db.insert_patient(&patient).unwrap();
        db.upsert_test_definition(&TestDefinition::new(
            "GLU".into(),
            "Glucose".into(),
            "chemistry".into(),
            "mmol/L".into(),
        ))
        .unwrap();
        db
    }

    #[test]
    fn test_empty_feed() {
        let db = setup_db();
        let summary = DeviceReconciler::new(&db, UnmatchedReadingPolicy::Retain)
            .reconcile(None)
            .unwrap();
        assert_eq!(summary, ReconcileSummary::default());
    }

    #[test]
    fn test_reading_written_and_consumed() {
        let db = setup_db();
        let mut request = TestRequest::new("2401011234".into());
        request.test_codes = vec!["GLU".into()];
        db.insert_request(&request).unwrap();

        let recorded_at = Utc::now() - Duration::minutes(3);
        let id = db
            .append_device_reading(&NewDeviceReading::new(
                "cobas",
                "2401011234",
                "GLU",
                5.5,
                recorded_at,
            ))
            .unwrap();

        let summary = DeviceReconciler::new(&db, UnmatchedReadingPolicy::Retain)
            .reconcile(Some("sync"))
            .unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.affected, 1);

        let result = db.get_result(&request.request_id, "GLU").unwrap().unwrap();
        assert_eq!(result.value, "5.5");
        assert_eq!(result.updated_at, recorded_at);
        assert_eq!(result.entered_by.as_deref(), Some("sync"));
        assert!(!db.get_device_reading(id).unwrap().unwrap().active);
    }

    #[test]
    fn test_unknown_patient_is_unmatched() {
        let db = setup_db();
        db.append_device_reading(&NewDeviceReading::new(
            "cobas",
            "0000000000",
            "GLU",
            5.5,
            Utc::now(),
        ))
        .unwrap();

        let summary = DeviceReconciler::new(&db, UnmatchedReadingPolicy::Retain)
            .reconcile(None)
            .unwrap();
        assert_eq!(summary.unmatched, 1);
        assert_eq!(summary.dropped, 0);
        assert_eq!(db.count_active_readings().unwrap(), 1);
    }
}
