//! Test request lifecycle.

use super::{CompletionProgress, CompletionTracker, EngineError, EngineResult};
use crate::db::Database;
use crate::models::{RequestStatus, TestRequest};

/// Creates, edits and cancels test requests.
///
/// Status is never written here except by [`cancel_request`](Self::cancel_request);
/// everything else goes through the completion tracker.
pub struct RequestManager<'a> {
    db: &'a Database,
}

impl<'a> RequestManager<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create_request(
        &self,
        accession_code: &str,
        test_codes: &[String],
        panel_codes: &[String],
        notes: &str,
        actor: Option<&str>,
    ) -> EngineResult<TestRequest> {
        let tx = self.db.begin()?;
        if self.db.get_patient_by_accession(accession_code)?.is_none() {
            return Err(EngineError::NotFound(format!("patient {}", accession_code)));
        }
        let (test_codes, panel_codes) = self.validate_items(test_codes, panel_codes)?;

        let mut request = TestRequest::new(accession_code.to_string());
        request.test_codes = test_codes;
        request.panel_codes = panel_codes;
        request.notes = notes.trim().to_string();
        request.created_by = actor.map(str::to_string);
        self.db.insert_request(&request)?;

        let stored = self.load(&request.request_id)?;
        tx.commit()?;

        tracing::info!(
            request_id = %stored.request_id,
            accession_code,
            tests = stored.test_codes.len(),
            panels = stored.panel_codes.len(),
            "Request created"
        );
        Ok(stored)
    }

    /// Replace the tests, panels and notes of an open request.
    pub fn update_request_items(
        &self,
        request_id: &str,
        test_codes: &[String],
        panel_codes: &[String],
        notes: &str,
    ) -> EngineResult<TestRequest> {
        let tx = self.db.begin()?;
        let request = self.load(request_id)?;
        if request.is_cancelled() {
            return Err(EngineError::InvalidState(format!(
                "request {} is cancelled",
                request_id
            )));
        }

        let (test_codes, panel_codes) = self.validate_items(test_codes, panel_codes)?;
        self.db
            .replace_request_items(request_id, &test_codes, &panel_codes, notes.trim())?;
        CompletionTracker::new(self.db).recompute(request_id)?;

        let stored = self.load(request_id)?;
        tx.commit()?;
        Ok(stored)
    }

    /// Explicitly cancel a request. Cancelling twice is a no-op.
    pub fn cancel_request(&self, request_id: &str) -> EngineResult<TestRequest> {
        let tx = self.db.begin()?;
        let request = self.load(request_id)?;
        if !request.is_cancelled() {
            self.db
                .set_request_status(request_id, RequestStatus::Cancelled)?;
            tracing::info!(request_id, from = request.status.as_str(), "Request cancelled");
        }
        let stored = self.load(request_id)?;
        tx.commit()?;
        Ok(stored)
    }

    pub fn get_request(&self, request_id: &str) -> EngineResult<TestRequest> {
        self.load(request_id)
    }

    pub fn list_requests_for_patient(&self, accession_code: &str) -> EngineResult<Vec<TestRequest>> {
        Ok(self.db.list_requests_for_accession(accession_code)?)
    }

    pub fn list_requests(
        &self,
        status: Option<RequestStatus>,
        search: Option<&str>,
    ) -> EngineResult<Vec<TestRequest>> {
        Ok(self.db.list_requests(status, search)?)
    }

    pub fn delete_request(&self, request_id: &str) -> EngineResult<()> {
        if !self.db.delete_request(request_id)? {
            return Err(EngineError::NotFound(format!("request {}", request_id)));
        }
        tracing::info!(request_id, "Request deleted");
        Ok(())
    }

    pub fn request_total_price(&self, request_id: &str) -> EngineResult<f64> {
        self.load(request_id)?;
        Ok(self.db.request_total_price(request_id)?)
    }

    pub fn progress(&self, request_id: &str) -> EngineResult<CompletionProgress> {
        self.load(request_id)?;
        CompletionTracker::new(self.db).progress(request_id)
    }

    fn load(&self, request_id: &str) -> EngineResult<TestRequest> {
        self.db
            .get_request(request_id)?
            .ok_or_else(|| EngineError::NotFound(format!("request {}", request_id)))
    }

    /// Trim, dedupe and check every code against the active catalog.
    fn validate_items(
        &self,
        test_codes: &[String],
        panel_codes: &[String],
    ) -> EngineResult<(Vec<String>, Vec<String>)> {
        let test_codes = dedup_codes(test_codes);
        let panel_codes = dedup_codes(panel_codes);

        if test_codes.is_empty() && panel_codes.is_empty() {
            return Err(EngineError::Validation(
                "select at least one test or panel".into(),
            ));
        }

        for code in &test_codes {
            match self.db.get_test_definition(code)? {
                Some(test) if test.active => {}
                Some(_) => {
                    return Err(EngineError::Validation(format!("test {} is inactive", code)))
                }
                None => return Err(EngineError::NotFound(format!("test {}", code))),
            }
        }
        for code in &panel_codes {
            let panel = match self.db.get_panel(code)? {
                Some(panel) if panel.active => panel,
                Some(_) => {
                    return Err(EngineError::Validation(format!("panel {} is inactive", code)))
                }
                None => return Err(EngineError::NotFound(format!("panel {}", code))),
            };
            // Panel members cannot also be ordered individually.
            if let Some(dup) = test_codes.iter().find(|t| panel.test_codes.contains(*t)) {
                tracing::warn!(test = %dup, panel = %code, "Test already covered by panel");
                return Err(EngineError::Validation(format!(
                    "test {} is already part of panel {}",
                    dup, code
                )));
            }
        }

        Ok((test_codes, panel_codes))
    }
}

fn dedup_codes(codes: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(codes.len());
    for code in codes.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
        if !seen.iter().any(|s: &String| s == code) {
            seen.push(code.to_string());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ResultRecorder;
    use crate::models::{Patient, Sex, TestDefinition, TestPanel};

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        let mut patient = Patient::new("Sara".into(), Sex::Female);
        patient.accession_code = "2401011234".into();
        patient.age = Some(30);
        db.insert_patient(&patient).unwrap();

        for code in ["GLU", "UREA", "CREA"] {
            db.upsert_test_definition(&TestDefinition::new(
                code.into(),
                code.into(),
                "chemistry".into(),
                "".into(),
            ))
            .unwrap();
        }
        let mut panel = TestPanel::new("RFT".into(), "Renal function".into());
        panel.test_codes = vec!["UREA".into(), "CREA".into()];
        db.upsert_panel(&panel).unwrap();
        db
    }

    fn codes(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_create_request() {
        let db = setup_db();
        let manager = RequestManager::new(&db);

        let request = manager
            .create_request(
                "2401011234",
                &codes(&["GLU", " GLU "]),
                &codes(&["RFT"]),
                " fasting ",
                Some("reception"),
            )
            .unwrap();
        assert_eq!(request.test_codes, vec!["GLU"]);
        assert_eq!(request.panel_codes, vec!["RFT"]);
        assert_eq!(request.notes, "fasting");
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.created_by.as_deref(), Some("reception"));
        assert_eq!(manager.progress(&request.request_id).unwrap().total_required, 3);
    }

    #[test]
    fn test_create_validation() {
        let db = setup_db();
        let manager = RequestManager::new(&db);

        assert!(matches!(
            manager.create_request("2401011234", &[], &[], "", None),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            manager.create_request("0000000000", &codes(&["GLU"]), &[], "", None),
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            manager.create_request("2401011234", &codes(&["NOPE"]), &[], "", None),
            Err(EngineError::NotFound(_))
        ));

        db.deactivate_test_definition("GLU").unwrap();
        assert!(matches!(
            manager.create_request("2401011234", &codes(&["GLU"]), &[], "", None),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_test_already_in_panel() {
        let db = setup_db();
        let manager = RequestManager::new(&db);

        assert!(matches!(
            manager.create_request("2401011234", &codes(&["UREA"]), &codes(&["RFT"]), "", None),
            Err(EngineError::Validation(_))
        ));
        assert!(db.list_requests_for_accession("2401011234").unwrap().is_empty());

        let request = manager
            .create_request("2401011234", &codes(&["GLU"]), &codes(&["RFT"]), "", None)
            .unwrap();
        assert!(matches!(
            manager.update_request_items(
                &request.request_id,
                &codes(&["GLU", "CREA"]),
                &codes(&["RFT"]),
                ""
            ),
            Err(EngineError::Validation(_))
        ));

        let progress = manager.progress(&request.request_id).unwrap();
        assert_eq!(progress.total_required, 3);
        assert_eq!(manager.get_request(&request.request_id).unwrap().test_codes, vec!["GLU"]);
    }

    #[test]
    fn test_update_items_promotes_status() {
        let db = setup_db();
        let manager = RequestManager::new(&db);
        let request = manager
            .create_request("2401011234", &codes(&["GLU", "UREA"]), &[], "", None)
            .unwrap();

        ResultRecorder::new(&db)
            .upsert(&request.request_id, "GLU", "90", "", None)
            .unwrap();

        // Dropping the unentered test leaves everything entered
        let updated = manager
            .update_request_items(&request.request_id, &codes(&["GLU"]), &[], "")
            .unwrap();
        assert_eq!(updated.status, RequestStatus::Completed);
    }

    #[test]
    fn test_cancel_is_terminal() {
        let db = setup_db();
        let manager = RequestManager::new(&db);
        let request = manager
            .create_request("2401011234", &codes(&["GLU"]), &[], "", None)
            .unwrap();

        let cancelled = manager.cancel_request(&request.request_id).unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        assert!(manager.cancel_request(&request.request_id).is_ok());

        assert!(matches!(
            manager.update_request_items(&request.request_id, &codes(&["UREA"]), &[], ""),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn test_total_price() {
        let db = setup_db();
        let mut glucose = db.get_test_definition("GLU").unwrap().unwrap();
        glucose.price = 3.0;
        db.upsert_test_definition(&glucose).unwrap();
        let mut panel = db.get_panel("RFT").unwrap().unwrap();
        panel.price = 10.0;
        db.upsert_panel(&panel).unwrap();

        let manager = RequestManager::new(&db);
        let request = manager
            .create_request("2401011234", &codes(&["GLU"]), &codes(&["RFT"]), "", None)
            .unwrap();
        assert_eq!(manager.request_total_price(&request.request_id).unwrap(), 13.0);
    }
}
