//! Result upsert engine and the manual entry surface built on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{classify, CompletionTracker, EngineError, EngineResult};
use crate::db::Database;
use crate::models::{
    PanelResult, PanelStatus, ResultEntry, ResultStatus, Sex, TestDefinition, TestPanel,
    TestRequest, TestResult,
};

/// One test on an entry sheet with whatever has been entered so far.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryLine {
    pub test: TestDefinition,
    pub existing: Option<TestResult>,
}

/// A panel's member tests on an entry sheet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PanelSection {
    pub panel: TestPanel,
    pub panel_result: Option<PanelResult>,
    pub lines: Vec<EntryLine>,
}

/// Ordered (test, existing result) pairs for a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntrySheet {
    pub request_id: String,
    pub accession_code: String,
    pub individual: Vec<EntryLine>,
    pub panels: Vec<PanelSection>,
}

impl EntrySheet {
    /// Every line on the sheet, individual tests first.
    pub fn lines(&self) -> impl Iterator<Item = &EntryLine> {
        self.individual
            .iter()
            .chain(self.panels.iter().flat_map(|section| section.lines.iter()))
    }
}

/// Writes results and keeps request status in step.
pub struct ResultRecorder<'a> {
    db: &'a Database,
}

impl<'a> ResultRecorder<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create or update the result of one test on one request.
    ///
    /// Blank values are a no-op and return `Ok(None)`.
    pub fn upsert(
        &self,
        request_id: &str,
        test_code: &str,
        value: &str,
        notes: &str,
        actor: Option<&str>,
    ) -> EngineResult<Option<TestResult>> {
        if value.trim().is_empty() {
            return Ok(None);
        }

        let tx = self.db.begin()?;
        let request = self.open_request(request_id)?;
        let sex = self.patient_sex(&request)?;
        let definition = self.ordered_test(&request, test_code)?;

        let result = self.write_value(
            &request,
            &definition,
            sex,
            value,
            Some(notes),
            actor,
            Utc::now(),
        )?;
        tx.commit()?;
        Ok(Some(result))
    }

    /// Bulk entry for one request in a single transaction. Blank entries are skipped.
    pub fn record_results(
        &self,
        request_id: &str,
        entries: &[ResultEntry],
        actor: Option<&str>,
    ) -> EngineResult<Vec<TestResult>> {
        let tx = self.db.begin()?;
        let request = self.open_request(request_id)?;
        let sex = self.patient_sex(&request)?;
        let now = Utc::now();

        let mut written = Vec::new();
        for entry in entries.iter().filter(|entry| !entry.is_blank()) {
            let definition = self.ordered_test(&request, &entry.test_code)?;
            written.push(self.write_value(
                &request,
                &definition,
                sex,
                &entry.value,
                Some(&entry.notes),
                actor,
                now,
            )?);
        }

        tx.commit()?;
        tracing::info!(
            request_id,
            written = written.len(),
            skipped = entries.len() - written.len(),
            "Recorded results"
        );
        Ok(written)
    }

    /// Manually override the status of an existing result.
    pub fn flag_result(
        &self,
        request_id: &str,
        test_code: &str,
        status: ResultStatus,
        actor: Option<&str>,
    ) -> EngineResult<TestResult> {
        let tx = self.db.begin()?;
        if !self
            .db
            .set_result_status(request_id, test_code, status, actor)?
        {
            return Err(EngineError::NotFound(format!(
                "result for {} on request {}",
                test_code, request_id
            )));
        }
        let result = self.stored_result(request_id, test_code)?;
        tx.commit()?;

        tracing::info!(request_id, test = test_code, status = status.as_str(), "Result flagged");
        Ok(result)
    }

    /// Record panel-level completion bookkeeping.
    pub fn record_panel_result(
        &self,
        request_id: &str,
        panel_code: &str,
        status: PanelStatus,
        notes: &str,
    ) -> EngineResult<PanelResult> {
        let tx = self.db.begin()?;
        let request = self.open_request(request_id)?;
        if !self.db.request_contains_panel(&request.request_id, panel_code)? {
            return Err(EngineError::Validation(format!(
                "panel {} is not on request {}",
                panel_code, request_id
            )));
        }

        let result_id = self
            .db
            .get_panel_result(request_id, panel_code)?
            .map(|existing| existing.result_id)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        self.db.upsert_panel_result(&PanelResult {
            result_id,
            request_id: request_id.to_string(),
            panel_code: panel_code.to_string(),
            status,
            notes: notes.to_string(),
            recorded_at: Utc::now(),
        })?;
        CompletionTracker::new(self.db).recompute(request_id)?;

        let stored = self
            .db
            .get_panel_result(request_id, panel_code)?
            .ok_or_else(|| EngineError::NotFound(format!("panel result {}", panel_code)))?;
        tx.commit()?;
        Ok(stored)
    }

    /// Build the ordered entry sheet for a request.
    pub fn entry_sheet(&self, request_id: &str) -> EngineResult<EntrySheet> {
        let request = self
            .db
            .get_request(request_id)?
            .ok_or_else(|| EngineError::NotFound(format!("request {}", request_id)))?;

        let mut individual = Vec::new();
        for code in &request.test_codes {
            let test = self
                .db
                .get_test_definition(code)?
                .ok_or_else(|| EngineError::NotFound(format!("test {}", code)))?;
            individual.push(self.entry_line(request_id, test)?);
        }

        let mut panels = Vec::new();
        for code in &request.panel_codes {
            let panel = self
                .db
                .get_panel(code)?
                .ok_or_else(|| EngineError::NotFound(format!("panel {}", code)))?;
            let mut lines = Vec::new();
            for test in self.db.panel_tests(code)? {
                lines.push(self.entry_line(request_id, test)?);
            }
            panels.push(PanelSection {
                panel_result: self.db.get_panel_result(request_id, code)?,
                panel,
                lines,
            });
        }

        Ok(EntrySheet {
            request_id: request.request_id,
            accession_code: request.accession_code,
            individual,
            panels,
        })
    }

    /// Classify and store one value. Caller holds the transaction.
    ///
    /// `notes: None` keeps whatever notes an existing result already has.
    /// `at` is the first-entry time on insert and the modification time on update.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn write_value(
        &self,
        request: &TestRequest,
        definition: &TestDefinition,
        sex: Sex,
        value: &str,
        notes: Option<&str>,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> EngineResult<TestResult> {
        let value = value.trim();
        let status = classify(value, definition, sex);
        let existing = self.db.get_result(&request.request_id, &definition.code)?;

        let result = TestResult {
            result_id: existing
                .as_ref()
                .map(|r| r.result_id.clone())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            request_id: request.request_id.clone(),
            test_code: definition.code.clone(),
            value: value.to_string(),
            status,
            notes: notes
                .map(str::to_string)
                .or_else(|| existing.as_ref().map(|r| r.notes.clone()))
                .unwrap_or_default(),
            entered_by: None,
            last_modified_by: None,
            entered_at: at,
            updated_at: at,
        };
        self.db.upsert_result(&result, actor)?;

        tracing::debug!(
            request_id = %request.request_id,
            test = %definition.code,
            value,
            status = status.as_str(),
            update = existing.is_some(),
            "Result written"
        );

        CompletionTracker::new(self.db).recompute(&request.request_id)?;
        self.stored_result(&request.request_id, &definition.code)
    }

    /// Existing, non-cancelled request.
    pub(crate) fn open_request(&self, request_id: &str) -> EngineResult<TestRequest> {
        let request = self
            .db
            .get_request(request_id)?
            .ok_or_else(|| EngineError::NotFound(format!("request {}", request_id)))?;
        if request.is_cancelled() {
            return Err(EngineError::InvalidState(format!(
                "request {} is cancelled",
                request_id
            )));
        }
        Ok(request)
    }

    /// Sex of the request's patient, read fresh for every write.
    pub(crate) fn patient_sex(&self, request: &TestRequest) -> EngineResult<Sex> {
        self.db
            .get_patient_by_accession(&request.accession_code)?
            .map(|patient| patient.sex)
            .ok_or_else(|| EngineError::NotFound(format!("patient {}", request.accession_code)))
    }

    /// Definition of a test the request actually orders.
    fn ordered_test(&self, request: &TestRequest, test_code: &str) -> EngineResult<TestDefinition> {
        let definition = self
            .db
            .get_test_definition(test_code)?
            .ok_or_else(|| EngineError::NotFound(format!("test {}", test_code)))?;
        if !self.db.request_contains_test(&request.request_id, test_code)? {
            return Err(EngineError::Validation(format!(
                "test {} is not on request {}",
                test_code, request.request_id
            )));
        }
        Ok(definition)
    }

    fn stored_result(&self, request_id: &str, test_code: &str) -> EngineResult<TestResult> {
        self.db
            .get_result(request_id, test_code)?
            .ok_or_else(|| EngineError::NotFound(format!("result for {}", test_code)))
    }

    fn entry_line(&self, request_id: &str, test: TestDefinition) -> EngineResult<EntryLine> {
        Ok(EntryLine {
            existing: self.db.get_result(request_id, &test.code)?,
            test,
        })
    }
}
