//! Labflow Core Library
//!
//! Laboratory workflow core: patient registry, test catalog, test requests,
//! result entry, device feed reconciliation and patient reports.
//!
//! # Architecture
//!
//! ```text
//!   Manual / bulk entry            Instrument adapters
//!           │                              │
//!           │                   [APPEND: device_readings]
//!           │                              │
//!           │                     Device Reconciler (sync)
//!           │                              │
//!           └──────────────┬───────────────┘
//!                          ▼
//!                 ┌─────────────────────┐
//!                 │  Result Upsert      │── Reference range classification
//!                 │  (request, test)    │
//!                 └─────────┬───────────┘
//!                           ▼
//!                  Completion Tracker
//!            pending → in_progress → completed
//!                           │
//!                           ▼
//!                   Report Aggregator ──► JSON / CSV / print tracking
//! ```
//!
//! # Core Principle
//!
//! **Request status is derived.** It is recomputed after every result write and
//! only ever set directly by an explicit cancellation.
//!
//! # Modules
//!
//! - [`db`]: SQLite database layer
//! - [`models`]: Domain types (Patient, TestDefinition, TestRequest, TestResult, etc.)
//! - [`engine`]: Classification, upsert, reconciliation and completion tracking
//! - [`report`]: Patient reports and lab statistics
//! - [`config`]: Startup configuration

pub mod config;
pub mod db;
pub mod engine;
pub mod models;
pub mod report;

// Re-export commonly used types
pub use config::{LabConfig, UnmatchedReadingPolicy};
pub use db::Database;
pub use engine::{
    classify, CompletionTracker, DeviceReconciler, PatientRegistry, ReconcileSummary,
    RequestManager, ResultRecorder,
};
pub use models::{
    DeviceReading, NewDeviceReading, Patient, ReferenceRange, RequestStatus, ResultStatus, Sex,
    TestDefinition, TestPanel, TestRequest, TestResult,
};
pub use report::{LabStats, PatientReport, ReportAggregator};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};

use config::DEFAULT_ACCESSION_ATTEMPTS;
use models::{PanelResult, PanelStatus, ResultEntry};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum LabflowError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<db::DbError> for LabflowError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => LabflowError::NotFound(what),
            other => LabflowError::DatabaseError(other.to_string()),
        }
    }
}

impl From<engine::EngineError> for LabflowError {
    fn from(e: engine::EngineError) -> Self {
        use engine::EngineError;
        match e {
            EngineError::Database(db) => db.into(),
            EngineError::NotFound(what) => LabflowError::NotFound(what),
            EngineError::Patient(err) => LabflowError::InvalidInput(err.to_string()),
            EngineError::Validation(msg) => LabflowError::InvalidInput(msg),
            EngineError::InvalidState(msg) => LabflowError::InvalidState(msg),
        }
    }
}

impl From<report::ReportError> for LabflowError {
    fn from(e: report::ReportError) -> Self {
        use report::ReportError;
        match e {
            ReportError::Database(db) => db.into(),
            ReportError::PatientNotFound(code) => LabflowError::NotFound(format!("patient {}", code)),
            ReportError::Serialization(err) => err.into(),
        }
    }
}

impl From<config::ConfigError> for LabflowError {
    fn from(e: config::ConfigError) -> Self {
        LabflowError::InvalidInput(e.to_string())
    }
}

impl From<serde_json::Error> for LabflowError {
    fn from(e: serde_json::Error) -> Self {
        LabflowError::SerializationError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for LabflowError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        LabflowError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
#[uniffi::export]
pub fn open_database(
    path: String,
    unmatched_reading_policy: FfiUnmatchedReadingPolicy,
) -> Result<Arc<LabCore>, LabflowError> {
    let config = LabConfig::new(
        path.into(),
        unmatched_reading_policy.into(),
        DEFAULT_ACCESSION_ATTEMPTS,
    )?;
    LabCore::from_config(&config).map(Arc::new)
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<LabCore>, LabflowError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(LabCore {
        db: Arc::new(Mutex::new(db)),
        unmatched_reading_policy: UnmatchedReadingPolicy::default(),
        accession_attempts: DEFAULT_ACCESSION_ATTEMPTS,
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct LabCore {
    db: Arc<Mutex<Database>>,
    unmatched_reading_policy: UnmatchedReadingPolicy,
    accession_attempts: u32,
}

impl LabCore {
    /// Open the configured database.
    pub fn from_config(config: &LabConfig) -> Result<Self, LabflowError> {
        let db = Database::open(config.database_path())?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            unmatched_reading_policy: config.unmatched_reading_policy(),
            accession_attempts: config.accession_attempts(),
        })
    }
}

#[uniffi::export]
impl LabCore {
    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Register a new patient and assign an accession code.
    pub fn register_patient(&self, draft: FfiPatientDraft) -> Result<FfiPatient, LabflowError> {
        let db = self.db.lock()?;
        let registry = PatientRegistry::new(&db, self.accession_attempts);

        let mut patient = Patient::new(draft.full_name, draft.sex.into());
        patient.date_of_birth = parse_date(draft.date_of_birth.as_deref())?;
        patient.age = draft.age;
        patient.phone_number = draft.phone_number;
        patient.address = draft.address;

        let registered = registry.register_patient(patient, today())?;
        Ok(registered.into())
    }

    /// Update demographics and contact details.
    pub fn update_patient(&self, patient: FfiPatient) -> Result<FfiPatient, LabflowError> {
        let db = self.db.lock()?;
        let registry = PatientRegistry::new(&db, self.accession_attempts);

        let mut existing = registry.get_patient(&patient.patient_id)?;
        existing.full_name = patient.full_name;
        existing.sex = patient.sex.into();
        existing.date_of_birth = parse_date(patient.date_of_birth.as_deref())?;
        existing.age = patient.age;
        existing.phone_number = patient.phone_number;
        existing.address = patient.address;

        Ok(registry.update_patient(existing, today())?.into())
    }

    /// Get a patient by internal ID.
    pub fn get_patient(&self, patient_id: String) -> Result<Option<FfiPatient>, LabflowError> {
        let db = self.db.lock()?;
        Ok(db.get_patient(&patient_id)?.map(|p| p.into()))
    }

    /// Get a patient by accession code.
    pub fn get_patient_by_accession(
        &self,
        accession_code: String,
    ) -> Result<Option<FfiPatient>, LabflowError> {
        let db = self.db.lock()?;
        Ok(db.get_patient_by_accession(&accession_code)?.map(|p| p.into()))
    }

    /// Search patients by name, phone or accession code.
    pub fn search_patients(&self, query: String, limit: u32) -> Result<Vec<FfiPatient>, LabflowError> {
        let db = self.db.lock()?;
        let patients = db.search_patients(&query, limit as usize)?;
        Ok(patients.into_iter().map(|p| p.into()).collect())
    }

    /// List all patients, newest first.
    pub fn list_patients(&self) -> Result<Vec<FfiPatient>, LabflowError> {
        let db = self.db.lock()?;
        Ok(db.list_patients()?.into_iter().map(|p| p.into()).collect())
    }

    /// Delete a patient and everything they own.
    pub fn delete_patient(&self, patient_id: String) -> Result<(), LabflowError> {
        let db = self.db.lock()?;
        PatientRegistry::new(&db, self.accession_attempts).delete_patient(&patient_id)?;
        Ok(())
    }

    // =========================================================================
    // Catalog Operations
    // =========================================================================

    /// Add or update a test definition.
    pub fn upsert_test(&self, test: FfiTestDefinition) -> Result<(), LabflowError> {
        let db = self.db.lock()?;
        db.upsert_test_definition(&test.into())?;
        Ok(())
    }

    /// Get a test definition by code.
    pub fn get_test(&self, code: String) -> Result<Option<FfiTestDefinition>, LabflowError> {
        let db = self.db.lock()?;
        Ok(db.get_test_definition(&code)?.map(|t| t.into()))
    }

    /// List test definitions in display order.
    pub fn list_tests(&self, active_only: bool) -> Result<Vec<FfiTestDefinition>, LabflowError> {
        let db = self.db.lock()?;
        let tests = db.list_test_definitions(active_only)?;
        Ok(tests.into_iter().map(|t| t.into()).collect())
    }

    /// Search active tests by name or code.
    pub fn search_tests(
        &self,
        query: String,
        limit: u32,
    ) -> Result<Vec<FfiTestDefinition>, LabflowError> {
        let db = self.db.lock()?;
        let tests = db.search_tests(&query, limit as usize)?;
        Ok(tests.into_iter().map(|t| t.into()).collect())
    }

    /// Deactivate a test definition.
    pub fn deactivate_test(&self, code: String) -> Result<bool, LabflowError> {
        let db = self.db.lock()?;
        Ok(db.deactivate_test_definition(&code)?)
    }

    /// Add or update a panel with its member tests.
    pub fn upsert_panel(&self, panel: FfiTestPanel) -> Result<(), LabflowError> {
        let db = self.db.lock()?;
        let tx = db.begin()?;
        db.upsert_panel(&panel.into())?;
        tx.commit().map_err(db::DbError::from)?;
        Ok(())
    }

    /// Get a panel by code.
    pub fn get_panel(&self, code: String) -> Result<Option<FfiTestPanel>, LabflowError> {
        let db = self.db.lock()?;
        Ok(db.get_panel(&code)?.map(|p| p.into()))
    }

    /// List panels.
    pub fn list_panels(&self, active_only: bool) -> Result<Vec<FfiTestPanel>, LabflowError> {
        let db = self.db.lock()?;
        Ok(db.list_panels(active_only)?.into_iter().map(|p| p.into()).collect())
    }

    /// Replace the ordered member tests of a panel.
    pub fn set_panel_tests(&self, code: String, test_codes: Vec<String>) -> Result<(), LabflowError> {
        let db = self.db.lock()?;
        if db.get_panel(&code)?.is_none() {
            return Err(LabflowError::NotFound(format!("panel {}", code)));
        }
        let tx = db.begin()?;
        db.set_panel_tests(&code, &test_codes)?;
        tx.commit().map_err(db::DbError::from)?;
        Ok(())
    }

    /// Deactivate a panel.
    pub fn deactivate_panel(&self, code: String) -> Result<bool, LabflowError> {
        let db = self.db.lock()?;
        Ok(db.deactivate_panel(&code)?)
    }

    /// Sum of the member tests' individual prices.
    pub fn panel_individual_price_sum(&self, code: String) -> Result<f64, LabflowError> {
        let db = self.db.lock()?;
        let panel = db
            .get_panel(&code)?
            .ok_or_else(|| LabflowError::NotFound(format!("panel {}", code)))?;
        let members = db.panel_tests(&code)?;
        Ok(panel.individual_price_sum(&members))
    }

    // =========================================================================
    // Request Operations
    // =========================================================================

    /// Create a new test request for a patient.
    pub fn create_request(
        &self,
        accession_code: String,
        test_codes: Vec<String>,
        panel_codes: Vec<String>,
        notes: String,
        actor: Option<String>,
    ) -> Result<FfiTestRequest, LabflowError> {
        let db = self.db.lock()?;
        let request = RequestManager::new(&db).create_request(
            &accession_code,
            &test_codes,
            &panel_codes,
            &notes,
            actor.as_deref(),
        )?;
        ffi_request(&db, request)
    }

    /// Replace the tests, panels and notes of a request.
    pub fn update_request_items(
        &self,
        request_id: String,
        test_codes: Vec<String>,
        panel_codes: Vec<String>,
        notes: String,
    ) -> Result<FfiTestRequest, LabflowError> {
        let db = self.db.lock()?;
        let request = RequestManager::new(&db).update_request_items(
            &request_id,
            &test_codes,
            &panel_codes,
            &notes,
        )?;
        ffi_request(&db, request)
    }

    /// Cancel a request.
    pub fn cancel_request(&self, request_id: String) -> Result<FfiTestRequest, LabflowError> {
        let db = self.db.lock()?;
        let request = RequestManager::new(&db).cancel_request(&request_id)?;
        ffi_request(&db, request)
    }

    /// Get a request by ID.
    pub fn get_request(&self, request_id: String) -> Result<Option<FfiTestRequest>, LabflowError> {
        let db = self.db.lock()?;
        match db.get_request(&request_id)? {
            Some(request) => Ok(Some(ffi_request(&db, request)?)),
            None => Ok(None),
        }
    }

    /// List a patient's requests, newest first.
    pub fn list_requests_for_patient(
        &self,
        accession_code: String,
    ) -> Result<Vec<FfiTestRequest>, LabflowError> {
        let db = self.db.lock()?;
        db.list_requests_for_accession(&accession_code)?
            .into_iter()
            .map(|r| ffi_request(&db, r))
            .collect()
    }

    /// List requests with an optional status filter and patient search.
    pub fn list_requests(
        &self,
        status: Option<FfiRequestStatus>,
        search: Option<String>,
    ) -> Result<Vec<FfiTestRequest>, LabflowError> {
        let db = self.db.lock()?;
        db.list_requests(status.map(Into::into), search.as_deref())?
            .into_iter()
            .map(|r| ffi_request(&db, r))
            .collect()
    }

    /// Delete a request and its results.
    pub fn delete_request(&self, request_id: String) -> Result<(), LabflowError> {
        let db = self.db.lock()?;
        RequestManager::new(&db).delete_request(&request_id)?;
        Ok(())
    }

    /// Individual test prices plus bundled panel prices.
    pub fn request_total_price(&self, request_id: String) -> Result<f64, LabflowError> {
        let db = self.db.lock()?;
        Ok(RequestManager::new(&db).request_total_price(&request_id)?)
    }

    // =========================================================================
    // Result Operations
    // =========================================================================

    /// Enter or update a single result. Blank values return `None`.
    pub fn upsert_result(
        &self,
        request_id: String,
        test_code: String,
        value: String,
        notes: String,
        actor: Option<String>,
    ) -> Result<Option<FfiTestResult>, LabflowError> {
        let db = self.db.lock()?;
        let result = ResultRecorder::new(&db).upsert(
            &request_id,
            &test_code,
            &value,
            &notes,
            actor.as_deref(),
        )?;
        Ok(result.map(|r| r.into()))
    }

    /// Bulk result entry for one request.
    pub fn record_results(
        &self,
        request_id: String,
        entries: Vec<FfiResultEntry>,
        actor: Option<String>,
    ) -> Result<Vec<FfiTestResult>, LabflowError> {
        let db = self.db.lock()?;
        let entries: Vec<ResultEntry> = entries.into_iter().map(Into::into).collect();
        let written = ResultRecorder::new(&db).record_results(&request_id, &entries, actor.as_deref())?;
        Ok(written.into_iter().map(|r| r.into()).collect())
    }

    /// Manually override a result's status.
    pub fn flag_result(
        &self,
        request_id: String,
        test_code: String,
        status: FfiResultStatus,
        actor: Option<String>,
    ) -> Result<FfiTestResult, LabflowError> {
        let db = self.db.lock()?;
        let result = ResultRecorder::new(&db).flag_result(
            &request_id,
            &test_code,
            status.into(),
            actor.as_deref(),
        )?;
        Ok(result.into())
    }

    /// Record panel-level completion.
    pub fn record_panel_result(
        &self,
        request_id: String,
        panel_code: String,
        completed: bool,
        notes: String,
    ) -> Result<FfiPanelResult, LabflowError> {
        let db = self.db.lock()?;
        let status = if completed {
            PanelStatus::Completed
        } else {
            PanelStatus::Pending
        };
        let result =
            ResultRecorder::new(&db).record_panel_result(&request_id, &panel_code, status, &notes)?;
        Ok(result.into())
    }

    /// Ordered entry lines for a request: individual tests, then each panel's members.
    pub fn entry_sheet(&self, request_id: String) -> Result<Vec<FfiEntryLine>, LabflowError> {
        let db = self.db.lock()?;
        let sheet = ResultRecorder::new(&db).entry_sheet(&request_id)?;

        let mut lines: Vec<FfiEntryLine> = sheet
            .individual
            .into_iter()
            .map(|line| FfiEntryLine::new(None, line))
            .collect();
        for section in sheet.panels {
            let panel_code = section.panel.code;
            lines.extend(
                section
                    .lines
                    .into_iter()
                    .map(|line| FfiEntryLine::new(Some(panel_code.clone()), line)),
            );
        }
        Ok(lines)
    }

    // =========================================================================
    // Device Feed Operations
    // =========================================================================

    /// Append an instrument reading. `recorded_at` is RFC 3339; defaults to now.
    pub fn append_device_reading(
        &self,
        instrument: String,
        accession_code: String,
        test_code: String,
        value: f64,
        recorded_at: Option<String>,
    ) -> Result<i64, LabflowError> {
        if !value.is_finite() {
            return Err(LabflowError::InvalidInput("reading value must be finite".into()));
        }
        let recorded_at = match recorded_at {
            Some(text) => parse_timestamp(&text)?,
            None => Utc::now(),
        };

        let db = self.db.lock()?;
        let reading =
            NewDeviceReading::new(instrument, accession_code, test_code, value, recorded_at);
        Ok(db.append_device_reading(&reading)?)
    }

    /// Reconcile all active device readings.
    pub fn sync(&self, actor: Option<String>) -> Result<FfiReconcileSummary, LabflowError> {
        let db = self.db.lock()?;
        let summary =
            DeviceReconciler::new(&db, self.unmatched_reading_policy).reconcile(actor.as_deref())?;
        Ok(summary.into())
    }

    /// Number of readings waiting to be reconciled.
    pub fn pending_reading_count(&self) -> Result<u32, LabflowError> {
        let db = self.db.lock()?;
        Ok(db.count_active_readings()?)
    }

    // =========================================================================
    // Report Operations
    // =========================================================================

    /// Patient report as JSON.
    pub fn patient_report_json(&self, accession_code: String) -> Result<String, LabflowError> {
        let db = self.db.lock()?;
        let report = ReportAggregator::new(&db).patient_report(&accession_code)?;
        Ok(report.to_json()?)
    }

    /// Patient report as CSV.
    pub fn patient_report_csv(&self, accession_code: String) -> Result<String, LabflowError> {
        let db = self.db.lock()?;
        let report = ReportAggregator::new(&db).patient_report(&accession_code)?;
        Ok(report.to_csv())
    }

    /// Track a printed report. Returns the report ID.
    pub fn record_printed_report(
        &self,
        accession_code: String,
        actor: Option<String>,
        report_type: String,
        notes: String,
    ) -> Result<String, LabflowError> {
        let db = self.db.lock()?;
        let report = ReportAggregator::new(&db).record_printed_report(
            &accession_code,
            actor.as_deref(),
            &report_type,
            &notes,
        )?;
        Ok(report.report_id)
    }

    /// Lab-wide totals.
    pub fn lab_stats(&self, popular_limit: u32) -> Result<FfiLabStats, LabflowError> {
        let db = self.db.lock()?;
        let stats = report::lab_stats(&db, popular_limit as usize)?;
        Ok(stats.into())
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn parse_date(text: Option<&str>) -> Result<Option<NaiveDate>, LabflowError> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            NaiveDate::parse_from_str(t, "%Y-%m-%d")
                .map_err(|e| LabflowError::InvalidInput(format!("invalid date '{}': {}", t, e)))
        })
        .transpose()
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, LabflowError> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LabflowError::InvalidInput(format!("invalid timestamp '{}': {}", text, e)))
}

fn ffi_request(db: &Database, request: TestRequest) -> Result<FfiTestRequest, LabflowError> {
    let progress = CompletionTracker::new(db).progress(&request.request_id)?;
    Ok(FfiTestRequest {
        completion_percentage: progress.percentage(),
        request_id: request.request_id,
        accession_code: request.accession_code,
        test_codes: request.test_codes,
        panel_codes: request.panel_codes,
        status: request.status.into(),
        notes: request.notes,
        created_by: request.created_by,
        created_at: request.created_at.to_rfc3339(),
    })
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe sex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiSex {
    Male,
    Female,
}

impl From<Sex> for FfiSex {
    fn from(sex: Sex) -> Self {
        match sex {
            Sex::Male => FfiSex::Male,
            Sex::Female => FfiSex::Female,
        }
    }
}

impl From<FfiSex> for Sex {
    fn from(sex: FfiSex) -> Self {
        match sex {
            FfiSex::Male => Sex::Male,
            FfiSex::Female => Sex::Female,
        }
    }
}

/// FFI-safe unmatched reading policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiUnmatchedReadingPolicy {
    Retain,
    Drop,
}

impl From<FfiUnmatchedReadingPolicy> for UnmatchedReadingPolicy {
    fn from(policy: FfiUnmatchedReadingPolicy) -> Self {
        match policy {
            FfiUnmatchedReadingPolicy::Retain => UnmatchedReadingPolicy::Retain,
            FfiUnmatchedReadingPolicy::Drop => UnmatchedReadingPolicy::Drop,
        }
    }
}

/// FFI-safe request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiRequestStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl From<RequestStatus> for FfiRequestStatus {
    fn from(status: RequestStatus) -> Self {
        match status {
            RequestStatus::Pending => FfiRequestStatus::Pending,
            RequestStatus::InProgress => FfiRequestStatus::InProgress,
            RequestStatus::Completed => FfiRequestStatus::Completed,
            RequestStatus::Cancelled => FfiRequestStatus::Cancelled,
        }
    }
}

impl From<FfiRequestStatus> for RequestStatus {
    fn from(status: FfiRequestStatus) -> Self {
        match status {
            FfiRequestStatus::Pending => RequestStatus::Pending,
            FfiRequestStatus::InProgress => RequestStatus::InProgress,
            FfiRequestStatus::Completed => RequestStatus::Completed,
            FfiRequestStatus::Cancelled => RequestStatus::Cancelled,
        }
    }
}

/// FFI-safe result status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiResultStatus {
    Normal,
    High,
    Low,
    Abnormal,
    NotApplicable,
}

impl From<ResultStatus> for FfiResultStatus {
    fn from(status: ResultStatus) -> Self {
        match status {
            ResultStatus::Normal => FfiResultStatus::Normal,
            ResultStatus::High => FfiResultStatus::High,
            ResultStatus::Low => FfiResultStatus::Low,
            ResultStatus::Abnormal => FfiResultStatus::Abnormal,
            ResultStatus::NotApplicable => FfiResultStatus::NotApplicable,
        }
    }
}

impl From<FfiResultStatus> for ResultStatus {
    fn from(status: FfiResultStatus) -> Self {
        match status {
            FfiResultStatus::Normal => ResultStatus::Normal,
            FfiResultStatus::High => ResultStatus::High,
            FfiResultStatus::Low => ResultStatus::Low,
            FfiResultStatus::Abnormal => ResultStatus::Abnormal,
            FfiResultStatus::NotApplicable => ResultStatus::NotApplicable,
        }
    }
}

/// FFI-safe patient registration form.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientDraft {
    pub full_name: String,
    pub sex: FfiSex,
    /// `YYYY-MM-DD`
    pub date_of_birth: Option<String>,
    pub age: Option<u32>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
}

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub patient_id: String,
    pub accession_code: String,
    pub full_name: String,
    pub sex: FfiSex,
    pub date_of_birth: Option<String>,
    pub age: Option<u32>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub created_at: String,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            patient_id: patient.patient_id,
            accession_code: patient.accession_code,
            full_name: patient.full_name,
            sex: patient.sex.into(),
            date_of_birth: patient.date_of_birth.map(|d| d.format("%Y-%m-%d").to_string()),
            age: patient.age,
            phone_number: patient.phone_number,
            address: patient.address,
            created_at: patient.created_at.to_rfc3339(),
        }
    }
}

/// FFI-safe reference range.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReferenceRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub text: Option<String>,
}

impl From<ReferenceRange> for FfiReferenceRange {
    fn from(range: ReferenceRange) -> Self {
        Self {
            min: range.min,
            max: range.max,
            text: range.text,
        }
    }
}

impl From<FfiReferenceRange> for ReferenceRange {
    fn from(range: FfiReferenceRange) -> Self {
        ReferenceRange {
            min: range.min,
            max: range.max,
            text: range.text,
        }
    }
}

/// FFI-safe test definition.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTestDefinition {
    pub code: String,
    pub name: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub unit: String,
    pub price: f64,
    pub active: bool,
    pub display_order: u32,
    pub male_range: FfiReferenceRange,
    pub female_range: FfiReferenceRange,
}

impl From<TestDefinition> for FfiTestDefinition {
    fn from(test: TestDefinition) -> Self {
        Self {
            code: test.code,
            name: test.name,
            category: test.category,
            subcategory: test.subcategory,
            unit: test.unit,
            price: test.price,
            active: test.active,
            display_order: test.display_order,
            male_range: test.male_range.into(),
            female_range: test.female_range.into(),
        }
    }
}

impl From<FfiTestDefinition> for TestDefinition {
    fn from(test: FfiTestDefinition) -> Self {
        TestDefinition {
            code: test.code,
            name: test.name,
            category: test.category,
            subcategory: test.subcategory,
            unit: test.unit,
            price: test.price,
            active: test.active,
            display_order: test.display_order,
            male_range: test.male_range.into(),
            female_range: test.female_range.into(),
        }
    }
}

/// FFI-safe panel.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTestPanel {
    pub code: String,
    pub name: String,
    pub category: Option<String>,
    pub price: f64,
    pub active: bool,
    pub test_codes: Vec<String>,
}

impl From<TestPanel> for FfiTestPanel {
    fn from(panel: TestPanel) -> Self {
        Self {
            code: panel.code,
            name: panel.name,
            category: panel.category,
            price: panel.price,
            active: panel.active,
            test_codes: panel.test_codes,
        }
    }
}

impl From<FfiTestPanel> for TestPanel {
    fn from(panel: FfiTestPanel) -> Self {
        TestPanel {
            code: panel.code,
            name: panel.name,
            category: panel.category,
            price: panel.price,
            active: panel.active,
            test_codes: panel.test_codes,
        }
    }
}

/// FFI-safe test request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTestRequest {
    pub request_id: String,
    pub accession_code: String,
    pub test_codes: Vec<String>,
    pub panel_codes: Vec<String>,
    pub status: FfiRequestStatus,
    pub notes: String,
    pub created_by: Option<String>,
    pub created_at: String,
    pub completion_percentage: f64,
}

/// FFI-safe result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTestResult {
    pub result_id: String,
    pub request_id: String,
    pub test_code: String,
    pub value: String,
    pub status: FfiResultStatus,
    pub notes: String,
    pub entered_by: Option<String>,
    pub last_modified_by: Option<String>,
    pub entered_at: String,
    pub updated_at: String,
}

impl From<TestResult> for FfiTestResult {
    fn from(result: TestResult) -> Self {
        Self {
            result_id: result.result_id,
            request_id: result.request_id,
            test_code: result.test_code,
            value: result.value,
            status: result.status.into(),
            notes: result.notes,
            entered_by: result.entered_by,
            last_modified_by: result.last_modified_by,
            entered_at: result.entered_at.to_rfc3339(),
            updated_at: result.updated_at.to_rfc3339(),
        }
    }
}

/// FFI-safe bulk entry line.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiResultEntry {
    pub test_code: String,
    pub value: String,
    pub notes: String,
}

impl From<FfiResultEntry> for ResultEntry {
    fn from(entry: FfiResultEntry) -> Self {
        ResultEntry::new(entry.test_code, entry.value).with_notes(entry.notes)
    }
}

/// FFI-safe panel completion record.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPanelResult {
    pub result_id: String,
    pub request_id: String,
    pub panel_code: String,
    pub completed: bool,
    pub notes: String,
    pub recorded_at: String,
}

impl From<PanelResult> for FfiPanelResult {
    fn from(result: PanelResult) -> Self {
        Self {
            result_id: result.result_id,
            request_id: result.request_id,
            panel_code: result.panel_code,
            completed: result.status == PanelStatus::Completed,
            notes: result.notes,
            recorded_at: result.recorded_at.to_rfc3339(),
        }
    }
}

/// FFI-safe entry sheet line.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEntryLine {
    /// Set for lines belonging to a panel section
    pub panel_code: Option<String>,
    pub test_code: String,
    pub test_name: String,
    pub unit: String,
    pub existing_value: Option<String>,
    pub existing_status: Option<FfiResultStatus>,
}

impl FfiEntryLine {
    fn new(panel_code: Option<String>, line: engine::EntryLine) -> Self {
        Self {
            panel_code,
            test_code: line.test.code,
            test_name: line.test.name,
            unit: line.test.unit,
            existing_status: line.existing.as_ref().map(|r| r.status.into()),
            existing_value: line.existing.map(|r| r.value),
        }
    }
}

/// FFI-safe reconciliation summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReconcileSummary {
    pub processed: u32,
    pub affected: u32,
    pub stale: u32,
    pub unmatched: u32,
    pub dropped: u32,
    pub failed: u32,
}

impl From<ReconcileSummary> for FfiReconcileSummary {
    fn from(summary: ReconcileSummary) -> Self {
        Self {
            processed: summary.processed,
            affected: summary.affected,
            stale: summary.stale,
            unmatched: summary.unmatched,
            dropped: summary.dropped,
            failed: summary.failed,
        }
    }
}

/// FFI-safe popular test entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTestPopularity {
    pub test_code: String,
    pub test_name: String,
    pub request_count: u32,
}

/// FFI-safe lab statistics.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLabStats {
    pub total_patients: u32,
    pub total_requests: u32,
    pub total_results: u32,
    pub pending_requests: u32,
    pub in_progress_requests: u32,
    pub completed_requests: u32,
    pub cancelled_requests: u32,
    pub pending_readings: u32,
    pub printed_reports: u32,
    pub popular_tests: Vec<FfiTestPopularity>,
}

impl From<LabStats> for FfiLabStats {
    fn from(stats: LabStats) -> Self {
        Self {
            total_patients: stats.total_patients,
            total_requests: stats.total_requests,
            total_results: stats.total_results,
            pending_requests: stats.count_for(RequestStatus::Pending),
            in_progress_requests: stats.count_for(RequestStatus::InProgress),
            completed_requests: stats.count_for(RequestStatus::Completed),
            cancelled_requests: stats.count_for(RequestStatus::Cancelled),
            pending_readings: stats.pending_readings,
            printed_reports: stats.printed_reports,
            popular_tests: stats
                .popular_tests
                .into_iter()
                .map(|p| FfiTestPopularity {
                    test_code: p.test_code,
                    test_name: p.test_name,
                    request_count: p.request_count,
                })
                .collect(),
        }
    }
}
