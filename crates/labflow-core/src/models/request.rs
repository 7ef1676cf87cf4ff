//! Test request models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a test request.
///
/// Derived from entered results; only `Cancelled` is ever set explicitly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "in_progress" => Some(RequestStatus::InProgress),
            "completed" => Some(RequestStatus::Completed),
            "cancelled" => Some(RequestStatus::Cancelled),
            _ => None,
        }
    }

    pub fn all() -> [RequestStatus; 4] {
        [
            RequestStatus::Pending,
            RequestStatus::InProgress,
            RequestStatus::Completed,
            RequestStatus::Cancelled,
        ]
    }
}

/// A set of tests and panels ordered together for one patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestRequest {
    pub request_id: String,
    /// Owning patient, bound by accession code
    pub accession_code: String,
    /// Individually ordered test codes
    pub test_codes: Vec<String>,
    /// Ordered panel codes
    pub panel_codes: Vec<String>,
    pub status: RequestStatus,
    pub notes: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TestRequest {
    /// Create a new pending request.
    pub fn new(accession_code: String) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            accession_code,
            test_codes: Vec::new(),
            panel_codes: Vec::new(),
            status: RequestStatus::Pending,
            notes: String::new(),
            created_by: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == RequestStatus::Cancelled
    }

    /// Whether anything at all was ordered.
    pub fn is_empty(&self) -> bool {
        self.test_codes.is_empty() && self.panel_codes.is_empty()
    }
}
