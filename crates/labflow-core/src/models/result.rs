//! Result models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a single result against its reference range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResultStatus {
    Normal,
    High,
    Low,
    /// Set manually for qualitative findings
    Abnormal,
    /// Non-numeric value or no reference range configured
    NotApplicable,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Normal => "normal",
            ResultStatus::High => "high",
            ResultStatus::Low => "low",
            ResultStatus::Abnormal => "abnormal",
            ResultStatus::NotApplicable => "not_applicable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(ResultStatus::Normal),
            "high" => Some(ResultStatus::High),
            "low" => Some(ResultStatus::Low),
            "abnormal" => Some(ResultStatus::Abnormal),
            "not_applicable" => Some(ResultStatus::NotApplicable),
            _ => None,
        }
    }

    /// Whether the value falls outside its reference interval.
    pub fn is_flagged(&self) -> bool {
        matches!(
            self,
            ResultStatus::High | ResultStatus::Low | ResultStatus::Abnormal
        )
    }
}

/// The entered value of one test within one request.
///
/// Unique per (request, test).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    pub result_id: String,
    pub request_id: String,
    pub test_code: String,
    /// Stored as text so qualitative readings ("positive", "++") fit
    pub value: String,
    pub status: ResultStatus,
    pub notes: String,
    /// First writer
    pub entered_by: Option<String>,
    /// Most recent writer after the first entry
    pub last_modified_by: Option<String>,
    pub entered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Completion bookkeeping for a whole panel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PanelStatus {
    Pending,
    Completed,
}

impl PanelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PanelStatus::Pending => "pending",
            PanelStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PanelStatus::Pending),
            "completed" => Some(PanelStatus::Completed),
            _ => None,
        }
    }
}

/// Panel-level record; holds no values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PanelResult {
    pub result_id: String,
    pub request_id: String,
    pub panel_code: String,
    pub status: PanelStatus,
    pub notes: String,
    pub recorded_at: DateTime<Utc>,
}

/// One line of manual or bulk result entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultEntry {
    pub test_code: String,
    pub value: String,
    pub notes: String,
}

impl ResultEntry {
    pub fn new(test_code: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            test_code: test_code.into(),
            value: value.into(),
            notes: String::new(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Blank entries are skipped rather than stored as placeholders.
    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }
}
