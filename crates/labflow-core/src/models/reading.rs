//! Device feed models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An instrument observation waiting to be folded into the result store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceReading {
    /// Append order in the feed table
    pub reading_id: i64,
    pub instrument: String,
    pub accession_code: String,
    pub test_code: String,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
    /// False once consumed (or dropped); never reset
    pub active: bool,
}

impl DeviceReading {
    /// Value rendered the way it is stored on a result.
    pub fn value_text(&self) -> String {
        self.value.to_string()
    }
}

/// A reading as produced by an instrument adapter, before it is appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewDeviceReading {
    pub instrument: String,
    pub accession_code: String,
    pub test_code: String,
    pub value: f64,
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
}

impl NewDeviceReading {
    pub fn new(
        instrument: impl Into<String>,
        accession_code: impl Into<String>,
        test_code: impl Into<String>,
        value: f64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            accession_code: accession_code.into(),
            test_code: test_code.into(),
            value,
            recorded_at,
        }
    }
}
