//! Dashboard figures.

use serde::{Deserialize, Serialize};

use super::ReportResult;
use crate::db::{Database, TestPopularity};
use crate::models::RequestStatus;

/// Number of requests in one status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusCount {
    pub status: RequestStatus,
    pub count: u32,
}

/// Lab-wide totals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabStats {
    pub total_patients: u32,
    pub total_requests: u32,
    pub total_results: u32,
    pub requests_by_status: Vec<StatusCount>,
    pub popular_tests: Vec<TestPopularity>,
    pub pending_readings: u32,
    pub printed_reports: u32,
}

impl LabStats {
    pub fn count_for(&self, status: RequestStatus) -> u32 {
        self.requests_by_status
            .iter()
            .find(|c| c.status == status)
            .map_or(0, |c| c.count)
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Collect lab-wide totals and the `popular_limit` most ordered tests.
pub fn lab_stats(db: &Database, popular_limit: usize) -> ReportResult<LabStats> {
    let requests_by_status = db
        .count_requests_by_status()?
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect();

    Ok(LabStats {
        total_patients: db.count_patients()?,
        total_requests: db.count_requests()?,
        total_results: db.count_results()?,
        requests_by_status,
        popular_tests: db.popular_tests(popular_limit)?,
        pending_readings: db.count_active_readings()?,
        printed_reports: db.count_printed_reports()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_lab() {
        let db = Database::open_in_memory().unwrap();
        let stats = lab_stats(&db, 5).unwrap();

        assert_eq!(stats.total_patients, 0);
        assert_eq!(stats.requests_by_status.len(), 4);
        assert_eq!(stats.count_for(RequestStatus::Pending), 0);
        assert!(stats.popular_tests.is_empty());
        assert!(stats.to_json().unwrap().contains("\"total_requests\": 0"));
    }
}
