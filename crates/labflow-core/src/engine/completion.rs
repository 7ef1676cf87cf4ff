//! Request completion tracking.

use serde::{Deserialize, Serialize};

use super::{EngineError, EngineResult};
use crate::db::Database;
use crate::models::RequestStatus;

/// Entered versus required counts for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionProgress {
    /// Individual tests plus every panel's member count
    pub total_required: u32,
    /// Stored results plus panel result records
    pub total_entered: u32,
}

impl CompletionProgress {
    pub fn is_complete(&self) -> bool {
        self.total_required > 0 && self.total_entered >= self.total_required
    }

    pub fn percentage(&self) -> f64 {
        completion_percentage(self.total_entered, self.total_required)
    }
}

/// Percentage rounded to one decimal; zero when nothing is required.
///
/// Capped at 100. A panel's bookkeeping row counts as entered on top of its
/// member results, so `total_entered` can exceed `total_required`.
pub fn completion_percentage(total_entered: u32, total_required: u32) -> f64 {
    if total_required == 0 {
        return 0.0;
    }
    let permille = 1000.0 * f64::from(total_entered) / f64::from(total_required);
    (permille.round() / 10.0).min(100.0)
}

/// The status a request should move to, if any.
///
/// Cancelled is terminal. Completion wins over in-progress, and in-progress is
/// only ever reached from pending.
pub fn next_status(current: RequestStatus, progress: CompletionProgress) -> Option<RequestStatus> {
    match current {
        RequestStatus::Cancelled => None,
        RequestStatus::Completed => None,
        _ if progress.is_complete() => Some(RequestStatus::Completed),
        RequestStatus::Pending if progress.total_entered > 0 => Some(RequestStatus::InProgress),
        _ => None,
    }
}

/// Recomputes derived request status after result writes.
pub struct CompletionTracker<'a> {
    db: &'a Database,
}

impl<'a> CompletionTracker<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Current counts for a request.
    pub fn progress(&self, request_id: &str) -> EngineResult<CompletionProgress> {
        Ok(CompletionProgress {
            total_required: self.db.required_test_count(request_id)?,
            total_entered: self.db.entered_result_count(request_id)?,
        })
    }

    /// Recompute and persist the status. Returns the new status if it changed.
    pub fn recompute(&self, request_id: &str) -> EngineResult<Option<RequestStatus>> {
        let request = self
            .db
            .get_request(request_id)?
            .ok_or_else(|| EngineError::NotFound(format!("request {}", request_id)))?;

        let progress = self.progress(request_id)?;
        let Some(status) = next_status(request.status, progress) else {
            return Ok(None);
        };

        self.db.set_request_status(request_id, status)?;
        tracing::info!(
            request_id,
            from = request.status.as_str(),
            to = status.as_str(),
            entered = progress.total_entered,
            required = progress.total_required,
            "Request status changed"
        );
        Ok(Some(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(total_entered: u32, total_required: u32) -> CompletionProgress {
        CompletionProgress {
            total_required,
            total_entered,
        }
    }

    #[test]
    fn test_percentage() {
        assert_eq!(completion_percentage(0, 0), 0.0);
        assert_eq!(completion_percentage(3, 0), 0.0);
        assert_eq!(completion_percentage(1, 3), 33.3);
        assert_eq!(completion_percentage(2, 3), 66.7);
        assert_eq!(completion_percentage(5, 5), 100.0);
        assert_eq!(completion_percentage(4, 3), 100.0);
        assert_eq!(progress(4, 5).percentage(), 80.0);
    }

    #[test]
    fn test_transitions() {
        use RequestStatus::*;

        assert_eq!(next_status(Pending, progress(0, 5)), None);
        assert_eq!(next_status(Pending, progress(1, 5)), Some(InProgress));
        assert_eq!(next_status(InProgress, progress(4, 5)), None);
        assert_eq!(next_status(InProgress, progress(5, 5)), Some(Completed));
        assert_eq!(next_status(Pending, progress(5, 5)), Some(Completed));
        assert_eq!(next_status(Completed, progress(6, 5)), None);
    }

    #[test]
    fn test_cancelled_is_terminal() {
        assert_eq!(next_status(RequestStatus::Cancelled, progress(5, 5)), None);
        assert_eq!(next_status(RequestStatus::Cancelled, progress(1, 5)), None);
    }

    #[test]
    fn test_empty_request_never_completes() {
        assert_eq!(next_status(RequestStatus::Pending, progress(0, 0)), None);
        assert_eq!(
            next_status(RequestStatus::Pending, progress(1, 0)),
            Some(RequestStatus::InProgress)
        );
    }

    #[test]
    fn test_recompute_missing_request() {
        let db = Database::open_in_memory().unwrap();
        let tracker = CompletionTracker::new(&db);
        assert!(matches!(
            tracker.recompute("missing"),
            Err(EngineError::NotFound(_))
        ));
    }
}
