//! Completion tracking across manual entry, panel bookkeeping and item edits.

use labflow_core::db::Database;
use labflow_core::engine::{completion_percentage, CompletionTracker, EngineError};
use labflow_core::models::{
    PanelStatus, Patient, RequestStatus, ResultEntry, Sex, TestDefinition, TestPanel,
};
use labflow_core::{RequestManager, ResultRecorder};

const ACCESSION: &str = "2402029012";

fn setup_db() -> Database {
    let db = Database::open_in_memory().unwrap();

    let mut patient = Patient::new("Lina Farah".into(), Sex::Female);
    patient.accession_code = ACCESSION.into();
    patient.age = Some(41);
    db.insert_patient(&patient).unwrap();

    for (order, code) in ["GLU", "UREA", "HGB", "WBC", "PLT"].iter().enumerate() {
        let mut test = TestDefinition::new(
            code.to_string(),
            code.to_string(),
            "general".into(),
            String::new(),
        );
        test.display_order = order as u32;
        db.upsert_test_definition(&test).unwrap();
    }

    let mut cbc = TestPanel::new("CBC".into(), "Complete blood count".into());
    cbc.test_codes = vec!["HGB".into(), "WBC".into(), "PLT".into()];
    db.upsert_panel(&cbc).unwrap();

    db
}

/// Two individual tests plus a three-test panel.
fn five_test_request(db: &Database) -> String {
    RequestManager::new(db)
        .create_request(
            ACCESSION,
            &["GLU".into(), "UREA".into()],
            &["CBC".into()],
            "",
            None,
        )
        .unwrap()
        .request_id
}

fn status(db: &Database, request_id: &str) -> RequestStatus {
    db.get_request(request_id).unwrap().unwrap().status
}

#[test]
fn test_status_walks_pending_to_completed() {
    let db = setup_db();
    let request_id = five_test_request(&db);
    let recorder = ResultRecorder::new(&db);

    assert_eq!(status(&db, &request_id), RequestStatus::Pending);
    assert_eq!(
        CompletionTracker::new(&db).progress(&request_id).unwrap().total_required,
        5
    );

    let codes = ["GLU", "UREA", "HGB", "WBC", "PLT"];
    for (entered, code) in codes.iter().enumerate() {
        recorder
            .upsert(&request_id, code, "1.0", "", Some("tech"))
            .unwrap();

        let expected = if entered + 1 < codes.len() {
            RequestStatus::InProgress
        } else {
            RequestStatus::Completed
        };
        assert_eq!(status(&db, &request_id), expected, "after result #{}", entered + 1);
    }

    let progress = CompletionTracker::new(&db).progress(&request_id).unwrap();
    assert!(progress.is_complete());
    assert_eq!(progress.percentage(), 100.0);
}

#[test]
fn test_panel_result_counts_toward_completion() {
    let db = setup_db();
    let request_id = five_test_request(&db);
    let recorder = ResultRecorder::new(&db);

    let entries: Vec<ResultEntry> = ["GLU", "UREA", "HGB", "WBC"]
        .into_iter()
        .map(|code| ResultEntry::new(code, "2"))
        .collect();
    recorder.record_results(&request_id, &entries, None).unwrap();
    assert_eq!(status(&db, &request_id), RequestStatus::InProgress);
    assert_eq!(
        CompletionTracker::new(&db).progress(&request_id).unwrap().percentage(),
        80.0
    );

    recorder
        .record_panel_result(&request_id, "CBC", PanelStatus::Completed, "")
        .unwrap();
    assert_eq!(status(&db, &request_id), RequestStatus::Completed);
}

#[test]
fn test_blank_entries_do_not_advance_status() {
    let db = setup_db();
    let request_id = five_test_request(&db);
    let recorder = ResultRecorder::new(&db);

    assert!(recorder
        .upsert(&request_id, "GLU", "   ", "", None)
        .unwrap()
        .is_none());
    let written = recorder
        .record_results(
            &request_id,
            &[ResultEntry::new("GLU", ""), ResultEntry::new("UREA", "\t")],
            None,
        )
        .unwrap();

    assert!(written.is_empty());
    assert_eq!(status(&db, &request_id), RequestStatus::Pending);
    assert!(db.list_results_for_request(&request_id).unwrap().is_empty());
}

#[test]
fn test_cancelled_request_is_terminal() {
    let db = setup_db();
    let request_id = five_test_request(&db);
    let recorder = ResultRecorder::new(&db);
    let manager = RequestManager::new(&db);

    recorder.upsert(&request_id, "GLU", "5", "", None).unwrap();
    manager.cancel_request(&request_id).unwrap();

    assert!(matches!(
        recorder.upsert(&request_id, "UREA", "5", "", None),
        Err(EngineError::InvalidState(_))
    ));
    assert_eq!(
        CompletionTracker::new(&db).recompute(&request_id).unwrap(),
        None
    );
    assert_eq!(status(&db, &request_id), RequestStatus::Cancelled);

    // Cancelling again changes nothing.
    assert_eq!(
        manager.cancel_request(&request_id).unwrap().status,
        RequestStatus::Cancelled
    );
}

#[test]
fn test_completed_status_survives_item_growth() {
    let db = setup_db();
    let manager = RequestManager::new(&db);
    let request_id = manager
        .create_request(ACCESSION, &["GLU".into()], &[], "", None)
        .unwrap()
        .request_id;

    ResultRecorder::new(&db)
        .upsert(&request_id, "GLU", "4.8", "", None)
        .unwrap();
    assert_eq!(status(&db, &request_id), RequestStatus::Completed);

    manager
        .update_request_items(&request_id, &["GLU".into(), "UREA".into()], &[], "")
        .unwrap();
    assert_eq!(status(&db, &request_id), RequestStatus::Completed);
    assert_eq!(
        CompletionTracker::new(&db).progress(&request_id).unwrap().percentage(),
        50.0
    );
}

#[test]
fn test_percentage_capped_when_panel_row_exceeds_required() {
    let db = setup_db();
    let request_id = five_test_request(&db);
    let recorder = ResultRecorder::new(&db);

    let entries: Vec<ResultEntry> = ["GLU", "UREA", "HGB", "WBC", "PLT"]
        .into_iter()
        .map(|code| ResultEntry::new(code, "3"))
        .collect();
    recorder.record_results(&request_id, &entries, None).unwrap();
    recorder
        .record_panel_result(&request_id, "CBC", PanelStatus::Completed, "")
        .unwrap();

    let progress = CompletionTracker::new(&db).progress(&request_id).unwrap();
    assert_eq!(progress.total_required, 5);
    assert_eq!(progress.total_entered, 6);
    assert!(progress.is_complete());
    assert_eq!(progress.percentage(), 100.0);
    assert_eq!(status(&db, &request_id), RequestStatus::Completed);
}

#[test]
fn test_every_touched_request_satisfies_invariant() {
    let db = setup_db();
    let manager = RequestManager::new(&db);
    let recorder = ResultRecorder::new(&db);

    let first = manager
        .create_request(ACCESSION, &["GLU".into()], &[], "", None)
        .unwrap()
        .request_id;
    let second = manager
        .create_request(ACCESSION, &["GLU".into(), "UREA".into()], &[], "", None)
        .unwrap()
        .request_id;

    recorder.upsert(&first, "GLU", "6", "", None).unwrap();
    recorder.upsert(&second, "GLU", "6", "", None).unwrap();
    recorder.upsert(&second, "UREA", "30", "", None).unwrap();

    let tracker = CompletionTracker::new(&db);
    for request_id in [&first, &second] {
        let progress = tracker.progress(request_id).unwrap();
        if progress.total_entered >= progress.total_required {
            assert_eq!(status(&db, request_id), RequestStatus::Completed);
        }
    }
}

#[test]
fn test_percentage_rounding() {
    assert_eq!(completion_percentage(0, 0), 0.0);
    assert_eq!(completion_percentage(1, 3), 33.3);
    assert_eq!(completion_percentage(2, 3), 66.7);
    assert_eq!(completion_percentage(5, 5), 100.0);
    assert_eq!(completion_percentage(7, 5), 100.0);
}
