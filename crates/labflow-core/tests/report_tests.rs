//! Patient report layout, printed report tracking and lab statistics.

use labflow_core::db::Database;
use labflow_core::models::{
    PanelStatus, Patient, ReferenceRange, RequestStatus, Sex, TestDefinition, TestPanel,
};
use labflow_core::report::{ReportError, PANEL_DISPLAY_ORDER, PANEL_ENTRY_VALUE};
use labflow_core::{ReportAggregator, RequestManager, ResultRecorder};

const ACCESSION: &str = "2403033456";

fn definition(
    code: &str,
    name: &str,
    category: &str,
    subcategory: Option<&str>,
    order: u32,
) -> TestDefinition {
    let mut test = TestDefinition::new(code.into(), name.into(), category.into(), "g/dL".into());
    test.subcategory = subcategory.map(str::to_string);
    test.display_order = order;
    test.price = 4.0;
    test
}

fn setup_db() -> Database {
    let db = Database::open_in_memory().unwrap();

    let mut patient = Patient::new("Youssef Amin".into(), Sex::Male);
    patient.accession_code = ACCESSION.into();
    patient.age = Some(63);
    patient.phone_number = Some("0100000000".into());
    db.insert_patient(&patient).unwrap();

    let mut glucose = definition("GLU", "Glucose", "Chemistry", None, 2);
    glucose.male_range = ReferenceRange::numeric(70.0, 110.0);
    glucose.female_range = ReferenceRange::descriptor("65-99");
    db.upsert_test_definition(&glucose).unwrap();

    let mut urea = definition("UREA", "Urea", "Chemistry", None, 1);
    urea.male_range = ReferenceRange::descriptor("15 - 45");
    db.upsert_test_definition(&urea).unwrap();

    let mut hgb = definition("HGB", "Hemoglobin", "Hematology", Some("Blood count"), 3);
    hgb.male_range = ReferenceRange::numeric(13.5, 17.5);
    db.upsert_test_definition(&hgb).unwrap();
    db.upsert_test_definition(&definition("WBC", "White cells", "Hematology", Some("Blood count"), 4))
        .unwrap();

    let mut cbc = TestPanel::new("CBC".into(), "Complete blood count".into());
    cbc.category = Some("Blood count".into());
    cbc.price = 6.0;
    cbc.test_codes = vec!["HGB".into(), "WBC".into()];
    db.upsert_panel(&cbc).unwrap();

    db
}

fn populated_db() -> (Database, String) {
    let db = setup_db();
    let request_id = RequestManager::new(&db)
        .create_request(
            ACCESSION,
            &["GLU".into(), "UREA".into()],
            &["CBC".into()],
            "fasting",
            Some("reception"),
        )
        .unwrap()
        .request_id;

    let recorder = ResultRecorder::new(&db);
    recorder.upsert(&request_id, "GLU", "120", "", Some("tech")).unwrap();
    recorder.upsert(&request_id, "UREA", "30", "", Some("tech")).unwrap();
    recorder.upsert(&request_id, "HGB", "14.1", "", Some("tech")).unwrap();
    recorder
        .record_panel_result(&request_id, "CBC", PanelStatus::Completed, "")
        .unwrap();

    (db, request_id)
}

#[test]
fn test_report_groups_and_orders_entries() {
    let (db, request_id) = populated_db();
    let report = ReportAggregator::new(&db).patient_report(ACCESSION).unwrap();

    assert_eq!(report.patient.full_name, "Youssef Amin");
    assert_eq!(report.patient.sex, "M");

    let groups: Vec<&str> = report.groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(groups, vec!["Chemistry", "Blood count"]);

    let chemistry: Vec<&str> = report.groups[0].entries.iter().map(|e| e.code.as_str()).collect();
    assert_eq!(chemistry, vec!["UREA", "GLU"]);

    let blood_count = &report.groups[1].entries;
    assert_eq!(blood_count.len(), 2);
    assert_eq!(blood_count[0].code, "HGB");
    assert_eq!(blood_count[0].reference_range, "13.5 - 17.5");

    let panel = &blood_count[1];
    assert!(panel.is_panel);
    assert_eq!(panel.code, "CBC");
    assert_eq!(panel.value, PANEL_ENTRY_VALUE);
    assert_eq!(panel.display_order, PANEL_DISPLAY_ORDER);
    assert_eq!(panel.status, "completed");

    assert_eq!(report.requests.len(), 1);
    let summary = &report.requests[0];
    assert_eq!(summary.request_id, request_id);
    assert_eq!(summary.status, RequestStatus::Completed);
    assert_eq!(summary.total_required, 4);
    assert_eq!(summary.total_entered, 4);
    assert_eq!(summary.completion_percentage, 100.0);
    assert_eq!(summary.total_price, 14.0);
}

#[test]
fn test_report_formats_ranges_for_patient_sex() {
    let (db, _) = populated_db();
    let report = ReportAggregator::new(&db).patient_report(ACCESSION).unwrap();

    let glucose = report
        .groups
        .iter()
        .flat_map(|g| g.entries.iter())
        .find(|e| e.code == "GLU")
        .unwrap();
    assert_eq!(glucose.reference_range, "70 - 110");
    assert_eq!(glucose.status, "high");
    assert!(glucose.flagged);

    let urea = report
        .groups
        .iter()
        .flat_map(|g| g.entries.iter())
        .find(|e| e.code == "UREA")
        .unwrap();
    assert_eq!(urea.reference_range, "15 - 45");
    assert_eq!(urea.status, "normal");

    let flagged: Vec<&str> = report.flagged_entries().map(|e| e.code.as_str()).collect();
    assert_eq!(flagged, vec!["GLU"]);
    assert_eq!(report.entry_count(), 4);
}

#[test]
fn test_report_exports() {
    let (db, _) = populated_db();
    let report = ReportAggregator::new(&db).patient_report(ACCESSION).unwrap();

    let json = report.to_json().unwrap();
    assert!(json.contains("\"accession_code\": \"2403033456\""));
    assert!(json.contains("Complete blood count"));

    let csv = report.to_csv();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("accession_code,group,code"));
    assert_eq!(lines.count(), 4);
}

#[test]
fn test_report_without_results_lists_requests() {
    let db = setup_db();
    RequestManager::new(&db)
        .create_request(ACCESSION, &["GLU".into()], &[], "", None)
        .unwrap();

    let report = ReportAggregator::new(&db).patient_report(ACCESSION).unwrap();
    assert!(report.groups.is_empty());
    assert_eq!(report.requests.len(), 1);
    assert_eq!(report.requests[0].completion_percentage, 0.0);
}

#[test]
fn test_printed_reports_and_stats() {
    let (db, _) = populated_db();
    let aggregator = ReportAggregator::new(&db);

    aggregator
        .record_printed_report(ACCESSION, Some("front-desk"), "patient_report", "collected")
        .unwrap();
    let printed = aggregator.printed_reports(ACCESSION).unwrap();
    assert_eq!(printed.len(), 1);
    assert_eq!(printed[0].printed_by.as_deref(), Some("front-desk"));
    assert_eq!(printed[0].notes, "collected");

    let stats = aggregator.lab_stats(3).unwrap();
    assert_eq!(stats.total_patients, 1);
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.total_results, 3);
    assert_eq!(stats.count_for(RequestStatus::Completed), 1);
    assert_eq!(stats.printed_reports, 1);
    assert!(stats.popular_tests.len() <= 3);
    assert!(stats.popular_tests.iter().all(|t| t.request_count == 1));
}

#[test]
fn test_unknown_patient_report() {
    let db = setup_db();
    assert!(matches!(
        ReportAggregator::new(&db).patient_report("0000000000"),
        Err(ReportError::PatientNotFound(_))
    ));
}
