//! Patient report aggregation.
//!
//! Reads already-classified results and lays them out for rendering. No
//! classification happens here; reference ranges are only formatted.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{ReportError, ReportResult};
use crate::db::{Database, PrintedReport};
use crate::engine::{completion_percentage, format_range};
use crate::models::{Patient, RequestStatus, TestDefinition, TestPanel};

/// Sort key that places panel entries after every individual test.
pub const PANEL_DISPLAY_ORDER: u32 = u32::MAX;

/// Value shown for panel-level entries.
pub const PANEL_ENTRY_VALUE: &str = "test panel";

/// Patient block at the top of a report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportHeader {
    pub accession_code: String,
    pub full_name: String,
    /// "M" or "F"
    pub sex: String,
    pub age: Option<u32>,
    pub date_of_birth: Option<NaiveDate>,
    pub phone_number: Option<String>,
}

impl From<&Patient> for ReportHeader {
    fn from(patient: &Patient) -> Self {
        Self {
            accession_code: patient.accession_code.clone(),
            full_name: patient.full_name.clone(),
            sex: patient.sex.as_code().to_string(),
            age: patient.age,
            date_of_birth: patient.date_of_birth,
            phone_number: patient.phone_number.clone(),
        }
    }
}

/// One request with its completion figures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestSummary {
    pub request_id: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub total_required: u32,
    pub total_entered: u32,
    pub completion_percentage: f64,
    pub total_price: f64,
}

/// A single line on the report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportEntry {
    pub request_id: String,
    /// Test or panel code
    pub code: String,
    pub name: String,
    pub value: String,
    pub unit: String,
    pub reference_range: String,
    /// Stored result status, or the panel status for panel entries
    pub status: String,
    pub flagged: bool,
    pub recorded_at: DateTime<Utc>,
    pub display_order: u32,
    pub is_panel: bool,
}

/// Entries sharing a clinical grouping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportGroup {
    pub name: String,
    pub entries: Vec<ReportEntry>,
}

/// Everything needed to render a patient's report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientReport {
    pub patient: ReportHeader,
    pub generated_at: DateTime<Utc>,
    pub requests: Vec<RequestSummary>,
    pub groups: Vec<ReportGroup>,
}

impl PatientReport {
    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Flat CSV export, one row per entry.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("accession_code,group,code,name,value,unit,reference_range,status,recorded_at\n");

        for group in &self.groups {
            for entry in &group.entries {
                csv.push_str(&format!(
                    "{},{},{},{},{},{},{},{},{}\n",
                    escape_csv(&self.patient.accession_code),
                    escape_csv(&group.name),
                    escape_csv(&entry.code),
                    escape_csv(&entry.name),
                    escape_csv(&entry.value),
                    escape_csv(&entry.unit),
                    escape_csv(&entry.reference_range),
                    entry.status,
                    entry.recorded_at.to_rfc3339(),
                ));
            }
        }

        csv
    }

    /// Number of entries across all groups.
    pub fn entry_count(&self) -> usize {
        self.groups.iter().map(|g| g.entries.len()).sum()
    }

    /// Entries whose status is high, low or abnormal.
    pub fn flagged_entries(&self) -> impl Iterator<Item = &ReportEntry> {
        self.groups
            .iter()
            .flat_map(|g| g.entries.iter())
            .filter(|e| e.flagged)
    }
}

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Builds patient reports from the result store.
pub struct ReportAggregator<'a> {
    db: &'a Database,
}

impl<'a> ReportAggregator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Build the full report for a patient.
    pub fn patient_report(&self, accession_code: &str) -> ReportResult<PatientReport> {
        let patient = self.patient(accession_code)?;

        let mut requests = Vec::new();
        for request in self.db.list_requests_for_accession(accession_code)? {
            let total_required = self.db.required_test_count(&request.request_id)?;
            let total_entered = self.db.entered_result_count(&request.request_id)?;
            requests.push(RequestSummary {
                total_price: self.db.request_total_price(&request.request_id)?,
                completion_percentage: completion_percentage(total_entered, total_required),
                request_id: request.request_id,
                status: request.status,
                created_at: request.created_at,
                total_required,
                total_entered,
            });
        }

        let mut tests: HashMap<String, TestDefinition> = HashMap::new();
        let mut panels: HashMap<String, TestPanel> = HashMap::new();
        let mut keyed: Vec<(String, ReportEntry)> = Vec::new();

        for row in self.db.list_results_for_accession(accession_code)? {
            let result = row.result;
            if !tests.contains_key(&result.test_code) {
                match self.db.get_test_definition(&result.test_code)? {
                    Some(definition) => {
                        tests.insert(result.test_code.clone(), definition);
                    }
                    None => {
                        tracing::warn!(test = %result.test_code, "Result for unknown test skipped");
                        continue;
                    }
                }
            }
            let Some(definition) = tests.get(&result.test_code) else {
                continue;
            };

            keyed.push((
                definition.report_group().to_string(),
                ReportEntry {
                    request_id: result.request_id,
                    code: result.test_code,
                    name: definition.name.clone(),
                    value: result.value,
                    unit: definition.unit.clone(),
                    reference_range: format_range(definition.range_for(patient.sex)),
                    status: result.status.as_str().to_string(),
                    flagged: result.status.is_flagged(),
                    recorded_at: result.updated_at,
                    display_order: definition.display_order,
                    is_panel: false,
                },
            ));
        }

        for panel_result in self.db.list_panel_results_for_accession(accession_code)? {
            if !panels.contains_key(&panel_result.panel_code) {
                match self.db.get_panel(&panel_result.panel_code)? {
                    Some(panel) => {
                        panels.insert(panel_result.panel_code.clone(), panel);
                    }
                    None => continue,
                }
            }
            let Some(panel) = panels.get(&panel_result.panel_code) else {
                continue;
            };

            keyed.push((
                panel.report_group().to_string(),
                ReportEntry {
                    request_id: panel_result.request_id,
                    code: panel_result.panel_code,
                    name: panel.name.clone(),
                    value: PANEL_ENTRY_VALUE.to_string(),
                    unit: String::new(),
                    reference_range: String::new(),
                    status: panel_result.status.as_str().to_string(),
                    flagged: false,
                    recorded_at: panel_result.recorded_at,
                    display_order: PANEL_DISPLAY_ORDER,
                    is_panel: true,
                },
            ));
        }

        Ok(PatientReport {
            patient: ReportHeader::from(&patient),
            generated_at: Utc::now(),
            requests,
            groups: group_entries(keyed),
        })
    }

    /// Track that a report was printed or sent.
    pub fn record_printed_report(
        &self,
        accession_code: &str,
        actor: Option<&str>,
        report_type: &str,
        notes: &str,
    ) -> ReportResult<PrintedReport> {
        self.patient(accession_code)?;

        let mut report = PrintedReport::new(
            accession_code.to_string(),
            report_type.to_string(),
            actor.map(str::to_string),
        );
        report.notes = notes.to_string();
        self.db.insert_printed_report(&report)?;

        tracing::info!(
            accession_code,
            report_type,
            report_id = %report.report_id,
            "Printed report recorded"
        );
        Ok(report)
    }

    pub fn printed_reports(&self, accession_code: &str) -> ReportResult<Vec<PrintedReport>> {
        Ok(self.db.list_printed_reports(accession_code)?)
    }

    pub fn lab_stats(&self, popular_limit: usize) -> ReportResult<super::LabStats> {
        super::lab_stats(self.db, popular_limit)
    }

    fn patient(&self, accession_code: &str) -> ReportResult<Patient> {
        self.db
            .get_patient_by_accession(accession_code)?
            .ok_or_else(|| ReportError::PatientNotFound(accession_code.to_string()))
    }
}

/// Sort by display order then name (newest first on ties), then bucket by group
/// keeping the order in which groups first appear.
fn group_entries(mut keyed: Vec<(String, ReportEntry)>) -> Vec<ReportGroup> {
    keyed.sort_by(|(_, a), (_, b)| {
        a.display_order
            .cmp(&b.display_order)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| b.recorded_at.cmp(&a.recorded_at))
    });

    let mut groups: Vec<ReportGroup> = Vec::new();
    for (name, entry) in keyed {
        match groups.iter_mut().find(|g| g.name == name) {
            Some(group) => group.entries.push(entry),
            None => groups.push(ReportGroup {
                name,
                entries: vec![entry],
            }),
        }
    }
    groups
}
