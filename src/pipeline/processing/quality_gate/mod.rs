pub mod dataset;
pub mod report;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, instrument, warn};

use crate::domain::{Dataset, Event};
use crate::observability::metrics;
use crate::pipeline::processing::normalize::RuleTables;
pub use dataset::{
    DatasetChecks, DatasetQualityWarning, DuplicateCheck, DuplicateEntry, MonthCoverage,
    RatioCheck,
};
pub use report::{DateRange, Distributions, FieldStats, QualityReport, ValidatedDataset};

/// Quality Gate decision for a record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QualityDecision {
    /// No issue above informational
    Accept,
    /// Non-mandatory issues; still eligible for sync
    AcceptWithWarnings,
    /// A mandatory field is violated; kept for local export, excluded from sync
    Reject,
}

/// Individual quality issue found during assessment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityIssue {
    pub issue_type: QualityIssueType,
    pub severity: QualitySeverity,
    pub description: String,
    /// Field that triggered this issue
    pub field: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QualityIssueType {
    MissingData,
    InvalidFormat,
    OutOfRange,
    NonCanonicalValue,
    Duplicate,
}

/// Severity levels for quality issues
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualitySeverity {
    /// Informational only (e.g. state could not be derived)
    Info,
    /// Non-mandatory field missing or marginal
    Warning,
    /// Mandatory field violated
    Failure,
}

impl QualityIssue {
    fn new(
        issue_type: QualityIssueType,
        severity: QualitySeverity,
        field: &str,
        description: impl Into<String>,
    ) -> Self {
        Self {
            issue_type,
            severity,
            description: description.into(),
            field: Some(field.to_string()),
        }
    }
}

/// Per-record outcome of the quality gate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordAssessment {
    /// Position of the record in the dataset
    pub index: usize,
    pub decision: QualityDecision,
    pub issues: Vec<QualityIssue>,
}

impl RecordAssessment {
    fn from_issues(index: usize, issues: Vec<QualityIssue>) -> Self {
        let decision = determine_decision(&issues);
        Self {
            index,
            decision,
            issues,
        }
    }

    pub fn is_sync_eligible(&self) -> bool {
        self.decision != QualityDecision::Reject
    }

    pub fn failure_reasons(&self) -> Vec<&str> {
        self.issues
            .iter()
            .filter(|i| i.severity == QualitySeverity::Failure)
            .map(|i| i.description.as_str())
            .collect()
    }

    pub fn is_duplicate(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.issue_type == QualityIssueType::Duplicate)
    }

    fn push_issue(&mut self, issue: QualityIssue) {
        self.issues.push(issue);
        self.decision = determine_decision(&self.issues);
    }
}

fn determine_decision(issues: &[QualityIssue]) -> QualityDecision {
    match issues.iter().map(|i| i.severity).max() {
        Some(QualitySeverity::Failure) => QualityDecision::Reject,
        Some(QualitySeverity::Warning) => QualityDecision::AcceptWithWarnings,
        _ => QualityDecision::Accept,
    }
}

/// Configuration for Quality Gate assessment rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityGateConfig {
    /// Minimum name length in characters after trimming
    pub min_name_len: usize,
    /// Days in the past an event date may lie (0 = today or later)
    pub max_past_days: i64,
    /// Days in the future an event date may lie; unbounded when absent
    pub max_future_days: Option<i64>,
    /// Minimum number of distinct (year, month) pairs across dated records
    pub min_months_covered: usize,
    /// Minimum share of records with a derived state
    pub min_state_ratio: f64,
    /// Minimum share of records with a derived distance
    pub min_distance_ratio: f64,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            min_name_len: 3,
            max_past_days: 0,
            max_future_days: None,
            min_months_covered: 6,
            min_state_ratio: 0.8,
            min_distance_ratio: 0.6,
        }
    }
}

/// Trait for implementing Quality Gate assessment logic
pub trait QualityGate {
    /// Annotate every record and run the dataset-level checks. Never drops records.
    fn assess(&self, dataset: Dataset) -> ValidatedDataset;
}

#[derive(Debug, Clone)]
struct CanonicalValues {
    states: HashSet<String>,
    distances: HashSet<String>,
}

/// Default Quality Gate implementation with configurable rules
pub struct DefaultQualityGate {
    pub config: QualityGateConfig,
    canonical: Option<CanonicalValues>,
    reference_date: Option<NaiveDate>,
}

impl DefaultQualityGate {
    pub fn new() -> Self {
        Self::with_config(QualityGateConfig::default())
    }

    pub fn with_config(config: QualityGateConfig) -> Self {
        Self {
            config,
            canonical: None,
            reference_date: None,
        }
    }

    /// Also flag `state`/`distance` values that are not members of the rule tables
    pub fn with_canonical_values(mut self, rules: &RuleTables) -> Self {
        self.canonical = Some(CanonicalValues {
            states: rules.states.iter().cloned().collect(),
            distances: rules.distance_labels().into_iter().collect(),
        });
        self
    }

    /// Pin "today" for date-range checks instead of reading the clock
    pub fn with_reference_date(mut self, today: NaiveDate) -> Self {
        self.reference_date = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Utc::now().naive_utc().date())
    }

    /// Record-level checks for a single event
    pub fn assess_record(&self, index: usize, event: &Event, today: NaiveDate) -> RecordAssessment {
        let mut issues = Vec::new();
        issues.extend(self.check_name(event));
        issues.extend(self.check_date(event, today));
        issues.extend(check_registration_url(event));
        issues.extend(self.check_optional_fields(event));
        RecordAssessment::from_issues(index, issues)
    }

    fn check_name(&self, event: &Event) -> Option<QualityIssue> {
        let name = event.name.trim();
        if name.is_empty() {
            return Some(QualityIssue::new(
                QualityIssueType::MissingData,
                QualitySeverity::Failure,
                "name",
                "Name is missing",
            ));
        }
        if name.chars().count() < self.config.min_name_len {
            return Some(QualityIssue::new(
                QualityIssueType::InvalidFormat,
                QualitySeverity::Failure,
                "name",
                format!(
                    "Name '{}' is shorter than {} characters",
                    name, self.config.min_name_len
                ),
            ));
        }
        None
    }

    fn check_date(&self, event: &Event, today: NaiveDate) -> Option<QualityIssue> {
        if event.date.trim().is_empty() {
            return Some(QualityIssue::new(
                QualityIssueType::MissingData,
                QualitySeverity::Failure,
                "date",
                "Date is missing",
            ));
        }
        let Some(day) = event.event_day() else {
            return Some(QualityIssue::new(
                QualityIssueType::InvalidFormat,
                QualitySeverity::Failure,
                "date",
                format!("Date '{}' is not a valid YYYY-MM-DD date", event.date),
            ));
        };

        let days_diff = (day - today).num_days();
        if days_diff < -self.config.max_past_days {
            return Some(QualityIssue::new(
                QualityIssueType::OutOfRange,
                QualitySeverity::Failure,
                "date",
                format!("Date {} is {} days in the past", event.date, -days_diff),
            ));
        }
        if let Some(max_future) = self.config.max_future_days {
            if days_diff > max_future {
                return Some(QualityIssue::new(
                    QualityIssueType::OutOfRange,
                    QualitySeverity::Failure,
                    "date",
                    format!("Date {} is {} days in the future", event.date, days_diff),
                ));
            }
        }
        None
    }

    fn check_optional_fields(&self, event: &Event) -> Vec<QualityIssue> {
        let mut issues = Vec::new();

        if event.location.trim().is_empty() {
            issues.push(QualityIssue::new(
                QualityIssueType::MissingData,
                QualitySeverity::Warning,
                "location",
                "Location is missing",
            ));
        }

        let canonical = self.canonical.as_ref();
        for (field, value, allowed) in [
            ("state", &event.state, canonical.map(|c| &c.states)),
            ("distance", &event.distance, canonical.map(|c| &c.distances)),
        ] {
            if value.is_empty() {
                issues.push(QualityIssue::new(
                    QualityIssueType::MissingData,
                    QualitySeverity::Info,
                    field,
                    format!("No {} could be derived", field),
                ));
            } else if allowed.is_some_and(|set| !set.contains(value.as_str())) {
                issues.push(QualityIssue::new(
                    QualityIssueType::NonCanonicalValue,
                    QualitySeverity::Warning,
                    field,
                    format!("'{}' is not a canonical {}", value, field),
                ));
            }
        }

        issues
    }
}

/// `registration_url` must be an absolute http/https URL with a host
fn check_registration_url(event: &Event) -> Option<QualityIssue> {
    let raw = event.registration_url.trim();
    if raw.is_empty() {
        return Some(QualityIssue::new(
            QualityIssueType::MissingData,
            QualitySeverity::Failure,
            "registration_url",
            "Registration URL is missing",
        ));
    }
    if is_valid_registration_url(raw) {
        None
    } else {
        Some(QualityIssue::new(
            QualityIssueType::InvalidFormat,
            QualitySeverity::Failure,
            "registration_url",
            format!("Invalid URL format: {}", raw),
        ))
    }
}

pub fn is_valid_registration_url(raw: &str) -> bool {
    match url::Url::parse(raw) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

impl QualityGate for DefaultQualityGate {
    #[instrument(skip_all, fields(events = dataset.len()))]
    fn assess(&self, dataset: Dataset) -> ValidatedDataset {
        let today = self.today();

        let mut records: Vec<RecordAssessment> = dataset
            .iter()
            .enumerate()
            .map(|(index, event)| self.assess_record(index, event, today))
            .collect();

        // Synchronization barrier: everything below needs the full collection
        let checks = DatasetChecks::run(dataset.events(), &self.config);
        for entry in &checks.duplicates.duplicates {
            records[entry.index].push_issue(QualityIssue::new(
                QualityIssueType::Duplicate,
                QualitySeverity::Warning,
                "name",
                format!(
                    "Duplicate of record #{} (same name and date)",
                    entry.canonical_index
                ),
            ));
        }

        for record in &records {
            match record.decision {
                QualityDecision::Accept => metrics::quality_gate::record_accepted(),
                QualityDecision::AcceptWithWarnings => {
                    metrics::quality_gate::record_accepted_with_warnings()
                }
                QualityDecision::Reject => {
                    metrics::quality_gate::record_rejected();
                    warn!(
                        "Invalid event #{}: {}",
                        record.index,
                        record.failure_reasons().join(", ")
                    );
                }
            }
            for issue in &record.issues {
                metrics::quality_gate::issue_detected(
                    &format!("{:?}", issue.issue_type),
                    &format!("{:?}", issue.severity),
                );
            }
        }

        let report = QualityReport::build(dataset.events(), records, checks, today);
        for warning in report.dataset_warnings() {
            metrics::quality_gate::dataset_warning(warning.check_name());
            warn!("Dataset quality warning: {}", warning);
        }
        info!(
            "✅ Quality gate assessed {} events ({} valid, {} invalid, {} duplicates)",
            report.total_events,
            report.valid_events,
            report.invalid_events,
            report.duplicates()
        );

        ValidatedDataset::new(dataset, report)
    }
}

impl Default for DefaultQualityGate {
    fn default() -> Self {
        Self::new()
    }
}
