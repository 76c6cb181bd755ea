use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::dataset::{DatasetChecks, DatasetQualityWarning};
use super::{QualityDecision, RecordAssessment};
use crate::domain::{Dataset, Event};

const TOP_STATES: usize = 10;

/// How many records carry each field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldStats {
    pub with_names: usize,
    pub with_locations: usize,
    pub with_states: usize,
    pub with_distances: usize,
    pub with_urls: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

/// Value counts, most frequent first (ties alphabetical)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distributions {
    pub states: Vec<(String, usize)>,
    pub distances: Vec<(String, usize)>,
}

/// Structured output of the quality gate: per-record flags plus dataset-level checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub total_events: usize,
    pub valid_events: usize,
    pub invalid_events: usize,
    pub records: Vec<RecordAssessment>,
    pub checks: DatasetChecks,
    pub stats: FieldStats,
    pub date_range: Option<DateRange>,
    pub distributions: Distributions,
    /// The "today" used for date-range checks
    pub reference_date: NaiveDate,
    pub assessed_at: DateTime<Utc>,
}

impl QualityReport {
    pub(crate) fn build(
        events: &[Event],
        records: Vec<RecordAssessment>,
        checks: DatasetChecks,
        reference_date: NaiveDate,
    ) -> Self {
        let invalid_events = records
            .iter()
            .filter(|r| r.decision == QualityDecision::Reject)
            .count();

        let present = |f: fn(&Event) -> &str| events.iter().filter(|e| !f(e).is_empty()).count();
        let stats = FieldStats {
            with_names: present(|e| e.name.as_str()),
            with_locations: present(|e| e.location.as_str()),
            with_states: present(|e| e.state.as_str()),
            with_distances: present(|e| e.distance.as_str()),
            with_urls: present(|e| e.registration_url.as_str()),
        };

        let days: Vec<NaiveDate> = events.iter().filter_map(Event::event_day).collect();
        let date_range = match (days.iter().min(), days.iter().max()) {
            (Some(&first), Some(&last)) => Some(DateRange { first, last }),
            _ => None,
        };

        let mut states = count_values(events.iter().map(|e| e.state.as_str()));
        states.truncate(TOP_STATES);
        let distributions = Distributions {
            states,
            distances: count_values(events.iter().map(|e| e.distance.as_str())),
        };

        Self {
            total_events: events.len(),
            valid_events: events.len() - invalid_events,
            invalid_events,
            records,
            checks,
            stats,
            date_range,
            distributions,
            reference_date,
            assessed_at: Utc::now(),
        }
    }

    pub fn dataset_warnings(&self) -> Vec<DatasetQualityWarning> {
        self.checks.warnings()
    }

    /// True when every dataset-level check passed
    pub fn dataset_passed(&self) -> bool {
        self.checks.passed()
    }

    pub fn duplicates(&self) -> usize {
        self.checks.duplicates.duplicates.len()
    }
}

fn count_values<'a>(values: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values.filter(|v| !v.is_empty()) {
        *counts.entry(value).or_default() += 1;
    }
    let mut sorted: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(value, count)| (value.to_string(), count))
        .collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total_events;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, " Dataset Validation Report")?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f)?;
        writeln!(f, "✓ Total events: {}", total)?;
        if let Some(range) = &self.date_range {
            writeln!(f, "✓ Date range: {} to {}", range.first, range.last)?;
        }
        let coverage = &self.checks.month_coverage;
        let mark = |passed: bool| if passed { "✓" } else { "⚠" };
        writeln!(
            f,
            "{} Months covered: {} (minimum {})",
            mark(coverage.passed),
            coverage.months_covered,
            coverage.minimum
        )?;

        if total > 0 {
            let s = &self.stats;
            writeln!(
                f,
                "✓ Events with locations: {} ({:.1}%)",
                s.with_locations,
                percent(s.with_locations, total)
            )?;
            writeln!(
                f,
                "{} Events with states: {} ({:.1}%, threshold {:.1}%)",
                mark(self.checks.state_extraction.passed),
                s.with_states,
                self.checks.state_extraction.ratio * 100.0,
                self.checks.state_extraction.threshold * 100.0
            )?;
            writeln!(
                f,
                "{} Events with distances: {} ({:.1}%, threshold {:.1}%)",
                mark(self.checks.distance_extraction.passed),
                s.with_distances,
                self.checks.distance_extraction.ratio * 100.0,
                self.checks.distance_extraction.threshold * 100.0
            )?;
            writeln!(
                f,
                "✓ Events with URLs: {} ({:.1}%)",
                s.with_urls,
                percent(s.with_urls, total)
            )?;
        }

        if self.duplicates() > 0 {
            writeln!(f, "⚠ Duplicates found: {}", self.duplicates())?;
        } else {
            writeln!(f, "✓ No duplicates found")?;
        }

        writeln!(f)?;
        writeln!(f, "✓ Valid events: {}", self.valid_events)?;
        if self.invalid_events > 0 {
            writeln!(f, "⚠ Invalid events: {}", self.invalid_events)?;
        }

        writeln!(f)?;
        writeln!(f, "=== State Distribution (Top {}) ===", TOP_STATES)?;
        for (state, count) in &self.distributions.states {
            writeln!(f, "{}: {} events", state, count)?;
        }
        writeln!(f)?;
        writeln!(f, "=== Distance Distribution ===")?;
        for (distance, count) in &self.distributions.distances {
            writeln!(f, "{}: {} events", distance, count)?;
        }
        write!(f, "{}", "=".repeat(50))
    }
}

/// A dataset that has been through the quality gate. Events are read-only from here on.
#[derive(Debug, Clone)]
pub struct ValidatedDataset {
    dataset: Dataset,
    report: QualityReport,
}

impl ValidatedDataset {
    pub(crate) fn new(dataset: Dataset, report: QualityReport) -> Self {
        Self { dataset, report }
    }

    /// All records, failing or not, in insertion order
    pub fn events(&self) -> &[Event] {
        self.dataset.events()
    }

    pub fn report(&self) -> &QualityReport {
        &self.report
    }

    /// Records without a mandatory-field failure, in insertion order
    pub fn sync_eligible(&self) -> impl Iterator<Item = &Event> {
        self.dataset
            .iter()
            .zip(&self.report.records)
            .filter(|(_, record)| record.is_sync_eligible())
            .map(|(event, _)| event)
    }

    pub fn sync_payload(&self) -> Vec<Event> {
        self.sync_eligible().cloned().collect()
    }
}
