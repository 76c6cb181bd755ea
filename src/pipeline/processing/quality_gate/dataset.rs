use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

use super::QualityGateConfig;
use crate::domain::Event;

/// Aggregate threshold unmet; reported, never fatal to the run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatasetQualityWarning {
    #[error("{count} duplicate records (same name and date)")]
    DuplicatesPresent { count: usize },

    #[error("only {covered} distinct months covered, expected at least {minimum}")]
    InsufficientMonthCoverage { covered: usize, minimum: usize },

    #[error("state extraction rate {:.1}% below {:.1}%", .ratio * 100.0, .threshold * 100.0)]
    LowStateExtraction { ratio: f64, threshold: f64 },

    #[error("distance extraction rate {:.1}% below {:.1}%", .ratio * 100.0, .threshold * 100.0)]
    LowDistanceExtraction { ratio: f64, threshold: f64 },
}

impl DatasetQualityWarning {
    pub fn check_name(&self) -> &'static str {
        match self {
            Self::DuplicatesPresent { .. } => "duplicates",
            Self::InsufficientMonthCoverage { .. } => "month_coverage",
            Self::LowStateExtraction { .. } => "state_extraction",
            Self::LowDistanceExtraction { .. } => "distance_extraction",
        }
    }
}

/// A later occurrence of a natural key, pointing at its canonical first occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateEntry {
    pub index: usize,
    pub canonical_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCheck {
    pub duplicates: Vec<DuplicateEntry>,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthCoverage {
    pub months_covered: usize,
    pub minimum: usize,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioCheck {
    pub matched: usize,
    pub total: usize,
    pub ratio: f64,
    pub threshold: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetChecks {
    pub duplicates: DuplicateCheck,
    pub month_coverage: MonthCoverage,
    pub state_extraction: RatioCheck,
    pub distance_extraction: RatioCheck,
}

impl DatasetChecks {
    pub fn run(events: &[Event], config: &QualityGateConfig) -> Self {
        let duplicates = find_duplicates(events);
        Self {
            duplicates: DuplicateCheck {
                passed: duplicates.is_empty(),
                duplicates,
            },
            month_coverage: month_coverage(events, config.min_months_covered),
            state_extraction: extraction_ratio(events, config.min_state_ratio, |e| &e.state),
            distance_extraction: extraction_ratio(events, config.min_distance_ratio, |e| {
                &e.distance
            }),
        }
    }

    pub fn passed(&self) -> bool {
        self.duplicates.passed
            && self.month_coverage.passed
            && self.state_extraction.passed
            && self.distance_extraction.passed
    }

    pub fn warnings(&self) -> Vec<DatasetQualityWarning> {
        let mut warnings = Vec::new();
        if !self.duplicates.passed {
            warnings.push(DatasetQualityWarning::DuplicatesPresent {
                count: self.duplicates.duplicates.len(),
            });
        }
        if !self.month_coverage.passed {
            warnings.push(DatasetQualityWarning::InsufficientMonthCoverage {
                covered: self.month_coverage.months_covered,
                minimum: self.month_coverage.minimum,
            });
        }
        if !self.state_extraction.passed {
            warnings.push(DatasetQualityWarning::LowStateExtraction {
                ratio: self.state_extraction.ratio,
                threshold: self.state_extraction.threshold,
            });
        }
        if !self.distance_extraction.passed {
            warnings.push(DatasetQualityWarning::LowDistanceExtraction {
                ratio: self.distance_extraction.ratio,
                threshold: self.distance_extraction.threshold,
            });
        }
        warnings
    }
}

/// Every occurrence of a `(name, date)` key after the first, in insertion order
pub fn find_duplicates(events: &[Event]) -> Vec<DuplicateEntry> {
    let mut first_seen: HashMap<(&str, &str), usize> = HashMap::new();
    let mut duplicates = Vec::new();
    for (index, event) in events.iter().enumerate() {
        match first_seen.get(&event.natural_key()) {
            Some(&canonical_index) => duplicates.push(DuplicateEntry {
                index,
                canonical_index,
            }),
            None => {
                first_seen.insert(event.natural_key(), index);
            }
        }
    }
    duplicates
}

/// Distinct `(year, month)` pairs across records whose date parses
pub fn month_coverage(events: &[Event], minimum: usize) -> MonthCoverage {
    let months: BTreeSet<(i32, u32)> = events
        .iter()
        .filter_map(Event::event_day)
        .map(|day| (day.year(), day.month()))
        .collect();
    MonthCoverage {
        months_covered: months.len(),
        minimum,
        passed: months.len() >= minimum,
    }
}

/// Share of records whose `field` is non-empty; an empty dataset fails
pub fn extraction_ratio<F>(events: &[Event], threshold: f64, field: F) -> RatioCheck
where
    F: Fn(&Event) -> &String,
{
    let total = events.len();
    let matched = events.iter().filter(|e| !field(e).is_empty()).count();
    let ratio = if total == 0 {
        0.0
    } else {
        matched as f64 / total as f64
    };
    RatioCheck {
        matched,
        total,
        ratio,
        threshold,
        passed: total > 0 && ratio >= threshold,
    }
}
