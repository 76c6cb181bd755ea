//! Metrics for the race scraper pipeline.
//!
//! Recording goes through the `metrics` facade; without an installed recorder the
//! calls are no-ops, so the library never requires an exporter.

use std::fmt;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Extraction metrics
    ExtractFragmentsProcessed,
    ExtractFragmentsSkipped,
    ExtractUnparsedDates,

    // Normalize metrics
    NormalizeStatesDerived,
    NormalizeDistancesDerived,

    // Quality Gate metrics
    QualityGateRecordsAccepted,
    QualityGateRecordsAcceptedWithWarnings,
    QualityGateRecordsRejected,
    QualityGateIssuesDetected,
    QualityGateDatasetWarnings,

    // Sync metrics
    SyncAttempts,
    SyncRetries,
    SyncChunksDelivered,
    SyncChunksFailed,
    SyncRecordsDelivered,
    SyncDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::ExtractFragmentsProcessed => "race_extract_fragments_processed_total",
            MetricName::ExtractFragmentsSkipped => "race_extract_fragments_skipped_total",
            MetricName::ExtractUnparsedDates => "race_extract_unparsed_dates_total",

            MetricName::NormalizeStatesDerived => "race_normalize_states_derived_total",
            MetricName::NormalizeDistancesDerived => "race_normalize_distances_derived_total",

            MetricName::QualityGateRecordsAccepted => "race_quality_gate_records_accepted_total",
            MetricName::QualityGateRecordsAcceptedWithWarnings => {
                "race_quality_gate_records_accepted_with_warnings_total"
            }
            MetricName::QualityGateRecordsRejected => "race_quality_gate_records_rejected_total",
            MetricName::QualityGateIssuesDetected => "race_quality_gate_issues_detected_total",
            MetricName::QualityGateDatasetWarnings => "race_quality_gate_dataset_warnings_total",

            MetricName::SyncAttempts => "race_sync_attempts_total",
            MetricName::SyncRetries => "race_sync_retries_total",
            MetricName::SyncChunksDelivered => "race_sync_chunks_delivered_total",
            MetricName::SyncChunksFailed => "race_sync_chunks_failed_total",
            MetricName::SyncRecordsDelivered => "race_sync_records_delivered_total",
            MetricName::SyncDuration => "race_sync_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub mod extraction {
    use super::MetricName;

    pub fn fragments_processed(extracted: usize, skipped: usize, unparsed_dates: usize) {
        ::metrics::counter!(MetricName::ExtractFragmentsProcessed.as_str())
            .increment(extracted as u64);
        ::metrics::counter!(MetricName::ExtractFragmentsSkipped.as_str()).increment(skipped as u64);
        ::metrics::counter!(MetricName::ExtractUnparsedDates.as_str())
            .increment(unparsed_dates as u64);
    }
}

pub mod normalize {
    use super::MetricName;

    pub fn fields_derived(states: usize, distances: usize) {
        ::metrics::counter!(MetricName::NormalizeStatesDerived.as_str()).increment(states as u64);
        ::metrics::counter!(MetricName::NormalizeDistancesDerived.as_str())
            .increment(distances as u64);
    }
}

pub mod quality_gate {
    use super::MetricName;

    pub fn record_accepted() {
        ::metrics::counter!(MetricName::QualityGateRecordsAccepted.as_str()).increment(1);
    }

    pub fn record_accepted_with_warnings() {
        ::metrics::counter!(MetricName::QualityGateRecordsAcceptedWithWarnings.as_str())
            .increment(1);
    }

    pub fn record_rejected() {
        ::metrics::counter!(MetricName::QualityGateRecordsRejected.as_str()).increment(1);
    }

    pub fn issue_detected(issue_type: &str, severity: &str) {
        ::metrics::counter!(
            MetricName::QualityGateIssuesDetected.as_str(),
            "issue_type" => issue_type.to_string(),
            "severity" => severity.to_string()
        )
        .increment(1);
    }

    pub fn dataset_warning(check: &'static str) {
        ::metrics::counter!(MetricName::QualityGateDatasetWarnings.as_str(), "check" => check)
            .increment(1);
    }
}

pub mod sync {
    use super::MetricName;

    pub fn attempt_made() {
        ::metrics::counter!(MetricName::SyncAttempts.as_str()).increment(1);
    }

    pub fn retry_scheduled() {
        ::metrics::counter!(MetricName::SyncRetries.as_str()).increment(1);
    }

    pub fn chunk_delivered(records: usize) {
        ::metrics::counter!(MetricName::SyncChunksDelivered.as_str()).increment(1);
        ::metrics::counter!(MetricName::SyncRecordsDelivered.as_str()).increment(records as u64);
    }

    pub fn chunk_failed(reason: &'static str) {
        ::metrics::counter!(MetricName::SyncChunksFailed.as_str(), "reason" => reason)
            .increment(1);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::SyncDuration.as_str()).record(secs);
    }
}
