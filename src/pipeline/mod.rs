// Race pipeline: extract -> normalize -> validate, then local export and sync

pub mod processing;
pub mod sync;

use chrono::NaiveDate;
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::common::error::Result;
use crate::config::PipelineConfig;
use crate::domain::{Event, RawFragment};
use crate::infra::file_exporter::{ExportPaths, FileExporter};
use crate::observability::metrics;
use processing::extract::{Extractor, ParseError};
use processing::normalize::{FieldNormalizer, NormalizationStats};
use processing::quality_gate::{DefaultQualityGate, QualityGate, ValidatedDataset};
use sync::{SyncClient, SyncReport};

/// Result of the per-run processing stages, read-only from here on
#[derive(Debug, Clone)]
pub struct ProcessedRun {
    pub validated: ValidatedDataset,
    pub skipped: Vec<ParseError>,
    /// Indices of events whose date text could not be normalized
    pub unparsed_dates: Vec<usize>,
    pub normalization: NormalizationStats,
}

impl ProcessedRun {
    pub fn events(&self) -> &[Event] {
        self.validated.events()
    }

    pub fn is_empty(&self) -> bool {
        self.validated.events().is_empty()
    }
}

pub struct Pipeline {
    extractor: Extractor,
    normalizer: FieldNormalizer,
    quality_gate: Box<dyn QualityGate + Send + Sync>,
}

impl Pipeline {
    pub fn new(
        extractor: Extractor,
        normalizer: FieldNormalizer,
        quality_gate: Box<dyn QualityGate + Send + Sync>,
    ) -> Self {
        Self {
            extractor,
            normalizer,
            quality_gate,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let gate = DefaultQualityGate::with_config(config.validation.clone())
            .with_canonical_values(&config.rules);
        Ok(Self::new(
            Extractor::new(),
            FieldNormalizer::from_rules(&config.rules)?,
            Box::new(gate),
        ))
    }

    /// Same as `from_config` with "today" pinned for the date-range checks
    pub fn from_config_at(config: &PipelineConfig, today: NaiveDate) -> Result<Self> {
        let gate = DefaultQualityGate::with_config(config.validation.clone())
            .with_canonical_values(&config.rules)
            .with_reference_date(today);
        Ok(Self::new(
            Extractor::new(),
            FieldNormalizer::from_rules(&config.rules)?,
            Box::new(gate),
        ))
    }

    #[instrument(skip_all, fields(fragments = fragments.len()))]
    pub fn process(&self, fragments: &[RawFragment]) -> ProcessedRun {
        info!("🔍 Processing {} fragments", fragments.len());

        let extraction = self.extractor.extract(fragments);
        metrics::extraction::fragments_processed(
            extraction.events.len(),
            extraction.skipped.len(),
            extraction.unparsed_dates.len(),
        );

        let mut dataset = extraction.events;
        let normalization = self.normalizer.normalize_dataset(&mut dataset);
        metrics::normalize::fields_derived(
            normalization.states_derived,
            normalization.distances_derived,
        );

        // Every record is materialized before the dataset-level checks run
        let validated = self.quality_gate.assess(dataset);

        ProcessedRun {
            validated,
            skipped: extraction.skipped,
            unparsed_dates: extraction.unparsed_dates,
            normalization,
        }
    }

    /// Write local artifacts; done before sync and never undone by it
    pub fn export(&self, run: &ProcessedRun, output_dir: &Path) -> Result<ExportPaths> {
        FileExporter::new(output_dir).export(&run.validated)
    }

    /// Send the sync-eligible records; failing records stay local only
    pub async fn sync(&self, run: &ProcessedRun, client: &SyncClient) -> SyncReport {
        let payload = run.validated.sync_payload();
        let excluded = run.events().len() - payload.len();
        if excluded > 0 {
            warn!(
                "Excluding {} records with validation failures from sync",
                excluded
            );
        }
        client.sync(&payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(name: &str, location: &str, date: &str, link: &str) -> RawFragment {
        RawFragment {
            name: Some(name.to_string()),
            location: Some(location.to_string()),
            date: Some(date.to_string()),
            description: None,
            link: Some(link.to_string()),
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::from_config_at(
            &PipelineConfig::default(),
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_process_runs_all_stages() {
        let fragments = vec![
            fragment(
                "Kota Belud Half Marathon",
                "Kota Belud, Sabah",
                "08 Nov 2026",
                "https://checkpointspot.asia/event/test1",
            ),
            RawFragment::default(),
            fragment("AB", "Ipoh, Perak", "someday", "not a url"),
        ];
        let run = pipeline().process(&fragments);

        assert_eq!(run.events().len(), 2);
        assert_eq!(run.skipped, vec![ParseError::EmptyFragment { index: 1 }]);
        assert_eq!(run.unparsed_dates, vec![1]);

        let first = &run.events()[0];
        assert_eq!(first.state, "Sabah");
        assert_eq!(first.distance, "21km");
        assert_eq!(first.date, "2026-11-08");

        assert_eq!(run.validated.report().invalid_events, 1);
        assert_eq!(run.validated.sync_payload().len(), 1);
    }

    #[test]
    fn test_export_writes_all_records() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline();
        let run = pipeline.process(&[
            fragment(
                "Penang Bridge Marathon",
                "Batu Kawan, Penang",
                "15 Nov 2026",
                "https://example.com/pbm",
            ),
            fragment("AB", "", "", ""),
        ]);
        let paths = pipeline.export(&run, dir.path()).unwrap();
        let exported = crate::infra::file_exporter::load_json(&paths.json).unwrap();
        assert_eq!(exported.len(), 2);
        assert!(paths.csv.exists());
        assert!(paths.report.exists());
    }
}
