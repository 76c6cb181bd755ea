use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::common::constants::{
    DEFAULT_CSV_OUTPUT, DEFAULT_JSON_OUTPUT, DEFAULT_REPORT_OUTPUT, EVENT_FIELDS,
};
use crate::common::error::Result;
use crate::domain::Event;
use crate::pipeline::processing::quality_gate::{QualityReport, ValidatedDataset};

/// Where one export run wrote its artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
    pub report: PathBuf,
}

/// Writes the local artifacts of a run into one directory
pub struct FileExporter {
    output_dir: PathBuf,
}

impl FileExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Every record is exported, failing ones included; the report carries the reasons
    pub fn export(&self, validated: &ValidatedDataset) -> Result<ExportPaths> {
        fs::create_dir_all(&self.output_dir)?;
        let paths = ExportPaths {
            json: self.output_dir.join(DEFAULT_JSON_OUTPUT),
            csv: self.output_dir.join(DEFAULT_CSV_OUTPUT),
            report: self.output_dir.join(DEFAULT_REPORT_OUTPUT),
        };
        save_json(validated.events(), &paths.json)?;
        save_csv(validated.events(), &paths.csv)?;
        save_report(validated.report(), &paths.report)?;
        Ok(paths)
    }
}

pub fn save_json(events: &[Event], path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, events)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    info!("💾 Saved {} events to {}", events.len(), path.display());
    Ok(())
}

pub fn save_csv(events: &[Event], path: &Path) -> Result<()> {
    // Header written explicitly so an empty export still carries it
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(EVENT_FIELDS)?;
    for event in events {
        writer.serialize(event)?;
    }
    writer.flush()?;
    info!("💾 Saved {} events to {}", events.len(), path.display());
    Ok(())
}

pub fn save_report(report: &QualityReport, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush()?;
    info!("📋 Saved quality report to {}", path.display());
    Ok(())
}

pub fn load_json(path: &Path) -> Result<Vec<Event>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn load_csv(path: &Path) -> Result<Vec<Event>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut events = Vec::new();
    for row in reader.deserialize() {
        events.push(row?);
    }
    Ok(events)
}
