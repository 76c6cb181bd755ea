use chrono::NaiveDate;
use race_scraper::apis::blog_page::BlogPageSource;
use race_scraper::common::constants::EVENT_FIELDS;
use race_scraper::config::PipelineConfig;
use race_scraper::domain::{Event, RawFragment};
use race_scraper::infra::file_exporter::{load_csv, load_json};
use race_scraper::pipeline::processing::quality_gate::QualityReport;
use race_scraper::pipeline::Pipeline;
use std::fs;

const RACE_PAGE: &str = include_str!("fixtures/race_page.html");

fn pipeline() -> Pipeline {
    Pipeline::from_config_at(
        &PipelineConfig::default(),
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
    )
    .unwrap()
}

#[test]
fn test_export_writes_json_csv_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("nested").join("out");
    let pipeline = pipeline();
    let run = pipeline.process(&BlogPageSource::parse_fragments(RACE_PAGE));

    let paths = pipeline.export(&run, &output).unwrap();

    let from_json = load_json(&paths.json).unwrap();
    assert_eq!(from_json, run.events());

    let csv = fs::read_to_string(&paths.csv).unwrap();
    assert_eq!(csv.lines().next().unwrap(), EVENT_FIELDS.join(","));
    assert_eq!(csv.lines().count(), 5);
    assert_eq!(load_csv(&paths.csv).unwrap(), run.events());

    let report: QualityReport =
        serde_json::from_str(&fs::read_to_string(&paths.report).unwrap()).unwrap();
    assert_eq!(report.total_events, 4);
    assert_eq!(report.records.len(), 4);
}

#[test]
fn test_json_objects_carry_every_csv_column() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline();
    let run = pipeline.process(&BlogPageSource::parse_fragments(RACE_PAGE));
    let paths = pipeline.export(&run, dir.path()).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&paths.json).unwrap()).unwrap();
    let first = json.as_array().unwrap()[0].as_object().unwrap();
    let mut keys: Vec<&str> = first.keys().map(String::as_str).collect();
    let mut expected = EVENT_FIELDS.to_vec();
    keys.sort_unstable();
    expected.sort_unstable();
    assert_eq!(keys, expected);
    assert!(first.values().all(|v| v.is_string()));
}

#[test]
fn test_failing_records_are_exported_with_reasons() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline();
    let run = pipeline.process(&[RawFragment {
        name: Some("XY".to_string()),
        location: Some("Kuching, Sarawak".to_string()),
        date: Some("sometime soon".to_string()),
        description: None,
        link: Some("ftp://example.com".to_string()),
    }]);
    let paths = pipeline.export(&run, dir.path()).unwrap();

    let exported: Vec<Event> = load_json(&paths.json).unwrap();
    assert_eq!(exported.len(), 1);
    assert_eq!(exported[0].date, "sometime soon");

    let report: QualityReport =
        serde_json::from_str(&fs::read_to_string(&paths.report).unwrap()).unwrap();
    assert_eq!(report.invalid_events, 1);
    assert_eq!(report.records[0].failure_reasons().len(), 3);
}

#[test]
fn test_empty_run_exports_header_only_csv() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline();
    let run = pipeline.process(&[]);
    let paths = pipeline.export(&run, dir.path()).unwrap();

    assert_eq!(
        fs::read_to_string(&paths.csv).unwrap().trim_end(),
        EVENT_FIELDS.join(",")
    );
    assert!(load_json(&paths.json).unwrap().is_empty());
}

#[test]
fn test_shipped_config_matches_defaults() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config.toml");
    let config = PipelineConfig::load(&path).unwrap();
    assert_eq!(config, PipelineConfig::default());
}
