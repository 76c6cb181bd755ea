use chrono::NaiveDate;
use race_scraper::apis::blog_page::BlogPageSource;
use race_scraper::config::PipelineConfig;
use race_scraper::infra::http_client::ReqwestHttp;
use race_scraper::pipeline::processing::quality_gate::QualityDecision;
use race_scraper::pipeline::{Pipeline, ProcessedRun};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RACE_PAGE: &str = include_str!("fixtures/race_page.html");

fn process(html: &str) -> ProcessedRun {
    let fragments = BlogPageSource::parse_fragments(html);
    Pipeline::from_config_at(
        &PipelineConfig::default(),
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
    )
    .unwrap()
    .process(&fragments)
}

#[test]
fn test_fixture_page_yields_normalized_events() {
    let run = process(RACE_PAGE);
    let events = run.events();
    assert_eq!(events.len(), 4);
    assert!(run.skipped.is_empty());
    assert!(run.unparsed_dates.is_empty());

    assert_eq!(events[0].name, "Kota Belud Half Marathon");
    assert_eq!(events[0].location, "Kota Belud, Sabah");
    assert_eq!(events[0].state, "Sabah");
    assert_eq!(events[0].distance, "21km");
    assert_eq!(events[0].date, "2026-11-08");
    assert_eq!(
        events[0].registration_url,
        "https://checkpointspot.asia/event/test1"
    );

    // No comma in the location, so no state
    assert_eq!(events[1].state, "");
    assert_eq!(events[1].distance, "42km");

    assert_eq!(events[2].state, "Pahang");
    assert_eq!(events[2].distance, "50km+");
    assert_eq!(events[2].date, "2026-10-24");

    assert_eq!(events[3].name, "Kuala Lumpur Marathon - 42KM");
    assert_eq!(events[3].distance, "42km");
    assert_eq!(events[3].date, "2026-10-04");
}

#[test]
fn test_fixture_page_quality_report() {
    let run = process(RACE_PAGE);
    let report = run.validated.report();

    assert_eq!(report.total_events, 4);
    assert_eq!(report.invalid_events, 0);
    assert!(report
        .records
        .iter()
        .all(|r| r.decision != QualityDecision::Reject));
    assert_eq!(report.duplicates(), 0);
    assert_eq!(report.checks.month_coverage.months_covered, 2);
    assert_eq!(report.checks.state_extraction.ratio, 0.5);
    assert_eq!(report.checks.distance_extraction.ratio, 1.0);

    let failed: Vec<&str> = report
        .dataset_warnings()
        .iter()
        .map(|w| w.check_name())
        .collect();
    assert_eq!(failed, vec!["month_coverage", "state_extraction"]);
    assert_eq!(run.validated.sync_payload().len(), 4);
}

#[test]
fn test_past_events_are_kept_but_not_synced() {
    let fragments = BlogPageSource::parse_fragments(RACE_PAGE);
    let run = Pipeline::from_config_at(
        &PipelineConfig::default(),
        NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
    )
    .unwrap()
    .process(&fragments);

    assert_eq!(run.events().len(), 4);
    assert_eq!(run.validated.report().invalid_events, 2);
    let synced: Vec<String> = run
        .validated
        .sync_payload()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(
        synced,
        vec!["Kota Belud Half Marathon", "Penang Bridge Marathon"]
    );
}

#[test]
fn test_duplicate_rows_flag_later_occurrence() {
    let html = r#"
        <b><u><span>DEC 2026</span></u></b>
        <div>06 Dec - <a href="https://example.com/a">Ipoh 10K Run (Ipoh, Perak)</a></div>
        <div>06 Dec - <a href="https://example.com/b">Ipoh 10K Run (Ipoh, Perak)</a></div>
    "#;
    let run = process(html);
    let records = &run.validated.report().records;
    assert!(!records[0].is_duplicate());
    assert!(records[1].is_duplicate());
    assert_eq!(run.validated.report().duplicates(), 1);
}

#[test]
fn test_page_without_headers_extracts_nothing() {
    let run = process("<div>08 Nov - <a href=\"https://example.com\">Orphan Run (Ipoh, Perak)</a></div>");
    assert!(run.is_empty());
    assert!(!run.validated.report().dataset_passed());
}

#[tokio::test]
async fn test_fetch_fragments_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/running-event-2026.html"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(RACE_PAGE, "text/html; charset=utf-8"))
        .mount(&server)
        .await;

    let source = BlogPageSource::new(Arc::new(ReqwestHttp::new().unwrap()));
    let url = format!("{}/p/running-event-2026.html", server.uri());
    let fragments = source.fetch_fragments(&url).await.expect("fetch ok");
    assert_eq!(fragments.len(), 4);
    assert_eq!(fragments[3].date.as_deref(), Some("04 Oct 2026"));
}

#[tokio::test]
async fn test_fetch_fragments_fails_on_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = BlogPageSource::new(Arc::new(ReqwestHttp::new().unwrap()));
    let result = source
        .fetch_fragments(&format!("{}/missing", server.uri()))
        .await;
    assert!(result.is_err());
}
