use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use std::sync::LazyLock;
use tracing::{debug, info, instrument, warn};

use crate::app::ports::HttpClientPort;
use crate::common::error::{Result, ScraperError};
use crate::domain::RawFragment;

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

static ROW_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})\s+([A-Za-z]{3,9})\s*-\s*(.+)$").expect("valid row pattern")
});

static NAME_LOCATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)\s*\(([^()]+)\)\s*(?:⭐\s*)*$").expect("valid name pattern")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Current `MONTH YEAR` section while walking the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MonthHeader {
    month: u32,
    year: i32,
}

/// Race calendar blog page: month headers in `<b><u><span>`, one `<div>` per event
pub struct BlogPageSource {
    http: Arc<dyn HttpClientPort>,
}

impl BlogPageSource {
    pub fn new(http: Arc<dyn HttpClientPort>) -> Self {
        Self { http }
    }

    #[instrument(skip(self))]
    pub async fn fetch_fragments(&self, url: &str) -> Result<Vec<RawFragment>> {
        info!("🌐 Fetching race calendar from {}", url);
        let response = self
            .http
            .get(url)
            .await
            .map_err(|message| ScraperError::Api { message })?;
        if !(200..300).contains(&response.status) {
            return Err(ScraperError::Api {
                message: format!("GET {} returned HTTP {}", url, response.status),
            });
        }
        let body = String::from_utf8_lossy(&response.bytes);
        debug!(
            "Fetched {} bytes ({})",
            response.bytes.len(),
            response.content_type
        );
        Ok(Self::parse_fragments(&body))
    }

    /// Walk `<b>` and `<div>` elements in document order and collect event rows
    pub fn parse_fragments(html: &str) -> Vec<RawFragment> {
        let document = Html::parse_document(html);
        let (Ok(blocks), Ok(header_span), Ok(link)) = (
            Selector::parse("b, div"),
            Selector::parse("u span"),
            Selector::parse("a"),
        ) else {
            return Vec::new();
        };

        let mut fragments = Vec::new();
        let mut current: Option<MonthHeader> = None;

        for element in document.select(&blocks) {
            match element.value().name() {
                "b" => {
                    if let Some(span) = element.select(&header_span).next() {
                        let text = collapsed_text(&span);
                        match parse_month_header(&text) {
                            Some(header) => {
                                info!("📅 Found month header: {}", text);
                                current = Some(header);
                            }
                            None => debug!("Ignoring bold text that is not a month header: {}", text),
                        }
                    }
                }
                "div" => {
                    let Some(header) = current else {
                        continue;
                    };
                    if let Some(fragment) = parse_row(&element, &link, header) {
                        fragments.push(fragment);
                    }
                }
                _ => {}
            }
        }

        info!("Found {} event rows", fragments.len());
        fragments
    }
}

fn collapsed_text(element: &ElementRef) -> String {
    let text: String = element.text().collect();
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

fn month_number(token: &str) -> Option<u32> {
    let prefix: String = token.chars().take(3).collect::<String>().to_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == prefix)
        .map(|i| i as u32 + 1)
}

/// `NOV 2026` or `November 2026`
fn parse_month_header(text: &str) -> Option<MonthHeader> {
    let mut parts = text.split_whitespace();
    let (Some(month), Some(year), None) = (parts.next(), parts.next(), parts.next()) else {
        return None;
    };
    if year.len() != 4 {
        return None;
    }
    Some(MonthHeader {
        month: month_number(month)?,
        year: year.parse().ok()?,
    })
}

/// `DD Mon - <a href>Event Name (Location) ⭐</a>`
fn parse_row(element: &ElementRef, link: &Selector, header: MonthHeader) -> Option<RawFragment> {
    let text = collapsed_text(element);
    let captures = ROW_PATTERN.captures(&text)?;
    let anchor = element.select(link).next()?;

    let day = &captures[1];
    let month = &captures[2];
    match month_number(month) {
        None => warn!("Unrecognized month '{}' in row: {}", month, text),
        Some(number) if number != header.month => {
            debug!("Row month '{}' differs from section header", month)
        }
        Some(_) => {}
    }
    // `Sept` and `November` both reduce to the abbreviation the date parser knows
    let month: String = month.chars().take(3).collect();

    let (name, location) = split_name_location(&collapsed_text(&anchor));
    let href = anchor.value().attr("href").map(|h| h.trim().to_string());

    Some(RawFragment {
        name: Some(name),
        location,
        date: Some(format!("{} {} {}", day, month, header.year)),
        description: None,
        link: href.filter(|h| !h.is_empty()),
    })
}

/// Split `Event Name (Location) ⭐` on the trailing parenthesised group
pub fn split_name_location(text: &str) -> (String, Option<String>) {
    match NAME_LOCATION_PATTERN.captures(text) {
        Some(captures) => (
            captures[1].trim().to_string(),
            Some(captures[2].trim().to_string()),
        ),
        None => (text.trim_end_matches('⭐').trim().to_string(), None),
    }
}
