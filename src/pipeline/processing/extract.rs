use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::domain::{Dataset, Event, RawFragment, ISO_DATE_FORMAT};

/// A fragment that cannot become even a minimal candidate event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("fragment {index} has no usable fields")]
    EmptyFragment { index: usize },
}

/// Candidate events plus the fragments that were skipped
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub events: Dataset,
    pub skipped: Vec<ParseError>,
    /// Indices (into `events`) whose date text could not be normalized
    pub unparsed_dates: Vec<usize>,
}

/// Turns raw fragments into candidate events with cleaned text and ISO dates.
/// `state` and `distance` are left empty for the normalizer.
pub struct Extractor {
    date_formats: Vec<&'static str>,
    whitespace: Regex,
    ordinal: Regex,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    pub fn new() -> Self {
        Self {
            date_formats: vec![
                ISO_DATE_FORMAT,   // "2026-11-08"
                "%d %b %Y",        // "08 Nov 2026"
                "%d %B %Y",        // "8 November 2026"
                "%b %d %Y",        // "Nov 8 2026"
                "%B %d %Y",        // "November 8 2026"
                "%A %d %B %Y",     // "Sunday 8 November 2026"
                "%a %d %b %Y",     // "Sun 8 Nov 2026"
                "%A %B %d %Y",     // "Sunday November 8 2026"
                "%d/%m/%Y",        // "08/11/2026"
                "%d-%m-%Y",        // "08-11-2026"
                "%d.%m.%Y",        // "08.11.2026"
                "%Y/%m/%d",        // "2026/11/08"
            ],
            whitespace: Regex::new(r"\s+").expect("static regex"),
            ordinal: Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").expect("static regex"),
        }
    }

    /// Trim and collapse internal runs of whitespace; case is preserved
    pub fn clean_text(&self, text: &str) -> String {
        self.whitespace.replace_all(text.trim(), " ").into_owned()
    }

    /// Normalize human-written date text to a calendar date
    pub fn normalize_date(&self, raw: &str) -> Option<NaiveDate> {
        let without_commas = raw.replace(',', " ");
        let without_ordinals = self.ordinal.replace_all(&without_commas, "$1");
        let cleaned = self.clean_text(&without_ordinals);
        if cleaned.is_empty() {
            return None;
        }
        self.date_formats
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(&cleaned, format).ok())
    }

    /// Extract a single fragment. A fragment without any usable field is a `ParseError`;
    /// anything else becomes an event, even when its date could not be normalized.
    pub fn extract_fragment(
        &self,
        index: usize,
        fragment: &RawFragment,
    ) -> Result<(Event, bool), ParseError> {
        if fragment.is_blank() {
            return Err(ParseError::EmptyFragment { index });
        }

        let clean = |field: &Option<String>| {
            field
                .as_deref()
                .map(|s| self.clean_text(s))
                .unwrap_or_default()
        };

        let raw_date = clean(&fragment.date);
        let (date, parsed) = match self.normalize_date(&raw_date) {
            Some(day) => (day.format(ISO_DATE_FORMAT).to_string(), true),
            None => {
                warn!("Failed to normalize date '{}' for fragment {}", raw_date, index);
                (raw_date, false)
            }
        };

        let event = Event {
            name: clean(&fragment.name),
            location: clean(&fragment.location),
            state: String::new(),
            distance: String::new(),
            date,
            description: clean(&fragment.description),
            registration_url: fragment
                .link
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
        };
        debug!("Extracted event: {}", event);
        Ok((event, parsed))
    }

    #[instrument(skip_all, fields(fragments = fragments.len()))]
    pub fn extract(&self, fragments: &[RawFragment]) -> ExtractionOutcome {
        let mut outcome = ExtractionOutcome::default();

        for (index, fragment) in fragments.iter().enumerate() {
            match self.extract_fragment(index, fragment) {
                Ok((event, parsed)) => {
                    if !parsed {
                        outcome.unparsed_dates.push(outcome.events.len());
                    }
                    outcome.events.push(event);
                }
                Err(e) => {
                    debug!("Skipping fragment: {}", e);
                    outcome.skipped.push(e);
                }
            }
        }

        info!(
            "Extraction complete. Found {} events, skipped {}, {} with unparsed dates",
            outcome.events.len(),
            outcome.skipped.len(),
            outcome.unparsed_dates.len()
        );
        outcome
    }
}
