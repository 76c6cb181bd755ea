//! Domain data shapes shared across the pipeline stages.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// One raw, unstructured listing item as handed over by the page source.
///
/// Every field is optional; a fragment with no usable field at all is not an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFragment {
    pub name: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
}

impl RawFragment {
    /// True when no field carries any non-whitespace text
    pub fn is_blank(&self) -> bool {
        [&self.name, &self.location, &self.date, &self.description, &self.link]
            .iter()
            .all(|field| field.as_deref().map_or(true, |s| s.trim().is_empty()))
    }
}

/// A running event record.
///
/// `state` and `distance` are derived by the normalizer and are empty until then.
/// `date` holds `YYYY-MM-DD` when extraction could normalize it, otherwise the raw
/// text is kept so the quality gate can report it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub distance: String,
    pub date: String,
    #[serde(default)]
    pub description: String,
    pub registration_url: String,
}

impl Event {
    /// The event day, if `date` is a valid ISO 8601 calendar date
    pub fn event_day(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, ISO_DATE_FORMAT).ok()
    }

    /// The `(name, date)` natural key used for duplicate detection and server-side upsert
    pub fn natural_key(&self) -> (&str, &str) {
        (&self.name, &self.date)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) - {}", self.name, self.date, self.location)
    }
}

/// Ordered collection of events for one run; insertion order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    events: Vec<Event>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub(crate) fn events_mut(&mut self) -> &mut [Event] {
        &mut self.events
    }
}

impl From<Vec<Event>> for Dataset {
    fn from(events: Vec<Event>) -> Self {
        Self { events }
    }
}

impl FromIterator<Event> for Dataset {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
