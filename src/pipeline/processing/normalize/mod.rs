//! Field normalizer: derives `state` from `location` and `distance` from `name`
//! using injected rule tables.

pub mod rules;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::common::error::Result;
use crate::domain::{Dataset, Event};
pub use rules::{DistanceRule, DistanceRuleSpec, DistanceRules, RuleTables, StateTable};

/// Counts of derived fields after a normalization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NormalizationStats {
    pub total: usize,
    pub states_derived: usize,
    pub distances_derived: usize,
}

pub struct FieldNormalizer {
    states: StateTable,
    distances: DistanceRules,
}

impl FieldNormalizer {
    pub fn new(states: StateTable, distances: DistanceRules) -> Self {
        Self { states, distances }
    }

    /// Build a normalizer from configuration-supplied rule tables
    pub fn from_rules(rules: &RuleTables) -> Result<Self> {
        Ok(Self::new(rules.state_table(), rules.compile_distance_rules()?))
    }

    /// Canonical state named by the tail after the last comma of `location`, or empty.
    ///
    /// "Kota Belud, Sabah" -> "Sabah"; "Kuala Lumpur" (no comma) -> "".
    pub fn extract_state(&self, location: &str) -> String {
        let Some((_, tail)) = location.rsplit_once(',') else {
            return String::new();
        };
        match self.states.lookup(tail) {
            Some(canonical) => canonical.to_string(),
            None => {
                debug!("Could not extract state from location: {}", location);
                String::new()
            }
        }
    }

    /// Label of the first distance rule matching `name`, or empty
    pub fn extract_distance(&self, name: &str) -> String {
        match self.distances.first_match(name) {
            Some(rule) => {
                debug!("Extracted distance '{}' from name: {}", rule.label(), name);
                rule.label().to_string()
            }
            None => {
                debug!("Could not extract distance from name: {}", name);
                String::new()
            }
        }
    }

    /// Enrich one event in place
    pub fn normalize(&self, event: &mut Event) {
        event.state = self.extract_state(&event.location);
        event.distance = self.extract_distance(&event.name);
    }

    #[instrument(skip_all, fields(events = dataset.len()))]
    pub fn normalize_dataset(&self, dataset: &mut Dataset) -> NormalizationStats {
        let mut stats = NormalizationStats::default();
        for event in dataset.events_mut() {
            self.normalize(event);
            stats.total += 1;
            if !event.state.is_empty() {
                stats.states_derived += 1;
            }
            if !event.distance.is_empty() {
                stats.distances_derived += 1;
            }
        }
        info!(
            "✅ Normalized {} events ({} states, {} distances derived)",
            stats.total, stats.states_derived, stats.distances_derived
        );
        stats
    }
}
