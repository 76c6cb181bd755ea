use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::common::error::{Result, ScraperError};

/// Rule tables as they appear in configuration: an ordered canonical state list and an
/// ordered list of distance patterns. Order matters for distance rules (first match wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleTables {
    pub states: Vec<String>,
    pub distance_rules: Vec<DistanceRuleSpec>,
}

/// One `(pattern, canonical label)` entry of the distance table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceRuleSpec {
    pub pattern: String,
    pub label: String,
}

impl DistanceRuleSpec {
    pub fn new(pattern: &str, label: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            label: label.to_string(),
        }
    }
}

impl RuleTables {
    /// Malaysian states and federal territories, plus the distance table used by the
    /// race-calendar page. Explicit numeric tokens come before keywords.
    pub fn malaysia() -> Self {
        let states = [
            "Johor",
            "Kedah",
            "Kelantan",
            "Melaka",
            "Negeri Sembilan",
            "Pahang",
            "Penang",
            "Perak",
            "Perlis",
            "Sabah",
            "Sarawak",
            "Selangor",
            "Terengganu",
            "Kuala Lumpur",
            "Labuan",
            "Putrajaya",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let distance_rules = vec![
            DistanceRuleSpec::new(r"\b42(?:\.195|\.2)?\s?KM?\b", "42km"),
            DistanceRuleSpec::new(r"\b21(?:\.0975|\.1)?\s?KM?\b", "21km"),
            DistanceRuleSpec::new(r"\b100\s?KM?\b", "100km"),
            DistanceRuleSpec::new(r"\b50\s?KM?\b", "50km"),
            DistanceRuleSpec::new(r"\b10\s?KM?\b", "10km"),
            DistanceRuleSpec::new(r"\b5\s?KM?\b", "5km"),
            DistanceRuleSpec::new(r"\bHalf\s+Marathon\b|\bHM\b", "21km"),
            DistanceRuleSpec::new(r"\bUltra\b", "50km+"),
            DistanceRuleSpec::new(r"\bMarathon\b", "42km"),
        ];

        Self {
            states,
            distance_rules,
        }
    }

    pub fn state_table(&self) -> StateTable {
        StateTable::new(self.states.iter().cloned())
    }

    pub fn compile_distance_rules(&self) -> Result<DistanceRules> {
        DistanceRules::compile(&self.distance_rules)
    }

    /// Distinct canonical distance labels, in table order of first appearance
    pub fn distance_labels(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.distance_rules
            .iter()
            .filter(|rule| seen.insert(rule.label.as_str()))
            .map(|rule| rule.label.clone())
            .collect()
    }
}

impl Default for RuleTables {
    fn default() -> Self {
        Self::malaysia()
    }
}

/// Ordered canonical state list with case-insensitive lookup
#[derive(Debug, Clone)]
pub struct StateTable {
    entries: Vec<(String, String)>,
}

impl StateTable {
    pub fn new<I, S>(states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = states
            .into_iter()
            .map(Into::into)
            .map(|canonical: String| (canonical.to_lowercase(), canonical))
            .collect();
        Self { entries }
    }

    /// Canonical form of `candidate` if it matches an entry exactly (ignoring case)
    pub fn lookup(&self, candidate: &str) -> Option<&str> {
        let key = candidate.trim().to_lowercase();
        self.entries
            .iter()
            .find(|(lower, _)| *lower == key)
            .map(|(_, canonical)| canonical.as_str())
    }

    pub fn contains(&self, value: &str) -> bool {
        self.entries.iter().any(|(_, canonical)| canonical == value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A compiled distance rule
#[derive(Debug, Clone)]
pub struct DistanceRule {
    regex: Regex,
    label: String,
}

impl DistanceRule {
    pub fn new(pattern: &str, label: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                ScraperError::Config(format!("Invalid distance pattern '{}': {}", pattern, e))
            })?;
        if label.trim().is_empty() {
            return Err(ScraperError::Config(format!(
                "Distance pattern '{}' has an empty label",
                pattern
            )));
        }
        Ok(Self {
            regex,
            label: label.to_string(),
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Priority-ordered distance rules; the first rule that matches decides the label
#[derive(Debug, Clone)]
pub struct DistanceRules {
    rules: Vec<DistanceRule>,
}

impl DistanceRules {
    pub fn compile(specs: &[DistanceRuleSpec]) -> Result<Self> {
        let rules = specs
            .iter()
            .map(|spec| DistanceRule::new(&spec.pattern, &spec.label))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn first_match(&self, text: &str) -> Option<&DistanceRule> {
        self.rules.iter().find(|rule| rule.matches(text))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label_for(name: &str) -> Option<String> {
        RuleTables::malaysia()
            .compile_distance_rules()
            .unwrap()
            .first_match(name)
            .map(|rule| rule.label().to_string())
    }

    #[test]
    fn test_state_lookup_is_case_insensitive() {
        let table = RuleTables::malaysia().state_table();
        assert_eq!(table.lookup("sabah"), Some("Sabah"));
        assert_eq!(table.lookup("  KUALA LUMPUR "), Some("Kuala Lumpur"));
        assert_eq!(table.lookup("Jerantut"), None);
    }

    #[test]
    fn test_state_lookup_requires_exact_match() {
        let table = RuleTables::malaysia().state_table();
        assert_eq!(table.lookup("Sabah Malaysia"), None);
        assert_eq!(table.lookup("Kuala"), None);
    }

    #[test]
    fn test_numeric_tokens() {
        assert_eq!(label_for("Standard Chartered Marathon - 42KM").as_deref(), Some("42km"));
        assert_eq!(label_for("Night Run 21.1KM").as_deref(), Some("21km"));
        assert_eq!(label_for("City Run 10KM").as_deref(), Some("10km"));
        assert_eq!(label_for("5K Malaysia Speed").as_deref(), Some("5km"));
        assert_eq!(label_for("Trail 100K Challenge").as_deref(), Some("100km"));
    }

    #[test]
    fn test_numeric_token_beats_keyword() {
        assert_eq!(label_for("Ultra Trail 50KM").as_deref(), Some("50km"));
        assert_eq!(label_for("Half Marathon 42KM Relay").as_deref(), Some("42km"));
    }

    #[test]
    fn test_keyword_rules() {
        assert_eq!(label_for("Kota Belud Half Marathon").as_deref(), Some("21km"));
        assert_eq!(label_for("Penang HM 2026").as_deref(), Some("21km"));
        assert_eq!(label_for("Full Marathon").as_deref(), Some("42km"));
        assert_eq!(label_for("Malaysia Taman Negara Ultra").as_deref(), Some("50km+"));
    }

    #[test]
    fn test_competing_tokens_first_rule_wins() {
        assert_eq!(label_for("10K & Marathon Relay").as_deref(), Some("10km"));
    }

    #[test]
    fn test_years_are_not_distances() {
        assert_eq!(label_for("Run 2025 Edition"), None);
        assert_eq!(label_for("Trail Run Adventure"), None);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let specs = vec![DistanceRuleSpec::new(r"(unclosed", "5km")];
        let err = DistanceRules::compile(&specs).unwrap_err();
        assert!(matches!(err, ScraperError::Config(_)));
    }

    #[test]
    fn test_distance_labels_are_distinct() {
        let labels = RuleTables::malaysia().distance_labels();
        assert_eq!(
            labels,
            vec!["42km", "21km", "100km", "50km", "10km", "5km", "50km+"]
        );
    }
}
