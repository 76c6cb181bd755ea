use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::common::constants::{API_KEY_ENV, API_URL_ENV, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use crate::common::error::{Result, ScraperError};
use crate::pipeline::processing::normalize::RuleTables;
use crate::pipeline::processing::quality_gate::QualityGateConfig;
use crate::pipeline::sync::SyncConfig;

/// Everything a run needs besides credentials. Missing sections fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub rules: RuleTables,
    pub validation: QualityGateConfig,
    pub sync: SyncConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("⚙️ Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Read `path`, or `$RACE_SCRAPER_CONFIG`, or `config.toml`; defaults when the file is absent
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let from_env = env::var(CONFIG_PATH_ENV).ok();
        let resolved = path
            .map(Path::to_path_buf)
            .or_else(|| from_env.map(Into::into))
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());

        if resolved.exists() {
            Self::load(&resolved)
        } else if path.is_some() {
            Err(ScraperError::Config(format!(
                "Config file '{}' does not exist",
                resolved.display()
            )))
        } else {
            debug!(
                "No config file at {}, using built-in defaults",
                resolved.display()
            );
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rules.states.is_empty() {
            return Err(ScraperError::Config(
                "rules.states must not be empty".to_string(),
            ));
        }
        // Compiling surfaces bad patterns at load time rather than mid-run
        self.rules.compile_distance_rules()?;
        for (name, ratio) in [
            ("validation.min_state_ratio", self.validation.min_state_ratio),
            ("validation.min_distance_ratio", self.validation.min_distance_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ScraperError::Config(format!(
                    "{} must be between 0 and 1, got {}",
                    name, ratio
                )));
            }
        }
        self.sync.validate()
    }
}

/// Sync endpoint and key, taken from the environment
#[derive(Clone)]
pub struct ApiCredentials {
    pub api_url: String,
    pub api_key: String,
}

impl ApiCredentials {
    /// `None` when either variable is unset or blank
    pub fn from_env() -> Option<Self> {
        let api_url = env::var(API_URL_ENV).ok().filter(|v| !v.trim().is_empty())?;
        let api_key = env::var(API_KEY_ENV).ok().filter(|v| !v.trim().is_empty())?;
        Some(Self { api_url, api_key })
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_url", &self.api_url)
            .field("api_key", &"***")
            .finish()
    }
}
