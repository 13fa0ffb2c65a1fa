//! Configuration management.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. See [`load_config`] for the load order.

mod file_config;

pub use file_config::{find_config_file, load_config, CONFIG_FILE_NAME, ENV_PREFIX};

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::utils::{validate_base_url, RetryConfig};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server transport settings
    pub server: ServerConfig,

    /// Dispatcher settings
    pub dispatcher: DispatcherConfig,

    /// Rate-limit retry settings shared by all adapters
    pub retry: RetrySettings,

    /// Per-source settings
    pub sources: SourcesConfig,
}

/// Server transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Transport deadline for one request
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 90,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Overall bound on one invocation, including the adapter's retry
    pub timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl DispatcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Rate-limit retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Delay before the retry when the upstream sends no retry-after hint
    pub backoff_floor_ms: u64,
    /// Longest retry-after hint that is still honored
    pub max_wait_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            backoff_floor_ms: 1000,
            max_wait_secs: 10,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: 1,
            backoff_floor: Duration::from_millis(self.backoff_floor_ms),
            max_wait: Duration::from_secs(self.max_wait_secs),
        }
    }
}

/// Per-source configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub pubmed: PubMedConfig,
    pub clinical_trials: ClinicalTrialsConfig,
    pub biorxiv: BiorxivConfig,
}

/// PubMed (NCBI E-utilities) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubMedConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_results: usize,
    /// Defaults to 3 req/s, or 10 req/s when an API key is set
    pub requests_per_second: Option<u32>,
    pub api_key: Option<String>,
    pub email: Option<String>,
    /// Tool name sent to NCBI for identification
    pub tool: String,
}

impl Default for PubMedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            timeout_secs: 20,
            max_results: 200,
            requests_per_second: None,
            api_key: None,
            email: None,
            tool: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

impl PubMedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Effective outbound request rate
    pub fn rate_limit(&self) -> u32 {
        self.requests_per_second
            .unwrap_or(if self.api_key.is_some() { 10 } else { 3 })
    }
}

/// ClinicalTrials.gov (API v2) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicalTrialsConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_results: usize,
    pub requests_per_second: u32,
}

impl Default for ClinicalTrialsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://clinicaltrials.gov/api/v2".to_string(),
            timeout_secs: 20,
            max_results: 1000,
            requests_per_second: 5,
        }
    }
}

impl ClinicalTrialsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// bioRxiv/medRxiv configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiorxivConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_results: usize,
    pub requests_per_second: u32,
    /// Days scanned by keyword search when no date range is given
    pub search_window_days: u32,
    /// Upper bound on feed pages scanned by one keyword search
    pub max_scan_pages: u32,
}

impl Default for BiorxivConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.biorxiv.org".to_string(),
            timeout_secs: 20,
            max_results: 100,
            requests_per_second: 5,
            search_window_days: 30,
            max_scan_pages: 5,
        }
    }
}

impl BiorxivConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl Config {
    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pubmed = &self.sources.pubmed;
        let trials = &self.sources.clinical_trials;
        let biorxiv = &self.sources.biorxiv;

        let endpoints = [
            ("pubmed", &pubmed.base_url, pubmed.max_results, pubmed.rate_limit(), pubmed.timeout_secs),
            ("clinical_trials", &trials.base_url, trials.max_results, trials.requests_per_second, trials.timeout_secs),
            ("biorxiv", &biorxiv.base_url, biorxiv.max_results, biorxiv.requests_per_second, biorxiv.timeout_secs),
        ];

        for (name, base_url, max_results, rate, timeout_secs) in endpoints {
            validate_base_url(base_url)
                .map_err(|e| ConfigError::Invalid(format!("sources.{}.base_url: {}", name, e)))?;

            if max_results == 0 {
                return Err(ConfigError::Invalid(format!(
                    "sources.{}.max_results must be at least 1",
                    name
                )));
            }
            if rate == 0 {
                return Err(ConfigError::Invalid(format!(
                    "sources.{}.requests_per_second must be at least 1",
                    name
                )));
            }
            if timeout_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "sources.{}.timeout_secs must be at least 1",
                    name
                )));
            }

            let budget = timeout_secs + self.retry.max_wait_secs;
            if self.dispatcher.timeout_secs <= budget {
                return Err(ConfigError::Invalid(format!(
                    "dispatcher.timeout_secs ({}) must exceed sources.{}.timeout_secs plus retry.max_wait_secs ({})",
                    self.dispatcher.timeout_secs, name, budget
                )));
            }
        }

        if biorxiv.search_window_days == 0 || biorxiv.max_scan_pages == 0 {
            return Err(ConfigError::Invalid(
                "sources.biorxiv.search_window_days and max_scan_pages must be at least 1".to_string(),
            ));
        }

        if self.server.request_timeout_secs < self.dispatcher.timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "server.request_timeout_secs ({}) must be at least dispatcher.timeout_secs ({})",
                self.server.request_timeout_secs, self.dispatcher.timeout_secs
            )));
        }

        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
