//! Configuration file discovery and loading.
//!
//! Sources are layered in this order, later ones winning:
//!
//! 1. Built-in defaults
//! 2. A TOML file: `--config PATH`, else `./biomed-mcp.toml`, else
//!    `<config dir>/biomed-mcp/config.toml`
//! 3. `BIOMED_MCP__*` environment variables (`__` separates nesting levels)
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! request_timeout_secs = 90
//!
//! [dispatcher]
//! timeout_secs = 60
//!
//! [retry]
//! backoff_floor_ms = 1000
//! max_wait_secs = 10
//!
//! [sources.pubmed]
//! api_key = "your-ncbi-key"
//! email = "you@example.org"
//!
//! [sources.clinical_trials]
//! max_results = 1000
//!
//! [sources.biorxiv]
//! search_window_days = 30
//! max_scan_pages = 5
//! ```

use std::path::{Path, PathBuf};

use super::{Config, ConfigError};

/// File name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "biomed-mcp.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "BIOMED_MCP";

/// Locate the configuration file, if any
///
/// An explicit path is returned as-is (and must exist when loaded).
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join(env!("CARGO_PKG_NAME")).join("config.toml"))
        .filter(|path| path.is_file())
}

/// Load and validate the configuration
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = find_config_file(explicit) {
        tracing::debug!("Loading configuration from {}", path.display());
        builder = builder.add_source(config::File::from(path.as_path()).required(true));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let mut config: Config = settings.try_deserialize()?;
    apply_ncbi_env(&mut config);
    config.validate()?;

    Ok(config)
}

/// Fill PubMed identification from the conventional NCBI variables
fn apply_ncbi_env(config: &mut Config) {
    let pubmed = &mut config.sources.pubmed;

    if pubmed.api_key.is_none() {
        pubmed.api_key = std::env::var("NCBI_API_KEY").ok().filter(|v| !v.is_empty());
    }
    if pubmed.email.is_none() {
        pubmed.email = std::env::var("NCBI_EMAIL").ok().filter(|v| !v.is_empty());
    }
}
