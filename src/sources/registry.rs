//! Registry for the configured source adapters.

use std::sync::Arc;

use super::{Source, SourceError};
use crate::config::Config;
use crate::models::SourceKind;

#[cfg(feature = "source-biorxiv")]
use super::BiorxivSource;
#[cfg(feature = "source-clinical-trials")]
use super::ClinicalTrialsSource;
#[cfg(feature = "source-pubmed")]
use super::PubMedSource;

/// Registry for all available source adapters
///
/// Built once at startup and handed to the tool registry; never mutated
/// while requests are served.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn Source>>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every adapter that is compiled in and enabled in `config`
    #[allow(unused_mut, unused_variables)]
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        let mut registry = Self::new();
        let retry = config.retry.to_retry_config();

        #[cfg(feature = "source-pubmed")]
        if config.sources.pubmed.enabled {
            registry.register(Arc::new(PubMedSource::new(&config.sources.pubmed, retry)?));
        }

        #[cfg(feature = "source-clinical-trials")]
        if config.sources.clinical_trials.enabled {
            registry.register(Arc::new(ClinicalTrialsSource::new(
                &config.sources.clinical_trials,
                retry,
            )?));
        }

        #[cfg(feature = "source-biorxiv")]
        if config.sources.biorxiv.enabled {
            registry.register(Arc::new(BiorxivSource::new(&config.sources.biorxiv, retry)?));
        }

        if registry.is_empty() {
            tracing::warn!("No sources enabled");
        }

        Ok(registry)
    }

    /// Register a new source
    pub fn register(&mut self, source: Arc<dyn Source>) {
        tracing::debug!("Registering source {}", source.name());
        self.sources.push(source);
    }

    /// Get a source by kind
    pub fn get(&self, kind: SourceKind) -> Option<&Arc<dyn Source>> {
        self.sources.iter().find(|source| source.kind() == kind)
    }

    /// Get all registered sources, in registration order
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
