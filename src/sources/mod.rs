//! Source adapters with a shared trait-based architecture.
//!
//! This module defines the [`Source`] trait that every data-source adapter
//! implements. An adapter owns one pooled HTTP client, translates tool
//! arguments into the upstream API's request shape and parses the response
//! into [`Record`](crate::models::Record)s. New sources can be added by
//! implementing this trait and registering them with the [`SourceRegistry`];
//! the dispatcher never needs to change.
//!
//! # Feature Flags
//!
//! Individual sources can be disabled at compile time using Cargo features:
//!
//! - `pubmed` - Enable PubMed source (default: enabled)
//! - `clinicaltrials` - Enable ClinicalTrials.gov source (default: enabled)
//! - `biorxiv` - Enable bioRxiv/medRxiv source (default: enabled)
//!
//! # Feature Groups
//!
//! - `literature` - pubmed, biorxiv
//! - `full` - All sources (default)

#[cfg(feature = "source-biorxiv")]
mod biorxiv;
#[cfg(feature = "source-clinical-trials")]
mod clinical_trials;
#[cfg(feature = "source-pubmed")]
mod pubmed;
mod registry;

pub mod mock;

#[cfg(feature = "source-biorxiv")]
pub use biorxiv::BiorxivSource;
#[cfg(feature = "source-clinical-trials")]
pub use clinical_trials::ClinicalTrialsSource;
pub use mock::MockSource;
#[cfg(feature = "source-pubmed")]
pub use pubmed::PubMedSource;
pub use registry::SourceRegistry;

use std::sync::Arc;
use std::time::Duration;

use crate::mcp::Tool;
use crate::models::SourceKind;
use crate::utils::ValidationError;

/// The Source trait defines the interface for all data-source adapters.
///
/// # Implementing a New Source
///
/// 1. Create a struct holding its own [`HttpClient`](crate::utils::HttpClient)
/// 2. Implement `kind`, `max_results` and `tools`
/// 3. Add the source to [`SourceRegistry::from_config`] or register it manually
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Which source this adapter talks to
    fn kind(&self) -> SourceKind;

    /// Human-readable name of this source
    fn name(&self) -> &str {
        self.kind().name()
    }

    /// Upper bound on records returned by one call; larger limits are clamped
    fn max_results(&self) -> usize;

    /// The tools this adapter exposes, bound to this adapter instance
    fn tools(self: Arc<Self>) -> Vec<Tool>;
}

/// Clamp a caller-supplied limit to the source maximum
pub fn clamp_limit(requested: usize, max: usize, source: SourceKind) -> usize {
    if requested > max {
        tracing::debug!(
            "{} limit {} exceeds maximum, clamping to {}",
            source,
            requested,
            max
        );
    }
    requested.min(max)
}

/// Errors that can occur when interacting with a source
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    /// Network failure, connection refused, timeout or upstream 5xx
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// HTTP 429 or source-specific throttle signal
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Response could not be parsed into the expected schema
    #[error("Malformed upstream response: {0}")]
    Malformed(String),

    /// No matching record
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request parameters the adapter or upstream refuses
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl SourceError {
    /// Rate limit error with an optional retry-after hint
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        SourceError::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    /// Retry-after hint in whole seconds (rounded up), if any
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            SourceError::RateLimited {
                retry_after: Some(delay),
                ..
            } => {
                let secs = delay.as_secs();
                Some(if delay.subsec_nanos() > 0 { secs + 1 } else { secs })
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Malformed(err.to_string())
        } else {
            SourceError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Malformed(format!("JSON: {}", err))
    }
}

impl From<quick_xml::DeError> for SourceError {
    fn from(err: quick_xml::DeError) -> Self {
        SourceError::Malformed(format!("XML: {}", err))
    }
}

impl From<ValidationError> for SourceError {
    fn from(err: ValidationError) -> Self {
        SourceError::InvalidRequest(err.to_string())
    }
}
