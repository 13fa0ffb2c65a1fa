//! Normalized record returned by every source adapter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The data source that produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "bioRxiv")]
    BioRxiv,
    #[serde(rename = "ClinicalTrials")]
    ClinicalTrials,
    #[serde(rename = "PubMed")]
    PubMed,
}

impl SourceKind {
    /// Returns the display name of the source
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::BioRxiv => "bioRxiv",
            SourceKind::ClinicalTrials => "ClinicalTrials.gov",
            SourceKind::PubMed => "PubMed",
        }
    }

    /// Returns the source identifier (used as tool name prefix)
    pub fn id(&self) -> &'static str {
        match self {
            SourceKind::BioRxiv => "biorxiv",
            SourceKind::ClinicalTrials => "clinicaltrials",
            SourceKind::PubMed => "pubmed",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single result item in the uniform shape shared by all sources.
///
/// Records are built once by an adapter and never mutated afterwards; the
/// `raw` field carries whatever source-specific fields the adapter chose to
/// pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Source that produced this record
    pub source: SourceKind,

    /// Source-native identifier (PMID, NCT ID, DOI)
    pub id: String,

    /// Title
    pub title: String,

    /// Abstract or brief summary
    pub summary: String,

    /// Human-facing page URL
    pub url: String,

    /// Publication/posting date, ISO formatted when the source allows it
    #[serde(rename = "publishedDate", skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,

    /// Opaque passthrough of source-specific fields
    #[serde(default)]
    pub raw: Value,
}

/// Builder for constructing Record objects
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: Record,
    raw: Map<String, Value>,
}

impl RecordBuilder {
    /// Create a new builder with required fields
    pub fn new(
        source: SourceKind,
        id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            record: Record {
                source,
                id: id.into(),
                title: title.into(),
                summary: String::new(),
                url: url.into(),
                published_date: None,
                raw: Value::Null,
            },
            raw: Map::new(),
        }
    }

    /// Set summary
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.record.summary = summary.into();
        self
    }

    /// Set publication date; empty strings are ignored
    pub fn published_date(mut self, date: Option<String>) -> Self {
        self.record.published_date = date.filter(|d| !d.trim().is_empty());
        self
    }

    /// Add a single passthrough field
    pub fn raw_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.raw.insert(key.into(), value.into());
        self
    }

    /// Replace the passthrough payload with a complete upstream document
    pub fn raw(mut self, value: Value) -> Self {
        match value {
            Value::Object(map) => self.raw = map,
            other => {
                self.raw.insert("value".to_string(), other);
            }
        }
        self
    }

    /// Build the Record
    pub fn build(mut self) -> Record {
        self.record.raw = Value::Object(self.raw);
        self.record
    }
}
