//! Input validation for source identifiers, dates and base URLs.
//!
//! Identifiers end up in upstream URL paths, so they are checked before any
//! request is built.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;

/// Validation error types
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Invalid PubMed ID: {0}")]
    InvalidPmid(String),

    #[error("Invalid NCT ID: {0}")]
    InvalidNctId(String),

    #[error("Invalid DOI format: {0}")]
    InvalidDoi(String),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

fn nct_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^NCT\d{8}$").expect("valid NCT regex"))
}

/// Validate a PubMed identifier (digits only)
pub fn validate_pmid(pmid: &str) -> Result<String, ValidationError> {
    let pmid = pmid.trim();
    let pmid = pmid.strip_prefix("PMID:").unwrap_or(pmid).trim();

    if pmid.is_empty() || !pmid.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidPmid(pmid.to_string()));
    }

    Ok(pmid.to_string())
}

/// Validate a ClinicalTrials.gov identifier, normalized to upper case
pub fn validate_nct_id(nct_id: &str) -> Result<String, ValidationError> {
    let nct_id = nct_id.trim().to_uppercase();

    if !nct_pattern().is_match(&nct_id) {
        return Err(ValidationError::InvalidNctId(nct_id));
    }

    Ok(nct_id)
}

/// Validate and sanitize a DOI
///
/// DOIs have the format "10.xxxx/xxxxxx" where xxxx is a registrant code
/// and xxxxxx is an item ID.
pub fn validate_doi(doi: &str) -> Result<String, ValidationError> {
    let doi = doi.trim().to_lowercase();

    if doi.is_empty() {
        return Err(ValidationError::InvalidDoi("empty DOI".to_string()));
    }

    // Remove any URL prefix if present first
    let doi = doi.strip_prefix("doi:").unwrap_or(&doi);
    let doi = doi.strip_prefix("https://doi.org/").unwrap_or(doi);
    let doi = doi.strip_prefix("http://doi.org/").unwrap_or(doi);

    if !doi.starts_with("10.") {
        return Err(ValidationError::InvalidDoi(
            "DOI must start with '10.'".to_string(),
        ));
    }

    if !doi.contains('/') {
        return Err(ValidationError::InvalidDoi(
            "DOI must contain a slash".to_string(),
        ));
    }

    if doi.contains("..") || doi.chars().any(|c| c.is_whitespace() || c == '?' || c == '#') {
        return Err(ValidationError::InvalidDoi(doi.to_string()));
    }

    Ok(doi.to_string())
}

/// Validate a calendar date in YYYY-MM-DD form
pub fn validate_date(date: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(date.to_string()))
}

/// Validate an upstream base URL (http or https only)
pub fn validate_base_url(url: &str) -> Result<url::Url, ValidationError> {
    let parsed = url::Url::parse(url.trim()).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(ValidationError::InvalidUrl(format!(
            "invalid scheme: {}",
            scheme
        ))),
    }
}
