//! Utility modules supporting the source adapters.
//!
//! - [`HttpClient`]: pooled HTTP client with per-adapter rate limiting
//! - [`RetryConfig`] / [`with_rate_limit_retry`]: one retry on upstream throttling
//! - [`validate_pmid`], [`validate_nct_id`], [`validate_doi`]: identifier checks
//!
//! # Retry on rate limiting
//!
//! ```rust,no_run
//! use biomed_mcp::sources::SourceError;
//! use biomed_mcp::utils::{with_rate_limit_retry, RetryConfig};
//!
//! # async fn fetch_data() -> Result<String, SourceError> { Ok("data".to_string()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), SourceError> {
//! let data = with_rate_limit_retry(RetryConfig::default(), || fetch_data()).await?;
//! # Ok(())
//! # }
//! ```

mod http;
mod retry;
mod validate;

pub use self::http::{parse_retry_after, HttpClient};
pub use retry::{with_rate_limit_retry, RetryConfig};
pub use validate::{
    validate_base_url, validate_date, validate_doi, validate_nct_id, validate_pmid,
    ValidationError,
};
