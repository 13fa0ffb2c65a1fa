//! # Biomed MCP
//!
//! A tool-dispatch server exposing bioRxiv/medRxiv, ClinicalTrials.gov and
//! PubMed as named tools with a uniform request/response contract.
//!
//! ## Architecture
//!
//! - [`models`]: Records, tool descriptors, requests and results
//! - [`sources`]: Upstream adapters behind the [`Source`] trait
//! - [`mcp`]: Tool registry, dispatcher and the MCP server transport
//! - [`rest`]: JSON-over-HTTP transport
//! - [`utils`]: HTTP client, rate-limit retry and identifier validation
//! - [`config`]: Configuration management

pub mod config;
pub mod mcp;
pub mod models;
pub mod rest;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use mcp::{Dispatcher, ToolRegistry};
pub use models::{Record, ToolRequest, ToolResult};
pub use sources::{Source, SourceRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
