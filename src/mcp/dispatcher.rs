//! Dispatcher: resolves, validates and executes tool invocations.
//!
//! Every outcome is reported in-band as a [`ToolResult`]; the dispatcher
//! never returns an error to the transport.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tracing::Instrument;

use super::schema::Arguments;
use super::tools::ToolRegistry;
use crate::models::{
    ErrorKind, Record, SourceKind, ToolDescriptor, ToolError, ToolRequest, ToolResult,
};
use crate::sources::SourceError;

/// Routes tool invocations to their adapters
///
/// Holds only the read-only registry, so one instance is shared by all
/// concurrent invocations.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher; `timeout` bounds each invocation end to end
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Descriptors of every registered tool
    pub fn tools(&self) -> Vec<&ToolDescriptor> {
        self.registry.list()
    }

    /// Invoke one tool
    pub async fn invoke(&self, request: &ToolRequest) -> ToolResult {
        let span = tracing::debug_span!("invoke", tool = %request.tool);
        self.invoke_inner(request).instrument(span).await
    }

    /// Invoke several tools concurrently; results keep request order
    pub async fn invoke_batch(&self, requests: &[ToolRequest]) -> Vec<ToolResult> {
        join_all(requests.iter().map(|request| self.invoke(request))).await
    }

    async fn invoke_inner(&self, request: &ToolRequest) -> ToolResult {
        let tool = match self.registry.lookup(&request.tool) {
            Ok(tool) => tool,
            Err(_) => {
                tracing::debug!("Unknown tool");
                return ToolResult::failure(ToolError::unknown_tool(&request.tool));
            }
        };

        let args = match Arguments::validate(&tool.descriptor, &request.arguments) {
            Ok(args) => args,
            Err(error) => {
                tracing::debug!("Rejected arguments: {}", error.message);
                return ToolResult::failure(error);
            }
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, tool.handler.call(&args)).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(page)) => {
                let records = normalize_records(page.records, tool.source);
                tracing::debug!(records = records.len(), ?elapsed, "Invocation succeeded");
                ToolResult::success(records, page.cursor)
            }
            Ok(Err(error)) => map_source_error(error),
            Err(_) => {
                tracing::warn!(?elapsed, "Invocation timed out");
                ToolResult::failure(ToolError::new(
                    ErrorKind::UpstreamUnavailable,
                    format!("{} timed out after {}s", request.tool, self.timeout.as_secs_f32()),
                ))
            }
        }
    }
}

/// Map an adapter failure to its in-band result
///
/// `NotFound` is the empty-result convention, not a failure.
pub fn map_source_error(error: SourceError) -> ToolResult {
    let kind = match &error {
        SourceError::NotFound(message) => {
            tracing::debug!("No matching record: {}", message);
            return ToolResult::empty();
        }
        SourceError::Unavailable(_) => ErrorKind::UpstreamUnavailable,
        SourceError::RateLimited { .. } => ErrorKind::UpstreamRateLimited,
        SourceError::Malformed(_) => ErrorKind::UpstreamMalformedResponse,
        SourceError::InvalidRequest(_) => ErrorKind::InvalidArgument,
    };

    if kind.is_caller_fault() {
        tracing::debug!("{}", error);
    } else {
        tracing::warn!("{}", error);
    }

    ToolResult::failure(ToolError::new(kind, error.to_string()).retry_after(error.retry_after_secs()))
}

/// Drop records from a foreign source and repeated ids, keeping order
fn normalize_records(records: Vec<Record>, source: SourceKind) -> Vec<Record> {
    let mut seen = HashSet::new();

    records
        .into_iter()
        .filter(|record| {
            if record.source != source {
                tracing::warn!(
                    "Dropping {} record {} returned for a {} tool",
                    record.source,
                    record.id,
                    source
                );
                return false;
            }
            if !seen.insert(record.id.clone()) {
                tracing::debug!("Dropping duplicate record {}", record.id);
                return false;
            }
            true
        })
        .collect()
}
