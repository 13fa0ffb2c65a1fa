//! Scripted mock source for testing purposes.
//!
//! Each call pops the next scripted response; an empty script yields empty
//! pages. The same rate-limit retry used by the HTTP adapters wraps every
//! call, so retry behavior can be observed through [`MockSource::calls`].

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::mcp::{Arguments, Tool, ToolHandler};
use crate::models::{Page, ParamSpec, Record, RecordBuilder, SourceKind, ToolDescriptor};
use crate::sources::{clamp_limit, Source, SourceError};
use crate::utils::{with_rate_limit_retry, RetryConfig};

/// A mock source that returns predefined responses.
#[derive(Debug)]
pub struct MockSource {
    kind: SourceKind,
    prefix: String,
    max_results: usize,
    delay: Option<Duration>,
    retry: RetryConfig,
    responses: Mutex<VecDeque<Result<Page, SourceError>>>,
    calls: AtomicUsize,
    last_limit: AtomicUsize,
}

impl MockSource {
    /// Create a mock posing as `kind`, exposing `mock_search` and `mock_fetch`
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            prefix: "mock".to_string(),
            max_results: 100,
            delay: None,
            retry: RetryConfig {
                max_retries: 1,
                backoff_floor: Duration::from_millis(10),
                max_wait: Duration::from_secs(1),
            },
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            last_limit: AtomicUsize::new(0),
        }
    }

    /// Tool name prefix (`<prefix>_search`, `<prefix>_fetch`)
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Queue a response for the next call
    pub fn push_response(&self, response: Result<Page, SourceError>) {
        self.queue().push_back(response);
    }

    /// Queue a successful page of records
    pub fn push_records(&self, records: Vec<Record>) {
        self.push_response(Ok(Page::new(records)));
    }

    /// Queue a failure
    pub fn push_error(&self, error: SourceError) {
        self.push_response(Err(error));
    }

    /// Number of upstream attempts made so far (retries included)
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Effective (clamped) limit of the most recent search
    pub fn last_limit(&self) -> usize {
        self.last_limit.load(Ordering::SeqCst)
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Result<Page, SourceError>>> {
        self.responses.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn attempt(&self) -> Result<Page, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.queue().pop_front();
        next.unwrap_or_else(|| Ok(Page::empty()))
    }

    /// Scripted search, truncated to the clamped limit
    pub async fn search(&self, limit: usize) -> Result<Page, SourceError> {
        let limit = clamp_limit(limit, self.max_results, self.kind);
        self.last_limit.store(limit, Ordering::SeqCst);
        if limit == 0 {
            return Ok(Page::empty());
        }

        let mut page = with_rate_limit_retry(self.retry, || self.attempt()).await?;
        page.records.truncate(limit);
        Ok(page)
    }

    /// Scripted fetch; an empty page means no such record
    pub async fn fetch(&self, id: &str) -> Result<Page, SourceError> {
        let page = with_rate_limit_retry(self.retry, || self.attempt()).await?;
        if page.records.is_empty() {
            return Err(SourceError::NotFound(format!("No mock record {}", id)));
        }
        Ok(page)
    }
}

impl Source for MockSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    fn max_results(&self) -> usize {
        self.max_results
    }

    fn tools(self: Arc<Self>) -> Vec<Tool> {
        let search = ToolDescriptor::new(format!("{}_search", self.prefix), "Scripted search")
            .param(ParamSpec::string("query", "Search terms").required())
            .param(ParamSpec::integer("limit", "Maximum records").default_value(10));
        let fetch = ToolDescriptor::new(format!("{}_fetch", self.prefix), "Scripted fetch")
            .param(ParamSpec::string("id", "Record identifier").required());

        vec![
            Tool::new(
                search,
                self.kind,
                Arc::new(MockTool {
                    source: Arc::clone(&self),
                    fetch: false,
                }),
            ),
            Tool::new(
                fetch,
                self.kind,
                Arc::new(MockTool {
                    source: Arc::clone(&self),
                    fetch: true,
                }),
            ),
        ]
    }
}

#[derive(Debug)]
struct MockTool {
    source: Arc<MockSource>,
    fetch: bool,
}

#[async_trait]
impl ToolHandler for MockTool {
    async fn call(&self, args: &Arguments) -> Result<Page, SourceError> {
        if self.fetch {
            self.source.fetch(args.required_str("id")?).await
        } else {
            self.source.search(args.usize_or("limit", 10)).await
        }
    }
}

/// Helper function to create a mock record for testing.
pub fn make_record(kind: SourceKind, id: &str, title: &str) -> Record {
    RecordBuilder::new(kind, id, title, format!("https://example.org/{}", id))
        .summary(format!("Summary of {}", title))
        .build()
}
