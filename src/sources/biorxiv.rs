//! bioRxiv/medRxiv source implementation.
//!
//! Both servers share one API (`api.biorxiv.org`) and differ only in the
//! server path segment, so a single adapter serves both. Records always carry
//! `source = bioRxiv`; the server is kept in `raw`.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::config::BiorxivConfig;
use crate::mcp::{Arguments, Tool, ToolHandler};
use crate::models::{Page, ParamSpec, Record, RecordBuilder, SourceKind, ToolDescriptor};
use crate::sources::{clamp_limit, Source, SourceError};
use crate::utils::{validate_date, validate_doi, HttpClient, RetryConfig};

/// Preprint server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Server {
    #[default]
    BioRxiv,
    MedRxiv,
}

impl Server {
    /// Path segment used by the API
    pub fn as_str(&self) -> &'static str {
        match self {
            Server::BioRxiv => "biorxiv",
            Server::MedRxiv => "medrxiv",
        }
    }

    /// Parse a caller-supplied server name; absent means bioRxiv
    pub fn parse(name: Option<&str>) -> Result<Self, SourceError> {
        match name.map(|n| n.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("biorxiv") => Ok(Server::BioRxiv),
            Some("medrxiv") => Ok(Server::MedRxiv),
            Some(other) => Err(SourceError::InvalidRequest(format!(
                "Unsupported server '{}', expected 'biorxiv' or 'medrxiv'",
                other
            ))),
        }
    }

    fn content_url(&self, doi: &str, version: u32) -> String {
        format!("https://www.{}.org/content/{}v{}", self.as_str(), doi, version)
    }
}

/// Search parameters for [`BiorxivSource::search`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreprintSearch {
    pub server: Server,
    pub query: String,
    pub limit: usize,
    pub offset: usize,
    pub category: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// bioRxiv/medRxiv source
#[derive(Debug, Clone)]
pub struct BiorxivSource {
    client: HttpClient,
    base_url: String,
    max_results: usize,
    search_window_days: u32,
    max_scan_pages: u32,
}

impl BiorxivSource {
    pub fn new(config: &BiorxivConfig, retry: RetryConfig) -> Result<Self, SourceError> {
        let client = HttpClient::new(SourceKind::BioRxiv, config.timeout())?
            .with_rate_limit(config.requests_per_second)
            .with_retry(retry);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_results: config.max_results,
            search_window_days: config.search_window_days,
            max_scan_pages: config.max_scan_pages,
        })
    }

    /// Latest version of a preprint by DOI
    pub async fn fetch(&self, server: Server, doi: &str) -> Result<Page, SourceError> {
        let doi = validate_doi(doi)?;
        let url = format!("{}/details/{}/{}/na/json", self.base_url, server.as_str(), doi);
        let response: DetailsResponse = self.client.get_json(&url, &[]).await?;

        let (mut preprints, _) = collect_latest(response.collection, usize::MAX)?;
        match preprints.pop() {
            Some(preprint) => Ok(Page::single(preprint.into_record(server))),
            None => Err(SourceError::NotFound(format!(
                "No {} preprint with DOI {}",
                server.as_str(),
                doi
            ))),
        }
    }

    /// Journal publication of a preprint, if one is known
    pub async fn published_version(&self, server: Server, doi: &str) -> Result<Page, SourceError> {
        let doi = validate_doi(doi)?;
        let url = format!("{}/pubs/{}/{}/na/json", self.base_url, server.as_str(), doi);
        let response: DetailsResponse = self.client.get_json(&url, &[]).await?;

        let Some(item) = response.collection.into_iter().next() else {
            return Err(SourceError::NotFound(format!(
                "No published version recorded for {}",
                doi
            )));
        };

        let link = Publication::deserialize(&item)
            .map_err(|e| SourceError::Malformed(format!("bioRxiv publication entry: {}", e)))?;
        if link.published_doi.trim().is_empty() {
            return Err(SourceError::NotFound(format!(
                "No published version recorded for {}",
                doi
            )));
        }

        let id = if link.biorxiv_doi.is_empty() {
            doi
        } else {
            link.biorxiv_doi.clone()
        };
        let url = format!("https://doi.org/{}", link.published_doi.trim());

        let record = RecordBuilder::new(SourceKind::BioRxiv, id, link.preprint_title.trim(), url)
            .summary(link.preprint_abstract.trim())
            .published_date(Some(link.published_date.clone()))
            .raw(item)
            .raw_field("server", server.as_str())
            .build();

        Ok(Page::single(record))
    }

    /// Preprints posted in the last `days` days, newest feed order
    ///
    /// The cursor is the upstream feed offset of the next unread entry.
    pub async fn recent(
        &self,
        server: Server,
        days: u32,
        limit: usize,
        cursor: Option<&str>,
        category: Option<&str>,
    ) -> Result<Page, SourceError> {
        if days == 0 {
            return Err(SourceError::InvalidRequest(
                "days must be at least 1".to_string(),
            ));
        }
        let offset = parse_cursor(cursor)?;
        let limit = clamp_limit(limit, self.max_results, SourceKind::BioRxiv);
        if limit == 0 {
            return Ok(Page::empty());
        }

        let interval = format!("{}d", days);
        let response = self.details_page(server, &interval, offset, category).await?;
        let total = response.total();
        let (preprints, consumed) = collect_latest(response.collection, limit)?;

        let next = offset + consumed;
        let cursor = (consumed > 0 && total.is_some_and(|total| next < total)).then(|| next.to_string());

        let records = preprints.into_iter().map(|p| p.into_record(server)).collect();
        Ok(Page::new(records).cursor(cursor))
    }

    /// Keyword search over the details feed for a date interval
    ///
    /// The API has no keyword search, so entries are matched client side:
    /// every query term must appear in the title, abstract or authors.
    pub async fn search(&self, search: &PreprintSearch) -> Result<Page, SourceError> {
        let (start, end) = self.search_window(search)?;
        let limit = clamp_limit(search.limit, self.max_results, SourceKind::BioRxiv);
        if limit == 0 {
            return Ok(Page::empty());
        }

        let terms: Vec<String> = search
            .query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return Err(SourceError::InvalidRequest("Empty search query".to_string()));
        }

        let interval = format!("{}/{}", start, end);
        let wanted = search.offset.saturating_add(limit);
        let mut matches: Vec<Preprint> = Vec::new();
        let mut cursor = 0;
        let mut exhausted = false;

        for _ in 0..self.max_scan_pages {
            let response = self
                .details_page(search.server, &interval, cursor, search.category.as_deref())
                .await?;
            let total = response.total();
            let page_len = response.collection.len();

            let (preprints, _) = collect_latest(response.collection, usize::MAX)?;
            for preprint in preprints.into_iter().filter(|p| p.matches(&terms)) {
                merge_version(&mut matches, preprint);
            }

            cursor += page_len;
            if page_len == 0 || total.map_or(true, |total| cursor >= total) {
                exhausted = true;
                break;
            }
            if matches.len() > wanted {
                break;
            }
        }

        let has_more = matches.len() > wanted || (!exhausted && matches.len() == wanted);
        let records: Vec<Record> = matches
            .into_iter()
            .skip(search.offset)
            .take(limit)
            .map(|p| p.into_record(search.server))
            .collect();

        let cursor = has_more.then(|| (search.offset + records.len()).to_string());
        Ok(Page::new(records).cursor(cursor))
    }

    fn search_window(&self, search: &PreprintSearch) -> Result<(NaiveDate, NaiveDate), SourceError> {
        let end = match &search.end_date {
            Some(date) => validate_date(date)?,
            None => Utc::now().date_naive(),
        };
        let start = match &search.start_date {
            Some(date) => validate_date(date)?,
            None => end - ChronoDuration::days(i64::from(self.search_window_days)),
        };

        if start > end {
            return Err(SourceError::InvalidRequest(format!(
                "start_date {} is after end_date {}",
                start, end
            )));
        }
        Ok((start, end))
    }

    async fn details_page(
        &self,
        server: Server,
        interval: &str,
        cursor: usize,
        category: Option<&str>,
    ) -> Result<DetailsResponse, SourceError> {
        let url = format!(
            "{}/details/{}/{}/{}/json",
            self.base_url,
            server.as_str(),
            interval,
            cursor
        );
        let query: Vec<(&str, String)> = category
            .map(|c| vec![("category", c.trim().to_lowercase().replace(' ', "_"))])
            .unwrap_or_default();

        self.client.get_json(&url, &query).await
    }
}

fn parse_cursor(cursor: Option<&str>) -> Result<usize, SourceError> {
    match cursor.map(str::trim).filter(|c| !c.is_empty()) {
        None => Ok(0),
        Some(c) => c
            .parse()
            .map_err(|_| SourceError::InvalidRequest(format!("Invalid cursor '{}'", c))),
    }
}

/// Response envelope shared by the `details` and `pubs` endpoints
#[derive(Debug, Deserialize)]
struct DetailsResponse {
    #[serde(default)]
    messages: Vec<Value>,
    #[serde(default)]
    collection: Vec<Value>,
}

impl DetailsResponse {
    /// Total entries in the interval; the API sends numbers or strings
    fn total(&self) -> Option<usize> {
        let total = self.messages.first()?.get("total")?;
        match total {
            Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// One entry of the details feed
#[derive(Debug, Clone, Deserialize)]
struct Preprint {
    doi: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: String,
    #[serde(default, rename = "abstract")]
    summary: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    version: Value,
    #[serde(skip)]
    raw: Value,
}

impl Preprint {
    fn from_value(value: Value) -> Result<Self, SourceError> {
        let mut preprint = Preprint::deserialize(&value)
            .map_err(|e| SourceError::Malformed(format!("bioRxiv entry: {}", e)))?;
        preprint.raw = value;
        Ok(preprint)
    }

    fn version_number(&self) -> u32 {
        match &self.version {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(1),
            Value::String(s) => s.trim().parse().unwrap_or(1),
            _ => 1,
        }
    }

    fn matches(&self, terms: &[String]) -> bool {
        let haystack = format!("{} {} {}", self.title, self.summary, self.authors).to_lowercase();
        terms.iter().all(|term| haystack.contains(term.as_str()))
    }

    fn into_record(self, server: Server) -> Record {
        let url = server.content_url(&self.doi, self.version_number());

        RecordBuilder::new(SourceKind::BioRxiv, self.doi, self.title.trim(), url)
            .summary(self.summary.trim())
            .published_date(Some(self.date))
            .raw(self.raw)
            .raw_field("server", server.as_str())
            .build()
    }
}

/// Keep one entry per DOI (the highest version), in first-seen order
fn merge_version(preprints: &mut Vec<Preprint>, preprint: Preprint) {
    match preprints.iter_mut().find(|p| p.doi == preprint.doi) {
        Some(existing) => {
            if preprint.version_number() > existing.version_number() {
                *existing = preprint;
            }
        }
        None => preprints.push(preprint),
    }
}

/// Collapse versions until `limit` distinct DOIs are collected
///
/// Returns the preprints and how many feed entries were consumed.
fn collect_latest(items: Vec<Value>, limit: usize) -> Result<(Vec<Preprint>, usize), SourceError> {
    let mut preprints: Vec<Preprint> = Vec::new();
    let mut consumed = 0;

    for item in items {
        let preprint = Preprint::from_value(item)?;
        let known = preprints.iter().any(|p| p.doi == preprint.doi);
        if !known && preprints.len() >= limit {
            break;
        }
        merge_version(&mut preprints, preprint);
        consumed += 1;
    }

    Ok((preprints, consumed))
}

/// Entry of the `pubs` endpoint
#[derive(Debug, Deserialize)]
struct Publication {
    #[serde(default)]
    biorxiv_doi: String,
    #[serde(default)]
    published_doi: String,
    #[serde(default)]
    preprint_title: String,
    #[serde(default)]
    preprint_abstract: String,
    #[serde(default)]
    published_date: String,
}

impl Source for BiorxivSource {
    fn kind(&self) -> SourceKind {
        SourceKind::BioRxiv
    }

    fn max_results(&self) -> usize {
        self.max_results
    }

    fn tools(self: Arc<Self>) -> Vec<Tool> {
        [
            BiorxivOp::Search,
            BiorxivOp::Fetch,
            BiorxivOp::PublishedVersion,
            BiorxivOp::Recent,
        ]
        .into_iter()
        .map(|op| {
            Tool::new(
                op.descriptor(self.max_results),
                SourceKind::BioRxiv,
                Arc::new(BiorxivTool {
                    source: Arc::clone(&self),
                    op,
                }),
            )
        })
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BiorxivOp {
    Search,
    Fetch,
    PublishedVersion,
    Recent,
}

impl BiorxivOp {
    fn descriptor(self, max: usize) -> ToolDescriptor {
        let server = ParamSpec::string("server", "Preprint server: 'biorxiv' or 'medrxiv'")
            .default_value("biorxiv");
        let limit = ParamSpec::integer(
            "limit",
            &format!("Maximum number of preprints (clamped to {})", max),
        )
        .default_value(10);
        let category = ParamSpec::string("category", "Subject category, e.g. 'neuroscience'");

        match self {
            BiorxivOp::Search => ToolDescriptor::new(
                "biorxiv_search",
                "Search recent preprints by keywords in title, abstract or authors",
            )
            .param(ParamSpec::string("query", "Keywords that must all match").required())
            .param(limit)
            .param(ParamSpec::integer("offset", "Number of matches to skip").default_value(0))
            .param(category)
            .param(ParamSpec::string("start_date", "Start of the posting window (YYYY-MM-DD)"))
            .param(ParamSpec::string("end_date", "End of the posting window (YYYY-MM-DD)"))
            .param(server),
            BiorxivOp::Fetch => ToolDescriptor::new(
                "biorxiv_fetch",
                "Get detailed information about a preprint by DOI",
            )
            .param(ParamSpec::string("doi", "Preprint DOI, e.g. 10.1101/2023.01.01.123456").required())
            .param(server),
            BiorxivOp::PublishedVersion => ToolDescriptor::new(
                "biorxiv_published_version",
                "Find the journal publication of a preprint",
            )
            .param(ParamSpec::string("doi", "Preprint DOI").required())
            .param(server),
            BiorxivOp::Recent => ToolDescriptor::new(
                "biorxiv_recent",
                "List preprints posted in the last N days",
            )
            .param(ParamSpec::integer("days", "Number of days to look back").default_value(7))
            .param(limit)
            .param(ParamSpec::string("cursor", "Cursor returned by a previous call"))
            .param(category)
            .param(server),
        }
    }
}

#[derive(Debug)]
struct BiorxivTool {
    source: Arc<BiorxivSource>,
    op: BiorxivOp,
}

#[async_trait]
impl ToolHandler for BiorxivTool {
    async fn call(&self, args: &Arguments) -> Result<Page, SourceError> {
        let server = Server::parse(args.str("server"))?;

        match self.op {
            BiorxivOp::Search => {
                let search = PreprintSearch {
                    server,
                    query: args.required_str("query")?.to_string(),
                    limit: args.usize_or("limit", 10),
                    offset: args.usize_or("offset", 0),
                    category: args.str("category").map(str::to_string),
                    start_date: args.str("start_date").map(str::to_string),
                    end_date: args.str("end_date").map(str::to_string),
                };
                self.source.search(&search).await
            }
            BiorxivOp::Fetch => self.source.fetch(server, args.required_str("doi")?).await,
            BiorxivOp::PublishedVersion => {
                self.source
                    .published_version(server, args.required_str("doi")?)
                    .await
            }
            BiorxivOp::Recent => {
                let days = u32::try_from(args.u64_or("days", 7)).map_err(|_| {
                    SourceError::InvalidRequest("days is too large".to_string())
                })?;
                self.source
                    .recent(
                        server,
                        days,
                        args.usize_or("limit", 10),
                        args.str("cursor"),
                        args.str("category"),
                    )
                    .await
            }
        }
    }
}
