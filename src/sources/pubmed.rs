//! PubMed source implementation using the NCBI E-utilities API.
//!
//! Searches run `esearch` for an ordered PMID list and then one batched
//! `efetch` for the article XML. Related articles come from `elink`.

use async_trait::async_trait;
use quick_xml::de::from_str;
use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::PubMedConfig;
use crate::mcp::{Arguments, Tool, ToolHandler};
use crate::models::{
    Page, ParamSpec, Record, RecordBuilder, SearchQuery, SourceKind, ToolDescriptor,
};
use crate::sources::{clamp_limit, Source, SourceError};
use crate::utils::{validate_pmid, HttpClient, RetryConfig};

const ARTICLE_URL: &str = "https://pubmed.ncbi.nlm.nih.gov";

/// PubMed source
///
/// Uses NCBI E-utilities for searching and fetching PubMed records.
#[derive(Debug, Clone)]
pub struct PubMedSource {
    client: HttpClient,
    base_url: String,
    api_key: Option<String>,
    email: Option<String>,
    tool: String,
    max_results: usize,
}

impl PubMedSource {
    /// Create a new PubMed source
    pub fn new(config: &PubMedConfig, retry: RetryConfig) -> Result<Self, SourceError> {
        let client = HttpClient::new(SourceKind::PubMed, config.timeout())?
            .with_rate_limit(config.rate_limit())
            .with_retry(retry);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            email: config.email.clone(),
            tool: config.tool.clone(),
            max_results: config.max_results,
        })
    }

    /// Search for articles; the cursor is the next `offset`
    pub async fn search(&self, query: &SearchQuery) -> Result<Page, SourceError> {
        let limit = clamp_limit(query.limit, self.max_results, SourceKind::PubMed);
        if limit == 0 {
            return Ok(Page::empty());
        }

        let params = self.search_params(&query.query, limit, query.offset, query.year.as_deref())?;
        let xml = self.client.get_text(&self.endpoint("esearch.fcgi"), &params).await?;
        let result = Self::parse_search_response(&xml)?;

        if result.ids.is_empty() {
            return Ok(Page::empty());
        }

        let next = query.offset + result.ids.len();
        let cursor = (next < result.count).then(|| next.to_string());
        let records = self.fetch_records(&result.ids).await?;

        Ok(Page::new(records).cursor(cursor))
    }

    /// Fetch a single article by PMID
    pub async fn fetch(&self, pmid: &str) -> Result<Page, SourceError> {
        let pmid = validate_pmid(pmid)?;
        let records = self.fetch_records(&[pmid.clone()]).await?;

        records
            .into_iter()
            .find(|record| record.id == pmid)
            .map(Page::single)
            .ok_or_else(|| SourceError::NotFound(format!("PubMed article {}", pmid)))
    }

    /// Articles PubMed links to `pmid` as similar
    pub async fn related(&self, pmid: &str, limit: usize) -> Result<Page, SourceError> {
        let pmid = validate_pmid(pmid)?;
        let limit = clamp_limit(limit, self.max_results, SourceKind::PubMed);
        if limit == 0 {
            return Ok(Page::empty());
        }

        let mut params = vec![
            ("dbfrom", "pubmed".to_string()),
            ("db", "pubmed".to_string()),
            ("id", pmid.clone()),
            ("linkname", "pubmed_pubmed".to_string()),
            ("retmode", "json".to_string()),
        ];
        self.push_identification(&mut params);

        let body = self.client.get_text(&self.endpoint("elink.fcgi"), &params).await?;
        let ids: Vec<String> = Self::parse_link_response(&body)?
            .into_iter()
            .filter(|id| *id != pmid)
            .take(limit)
            .collect();

        if ids.is_empty() {
            return Ok(Page::empty());
        }

        Ok(Page::new(self.fetch_records(&ids).await?))
    }

    /// Search by author name
    pub async fn by_author(
        &self,
        author: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Page, SourceError> {
        let query = SearchQuery::new(format!("{}[Author]", author.trim()))
            .limit(limit)
            .offset(offset);
        self.search(&query).await
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    /// NCBI asks every client to identify itself
    fn push_identification(&self, params: &mut Vec<(&'static str, String)>) {
        params.push(("tool", self.tool.clone()));
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }
        if let Some(api_key) = &self.api_key {
            params.push(("api_key", api_key.clone()));
        }
    }

    /// Build esearch query parameters
    fn search_params(
        &self,
        term: &str,
        limit: usize,
        offset: usize,
        year: Option<&str>,
    ) -> Result<Vec<(&'static str, String)>, SourceError> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", term.to_string()),
            ("retstart", offset.to_string()),
            ("retmax", limit.to_string()),
            ("retmode", "xml".to_string()),
        ];

        if let Some(year) = year {
            let (min, max) = year_range(year)?;
            params.push(("datetype", "pdat".to_string()));
            params.push(("mindate", min));
            params.push(("maxdate", max));
        }

        self.push_identification(&mut params);
        Ok(params)
    }

    async fn fetch_records(&self, ids: &[String]) -> Result<Vec<Record>, SourceError> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("id", ids.join(",")),
            ("retmode", "xml".to_string()),
        ];
        self.push_identification(&mut params);

        let xml = self.client.get_text(&self.endpoint("efetch.fcgi"), &params).await?;
        let mut records = Self::parse_fetch_response(&xml)?;

        // efetch does not promise request order; keep the esearch ranking
        records.sort_by_key(|record| {
            ids.iter()
                .position(|id| *id == record.id)
                .unwrap_or(usize::MAX)
        });
        Ok(records)
    }

    /// Parse E-utilities search response XML
    fn parse_search_response(xml: &str) -> Result<SearchResult, SourceError> {
        #[derive(Debug, Deserialize)]
        #[allow(non_snake_case)]
        struct ESearchResult {
            Count: Option<String>,
            IdList: Option<IdList>,
            ERROR: Option<String>,
        }

        #[derive(Debug, Deserialize)]
        #[allow(non_snake_case)]
        struct IdList {
            #[serde(rename = "Id", default)]
            ids: Vec<String>,
        }

        let result: ESearchResult = from_str(xml)
            .map_err(|e| SourceError::Malformed(format!("PubMed search XML: {}", e)))?;

        if let Some(error) = result.ERROR {
            if result.IdList.is_none() {
                return Err(SourceError::InvalidRequest(format!("PubMed: {}", error)));
            }
        }

        let ids = result.IdList.map(|list| list.ids).unwrap_or_default();
        let count = match result.Count {
            Some(count) => count.trim().parse().map_err(|_| {
                SourceError::Malformed(format!("PubMed search count '{}'", count))
            })?,
            None => ids.len(),
        };

        Ok(SearchResult { count, ids })
    }

    /// Parse an elink JSON response into linked PMIDs, in upstream order
    fn parse_link_response(body: &str) -> Result<Vec<String>, SourceError> {
        #[derive(Debug, Deserialize)]
        struct LinkResponse {
            #[serde(default)]
            linksets: Vec<LinkSet>,
        }

        #[derive(Debug, Deserialize)]
        struct LinkSet {
            #[serde(default)]
            linksetdbs: Vec<LinkSetDb>,
        }

        #[derive(Debug, Deserialize)]
        struct LinkSetDb {
            linkname: String,
            #[serde(default)]
            links: Vec<Value>,
        }

        let response: LinkResponse = serde_json::from_str(body)?;

        Ok(response
            .linksets
            .into_iter()
            .flat_map(|set| set.linksetdbs)
            .filter(|db| db.linkname == "pubmed_pubmed")
            .flat_map(|db| db.links)
            .filter_map(|link| match link {
                Value::String(id) => Some(id),
                Value::Number(id) => Some(id.to_string()),
                _ => None,
            })
            .collect())
    }

    /// Parse E-utilities fetch response XML
    fn parse_fetch_response(xml: &str) -> Result<Vec<Record>, SourceError> {
        #[derive(Debug, Deserialize)]
        #[allow(non_snake_case)]
        struct PubmedArticleSet {
            #[serde(rename = "PubmedArticle", default)]
            articles: Vec<PubmedArticle>,
        }

        #[derive(Debug, Deserialize)]
        #[allow(non_snake_case)]
        struct PubmedArticle {
            MedlineCitation: Option<MedlineCitation>,
            PubmedData: Option<PubmedData>,
        }

        #[derive(Debug, Deserialize)]
        #[allow(non_snake_case)]
        struct MedlineCitation {
            PMID: Option<Text>,
            Article: Option<Article>,
        }

        #[derive(Debug, Deserialize)]
        #[allow(non_snake_case)]
        struct Article {
            Journal: Option<Journal>,
            ArticleTitle: Option<Text>,
            Abstract: Option<Abstract>,
            AuthorList: Option<AuthorList>,
        }

        #[derive(Debug, Deserialize)]
        #[allow(non_snake_case)]
        struct Journal {
            Title: Option<Text>,
            JournalIssue: Option<JournalIssue>,
        }

        #[derive(Debug, Deserialize)]
        #[allow(non_snake_case)]
        struct JournalIssue {
            PubDate: Option<PubDate>,
        }

        #[derive(Debug, Deserialize)]
        #[allow(non_snake_case)]
        struct PubDate {
            Year: Option<String>,
            Month: Option<String>,
            Day: Option<String>,
            MedlineDate: Option<String>,
        }

        #[derive(Debug, Deserialize)]
        #[allow(non_snake_case)]
        struct Abstract {
            #[serde(rename = "AbstractText", default)]
            sections: Vec<AbstractText>,
        }

        #[derive(Debug, Deserialize)]
        struct AbstractText {
            #[serde(rename = "@Label")]
            label: Option<String>,
            #[serde(rename = "$text", default)]
            text: String,
        }

        #[derive(Debug, Deserialize)]
        #[allow(non_snake_case)]
        struct AuthorList {
            #[serde(rename = "Author", default)]
            authors: Vec<Author>,
        }

        #[derive(Debug, Deserialize)]
        #[allow(non_snake_case)]
        struct Author {
            LastName: Option<String>,
            ForeName: Option<String>,
            CollectiveName: Option<String>,
        }

        #[derive(Debug, Deserialize)]
        #[allow(non_snake_case)]
        struct PubmedData {
            ArticleIdList: Option<ArticleIdList>,
        }

        #[derive(Debug, Deserialize)]
        #[allow(non_snake_case)]
        struct ArticleIdList {
            #[serde(rename = "ArticleId", default)]
            ids: Vec<ArticleId>,
        }

        #[derive(Debug, Deserialize)]
        struct ArticleId {
            #[serde(rename = "@IdType")]
            id_type: String,
            #[serde(rename = "$text", default)]
            value: String,
        }

        #[derive(Debug, Deserialize)]
        struct Text {
            #[serde(rename = "$text", default)]
            text: String,
        }

        let xml = flatten_mixed_content(xml)?;
        let result: PubmedArticleSet = from_str(&xml)
            .map_err(|e| SourceError::Malformed(format!("PubMed fetch XML: {}", e)))?;

        let mut records = Vec::new();

        for article in result.articles {
            let Some(citation) = article.MedlineCitation else {
                continue;
            };
            let pmid = citation
                .PMID
                .map(|p| p.text.trim().to_string())
                .unwrap_or_default();
            if pmid.is_empty() {
                tracing::debug!("Skipping PubMed article without PMID");
                continue;
            }

            let details = citation.Article;

            let title = details
                .as_ref()
                .and_then(|a| a.ArticleTitle.as_ref())
                .map(|t| t.text.trim().to_string())
                .unwrap_or_default();

            let authors: Vec<String> = details
                .as_ref()
                .and_then(|a| a.AuthorList.as_ref())
                .map(|list| {
                    list.authors
                        .iter()
                        .filter_map(|author| match &author.CollectiveName {
                            Some(collective) => Some(collective.trim().to_string()),
                            None => {
                                let name = format!(
                                    "{} {}",
                                    author.ForeName.as_deref().unwrap_or(""),
                                    author.LastName.as_deref().unwrap_or("")
                                );
                                let name = name.trim();
                                (!name.is_empty()).then(|| name.to_string())
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();

            let summary = details
                .as_ref()
                .and_then(|a| a.Abstract.as_ref())
                .map(|ab| {
                    ab.sections
                        .iter()
                        .map(|section| match &section.label {
                            Some(label) => format!("{}: {}", label, section.text.trim()),
                            None => section.text.trim().to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .unwrap_or_default();

            let journal = details.as_ref().and_then(|a| a.Journal.as_ref());

            let journal_title = journal
                .and_then(|j| j.Title.as_ref())
                .map(|t| t.text.trim().to_string());

            let published_date = journal
                .and_then(|j| j.JournalIssue.as_ref())
                .and_then(|issue| issue.PubDate.as_ref())
                .and_then(|date| {
                    normalize_pub_date(
                        date.Year.as_deref(),
                        date.Month.as_deref(),
                        date.Day.as_deref(),
                        date.MedlineDate.as_deref(),
                    )
                });

            let doi = article
                .PubmedData
                .as_ref()
                .and_then(|data| data.ArticleIdList.as_ref())
                .and_then(|list| list.ids.iter().find(|id| id.id_type == "doi"))
                .map(|id| id.value.trim().to_string());

            let url = format!("{}/{}/", ARTICLE_URL, pmid);

            records.push(
                RecordBuilder::new(SourceKind::PubMed, pmid.clone(), title, url)
                    .summary(summary)
                    .published_date(published_date)
                    .raw(json!({
                        "pmid": pmid,
                        "authors": authors,
                        "journal": journal_title,
                        "doi": doi,
                    }))
                    .build(),
            );
        }

        Ok(records)
    }
}

/// Parsed esearch result: total hit count and the PMIDs of this page
#[derive(Debug, Clone, PartialEq)]
struct SearchResult {
    count: usize,
    ids: Vec<String>,
}

/// Elements whose content is free text with inline markup
const MIXED_CONTENT: [&[u8]; 3] = [b"ArticleTitle", b"AbstractText", b"VernacularTitle"];

/// Drop inline markup (`<i>`, `<sup>`, MathML, ...) inside titles and
/// abstract sections so each becomes a single text node.
fn flatten_mixed_content(xml: &str) -> Result<String, SourceError> {
    let malformed = |e: &dyn std::fmt::Display| SourceError::Malformed(format!("PubMed fetch XML: {}", e));

    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    // 0 outside mixed content, else nesting depth below the mixed element
    let mut depth = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| malformed(&e))?;
        let event = match event {
            Event::Eof => break,
            Event::Start(start) => {
                if depth > 0 {
                    depth += 1;
                    continue;
                }
                if MIXED_CONTENT.contains(&start.name().as_ref()) {
                    depth = 1;
                }
                Event::Start(start)
            }
            Event::End(end) => match depth {
                0 => Event::End(end),
                1 => {
                    depth = 0;
                    Event::End(end)
                }
                _ => {
                    depth -= 1;
                    continue;
                }
            },
            Event::Empty(_) if depth > 0 => continue,
            Event::CData(data) if depth > 0 => {
                let text = String::from_utf8_lossy(&data).into_owned();
                Event::Text(BytesText::new(&text).into_owned())
            }
            other => other,
        };
        writer.write_event(event).map_err(|e| malformed(&e))?;
    }

    String::from_utf8(writer.into_inner()).map_err(|e| malformed(&e))
}

/// Translate a year filter (`2020`, `2015-2020`, `2020-`, `-2020`) into an
/// E-utilities `mindate`/`maxdate` pair
fn year_range(year: &str) -> Result<(String, String), SourceError> {
    fn parse(part: &str, year: &str) -> Result<u16, SourceError> {
        let part = part.trim();
        if part.len() == 4 {
            if let Ok(value) = part.parse() {
                return Ok(value);
            }
        }
        Err(SourceError::InvalidRequest(format!(
            "Invalid year filter '{}'",
            year
        )))
    }

    let year = year.trim();
    let (from, until) = match year.split_once('-') {
        None => {
            let y = parse(year, year)?;
            (y, y)
        }
        Some(("", until)) => (1800, parse(until, year)?),
        Some((from, "")) => (parse(from, year)?, 3000),
        Some((from, until)) => (parse(from, year)?, parse(until, year)?),
    };

    if from > until {
        return Err(SourceError::InvalidRequest(format!(
            "Invalid year filter '{}': start after end",
            year
        )));
    }

    Ok((format!("{}/01/01", from), format!("{}/12/31", until)))
}

/// Normalize a PubMed `PubDate` to `YYYY`, `YYYY-MM` or `YYYY-MM-DD`
fn normalize_pub_date(
    year: Option<&str>,
    month: Option<&str>,
    day: Option<&str>,
    medline_date: Option<&str>,
) -> Option<String> {
    let Some(year) = year.map(str::trim).filter(|y| y.len() == 4) else {
        // MedlineDate looks like "1998 Dec-1999 Jan"; keep the leading year
        return medline_date
            .map(str::trim)
            .and_then(|d| d.get(..4))
            .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string);
    };

    let month = month.and_then(|m| {
        let m = m.trim();
        m.parse::<u32>()
            .ok()
            .filter(|n| (1..=12).contains(n))
            .or_else(|| m.parse::<chrono::Month>().ok().map(|m| m.number_from_month()))
    });

    let Some(month) = month else {
        return Some(year.to_string());
    };

    let day = day.and_then(|d| d.trim().parse::<u32>().ok());
    let date = year
        .parse::<i32>()
        .ok()
        .zip(day)
        .and_then(|(y, d)| chrono::NaiveDate::from_ymd_opt(y, month, d));

    Some(match date {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => format!("{}-{:02}", year, month),
    })
}

impl Source for PubMedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::PubMed
    }

    fn max_results(&self) -> usize {
        self.max_results
    }

    fn tools(self: Arc<Self>) -> Vec<Tool> {
        [
            PubMedOp::Search,
            PubMedOp::Fetch,
            PubMedOp::Related,
            PubMedOp::ByAuthor,
        ]
        .into_iter()
        .map(|op| {
            Tool::new(
                op.descriptor(self.max_results),
                SourceKind::PubMed,
                Arc::new(PubMedTool {
                    source: Arc::clone(&self),
                    op,
                }),
            )
        })
        .collect()
    }
}

/// PubMed operations exposed as tools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PubMedOp {
    Search,
    Fetch,
    Related,
    ByAuthor,
}

impl PubMedOp {
    fn descriptor(self, max: usize) -> ToolDescriptor {
        let limit = ParamSpec::integer(
            "limit",
            &format!("Maximum number of articles (clamped to {})", max),
        )
        .default_value(10);
        let offset = ParamSpec::integer("offset", "Number of hits to skip").default_value(0);

        match self {
            PubMedOp::Search => ToolDescriptor::new(
                "pubmed_search",
                "Search PubMed for articles matching a query",
            )
            .param(ParamSpec::string("query", "PubMed search terms").required())
            .param(limit)
            .param(offset)
            .param(ParamSpec::string(
                "year",
                "Publication year filter (e.g., '2020', '2018-2022', '2010-', '-2015')",
            )),
            PubMedOp::Fetch => ToolDescriptor::new(
                "pubmed_fetch",
                "Get the abstract and metadata of a PubMed article by PMID",
            )
            .param(ParamSpec::string("pmid", "PubMed ID").required()),
            PubMedOp::Related => ToolDescriptor::new(
                "pubmed_related",
                "Find articles PubMed lists as similar to a given PMID",
            )
            .param(ParamSpec::string("pmid", "PubMed ID").required())
            .param(limit),
            PubMedOp::ByAuthor => ToolDescriptor::new(
                "pubmed_by_author",
                "Search PubMed for articles by an author",
            )
            .param(ParamSpec::string("author", "Author name, e.g. 'Doudna JA'").required())
            .param(limit)
            .param(offset),
        }
    }
}

/// Tool handler bound to one PubMed operation
#[derive(Debug)]
struct PubMedTool {
    source: Arc<PubMedSource>,
    op: PubMedOp,
}

#[async_trait]
impl ToolHandler for PubMedTool {
    async fn call(&self, args: &Arguments) -> Result<Page, SourceError> {
        let limit = args.usize_or("limit", 10);
        let offset = args.usize_or("offset", 0);

        match self.op {
            PubMedOp::Search => {
                let mut query = SearchQuery::new(args.required_str("query")?)
                    .limit(limit)
                    .offset(offset);
                if let Some(year) = args.str("year") {
                    query = query.year(year);
                }
                self.source.search(&query).await
            }
            PubMedOp::Fetch => self.source.fetch(args.required_str("pmid")?).await,
            PubMedOp::Related => {
                self.source
                    .related(args.required_str("pmid")?, limit)
                    .await
            }
            PubMedOp::ByAuthor => {
                self.source
                    .by_author(args.required_str("author")?, limit, offset)
                    .await
            }
        }
    }
}
