//! ClinicalTrials.gov source implementation (API v2).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::config::ClinicalTrialsConfig;
use crate::mcp::{Arguments, Tool, ToolHandler};
use crate::models::{Page, ParamSpec, Record, RecordBuilder, SourceKind, ToolDescriptor};
use crate::sources::{clamp_limit, Source, SourceError};
use crate::utils::{validate_nct_id, HttpClient, RetryConfig};

const STUDY_URL: &str = "https://clinicaltrials.gov/study";

/// Which study field a search matches against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyField {
    /// Free text over the whole record (`query.term`)
    Term,
    /// Conditions and diseases (`query.cond`)
    Condition,
    /// Facility location (`query.locn`)
    Location,
}

impl StudyField {
    fn param(self) -> &'static str {
        match self {
            StudyField::Term => "query.term",
            StudyField::Condition => "query.cond",
            StudyField::Location => "query.locn",
        }
    }
}

/// ClinicalTrials.gov source
#[derive(Debug, Clone)]
pub struct ClinicalTrialsSource {
    client: HttpClient,
    base_url: String,
    max_results: usize,
}

impl ClinicalTrialsSource {
    pub fn new(config: &ClinicalTrialsConfig, retry: RetryConfig) -> Result<Self, SourceError> {
        let client = HttpClient::new(SourceKind::ClinicalTrials, config.timeout())?
            .with_rate_limit(config.requests_per_second)
            .with_retry(retry);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_results: config.max_results,
        })
    }

    /// Search studies; the cursor is the upstream `nextPageToken`
    pub async fn search(
        &self,
        field: StudyField,
        text: &str,
        limit: usize,
        cursor: Option<&str>,
        status: Option<&str>,
    ) -> Result<Page, SourceError> {
        let limit = clamp_limit(limit, self.max_results, SourceKind::ClinicalTrials);
        if limit == 0 {
            return Ok(Page::empty());
        }

        let params = Self::search_params(field, text, limit, cursor, status);
        let response: StudiesResponse = self
            .client
            .get_json(&format!("{}/studies", self.base_url), &params)
            .await?;

        let records = response
            .studies
            .into_iter()
            .map(Self::parse_study)
            .collect::<Result<Vec<_>, _>>()?;

        let cursor = response.next_page_token.filter(|token| !token.is_empty());
        Ok(Page::new(records).cursor(cursor))
    }

    /// Fetch one study by NCT ID
    pub async fn fetch(&self, nct_id: &str) -> Result<Page, SourceError> {
        let nct_id = validate_nct_id(nct_id)?;
        let params = [("format", "json".to_string())];

        let study: Value = self
            .client
            .get_json(&format!("{}/studies/{}", self.base_url, nct_id), &params)
            .await?;

        Ok(Page::single(Self::parse_study(study)?))
    }

    fn search_params(
        field: StudyField,
        text: &str,
        limit: usize,
        cursor: Option<&str>,
        status: Option<&str>,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            (field.param(), text.to_string()),
            ("pageSize", limit.to_string()),
            ("format", "json".to_string()),
        ];

        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            params.push(("pageToken", cursor.to_string()));
        }

        if let Some(status) = status {
            params.push(("filter.overallStatus", normalize_status(status)));
        }

        params
    }

    /// Build a record from one study document, keeping the document as `raw`
    fn parse_study(study: Value) -> Result<Record, SourceError> {
        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Study {
            protocol_section: ProtocolSection,
        }

        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ProtocolSection {
            identification_module: IdentificationModule,
            status_module: Option<StatusModule>,
            description_module: Option<DescriptionModule>,
        }

        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct IdentificationModule {
            nct_id: String,
            brief_title: Option<String>,
            official_title: Option<String>,
        }

        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct StatusModule {
            study_first_post_date_struct: Option<DateStruct>,
            start_date_struct: Option<DateStruct>,
        }

        #[derive(Debug, Deserialize)]
        struct DateStruct {
            date: String,
        }

        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct DescriptionModule {
            brief_summary: Option<String>,
        }

        let parsed = Study::deserialize(&study).map_err(|e| {
            SourceError::Malformed(format!("ClinicalTrials.gov study: {}", e))
        })?;
        let section = parsed.protocol_section;
        let ident = section.identification_module;

        let title = ident
            .brief_title
            .or(ident.official_title)
            .unwrap_or_default();

        let summary = section
            .description_module
            .and_then(|d| d.brief_summary)
            .unwrap_or_default();

        let published_date = section.status_module.and_then(|status| {
            status
                .study_first_post_date_struct
                .or(status.start_date_struct)
                .map(|d| d.date)
        });

        let url = format!("{}/{}", STUDY_URL, ident.nct_id);

        Ok(RecordBuilder::new(SourceKind::ClinicalTrials, ident.nct_id, title.trim(), url)
            .summary(summary.trim())
            .published_date(published_date)
            .raw(study)
            .build())
    }
}

/// `recruiting` / `Not yet recruiting` -> `RECRUITING` / `NOT_YET_RECRUITING`
fn normalize_status(status: &str) -> String {
    status
        .split(',')
        .map(|s| s.trim().to_uppercase().replace([' ', '-'], "_"))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// One page of `/studies`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudiesResponse {
    #[serde(default)]
    studies: Vec<Value>,
    next_page_token: Option<String>,
}

impl Source for ClinicalTrialsSource {
    fn kind(&self) -> SourceKind {
        SourceKind::ClinicalTrials
    }

    fn max_results(&self) -> usize {
        self.max_results
    }

    fn tools(self: Arc<Self>) -> Vec<Tool> {
        [
            TrialsOp::Search,
            TrialsOp::Fetch,
            TrialsOp::ByCondition,
            TrialsOp::ByLocation,
        ]
        .into_iter()
        .map(|op| {
            Tool::new(
                op.descriptor(self.max_results),
                SourceKind::ClinicalTrials,
                Arc::new(TrialsTool {
                    source: Arc::clone(&self),
                    op,
                }),
            )
        })
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrialsOp {
    Search,
    Fetch,
    ByCondition,
    ByLocation,
}

impl TrialsOp {
    fn descriptor(self, max: usize) -> ToolDescriptor {
        let (name, description, text_description) = match self {
            TrialsOp::Fetch => {
                return ToolDescriptor::new(
                    "clinicaltrials_fetch",
                    "Get detailed information about a clinical trial by NCT ID",
                )
                .param(ParamSpec::string("nct_id", "Trial identifier, e.g. NCT04280705").required());
            }
            TrialsOp::Search => (
                "clinicaltrials_search",
                "Search ClinicalTrials.gov for trials matching a query",
                "Search terms",
            ),
            TrialsOp::ByCondition => (
                "clinicaltrials_by_condition",
                "Find clinical trials studying a medical condition",
                "Condition or disease",
            ),
            TrialsOp::ByLocation => (
                "clinicaltrials_by_location",
                "Find clinical trials with sites in a location",
                "City, state or country",
            ),
        };

        ToolDescriptor::new(name, description)
            .param(ParamSpec::string(self.text_param(), text_description).required())
            .param(
                ParamSpec::integer(
                    "limit",
                    &format!("Maximum number of trials (clamped to {})", max),
                )
                .default_value(10),
            )
            .param(ParamSpec::string(
                "cursor",
                "Page token returned by a previous call",
            ))
            .param(ParamSpec::string(
                "status",
                "Overall status filter, e.g. RECRUITING or COMPLETED",
            ))
    }

    fn field(self) -> Option<StudyField> {
        match self {
            TrialsOp::Search => Some(StudyField::Term),
            TrialsOp::ByCondition => Some(StudyField::Condition),
            TrialsOp::ByLocation => Some(StudyField::Location),
            TrialsOp::Fetch => None,
        }
    }

    fn text_param(self) -> &'static str {
        match self {
            TrialsOp::Search => "query",
            TrialsOp::ByCondition => "condition",
            TrialsOp::ByLocation => "location",
            TrialsOp::Fetch => "nct_id",
        }
    }
}

#[derive(Debug)]
struct TrialsTool {
    source: Arc<ClinicalTrialsSource>,
    op: TrialsOp,
}

#[async_trait]
impl ToolHandler for TrialsTool {
    async fn call(&self, args: &Arguments) -> Result<Page, SourceError> {
        let text = args.required_str(self.op.text_param())?;

        match self.op.field() {
            None => self.source.fetch(text).await,
            Some(field) => {
                self.source
                    .search(
                        field,
                        text,
                        args.usize_or("limit", 10),
                        args.str("cursor"),
                        args.str("status"),
                    )
                    .await
            }
        }
    }
}
