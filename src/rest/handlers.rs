//! REST handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::AppState;
use crate::models::{ToolDescriptor, ToolRequest, ToolResult};

pub(super) async fn health() -> &'static str {
    "ok"
}

pub(super) async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolDescriptor>> {
    Json(state.dispatcher.tools().into_iter().cloned().collect())
}

pub(super) async fn invoke(
    State(state): State<AppState>,
    Json(request): Json<ToolRequest>,
) -> Json<ToolResult> {
    Json(state.dispatcher.invoke(&request).await)
}

/// `?query=..&max_results=..`
#[derive(Debug, Deserialize)]
pub(super) struct SearchParams {
    query: String,
    max_results: Option<u64>,
}

impl SearchParams {
    fn into_request(self, tool: &str) -> ToolRequest {
        let request = ToolRequest::new(tool).arg("query", self.query);
        match self.max_results {
            Some(limit) => request.arg("limit", limit),
            None => request,
        }
    }
}

pub(super) async fn pubmed_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<ToolResult> {
    let request = params.into_request("pubmed_search");
    Json(state.dispatcher.invoke(&request).await)
}

pub(super) async fn pubmed_abstract(
    State(state): State<AppState>,
    Path(pmid): Path<String>,
) -> Json<ToolResult> {
    let request = ToolRequest::new("pubmed_fetch").arg("pmid", pmid);
    Json(state.dispatcher.invoke(&request).await)
}

pub(super) async fn clinicaltrials_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<ToolResult> {
    let request = params.into_request("clinicaltrials_search");
    Json(state.dispatcher.invoke(&request).await)
}

pub(super) async fn clinicaltrials_trial(
    State(state): State<AppState>,
    Path(nct_id): Path<String>,
) -> Json<ToolResult> {
    let request = ToolRequest::new("clinicaltrials_fetch").arg("nct_id", nct_id);
    Json(state.dispatcher.invoke(&request).await)
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerParams {
    server: Option<String>,
}

pub(super) async fn biorxiv_preprint(
    State(state): State<AppState>,
    Path(doi): Path<String>,
    Query(params): Query<ServerParams>,
) -> Json<ToolResult> {
    let mut request = ToolRequest::new("biorxiv_fetch").arg("doi", doi);
    if let Some(server) = params.server {
        request = request.arg("server", server);
    }
    Json(state.dispatcher.invoke(&request).await)
}

#[derive(Debug, Deserialize)]
pub(super) struct RecentParams {
    server: Option<String>,
    days: Option<u64>,
    max_results: Option<u64>,
    category: Option<String>,
}

pub(super) async fn biorxiv_recent(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> Json<ToolResult> {
    let mut request = ToolRequest::new("biorxiv_recent");
    if let Some(server) = params.server {
        request = request.arg("server", server);
    }
    if let Some(days) = params.days {
        request = request.arg("days", days);
    }
    if let Some(limit) = params.max_results {
        request = request.arg("limit", limit);
    }
    if let Some(category) = params.category {
        request = request.arg("category", category);
    }
    Json(state.dispatcher.invoke(&request).await)
}
