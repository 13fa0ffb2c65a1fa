//! Integration tests for the dispatcher and the server transports.
//!
//! Tools are backed by scripted [`MockSource`]s so every path through the
//! dispatcher can be driven without network access.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use biomed_mcp::config::load_config;
use biomed_mcp::mcp::{Dispatcher, McpServer, RegistryError, ToolRegistry};
use biomed_mcp::models::{ErrorKind, SourceKind, ToolRequest, ToolResult};
use biomed_mcp::sources::mock::make_record;
use biomed_mcp::sources::{MockSource, SourceError, SourceRegistry};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn dispatcher_with(mocks: &[Arc<MockSource>], timeout: Duration) -> Dispatcher {
    let mut registry = ToolRegistry::new();
    for mock in mocks {
        registry.register_source(mock.clone()).unwrap();
    }
    Dispatcher::new(Arc::new(registry), timeout)
}

fn single_mock(kind: SourceKind) -> (Arc<MockSource>, Dispatcher) {
    let mock = Arc::new(MockSource::new(kind));
    let dispatcher = dispatcher_with(&[mock.clone()], Duration::from_secs(5));
    (mock, dispatcher)
}

fn search(query: &str) -> ToolRequest {
    ToolRequest::new("mock_search").arg("query", query)
}

mod dispatcher {
    use super::*;

    #[tokio::test]
    async fn test_unknown_tool() {
        let (mock, dispatcher) = single_mock(SourceKind::PubMed);

        let result = dispatcher.invoke(&ToolRequest::new("mock_delete")).await;

        assert_eq!(result.error_kind(), Some(ErrorKind::UnknownTool));
        assert!(result.records.is_empty());
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_required_argument_makes_no_call() {
        let (mock, dispatcher) = single_mock(SourceKind::PubMed);

        let result = dispatcher.invoke(&ToolRequest::new("mock_search")).await;

        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidArgument));
        assert!(result.error.unwrap().message.contains("query"));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_mistyped_argument_rejected() {
        let (mock, dispatcher) = single_mock(SourceKind::PubMed);

        let result = dispatcher.invoke(&search("x").arg("limit", "ten")).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidArgument));

        let result = dispatcher.invoke(&search("x").arg("limit", -1)).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidArgument));

        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_limit_is_empty_success() {
        let (mock, dispatcher) = single_mock(SourceKind::PubMed);
        mock.push_records(vec![make_record(SourceKind::PubMed, "1", "One")]);

        let result = dispatcher.invoke(&search("x").arg("limit", 0)).await;

        assert_eq!(result, ToolResult::empty());
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_limit_clamped_to_source_maximum() {
        let mock = Arc::new(MockSource::new(SourceKind::ClinicalTrials).with_max_results(5));
        let dispatcher = dispatcher_with(&[mock.clone()], Duration::from_secs(5));

        let result = dispatcher.invoke(&search("x").arg("limit", 500)).await;

        assert!(!result.is_error());
        assert_eq!(mock.last_limit(), 5);
    }

    #[tokio::test]
    async fn test_records_keep_upstream_order() {
        let (mock, dispatcher) = single_mock(SourceKind::PubMed);
        mock.push_records(vec![
            make_record(SourceKind::PubMed, "3", "Three"),
            make_record(SourceKind::PubMed, "1", "One"),
            make_record(SourceKind::PubMed, "2", "Two"),
        ]);

        let result = dispatcher.invoke(&search("x")).await;

        let ids: Vec<&str> = result.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[tokio::test]
    async fn test_foreign_and_duplicate_records_dropped() {
        let (mock, dispatcher) = single_mock(SourceKind::PubMed);
        mock.push_records(vec![
            make_record(SourceKind::PubMed, "1", "One"),
            make_record(SourceKind::BioRxiv, "10.1101/x", "Preprint"),
            make_record(SourceKind::PubMed, "1", "One again"),
        ]);

        let result = dispatcher.invoke(&search("x")).await;

        assert_eq!(result.records.len(), 1);
        assert!(result.records.iter().all(|r| r.source == SourceKind::PubMed));
    }

    #[tokio::test]
    async fn test_rate_limit_then_success_retries_once() {
        let (mock, dispatcher) = single_mock(SourceKind::PubMed);
        mock.push_error(SourceError::rate_limited("429", None));
        mock.push_records(vec![make_record(SourceKind::PubMed, "1", "One")]);

        let result = dispatcher.invoke(&search("x")).await;

        assert!(!result.is_error());
        assert_eq!(result.records.len(), 1);
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_twice_surfaces_error() {
        let (mock, dispatcher) = single_mock(SourceKind::PubMed);
        mock.push_error(SourceError::rate_limited("429", Some(Duration::from_millis(20))));
        mock.push_error(SourceError::rate_limited("429", Some(Duration::from_secs(1))));

        let result = dispatcher.invoke(&search("x")).await;

        assert_eq!(result.error_kind(), Some(ErrorKind::UpstreamRateLimited));
        assert_eq!(result.error.unwrap().retry_after_seconds, Some(1));
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_other_errors_not_retried() {
        let (mock, dispatcher) = single_mock(SourceKind::BioRxiv);
        mock.push_error(SourceError::Malformed("truncated JSON".to_string()));

        let result = dispatcher.invoke(&search("x")).await;

        assert_eq!(
            result.error_kind(),
            Some(ErrorKind::UpstreamMalformedResponse)
        );
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_empty_success() {
        let (mock, dispatcher) = single_mock(SourceKind::ClinicalTrials);

        let result = dispatcher
            .invoke(&ToolRequest::new("mock_fetch").arg("id", "NCT00000000"))
            .await;

        assert_eq!(result, ToolResult::empty());
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let mock = Arc::new(MockSource::new(SourceKind::PubMed).with_delay(Duration::from_secs(2)));
        let dispatcher = dispatcher_with(&[mock.clone()], Duration::from_millis(50));

        let result = dispatcher.invoke(&search("x")).await;

        assert_eq!(result.error_kind(), Some(ErrorKind::UpstreamUnavailable));
        assert!(result.error.unwrap().message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_batch_invocations_are_independent() {
        let alpha = Arc::new(MockSource::new(SourceKind::PubMed).with_prefix("alpha"));
        let beta = Arc::new(MockSource::new(SourceKind::ClinicalTrials).with_prefix("beta"));
        let dispatcher = dispatcher_with(&[alpha.clone(), beta.clone()], Duration::from_secs(5));

        alpha.push_error(SourceError::Unavailable("connection reset".to_string()));
        beta.push_records(vec![make_record(SourceKind::ClinicalTrials, "NCT00000001", "Trial")]);

        let results = dispatcher
            .invoke_batch(&[
                ToolRequest::new("alpha_search").arg("query", "a"),
                ToolRequest::new("beta_search").arg("query", "b"),
                ToolRequest::new("gamma_search").arg("query", "c"),
            ])
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].error_kind(), Some(ErrorKind::UpstreamUnavailable));
        assert!(!results[1].is_error());
        assert_eq!(results[1].records[0].id, "NCT00000001");
        assert_eq!(results[2].error_kind(), Some(ErrorKind::UnknownTool));
    }

    #[test]
    fn test_duplicate_tool_names_rejected() {
        let mut registry = ToolRegistry::new();
        registry
            .register_source(Arc::new(MockSource::new(SourceKind::PubMed)))
            .unwrap();

        let err = registry
            .register_source(Arc::new(MockSource::new(SourceKind::BioRxiv)))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTool("mock_search".to_string()));
    }

    #[test]
    fn test_default_catalog() {
        let sources = SourceRegistry::from_config(&Default::default()).unwrap();
        let tools = ToolRegistry::from_sources(&sources).unwrap();

        for name in [
            "pubmed_search",
            "pubmed_fetch",
            "pubmed_related",
            "pubmed_by_author",
            "clinicaltrials_search",
            "clinicaltrials_fetch",
            "clinicaltrials_by_condition",
            "clinicaltrials_by_location",
            "biorxiv_search",
            "biorxiv_fetch",
            "biorxiv_published_version",
            "biorxiv_recent",
        ] {
            assert!(tools.get(name).is_some(), "missing tool {}", name);
        }
        assert_eq!(tools.len(), 12);
    }
}

mod rest {
    use super::*;
    use biomed_mcp::rest::router;

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_, dispatcher) = single_mock(SourceKind::PubMed);
        let app = router(dispatcher, Duration::from_secs(5));

        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_list_tools() {
        let (_, dispatcher) = single_mock(SourceKind::PubMed);
        let app = router(dispatcher, Duration::from_secs(5));

        let response = app.oneshot(get("/tools")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["mock_search", "mock_fetch"]);
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let (mock, dispatcher) = single_mock(SourceKind::PubMed);
        mock.push_records(vec![make_record(SourceKind::PubMed, "42", "Answer")]);
        let app = router(dispatcher, Duration::from_secs(5));

        let body = json!({"tool": "mock_search", "arguments": {"query": "life"}}).to_string();
        let response = app.oneshot(post_json("/invoke", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["records"][0]["id"], "42");
        assert_eq!(body["records"][0]["source"], "PubMed");
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_invoke_error_is_in_band() {
        let (_, dispatcher) = single_mock(SourceKind::PubMed);
        let app = router(dispatcher, Duration::from_secs(5));

        let response = app
            .oneshot(post_json("/invoke", r#"{"tool": "no_such_tool"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["error"]["kind"], "UnknownToolError");
        assert_eq!(body["records"], json!([]));
    }

    #[tokio::test]
    async fn test_malformed_body_rejected_before_dispatch() {
        let (mock, dispatcher) = single_mock(SourceKind::PubMed);
        let app = router(dispatcher, Duration::from_secs(5));

        let response = app
            .clone()
            .oneshot(post_json("/invoke", "not json"))
            .await
            .unwrap();
        assert!(response.status().is_client_error());

        let response = app
            .oneshot(post_json("/invoke", r#"{"arguments": {}}"#))
            .await
            .unwrap();
        assert!(response.status().is_client_error());

        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_search_shorthand_maps_max_results() {
        let mock = Arc::new(MockSource::new(SourceKind::PubMed).with_prefix("pubmed"));
        let dispatcher = dispatcher_with(&[mock.clone()], Duration::from_secs(5));
        let app = router(dispatcher, Duration::from_secs(5));

        let response = app
            .oneshot(get("/pubmed/search?query=crispr&max_results=3"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(mock.last_limit(), 3);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_request_deadline() {
        let mock = Arc::new(MockSource::new(SourceKind::PubMed).with_delay(Duration::from_secs(2)));
        let dispatcher = dispatcher_with(&[mock.clone()], Duration::from_secs(5));
        let app = router(dispatcher, Duration::from_millis(50));

        let body = json!({"tool": "mock_search", "arguments": {"query": "slow"}}).to_string();
        let response = app.oneshot(post_json("/invoke", &body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}

mod mcp {
    use super::*;

    #[test]
    fn test_server_builds_from_registry() {
        let (_, dispatcher) = single_mock(SourceKind::PubMed);
        assert!(McpServer::new(dispatcher, Duration::from_secs(5)).is_ok());
    }
}

mod config {
    use super::*;

    #[test]
    fn test_config_file_drives_registry() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[sources.pubmed]
enabled = false

[sources.biorxiv]
max_results = 25
"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert!(!config.sources.pubmed.enabled);
        assert_eq!(config.sources.biorxiv.max_results, 25);

        let sources = SourceRegistry::from_config(&config).unwrap();
        let tools = ToolRegistry::from_sources(&sources).unwrap();
        assert!(tools.get("pubmed_search").is_none());
        assert!(tools.get("biorxiv_search").is_some());
    }
}
