//! JSON-over-HTTP server transport.
//!
//! `POST /invoke` takes a Tool Invocation Request and always answers 200 with
//! a Tool Result; failures travel in its `error` field. The per-source GET
//! routes are shorthands that build the request from the path and query.

mod handlers;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::mcp::Dispatcher;

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
}

/// Build the REST router
///
/// `request_timeout` is the transport deadline; when it elapses the
/// in-flight invocation is dropped and the caller gets 408.
pub fn router(dispatcher: Dispatcher, request_timeout: Duration) -> Router {
    let state = AppState { dispatcher };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/tools", get(handlers::list_tools))
        .route("/invoke", post(handlers::invoke))
        .route("/pubmed/search", get(handlers::pubmed_search))
        .route("/pubmed/abstract/{pmid}", get(handlers::pubmed_abstract))
        .route("/clinicaltrials/search", get(handlers::clinicaltrials_search))
        .route("/clinicaltrials/trial/{nct_id}", get(handlers::clinicaltrials_trial))
        .route("/biorxiv/preprint/{*doi}", get(handlers::biorxiv_preprint))
        .route("/biorxiv/search/recent", get(handlers::biorxiv_recent))
        .layer(axum::middleware::from_fn(move |req: Request, next: Next| async move {
            match tokio::time::timeout(request_timeout, next.run(req)).await {
                Ok(response) => response,
                Err(_) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
            }
        }))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the REST transport on `addr` until Ctrl-C
pub async fn serve(addr: &str, dispatcher: Dispatcher, request_timeout: Duration) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("REST server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(dispatcher, request_timeout))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down REST server");
}
