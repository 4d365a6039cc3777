//! Thin axum demo binary wiring an ingress adapter in front of
//! `waf-core` (spec §1: the HTTP framework adapter is an external
//! collaborator; this crate is a minimal, explicitly-not-tested demo
//! of that seam, not part of the core's contract).
//!
//! Exposes `/health`, `/metrics`, and a catch-all route that runs the
//! full request-analysis pipeline and either lets the request through
//! or short-circuits with the 403 body from spec §4.9.

mod ingress;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use waf_common::config::WafConfig;
use waf_core::{Decision, WafCore};

use crate::ingress::AxumIngressRequest;

#[derive(Clone)]
struct AppState {
    core: Arc<WafCore>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = WafConfig::default();
    let core = Arc::new(WafCore::new(config));
    spawn_event_logger(&core);

    let state = AppState { core };

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .fallback(firewall)
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!(%addr, "waf-service listening");
    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("axum server");
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.core.metrics.render() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Catch-all: runs the pipeline, then either signals "continue" (here,
/// a placeholder 200 — wiring an actual upstream proxy is outside the
/// core's scope) or returns the spec §4.9 403 JSON body.
async fn firewall(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> impl IntoResponse {
    let request = AxumIngressRequest::from_parts(&method, &uri, &headers, connect_info.as_ref(), body);

    match state.core.analyze_request(&request).await {
        Decision::Allow => StatusCode::OK.into_response(),
        Decision::Block(response) => (StatusCode::FORBIDDEN, Json(response)).into_response(),
    }
}

/// Listens on the core's event bus and logs every emitted event —
/// the design note in spec §9 requires listeners not block the
/// request path, so this runs on its own task reading from a
/// broadcast receiver.
fn spawn_event_logger(core: &Arc<WafCore>) {
    let mut events = core.events.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(?event, "waf event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event logger lagged, dropped events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
