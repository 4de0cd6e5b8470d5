//! HTTP exposition surface
//!
//! `/metrics` drives one full retrieval cycle (topology discovery, then
//! role verification against whatever primary that cycle captured) before
//! rendering the registry. `/health` is a plain liveness probe. Concurrent
//! scrapes are safe: all published state lives in atomic instruments, and
//! the CPU baseline has its own narrow lock.

use crate::metrics::ExporterMetrics;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;
use tracing::warn;

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<ExporterMetrics>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/metrics", get(scrape))
        .with_state(state)
}

async fn scrape(State(state): State<AppState>) -> Response {
    let snap = state.metrics.topology.discover().await;
    state.metrics.roles.verify(snap.primary.as_ref()).await;

    match render(&state.metrics.registry) {
        Ok(body) => ([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            warn!("metrics encoding failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub(crate) fn render(registry: &Registry) -> prometheus::Result<String> {
    let mut buf = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
