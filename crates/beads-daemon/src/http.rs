// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Optional HTTP listener: the same operation set as the Unix
//! socket, exposed as a minimal JSON-body POST interface, plus the
//! `/events` SSE endpoint. Bound only when
//! `daemon.http_addr` is configured; the Unix socket remains the
//! primary transport and is always available regardless of this one.
//!
//! Router shape — `Arc<AppState>` extractor state, a
//! `Json(req)`-in/`Json(resp)`-out handler per route, `tower_http`'s
//! `TraceLayer`/`CorsLayer` — follows `cloonix-trx`'s `trx-api::main`
//! axum REST surface over an issue store.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::lifecycle::DaemonState;
use crate::protocol::{RequestEnvelope, ResponseEnvelope};
use crate::sse::{event_stream, EventFilter};

/// Builds the router. Token auth (when `state.token` is set) is
/// enforced inside `dispatch_envelope` exactly as it is for the Unix
/// socket, since `/rpc` forwards the caller's envelope there unchanged
/// — one auth check, not two.
pub fn router(state: Arc<DaemonState>) -> Router {
    Router::new()
        .route("/rpc", post(rpc))
        .route("/events", get(events))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn rpc(State(state): State<Arc<DaemonState>>, Json(env): Json<RequestEnvelope>) -> impl IntoResponse {
    let response: ResponseEnvelope = crate::listener::dispatch_envelope(&state, &env).await;
    Json(response)
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    #[serde(default)]
    since: i64,
    #[serde(default)]
    filter: Option<String>,
}

async fn events(
    State(state): State<Arc<DaemonState>>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let filter = query.filter.as_deref().and_then(EventFilter::parse);
    let stream = event_stream(state, query.since, filter).map(|sse_event| {
        let data = serde_json::to_string(&sse_event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event(sse_event.event_type.clone()).data(data))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
