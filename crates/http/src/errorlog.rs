// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! Error-log queries: merged across every node.

use crate::error::ApiError;
use crate::AppState;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use cplane_errorlog::{ErrorLogFilter, ErrorLogSource};
use serde::Deserialize;

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/errorlog", get(list))
        .route("/errorlog/counters", get(counters))
}

#[derive(Deserialize)]
struct ErrorLogQuery {
    node_id: Option<String>,
    source: Option<ErrorLogSource>,
    contains: Option<String>,
    offset: Option<usize>,
    limit: Option<usize>,
}

async fn list(State(state): State<AppState>, Query(query): Query<ErrorLogQuery>) -> Result<impl IntoResponse, ApiError> {
    let filter = ErrorLogFilter {
        node_id: query.node_id,
        source: query.source,
        contains: query.contains,
    };
    let entries = state
        .errorlog
        .list(&filter, query.offset.unwrap_or(0), query.limit.unwrap_or(50))
        .await?;
    Ok(Json(entries))
}

async fn counters(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.errorlog.counters().await?))
}
