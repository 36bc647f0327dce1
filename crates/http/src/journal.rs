// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! Operations journal queries.

use crate::error::ApiError;
use crate::AppState;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use cplane_core::ComponentKind;
use cplane_journal::JournalFilter;
use serde::Deserialize;

pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/journal", get(list))
}

#[derive(Deserialize)]
struct JournalQuery {
    kind: Option<String>,
    component_id: Option<String>,
    project_id: Option<String>,
    success: Option<bool>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    action: Option<String>,
    node_id: Option<String>,
    keyword: Option<String>,
    offset: Option<usize>,
    limit: Option<usize>,
}

async fn list(State(state): State<AppState>, Query(query): Query<JournalQuery>) -> Result<impl IntoResponse, ApiError> {
    let filter = JournalFilter {
        kind: query.kind.as_deref().and_then(ComponentKind::parse),
        component_id: query.component_id,
        project_id: query.project_id,
        success: query.success,
        start_time: query.start_time,
        end_time: query.end_time,
        action: query.action,
        node_id: query.node_id,
        keyword: query.keyword,
    };
    let records = state
        .journal
        .list(&filter, query.offset.unwrap_or(0), query.limit.unwrap_or(50))
        .await?;
    Ok(Json(records))
}
