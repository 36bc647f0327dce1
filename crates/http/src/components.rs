// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! Component CRUD: stage a draft, apply it, delete it, or inspect its current state. All write
//! routes only make sense on the leader; a follower exposes the same read routes but rejects
//! writes with a [`cplane_core::Error::Conflict`] pointing at the leader-only contract.

use crate::error::ApiError;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use cplane_core::{ComponentKind, Error};
use cplane_pending::{ApplyOrigin, ChangeOp, PendingChange};
use serde::{Deserialize, Serialize};

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/components/{kind}", get(list))
        .route(
            "/components/{kind}/{id}",
            get(get_one).put(stage).delete(delete),
        )
        .route("/components/{kind}/{id}/apply", put(apply))
        .route("/components/{kind}/{id}/start", post(start))
        .route("/components/{kind}/{id}/stop", post(stop))
}

fn parse_kind(raw: &str) -> Result<ComponentKind, ApiError> {
    ComponentKind::parse(raw).ok_or_else(|| ApiError(Error::validation(format!("unknown component kind '{raw}'"))))
}

fn require_leader(state: &AppState) -> Result<(), ApiError> {
    if state.is_leader {
        Ok(())
    } else {
        Err(ApiError(Error::Conflict {
            context: cplane_core::Context::default(),
            message: "this node is a follower; submit writes to the leader".to_string(),
        }))
    }
}

#[derive(Serialize)]
struct ComponentView {
    id: String,
    status: String,
    raw: String,
}

impl From<cplane_catalog::ComponentInstance> for ComponentView {
    fn from(instance: cplane_catalog::ComponentInstance) -> Self {
        Self {
            id: instance.id.to_string(),
            status: format!("{:?}", instance.status).to_lowercase(),
            raw: instance.raw,
        }
    }
}

async fn list(State(state): State<AppState>, Path(kind): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let items: Vec<ComponentView> = state.catalog.list_all(kind).into_iter().map(Into::into).collect();
    Ok(Json(items))
}

async fn get_one(State(state): State<AppState>, Path((kind, id)): Path<(String, String)>) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let instance = state.catalog.get(kind, &id).ok_or_else(|| ApiError(Error::not_found(kind, id.clone())))?;
    Ok(Json(ComponentView::from(instance)))
}

#[derive(Deserialize)]
struct RawBody {
    raw: String,
}

async fn stage(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    Json(body): Json<RawBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_leader(&state)?;
    let kind = parse_kind(&kind)?;
    let created = state.pcm.stage(kind, &id, body.raw)?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "staged": created }))))
}

async fn apply(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    body: Option<Json<RawBody>>,
) -> Result<impl IntoResponse, ApiError> {
    require_leader(&state)?;
    let kind = parse_kind(&kind)?;
    let raw = match body {
        Some(Json(body)) => body.raw,
        None => state
            .catalog
            .get_draft(kind, &id)
            .ok_or_else(|| ApiError(Error::validation("no draft staged and no body provided")))?,
    };
    state
        .pcm
        .apply_single(PendingChange { kind, id, op: ChangeOp::Upsert { raw } }, ApplyOrigin::Local)
        .await?;
    Ok(StatusCode::OK)
}

async fn delete(State(state): State<AppState>, Path((kind, id)): Path<(String, String)>) -> Result<impl IntoResponse, ApiError> {
    require_leader(&state)?;
    let kind = parse_kind(&kind)?;
    state
        .pcm
        .apply_single(PendingChange { kind, id, op: ChangeOp::Delete }, ApplyOrigin::Local)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start(State(state): State<AppState>, Path((kind, id)): Path<(String, String)>) -> Result<impl IntoResponse, ApiError> {
    require_leader(&state)?;
    let kind = parse_kind(&kind)?;
    state.pcm.start(kind, &id).await?;
    Ok(StatusCode::OK)
}

async fn stop(State(state): State<AppState>, Path((kind, id)): Path<(String, String)>) -> Result<impl IntoResponse, ApiError> {
    require_leader(&state)?;
    let kind = parse_kind(&kind)?;
    state.pcm.stop(kind, &id).await?;
    Ok(StatusCode::OK)
}
