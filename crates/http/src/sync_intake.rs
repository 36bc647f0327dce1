// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! Follower-side sync intake: the HTTP half of the Synchronization Bus's delivery path (the
//! other half is the pub/sub drain task spawned directly against [`cplane_sync::SyncBus`]).

use crate::error::ApiError;
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use cplane_sync::SyncInstruction;

pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/component-sync", post(intake))
}

async fn intake(State(state): State<AppState>, Json(instruction): Json<SyncInstruction>) -> Result<impl IntoResponse, ApiError> {
    state.sync.handle_intake(instruction).await?;
    Ok(StatusCode::OK)
}
