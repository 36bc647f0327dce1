// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! Project restart (spec §4.7): stop every listed project, then start every one that's now
//! stopped, without tearing down components shared by projects that stay running throughout.

use crate::error::ApiError;
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use cplane_core::Error;
use serde::Deserialize;

pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/projects/restart", post(restart))
}

#[derive(Deserialize)]
struct RestartRequest {
    ids: Vec<String>,
    #[serde(default = "default_reason")]
    reason: String,
}

fn default_reason() -> String {
    "manual".to_string()
}

async fn restart(State(state): State<AppState>, Json(body): Json<RestartRequest>) -> Result<impl IntoResponse, ApiError> {
    if !state.is_leader {
        return Err(ApiError(Error::Conflict {
            context: cplane_core::Context::default(),
            message: "this node is a follower; submit restarts to the leader".to_string(),
        }));
    }
    state.pcm.restart_projects(&body.ids, &body.reason).await?;
    Ok(StatusCode::OK)
}
