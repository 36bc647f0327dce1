// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! Batch apply (spec §4.6): verify every change in the request as a unit, then apply them in
//! dependency order.

use crate::error::ApiError;
use crate::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use cplane_core::{ComponentKind, Error};
use cplane_pending::{ApplyOrigin, ChangeOp, PendingChange};
use serde::Deserialize;

pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/batch/apply", post(apply_batch))
}

#[derive(Deserialize)]
struct BatchChange {
    kind: String,
    id: String,
    raw: Option<String>,
}

#[derive(Deserialize)]
struct BatchRequest {
    changes: Vec<BatchChange>,
}

async fn apply_batch(State(state): State<AppState>, Json(body): Json<BatchRequest>) -> Result<impl IntoResponse, ApiError> {
    if !state.is_leader {
        return Err(ApiError(Error::Conflict {
            context: cplane_core::Context::default(),
            message: "this node is a follower; submit writes to the leader".to_string(),
        }));
    }

    let mut changes = Vec::with_capacity(body.changes.len());
    for change in body.changes {
        let kind = ComponentKind::parse(&change.kind)
            .ok_or_else(|| ApiError(Error::validation(format!("unknown component kind '{}'", change.kind))))?;
        let op = match change.raw {
            Some(raw) => ChangeOp::Upsert { raw },
            None => ChangeOp::Delete,
        };
        changes.push(PendingChange { kind, id: change.id, op });
    }

    let outcome = state.pcm.apply_batch(changes, ApplyOrigin::Local).await?;
    Ok(Json(outcome))
}
