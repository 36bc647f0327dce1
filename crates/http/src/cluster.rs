// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! Cluster membership: heartbeat intake and a snapshot of known nodes.

use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use cplane_membership::Role;
use serde::{Deserialize, Serialize};

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/cluster/nodes", get(nodes))
        .route("/cluster/heartbeat", post(heartbeat))
}

#[derive(Serialize)]
struct NodeView {
    node_id: String,
    role: &'static str,
    healthy: bool,
}

async fn nodes(State(state): State<AppState>) -> impl IntoResponse {
    let views: Vec<NodeView> = state
        .membership
        .snapshot()
        .into_iter()
        .map(|n| NodeView {
            node_id: n.node_id.to_string(),
            role: match n.role {
                Role::Leader => "leader",
                Role::Follower => "follower",
            },
            healthy: n.healthy,
        })
        .collect();
    Json(views)
}

#[derive(Deserialize)]
struct HeartbeatRequest {
    node_id: String,
    role: String,
}

async fn heartbeat(State(state): State<AppState>, Json(body): Json<HeartbeatRequest>) -> impl IntoResponse {
    let role = if body.role == "leader" { Role::Leader } else { Role::Follower };
    state.membership.update_heartbeat(body.node_id, role);
    StatusCode::OK
}
