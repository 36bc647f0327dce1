// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! The HTTP Surface (spec §4.10): component CRUD, batch apply, project restart, journal and
//! error-log queries, cluster membership, and the follower-side sync intake route, composed the
//! way the teacher composes its admin server — per-resource route modules merged into one
//! `Router<AppState>`, served with graceful shutdown on a [`CancellationToken`].

mod auth;
mod batch;
mod cluster;
mod components;
pub mod error;
mod errorlog;
mod health;
mod journal;
mod projects;
mod sync_intake;

use axum::middleware;
use axum::Router;
use cplane_catalog::Catalog;
use cplane_errorlog::ErrorLogAggregator;
use cplane_journal::Journal;
use cplane_membership::Membership;
use cplane_pending::Pcm;
use cplane_sync::SyncBus;
use cplane_telemetry::otel_info;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Errors standing up the HTTP surface.
#[derive(Error, Debug)]
pub enum ServeError {
    /// `bind_address` could not be parsed as a socket address.
    #[error("invalid bind address '{bind_address}': {details}")]
    InvalidBindAddress {
        /// The address that failed to parse.
        bind_address: String,
        /// Parse error details.
        details: String,
    },
    /// The TCP listener could not be bound.
    #[error("failed to bind HTTP server on '{addr}': {details}")]
    BindFailed {
        /// The address that failed to bind.
        addr: String,
        /// Bind error details.
        details: String,
    },
    /// The server exited with an error while serving.
    #[error("HTTP server error on '{addr}': {details}")]
    ServerError {
        /// The address the server was bound to.
        addr: String,
        /// Server error details.
        details: String,
    },
}

/// Shared state every handler reads from.
#[derive(Clone)]
struct AppState {
    catalog: Arc<Catalog>,
    pcm: Arc<Pcm>,
    sync: Arc<SyncBus>,
    journal: Arc<Journal>,
    errorlog: Arc<ErrorLogAggregator>,
    membership: Arc<Membership>,
    auth_token: Arc<str>,
    is_leader: bool,
}

/// Everything [`run`] needs to wire up the HTTP surface.
pub struct Dependencies {
    /// The Config Store.
    pub catalog: Arc<Catalog>,
    /// The Pending-Change Manager.
    pub pcm: Arc<Pcm>,
    /// The Synchronization Bus (used here only for follower-side intake; fan-out is driven
    /// directly by the PCM's [`cplane_pending::ChangePublisher`]).
    pub sync: Arc<SyncBus>,
    /// The Operations Journal.
    pub journal: Arc<Journal>,
    /// The Error-Log Aggregator.
    pub errorlog: Arc<ErrorLogAggregator>,
    /// Cluster membership.
    pub membership: Arc<Membership>,
    /// The cluster-wide shared auth token.
    pub auth_token: String,
    /// Whether this node is the cluster leader (gates write routes).
    pub is_leader: bool,
}

/// Binds `bind_address` and serves the HTTP surface until `cancel` fires.
///
/// # Errors
/// Returns [`ServeError`] if the address is invalid, the listener can't be bound, or the server
/// exits with an I/O error.
pub async fn run(bind_address: &str, deps: Dependencies, cancel: CancellationToken) -> Result<(), ServeError> {
    let state = AppState {
        catalog: deps.catalog,
        pcm: deps.pcm,
        sync: deps.sync,
        journal: deps.journal,
        errorlog: deps.errorlog,
        membership: deps.membership,
        auth_token: Arc::from(deps.auth_token.as_str()),
        is_leader: deps.is_leader,
    };

    let authenticated = Router::new()
        .merge(components::routes())
        .merge(projects::routes())
        .merge(batch::routes())
        .merge(journal::routes())
        .merge(errorlog::routes())
        .merge(cluster::routes())
        .merge(sync_intake::routes())
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_token));

    let app = Router::new().merge(health::routes()).merge(authenticated).with_state(state);

    let addr = bind_address
        .parse::<SocketAddr>()
        .map_err(|e| ServeError::InvalidBindAddress { bind_address: bind_address.to_string(), details: e.to_string() })?;

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ServeError::BindFailed { addr: addr.to_string(), details: e.to_string() })?;

    otel_info!("http.listening", addr = %addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| ServeError::ServerError { addr: addr.to_string(), details: e.to_string() })
}
