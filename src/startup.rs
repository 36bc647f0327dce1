// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! Node bring-up: connect to the coordination store, reconcile the on-disk Config Store,
//! construct every persisted component through the unified lifecycle path, and serve the HTTP
//! surface until cancelled.

use crate::config::{Config, CoordinationStoreConfig};
use cplane_catalog::Catalog;
use cplane_core::ComponentKind;
use cplane_coordination::{CoordinationStore, MemoryStore, RedisStore};
use cplane_depgraph::DepGraph;
use cplane_errorlog::{ErrorLogAggregator, ErrorLogUploader};
use cplane_journal::Journal;
use cplane_lifecycle::{LifecycleAdapter, StaticRuntime};
use cplane_membership::{Membership, Role};
use cplane_pending::Pcm;
use cplane_sync::SyncBus;
use cplane_telemetry::{otel_info, otel_warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const LEADER_TOKEN_KEY: &str = "cluster:leader:token";

/// Errors bringing a node up. Every variant is fatal (spec §6: startup errors exit `1`).
#[derive(Error, Debug)]
pub enum StartupError {
    /// Could not connect to the configured coordination store.
    #[error("failed to connect to the coordination store: {0}")]
    CoordinationStore(String),
    /// A follower could not fetch the shared auth token from the coordination store.
    #[error("cannot reach coordination store to fetch cluster token (fatal for a follower)")]
    CannotFetchToken,
    /// Reconciling the on-disk Config Store failed.
    #[error("failed to scan the config root: {0}")]
    DiskScan(String),
    /// Constructing a persisted component failed.
    #[error("failed to bring up persisted component: {0}")]
    Reconcile(String),
    /// The HTTP surface failed to start.
    #[error("HTTP surface error: {0}")]
    Http(#[from] cplane_http::ServeError),
}

async fn connect_store(cfg: &CoordinationStoreConfig) -> Result<Arc<dyn CoordinationStore>, StartupError> {
    match cfg {
        CoordinationStoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        CoordinationStoreConfig::Redis { url } => {
            let store = RedisStore::connect(url).await.map_err(|e| StartupError::CoordinationStore(e.to_string()))?;
            Ok(Arc::new(store))
        }
    }
}

/// Publishes (leader) or fetches (follower) the cluster-wide shared token at
/// [`LEADER_TOKEN_KEY`], per spec §6's coordination-store key table.
async fn resolve_cluster_token(cfg: &Config, store: &dyn CoordinationStore) -> Result<String, StartupError> {
    if cfg.is_leader {
        store
            .set(LEADER_TOKEN_KEY, &cfg.token, None)
            .await
            .map_err(|e| StartupError::CoordinationStore(e.to_string()))?;
        Ok(cfg.token.clone())
    } else {
        store
            .get(LEADER_TOKEN_KEY)
            .await
            .map_err(|_| StartupError::CannotFetchToken)?
            .ok_or(StartupError::CannotFetchToken)
    }
}

/// Constructs and starts every component already present on disk, in dependency order, so a
/// restarted node converges back to the state its config root describes.
async fn bring_up_persisted_components(catalog: &Catalog, lifecycle: &LifecycleAdapter) -> Result<(), StartupError> {
    for kind in ComponentKind::APPLY_ORDER {
        for instance in catalog.list_all(kind) {
            let constructed = lifecycle
                .construct(kind, &instance.id, &instance.raw)
                .await
                .map_err(|e| StartupError::Reconcile(e.to_string()))?;
            catalog.set(kind, constructed).map_err(|e| StartupError::Reconcile(e.to_string()))?;
            lifecycle.start(kind, &instance.id).await.map_err(|e| StartupError::Reconcile(e.to_string()))?;
        }
    }
    Ok(())
}

/// Spawns the follower-side heartbeat sender: POSTs to the leader's `/cluster/heartbeat` every
/// `interval`, until `cancel` fires. A failed heartbeat is logged and retried on the next tick —
/// Cluster Membership's sweeper is what actually marks this node unhealthy on the leader side if
/// these keep failing.
fn spawn_heartbeat_sender(self_address: String, leader_address: String, token: String, interval: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let url = format!("http://{leader_address}/cluster/heartbeat");
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let body = serde_json::json!({ "node_id": self_address, "role": "follower" });
                    let result = client.post(&url).bearer_auth(&token).json(&body).send().await;
                    match result {
                        Ok(resp) if resp.status().is_success() => {}
                        Ok(resp) => otel_warn!("hubd.heartbeat_rejected", status = %resp.status()),
                        Err(e) => otel_warn!("hubd.heartbeat_unreachable", error = %e),
                    }
                }
            }
        }
    });
}

/// Brings a node fully up and serves it until `cancel` fires.
///
/// # Errors
/// Returns [`StartupError`] for any failure that spec §6 treats as fatal at startup.
pub async fn run_node(cfg: Config, cancel: CancellationToken) -> Result<(), StartupError> {
    let store = connect_store(&cfg.coordination_store).await?;
    let effective_token = resolve_cluster_token(&cfg, store.as_ref()).await?;

    let catalog = Arc::new(Catalog::new(cfg.config_root.clone()));
    catalog.scan_from_disk().map_err(|e| StartupError::DiskScan(e.to_string()))?;

    let depgraph = Arc::new(DepGraph::new(catalog.clone()));
    let runtime = Arc::new(StaticRuntime::new());
    let lifecycle = Arc::new(LifecycleAdapter::new(catalog.clone(), depgraph.clone(), runtime));

    bring_up_persisted_components(&catalog, &lifecycle).await?;
    depgraph.rebuild();

    let journal = Arc::new(Journal::new(store.clone()));
    let pcm = Arc::new(Pcm::new(catalog.clone(), depgraph.clone(), lifecycle.clone(), journal.clone(), cfg.self_address.clone()));

    let membership = Arc::new(Membership::new(cfg.unhealthy_after()));
    let self_role = if cfg.is_leader { Role::Leader } else { Role::Follower };
    membership.update_heartbeat(cfg.self_address.clone(), self_role);
    membership.clone().spawn_sweeper(cfg.heartbeat_interval(), cancel.clone());

    let sync_bus = Arc::new(SyncBus::new(store.clone(), membership.clone(), pcm.clone(), effective_token.clone()));
    if cfg.is_leader {
        pcm.set_publisher(sync_bus.clone());
    } else {
        sync_bus.clone().spawn_follower_intake(cancel.clone()).await.map_err(|e| StartupError::CoordinationStore(e.to_string()))?;
        if let Some(leader_address) = &cfg.leader_address {
            spawn_heartbeat_sender(
                cfg.self_address.clone(),
                leader_address.clone(),
                effective_token.clone(),
                cfg.heartbeat_interval(),
                cancel.clone(),
            );
        }
    }

    let hub_log_uploader = Arc::new(ErrorLogUploader::new(cfg.self_address.clone(), cfg.log_dir.join("hub.log"), store.clone()));
    hub_log_uploader.spawn(cancel.clone());
    let plugin_log_uploader = Arc::new(ErrorLogUploader::new(cfg.self_address.clone(), cfg.log_dir.join("plugin.log"), store.clone()));
    plugin_log_uploader.spawn(cancel.clone());
    let errorlog = Arc::new(ErrorLogAggregator::new(store.clone()));

    otel_info!("hubd.ready", bind_address = %cfg.bind_address);

    let deps = cplane_http::Dependencies {
        catalog,
        pcm,
        sync: sync_bus,
        journal,
        errorlog,
        membership,
        auth_token: effective_token,
        is_leader: cfg.is_leader,
    };

    cplane_http::run(&cfg.bind_address, deps, cancel).await?;
    Ok(())
}
