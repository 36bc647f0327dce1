// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! The Synchronization Bus (spec §4.7): the leader fans a change out over a coordination-store
//! pub/sub channel and by direct HTTP POST to every healthy follower; a follower drains both the
//! channel and its HTTP intake route into the same unified reload path ([`Pcm::apply_single`]
//! with [`ApplyOrigin::Sync`]) so it never matters which path delivered the change.

use cplane_coordination::CoordinationStore;
use cplane_core::{ComponentKind, Error};
use cplane_membership::Membership;
use cplane_pending::{ApplyOrigin, ChangeOp, ChangePublisher, Pcm, PendingChange};
use cplane_telemetry::otel_warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SYNC_CHANNEL: &str = "cluster:instructions";
const RETRY_BACKOFFS: [Duration; 3] = [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(3)];

/// One change as it travels over the bus: either side of [`ChangeOp`], flattened to something
/// `serde_json` can round-trip without needing `ChangeOp` itself to derive `Serialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncInstruction {
    /// The component kind.
    pub kind: ComponentKind,
    /// The component id.
    pub id: String,
    /// The new raw text, or `None` for a delete.
    pub raw: Option<String>,
    /// Projects the leader found referencing `(kind, id)` and running at apply time. A follower
    /// restarts whichever of these it runs itself, rather than recomputing the closure locally,
    /// so its restarted set always matches the leader's apply-time decision.
    #[serde(default)]
    pub affected_projects: Vec<String>,
}

impl SyncInstruction {
    fn into_change(self) -> PendingChange {
        PendingChange {
            kind: self.kind,
            id: self.id,
            op: match self.raw {
                Some(raw) => ChangeOp::Upsert { raw },
                None => ChangeOp::Delete,
            },
        }
    }
}

/// The Synchronization Bus.
pub struct SyncBus {
    store: Arc<dyn CoordinationStore>,
    membership: Arc<Membership>,
    pcm: Arc<Pcm>,
    http: reqwest::Client,
    auth_token: String,
}

impl SyncBus {
    /// Builds a bus over `store` and `membership`, intaking into `pcm`. `auth_token` is sent as
    /// a bearer token on outbound follower POSTs (the same token followers check on the sync
    /// intake route).
    #[must_use]
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        membership: Arc<Membership>,
        pcm: Arc<Pcm>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            store,
            membership,
            pcm,
            http: reqwest::Client::new(),
            auth_token: auth_token.into(),
        }
    }

    /// Spawns the follower-side pub/sub drain task: subscribes to [`SYNC_CHANNEL`] and applies
    /// every instruction received through [`Pcm::apply_single`] with [`ApplyOrigin::Sync`], until
    /// `cancel` fires.
    ///
    /// # Errors
    /// Returns [`Error::Store`] if the initial subscribe fails.
    pub async fn spawn_follower_intake(self: Arc<Self>, cancel: CancellationToken) -> Result<(), Error> {
        let mut rx = self
            .store
            .subscribe(SYNC_CHANNEL)
            .await
            .map_err(|e| Error::Store { message: e.to_string() })?;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = rx.recv() => {
                        let Some(payload) = received else { break };
                        if let Ok(instruction) = serde_json::from_str::<SyncInstruction>(&payload) {
                            if let Err(err) = self.apply_and_restart(instruction).await {
                                otel_warn!("sync.apply_from_bus_failed", error = %err);
                            }
                        }
                    }
                }
            }
        });
        Ok(())
    }

    /// Applies an instruction delivered directly over HTTP (the follower-side sync intake
    /// route), through the same unified reload path as the pub/sub drain task.
    ///
    /// # Errors
    /// Returns whatever [`Pcm::apply_single`] returns.
    pub async fn handle_intake(&self, instruction: SyncInstruction) -> Result<(), Error> {
        self.apply_and_restart(instruction).await
    }

    /// Applies `instruction` through the unified reload path, then restarts whichever of its
    /// `affected_projects` this node actually runs (spec §4.8: followers restart their copies of
    /// the leader-computed affected set, not a locally recomputed one).
    async fn apply_and_restart(&self, instruction: SyncInstruction) -> Result<(), Error> {
        let affected = instruction.affected_projects.clone();
        self.pcm.apply_single(instruction.into_change(), ApplyOrigin::Sync).await?;
        if !affected.is_empty() {
            self.pcm.restart_projects(&affected, "sync").await?;
        }
        Ok(())
    }

    async fn fan_out(&self, instruction: SyncInstruction) {
        let payload = match serde_json::to_string(&instruction) {
            Ok(p) => p,
            Err(e) => {
                otel_warn!("sync.encode_failed", error = %e);
                return;
            }
        };

        if let Err(e) = self.store.publish(SYNC_CHANNEL, &payload).await {
            otel_warn!("sync.publish_failed", error = %e);
        }

        for follower in self.membership.healthy_followers() {
            self.post_with_retry(&follower, &payload).await;
        }
    }

    async fn post_with_retry(&self, follower: &str, payload: &str) {
        let url = format!("http://{follower}/component-sync");
        let mut attempt = 0;
        loop {
            let result = self
                .http
                .post(&url)
                .bearer_auth(&self.auth_token)
                .header("content-type", "application/json")
                .body(payload.to_string())
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => return,
                Ok(resp) => {
                    otel_warn!("sync.follower_rejected", follower, status = %resp.status());
                }
                Err(e) => {
                    otel_warn!("sync.follower_unreachable", follower, error = %e);
                }
            }

            if attempt >= RETRY_BACKOFFS.len() {
                otel_warn!("sync.follower_retries_exhausted", follower);
                return;
            }
            tokio::time::sleep(RETRY_BACKOFFS[attempt]).await;
            attempt += 1;
        }
    }
}

#[async_trait::async_trait]
impl ChangePublisher for SyncBus {
    async fn publish_upsert(&self, kind: ComponentKind, id: &str, raw: &str, affected_projects: &[String]) {
        self.fan_out(SyncInstruction {
            kind,
            id: id.to_string(),
            raw: Some(raw.to_string()),
            affected_projects: affected_projects.to_vec(),
        })
        .await;
    }

    async fn publish_delete(&self, kind: ComponentKind, id: &str, affected_projects: &[String]) {
        self.fan_out(SyncInstruction {
            kind,
            id: id.to_string(),
            raw: None,
            affected_projects: affected_projects.to_vec(),
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_round_trips_through_json() {
        let instr = SyncInstruction {
            kind: ComponentKind::Input,
            id: "i1".to_string(),
            raw: Some("type: kafka".to_string()),
            affected_projects: vec!["p1".to_string()],
        };
        let encoded = serde_json::to_string(&instr).unwrap();
        let decoded: SyncInstruction = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.id, "i1");
        assert!(decoded.raw.is_some());
        assert_eq!(decoded.affected_projects, vec!["p1".to_string()]);
    }

    #[test]
    fn delete_instruction_converts_to_delete_op() {
        let instr = SyncInstruction {
            kind: ComponentKind::Output,
            id: "o1".to_string(),
            raw: None,
            affected_projects: Vec::new(),
        };
        let change = instr.into_change();
        assert!(matches!(change.op, ChangeOp::Delete));
    }
}
