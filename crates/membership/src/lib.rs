// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! Cluster Membership (spec §4.5): a table of known nodes keyed by node id, updated by inbound
//! heartbeats and swept periodically for nodes that have gone quiet.

use chrono::{DateTime, Utc};
use cplane_core::NodeId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Whether a node is the cluster leader or a follower.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The single node accepting writes and fanning out sync instructions.
    Leader,
    /// A read-replica node applying instructions pushed by the leader.
    Follower,
}

/// What the membership table knows about one node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    /// The node's id (its address, per SPEC_FULL §2).
    pub node_id: NodeId,
    /// The node's role as of its last heartbeat.
    pub role: Role,
    /// When the last heartbeat from this node was received.
    pub last_heartbeat: DateTime<Utc>,
    /// Whether the node is currently considered healthy (has heartbeated recently).
    pub healthy: bool,
}

/// The cluster membership table: a process-wide map from node id to [`NodeInfo`], guarded by a
/// single lock since updates are small and reads are snapshot-then-release per spec §5.
pub struct Membership {
    nodes: RwLock<HashMap<String, NodeInfo>>,
    unhealthy_after: Duration,
}

impl Membership {
    /// Builds an empty table; a node is considered unhealthy once `unhealthy_after` has elapsed
    /// since its last heartbeat.
    #[must_use]
    pub fn new(unhealthy_after: Duration) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            unhealthy_after,
        }
    }

    /// Records a heartbeat from `node_id`, inserting it if unseen.
    pub fn update_heartbeat(&self, node_id: impl Into<NodeId>, role: Role) {
        let node_id = node_id.into();
        self.nodes.write().insert(
            node_id.to_string(),
            NodeInfo {
                node_id,
                role,
                last_heartbeat: Utc::now(),
                healthy: true,
            },
        );
    }

    /// Removes a node from the table (e.g. on graceful departure).
    pub fn remove(&self, node_id: &str) {
        self.nodes.write().remove(node_id);
    }

    /// A consistent snapshot of every known node.
    #[must_use]
    pub fn snapshot(&self) -> Vec<NodeInfo> {
        self.nodes.read().values().cloned().collect()
    }

    /// Healthy follower node ids, for the Synchronization Bus to fan instructions out to.
    #[must_use]
    pub fn healthy_followers(&self) -> Vec<NodeId> {
        self.nodes
            .read()
            .values()
            .filter(|n| n.healthy && matches!(n.role, Role::Follower))
            .map(|n| n.node_id.clone())
            .collect()
    }

    /// Marks nodes whose last heartbeat is older than `unhealthy_after` as unhealthy. Does not
    /// remove them: an unhealthy node that resumes heartbeating is marked healthy again on its
    /// next [`update_heartbeat`](Membership::update_heartbeat) call.
    pub fn sweep(&self) {
        let now = Utc::now();
        let mut nodes = self.nodes.write();
        for info in nodes.values_mut() {
            let age = now.signed_duration_since(info.last_heartbeat);
            if age.to_std().map(|d| d > self.unhealthy_after).unwrap_or(true) {
                info.healthy = false;
            }
        }
    }

    /// Spawns a background task that calls [`sweep`](Membership::sweep) every `interval`, until
    /// `cancel` fires.
    pub fn spawn_sweeper(self: std::sync::Arc<Self>, interval: Duration, cancel: CancellationToken) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.sweep(),
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_marks_node_healthy() {
        let membership = Membership::new(Duration::from_secs(30));
        membership.update_heartbeat("node-a:8080", Role::Follower);
        let snapshot = membership.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].healthy);
    }

    #[test]
    fn sweep_marks_stale_node_unhealthy() {
        let membership = Membership::new(Duration::from_secs(0));
        membership.update_heartbeat("node-a:8080", Role::Follower);
        std::thread::sleep(Duration::from_millis(5));
        membership.sweep();
        assert!(!membership.snapshot()[0].healthy);
    }

    #[test]
    fn healthy_followers_excludes_leader_and_unhealthy() {
        let membership = Membership::new(Duration::from_secs(30));
        membership.update_heartbeat("leader:8080", Role::Leader);
        membership.update_heartbeat("follower:8080", Role::Follower);
        assert_eq!(membership.healthy_followers(), vec!["follower:8080".to_string()]);
    }
}
