// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! The Pending-Change Manager (spec §4.6): staging raw text as drafts, verifying it, and
//! applying it through the unified reload routine — the single code path shared by a change
//! pushed over HTTP, a component loaded from disk at startup, and an instruction received from
//! the leader over the Synchronization Bus.

mod locks;

use chrono::Utc;
use cplane_catalog::Catalog;
use cplane_core::{ComponentKind, ComponentStatus, Error};
use cplane_depgraph::DepGraph;
use cplane_journal::{Journal, OperationRecord};
use cplane_lifecycle::{BatchContext, LifecycleAdapter};
use cplane_telemetry::otel_warn;
use locks::KeyLocks;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// What to do with a component id: replace its raw text, or remove it.
#[derive(Debug, Clone)]
pub enum ChangeOp {
    /// Stage/apply `raw` as the new configuration for this id.
    Upsert {
        /// The new raw configuration text.
        raw: String,
    },
    /// Remove this id entirely.
    Delete,
}

/// A single component-level change, as submitted to the PCM.
#[derive(Debug, Clone)]
pub struct PendingChange {
    /// The component kind.
    pub kind: ComponentKind,
    /// The component id.
    pub id: String,
    /// What to do with it.
    pub op: ChangeOp,
}

/// Where an apply call originated, so the PCM knows whether to fan the change out over the
/// Synchronization Bus (only for locally-originated changes on the leader) or not (changes
/// arriving from the bus are already being applied *because* of a fan-out, and must not trigger
/// another one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOrigin {
    /// A change submitted directly to this node (HTTP request, local file load).
    Local,
    /// A change arriving from the Synchronization Bus (follower-side intake).
    Sync,
}

/// The leader-side fan-out hook. Implemented by the Synchronization Bus; the PCM depends only on
/// this trait so `cplane-pending` never needs to depend on `cplane-sync` (which itself depends
/// on `cplane-pending` to drive follower-side intake through the same apply path).
#[async_trait::async_trait]
pub trait ChangePublisher: Send + Sync {
    /// Fans an upsert out to the cluster. `affected_projects` is every running project that
    /// referenced `(kind, id)` at apply time, so followers know which of their own running
    /// projects to restart.
    async fn publish_upsert(&self, kind: ComponentKind, id: &str, raw: &str, affected_projects: &[String]);
    /// Fans a delete out to the cluster, with the same `affected_projects` contract.
    async fn publish_delete(&self, kind: ComponentKind, id: &str, affected_projects: &[String]);
}

/// One successfully-applied change's identity, reported back from [`Pcm::apply_batch`].
#[derive(Debug, Clone, Serialize)]
pub struct ChangeId {
    /// The component kind.
    pub kind: ComponentKind,
    /// The component id.
    pub id: String,
}

/// One change that failed to apply during a batch, with why.
#[derive(Debug, Clone, Serialize)]
pub struct FailedChange {
    /// The component kind.
    pub kind: ComponentKind,
    /// The component id.
    pub id: String,
    /// The error that aborted this change's apply.
    pub error: String,
}

/// The outcome of a batch apply (spec §4.6/§7): the verify-all gate already passed by the time
/// this exists, so every entry here reflects an *apply*-phase result — individual apply failures
/// don't abort the batch, they're recorded and the rest of the batch continues.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    /// Total number of changes submitted.
    pub total_changes: usize,
    /// Number that applied successfully.
    pub success_count: usize,
    /// Number that failed to apply.
    pub failure_count: usize,
    /// Ids of changes that applied successfully.
    pub successful_ids: Vec<ChangeId>,
    /// Changes that failed, with their errors.
    pub failed_changes: Vec<FailedChange>,
    /// The union of running projects restarted as a result of this batch.
    pub projects_to_restart: Vec<String>,
}

/// The Pending-Change Manager.
pub struct Pcm {
    catalog: Arc<Catalog>,
    depgraph: Arc<DepGraph>,
    lifecycle: Arc<LifecycleAdapter>,
    journal: Arc<Journal>,
    locks: KeyLocks,
    publisher: RwLock<Option<Arc<dyn ChangePublisher>>>,
    node_id: String,
}

impl Pcm {
    /// Builds a PCM with no publisher wired in yet (single-node / follower nodes never need
    /// one; the leader binary sets one with [`set_publisher`](Pcm::set_publisher) after standing
    /// up the Synchronization Bus). `node_id` is this node's advertised address, stamped onto
    /// every journal record this PCM appends.
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        depgraph: Arc<DepGraph>,
        lifecycle: Arc<LifecycleAdapter>,
        journal: Arc<Journal>,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            depgraph,
            lifecycle,
            journal,
            locks: KeyLocks::new(),
            publisher: RwLock::new(None),
            node_id: node_id.into(),
        }
    }

    /// Wires in the cluster fan-out hook. Called once, by the leader binary, after the
    /// Synchronization Bus is constructed.
    pub fn set_publisher(&self, publisher: Arc<dyn ChangePublisher>) {
        *self.publisher.write() = Some(publisher);
    }

    /// Stages `raw` as a draft for `(kind, id)`. A no-op (returns `Ok(false)`) if `raw` matches
    /// the current live text.
    ///
    /// # Errors
    /// Returns [`Error::Store`] if the draft file write fails.
    pub fn stage(&self, kind: ComponentKind, id: &str, raw: String) -> Result<bool, Error> {
        self.catalog.set_draft(kind, id, raw).map_err(|e| Error::Store { message: e.to_string() })
    }

    /// Cancels a staged draft.
    ///
    /// # Errors
    /// Returns [`Error::Store`] if the draft file removal fails.
    pub fn cancel(&self, kind: ComponentKind, id: &str) -> Result<(), Error> {
        self.catalog.delete_draft(kind, id).map_err(|e| Error::Store { message: e.to_string() })
    }

    /// Starts an already-constructed component without changing its configuration. Locked the
    /// same way an apply is, so it can't race a concurrent config swap.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the id isn't in the catalog, or whatever the lifecycle
    /// adapter's start produces.
    pub async fn start(&self, kind: ComponentKind, id: &str) -> Result<(), Error> {
        let _guard = self.locks.lock(kind, &id.to_string()).await;
        if self.catalog.get(kind, id).is_none() {
            return Err(Error::not_found(kind, id.to_string()));
        }
        let result = self.lifecycle.start(kind, id).await;
        let (success, message) = outcome(&result);
        self.record(kind, id, None, "start", success, message).await?;
        result
    }

    /// Stops a running component without removing it.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the id isn't in the catalog, or whatever the lifecycle
    /// adapter's stop produces.
    pub async fn stop(&self, kind: ComponentKind, id: &str) -> Result<(), Error> {
        let _guard = self.locks.lock(kind, &id.to_string()).await;
        if self.catalog.get(kind, id).is_none() {
            return Err(Error::not_found(kind, id.to_string()));
        }
        let result = self.lifecycle.stop(kind, id).await;
        let (success, message) = outcome(&result);
        self.record(kind, id, None, "stop", success, message).await?;
        result
    }

    async fn record(
        &self,
        kind: ComponentKind,
        id: &str,
        project_id: Option<&str>,
        action: &str,
        success: bool,
        message: Option<String>,
    ) -> Result<(), Error> {
        self.journal
            .append(OperationRecord {
                id: uuid::Uuid::new_v4().to_string(),
                timestamp: Utc::now(),
                kind,
                component_id: id.to_string(),
                project_id: project_id.map(ToString::to_string),
                action: action.to_string(),
                success,
                message,
                node_id: self.node_id.clone(),
            })
            .await
    }

    /// Verifies a single candidate without applying it.
    ///
    /// # Errors
    /// Returns whatever [`LifecycleAdapter::verify`] returns.
    pub async fn verify(&self, kind: ComponentKind, id: &str, raw: &str) -> Result<(), Error> {
        if kind == ComponentKind::Plugin {
            // Verification first drops the current plugin registration so re-verifying the same
            // id as its own replacement can't spuriously conflict with itself.
            let _ = self.catalog.delete(kind, id);
        }
        self.lifecycle.verify(kind, id, raw, &BatchContext::new()).await
    }

    /// Applies one change through the unified reload routine and restarts whatever running
    /// projects it leaves affected (spec §4.6/§4.7): verify, stop the old instance if running,
    /// construct and install the new one, restart it if the old one was running, clear the
    /// draft, append a journal record, and restart every running project that references this
    /// component (if any). On the leader, also fans the change out to followers unless `origin`
    /// is [`ApplyOrigin::Sync`] (meaning it arrived from the bus already, in which case the
    /// caller restarts the leader-computed `affectedProjects[]` carried on the wire instead of
    /// this recomputing its own).
    ///
    /// # Errors
    /// Returns [`Error::Conflict`] deleting a component a running project still references, or
    /// whatever verification/construction/start/stop produces.
    pub async fn apply_single(&self, change: PendingChange, origin: ApplyOrigin) -> Result<(), Error> {
        let affected = self.reload(&change, origin).await?;
        if origin == ApplyOrigin::Local && !affected.is_empty() {
            self.restart_projects(&affected, "dependent component changed").await?;
        }
        Ok(())
    }

    /// Locks `(change.kind, change.id)`, applies the change, and journals the outcome. Returns
    /// the running projects the change leaves affected (empty for a project change itself, since
    /// a project doesn't affect other projects).
    async fn reload(&self, change: &PendingChange, origin: ApplyOrigin) -> Result<Vec<String>, Error> {
        let _guard = self.locks.lock(change.kind, &change.id).await;
        let result = self.apply_single_locked(change, origin).await;
        let action = match change.op {
            ChangeOp::Upsert { .. } => "upsert",
            ChangeOp::Delete => "delete",
        };
        let (success, message) = outcome(&result);
        self.record(change.kind, &change.id, None, action, success, message).await?;
        result
    }

    async fn apply_single_locked(&self, change: &PendingChange, origin: ApplyOrigin) -> Result<Vec<String>, Error> {
        match &change.op {
            ChangeOp::Delete => self.apply_delete(change.kind, &change.id, origin).await,
            ChangeOp::Upsert { raw } => self.apply_upsert(change.kind, &change.id, raw, origin).await,
        }
    }

    /// The running projects that reference `(kind, id)` right now. Always empty for a project
    /// itself, since projects don't reference other projects.
    fn affected_running_projects(&self, kind: ComponentKind, id: &str) -> Vec<String> {
        if kind == ComponentKind::Project {
            return Vec::new();
        }
        self.depgraph
            .projects_referencing(kind, id)
            .into_iter()
            .filter(|project_id| {
                self.catalog
                    .get(ComponentKind::Project, project_id)
                    .is_some_and(|instance| instance.status.is_running())
            })
            .collect()
    }

    async fn apply_delete(&self, kind: ComponentKind, id: &str, origin: ApplyOrigin) -> Result<Vec<String>, Error> {
        if kind != ComponentKind::Project && self.depgraph.count_running_projects_using(kind, id, None) > 0 {
            return Err(Error::Conflict {
                context: cplane_core::Context::component(kind, id.to_string()),
                message: "a running project still references this component".to_string(),
            });
        }

        if let Some(existing) = self.catalog.get(kind, id) {
            if existing.status.is_running() {
                self.lifecycle.stop(kind, id).await?;
            }
        }
        self.catalog.delete(kind, id).map_err(|e| Error::Store { message: e.to_string() })?;
        self.catalog.delete_draft(kind, id).map_err(|e| Error::Store { message: e.to_string() })?;
        if kind == ComponentKind::Project {
            self.depgraph.rebuild();
        }

        // The delete-conflict check above guarantees no running project still references `id`,
        // so this is always empty; computed anyway so the wire payload carries the same shape as
        // an upsert's.
        let affected = self.affected_running_projects(kind, id);

        if origin == ApplyOrigin::Local {
            if let Some(publisher) = self.publisher.read().clone() {
                publisher.publish_delete(kind, id, &affected).await;
            }
        }
        Ok(affected)
    }

    async fn apply_upsert(&self, kind: ComponentKind, id: &str, raw: &str, origin: ApplyOrigin) -> Result<Vec<String>, Error> {
        let existing = self.catalog.get(kind, id);
        let was_running = existing.as_ref().is_some_and(|i| i.status.is_running());
        if was_running {
            self.lifecycle.stop(kind, id).await?;
        }

        self.lifecycle.verify(kind, id, raw, &BatchContext::new()).await?;
        let instance = self.lifecycle.construct(kind, id, raw).await?;
        self.catalog.set(kind, instance).map_err(|e| Error::Store { message: e.to_string() })?;
        self.catalog.delete_draft(kind, id).map_err(|e| Error::Store { message: e.to_string() })?;
        if kind == ComponentKind::Project {
            self.depgraph.rebuild();
        }

        if was_running {
            self.lifecycle.start(kind, id).await?;
        }

        let affected = self.affected_running_projects(kind, id);

        if origin == ApplyOrigin::Local {
            if let Some(publisher) = self.publisher.read().clone() {
                publisher.publish_upsert(kind, id, raw, &affected).await;
            }
        }
        Ok(affected)
    }

    /// Verifies every change in `changes` as a unit (the gate: any failure aborts the whole
    /// batch with nothing applied), then applies them one at a time in the fixed dependency
    /// order `plugin, input, output, ruleset, project` (spec §4.6). Unlike the verify phase, an
    /// individual apply failure does not abort the batch: it's recorded in
    /// [`BatchOutcome::failed_changes`] and the remaining changes still apply. Every running
    /// project left affected by any successfully-applied change is restarted exactly once, after
    /// the whole batch has applied.
    ///
    /// # Errors
    /// Returns the first verification failure, with no changes applied.
    pub async fn apply_batch(&self, changes: Vec<PendingChange>, origin: ApplyOrigin) -> Result<BatchOutcome, Error> {
        let mut batch = BatchContext::new();
        for change in &changes {
            if matches!(change.op, ChangeOp::Upsert { .. }) {
                batch.stage(change.kind, change.id.clone());
            }
        }

        for change in &changes {
            match &change.op {
                ChangeOp::Upsert { raw } => {
                    self.lifecycle.verify(change.kind, &change.id, raw, &batch).await?;
                }
                ChangeOp::Delete => {
                    if change.kind != ComponentKind::Project
                        && self.depgraph.count_running_projects_using(change.kind, &change.id, None) > 0
                    {
                        return Err(Error::Conflict {
                            context: cplane_core::Context::component(change.kind, change.id.clone()),
                            message: "a running project still references this component".to_string(),
                        });
                    }
                }
            }
        }

        let mut ordered = changes;
        ordered.sort_by_key(|c| apply_rank(c.kind));
        let total_changes = ordered.len();

        let mut successful_ids = Vec::new();
        let mut failed_changes = Vec::new();
        let mut projects_to_restart: BTreeSet<String> = BTreeSet::new();

        for change in ordered {
            let kind = change.kind;
            let id = change.id.clone();
            match self.reload(&change, origin).await {
                Ok(affected) => {
                    successful_ids.push(ChangeId { kind, id });
                    projects_to_restart.extend(affected);
                }
                Err(e) => {
                    failed_changes.push(FailedChange { kind, id, error: e.to_string() });
                }
            }
        }

        let projects_to_restart: Vec<String> = projects_to_restart.into_iter().collect();
        if origin == ApplyOrigin::Local && !projects_to_restart.is_empty() {
            self.restart_projects(&projects_to_restart, "dependent batch change").await?;
        }

        Ok(BatchOutcome {
            total_changes,
            success_count: successful_ids.len(),
            failure_count: failed_changes.len(),
            successful_ids,
            failed_changes,
            projects_to_restart,
        })
    }

    /// Restarts every listed project: stops every one that's currently running, then starts
    /// every one that's now stopped (spec §4.7). Two full passes rather than one
    /// stop-then-start-per-project, so a shared referenced component isn't torn down and rebuilt
    /// once per project that references it. Each individual stop/start is journaled on its own
    /// (`project_stop`/`project_start`), and one aggregate `project_restart` record carries
    /// `reason`. An individual project's stop/start failure is logged and counted but does not
    /// abort the rest of the restart.
    ///
    /// # Errors
    /// Returns [`Error::Store`] only if appending the aggregate journal record itself fails;
    /// individual lifecycle failures never escalate to an error here.
    pub async fn restart_projects(&self, ids: &[String], reason: &str) -> Result<(), Error> {
        let mut failures = 0usize;

        for id in ids {
            let _guard = self.locks.lock(ComponentKind::Project, id).await;
            if self
                .catalog
                .get(ComponentKind::Project, id)
                .is_some_and(|i| i.status.is_running())
            {
                let result = self.lifecycle.stop(ComponentKind::Project, id).await;
                if result.is_err() {
                    failures += 1;
                    otel_warn!("pending.project_restart_stop_failed", project = id.as_str());
                }
                let (success, message) = outcome(&result);
                self.record(ComponentKind::Project, id, Some(id), "project_stop", success, message).await?;
            }
        }

        for id in ids {
            let _guard = self.locks.lock(ComponentKind::Project, id).await;
            if self
                .catalog
                .get(ComponentKind::Project, id)
                .is_some_and(|i| i.status == ComponentStatus::Stopped)
            {
                let result = self.lifecycle.start(ComponentKind::Project, id).await;
                if result.is_err() {
                    failures += 1;
                    otel_warn!("pending.project_restart_start_failed", project = id.as_str());
                }
                let (success, message) = outcome(&result);
                self.record(ComponentKind::Project, id, Some(id), "project_start", success, message).await?;
            }
        }

        self.record(
            ComponentKind::Project,
            &ids.join(","),
            None,
            "project_restart",
            failures == 0,
            Some(reason.to_string()),
        )
        .await
    }
}

fn apply_rank(kind: ComponentKind) -> usize {
    ComponentKind::APPLY_ORDER.iter().position(|k| *k == kind).unwrap_or(usize::MAX)
}

fn outcome(result: &Result<(), Error>) -> (bool, Option<String>) {
    match result {
        Ok(()) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cplane_lifecycle::StaticRuntime;

    struct RecordingPublisher {
        upserts: parking_lot::Mutex<Vec<(ComponentKind, String, Vec<String>)>>,
    }

    #[async_trait::async_trait]
    impl ChangePublisher for RecordingPublisher {
        async fn publish_upsert(&self, kind: ComponentKind, id: &str, _raw: &str, affected_projects: &[String]) {
            self.upserts.lock().push((kind, id.to_string(), affected_projects.to_vec()));
        }
        async fn publish_delete(&self, _kind: ComponentKind, _id: &str, _affected_projects: &[String]) {}
    }

    fn setup() -> (tempfile::TempDir, Pcm) {
        let dir = tempfile::tempdir().unwrap();
        for kind in ComponentKind::APPLY_ORDER {
            std::fs::create_dir_all(dir.path().join(kind.dir_name())).unwrap();
        }
        let catalog = Arc::new(Catalog::new(dir.path()));
        let depgraph = Arc::new(DepGraph::new(catalog.clone()));
        let lifecycle = Arc::new(LifecycleAdapter::new(
            catalog.clone(),
            depgraph.clone(),
            Arc::new(StaticRuntime::new()),
        ));
        let journal = Arc::new(Journal::new(Arc::new(cplane_coordination::MemoryStore::new())));
        (dir, Pcm::new(catalog, depgraph, lifecycle, journal, "node-1"))
    }

    #[tokio::test]
    async fn apply_batch_installs_whole_project_in_dependency_order() {
        let (_dir, pcm) = setup();
        let changes = vec![
            PendingChange {
                kind: ComponentKind::Output,
                id: "o1".to_string(),
                op: ChangeOp::Upsert { raw: "type: print".to_string() },
            },
            PendingChange {
                kind: ComponentKind::Project,
                id: "p1".to_string(),
                op: ChangeOp::Upsert {
                    raw: "INPUT.i1 -> RULESET.r1 -> OUTPUT.o1".to_string(),
                },
            },
            PendingChange {
                kind: ComponentKind::Input,
                id: "i1".to_string(),
                op: ChangeOp::Upsert { raw: "type: kafka".to_string() },
            },
            PendingChange {
                kind: ComponentKind::Ruleset,
                id: "r1".to_string(),
                op: ChangeOp::Upsert {
                    raw: "<root><rule id=\"r\"/></root>".to_string(),
                },
            },
        ];
        pcm.apply_batch(changes, ApplyOrigin::Local).await.unwrap();
    }

    #[tokio::test]
    async fn apply_batch_aborts_entirely_on_bad_reference() {
        let (_dir, pcm) = setup();
        let changes = vec![PendingChange {
            kind: ComponentKind::Project,
            id: "p1".to_string(),
            op: ChangeOp::Upsert {
                raw: "INPUT.missing -> RULESET.missing -> OUTPUT.missing".to_string(),
            },
        }];
        let err = pcm.apply_batch(changes, ApplyOrigin::Local).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_is_rejected_while_a_running_project_still_references_it() {
        let (_dir, pcm) = setup();
        let changes = vec![
            PendingChange {
                kind: ComponentKind::Output,
                id: "o1".to_string(),
                op: ChangeOp::Upsert { raw: "type: print".to_string() },
            },
            PendingChange {
                kind: ComponentKind::Input,
                id: "i1".to_string(),
                op: ChangeOp::Upsert { raw: "type: kafka".to_string() },
            },
            PendingChange {
                kind: ComponentKind::Ruleset,
                id: "r1".to_string(),
                op: ChangeOp::Upsert {
                    raw: "<root><rule id=\"r\"/></root>".to_string(),
                },
            },
            PendingChange {
                kind: ComponentKind::Project,
                id: "p1".to_string(),
                op: ChangeOp::Upsert {
                    raw: "INPUT.i1 -> RULESET.r1 -> OUTPUT.o1".to_string(),
                },
            },
        ];
        pcm.apply_batch(changes, ApplyOrigin::Local).await.unwrap();
        pcm.apply_single(
            PendingChange {
                kind: ComponentKind::Project,
                id: "p1".to_string(),
                op: ChangeOp::Delete,
            },
            ApplyOrigin::Local,
        )
        .await
        .unwrap_err();

        pcm.restart_projects(&["p1".to_string()], "test").await.unwrap();

        let err = pcm
            .apply_single(
                PendingChange {
                    kind: ComponentKind::Input,
                    id: "i1".to_string(),
                    op: ChangeOp::Delete,
                },
                ApplyOrigin::Local,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn local_upsert_notifies_publisher() {
        let (_dir, pcm) = setup();
        let publisher = Arc::new(RecordingPublisher {
            upserts: parking_lot::Mutex::new(Vec::new()),
        });
        pcm.set_publisher(publisher.clone());

        pcm.apply_single(
            PendingChange {
                kind: ComponentKind::Input,
                id: "i1".to_string(),
                op: ChangeOp::Upsert { raw: "type: kafka".to_string() },
            },
            ApplyOrigin::Local,
        )
        .await
        .unwrap();

        assert_eq!(publisher.upserts.lock().len(), 1);
    }

    #[tokio::test]
    async fn sync_origin_does_not_notify_publisher() {
        let (_dir, pcm) = setup();
        let publisher = Arc::new(RecordingPublisher {
            upserts: parking_lot::Mutex::new(Vec::new()),
        });
        pcm.set_publisher(publisher.clone());

        pcm.apply_single(
            PendingChange {
                kind: ComponentKind::Input,
                id: "i1".to_string(),
                op: ChangeOp::Upsert { raw: "type: kafka".to_string() },
            },
            ApplyOrigin::Sync,
        )
        .await
        .unwrap();

        assert!(publisher.upserts.lock().is_empty());
    }

    #[tokio::test]
    async fn upsert_of_a_running_dependency_restarts_the_referencing_project() {
        let (_dir, pcm) = setup();
        let changes = vec![
            PendingChange {
                kind: ComponentKind::Output,
                id: "o1".to_string(),
                op: ChangeOp::Upsert { raw: "type: print".to_string() },
            },
            PendingChange {
                kind: ComponentKind::Input,
                id: "i1".to_string(),
                op: ChangeOp::Upsert { raw: "type: kafka".to_string() },
            },
            PendingChange {
                kind: ComponentKind::Ruleset,
                id: "r1".to_string(),
                op: ChangeOp::Upsert {
                    raw: "<root><rule id=\"r\"/></root>".to_string(),
                },
            },
            PendingChange {
                kind: ComponentKind::Project,
                id: "p1".to_string(),
                op: ChangeOp::Upsert {
                    raw: "INPUT.i1 -> RULESET.r1 -> OUTPUT.o1".to_string(),
                },
            },
        ];
        pcm.apply_batch(changes, ApplyOrigin::Local).await.unwrap();
        pcm.start(ComponentKind::Project, "p1").await.unwrap();
        assert!(pcm.catalog.get(ComponentKind::Project, "p1").unwrap().status.is_running());

        pcm.apply_single(
            PendingChange {
                kind: ComponentKind::Ruleset,
                id: "r1".to_string(),
                op: ChangeOp::Upsert {
                    raw: "<root><rule id=\"r2\"/></root>".to_string(),
                },
            },
            ApplyOrigin::Local,
        )
        .await
        .unwrap();

        assert!(pcm.catalog.get(ComponentKind::Project, "p1").unwrap().status.is_running());

        let restarts = pcm
            .journal
            .list(
                &cplane_journal::JournalFilter {
                    action: Some("project_restart".to_string()),
                    ..Default::default()
                },
                0,
                10,
            )
            .await
            .unwrap();
        assert_eq!(restarts.len(), 1);
    }

    #[tokio::test]
    async fn batch_apply_continues_past_a_failed_change_and_reports_it() {
        let (_dir, pcm) = setup();
        let seed = vec![
            PendingChange {
                kind: ComponentKind::Output,
                id: "o1".to_string(),
                op: ChangeOp::Upsert { raw: "type: print".to_string() },
            },
            PendingChange {
                kind: ComponentKind::Input,
                id: "i1".to_string(),
                op: ChangeOp::Upsert { raw: "type: kafka".to_string() },
            },
            PendingChange {
                kind: ComponentKind::Ruleset,
                id: "r1".to_string(),
                op: ChangeOp::Upsert {
                    raw: "<root><rule id=\"r\"/></root>".to_string(),
                },
            },
        ];
        pcm.apply_batch(seed, ApplyOrigin::Local).await.unwrap();

        // Deleting r1 passes the batch's verify-all gate (no running project references it yet),
        // but its removal lands before the project's apply-time re-verify runs (rank order puts
        // rulesets before projects), so the project's apply fails even though verification
        // passed for the batch as a whole.
        let changes = vec![
            PendingChange {
                kind: ComponentKind::Ruleset,
                id: "r1".to_string(),
                op: ChangeOp::Delete,
            },
            PendingChange {
                kind: ComponentKind::Project,
                id: "p1".to_string(),
                op: ChangeOp::Upsert {
                    raw: "INPUT.i1 -> RULESET.r1 -> OUTPUT.o1".to_string(),
                },
            },
        ];

        let outcome = pcm.apply_batch(changes, ApplyOrigin::Local).await.unwrap();
        assert_eq!(outcome.total_changes, 2);
        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.failure_count, 1);
        assert_eq!(outcome.successful_ids.len(), 1);
        assert_eq!(outcome.successful_ids[0].id, "r1");
        assert_eq!(outcome.failed_changes.len(), 1);
        assert_eq!(outcome.failed_changes[0].id, "p1");
        assert!(outcome.projects_to_restart.is_empty());
    }
}
