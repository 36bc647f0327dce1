// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! The Component Lifecycle Adapter (spec §4.2): a uniform `Verify`/`Construct`/`Start`/`Stop`
//! contract dispatched over the five component kinds by a single tagged match, not by dynamic
//! dispatch across arbitrary per-kind objects.
//!
//! Input, Output, Ruleset, and Plugin delegate the kind-specific parts of that contract to an
//! injected [`ComponentRuntime`] — the only seam between the control plane and an actual
//! dataflow engine, which is out of scope here. [`StaticRuntime`] is the default implementation:
//! it performs real, lightweight checks (YAML schema shape, XML well-formedness, a Go source
//! sanity scan) and tracks running state in memory, without driving a real engine.
//!
//! Project is handled directly by [`LifecycleAdapter`] because verifying and starting a project
//! requires reading the Config Store and the Dependency Index, which a per-kind runtime
//! shouldn't need to know about.

mod runtime;

pub use runtime::{ComponentRuntime, StaticRuntime};

use cplane_catalog::{Catalog, ComponentInstance};
use cplane_core::{ComponentKind, ComponentStatus, Dataflow, Error};
use cplane_depgraph::DepGraph;
use std::collections::HashSet;
use std::sync::Arc;

/// Ids treated as existing in addition to whatever is already live, for verifying a project
/// whose referenced components are being staged in the same batch. Spec §4.6 step 2 requires
/// verify-all to succeed as a unit before anything is applied, so a project referencing an input
/// that is *also* part of the same batch must not fail verification just because that input
/// hasn't been installed into the registry yet.
#[derive(Debug, Default, Clone)]
pub struct BatchContext {
    staged: HashSet<(ComponentKind, String)>,
}

impl BatchContext {
    /// An empty context: nothing beyond the live registry is treated as existing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `(kind, id)` is staged elsewhere in the same batch.
    pub fn stage(&mut self, kind: ComponentKind, id: impl Into<String>) {
        self.staged.insert((kind, id.into()));
    }

    fn contains(&self, kind: ComponentKind, id: &str) -> bool {
        self.staged.contains(&(kind, id.to_string()))
    }
}

/// The Component Lifecycle Adapter.
pub struct LifecycleAdapter {
    catalog: Arc<Catalog>,
    depgraph: Arc<DepGraph>,
    runtime: Arc<dyn ComponentRuntime>,
}

impl LifecycleAdapter {
    /// Builds an adapter over `catalog` and `depgraph`, driving non-project kinds through
    /// `runtime`.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, depgraph: Arc<DepGraph>, runtime: Arc<dyn ComponentRuntime>) -> Self {
        Self {
            catalog,
            depgraph,
            runtime,
        }
    }

    /// Verifies `raw` as a candidate for `(kind, id)`, without mutating any registry.
    ///
    /// For a project, checks that every referenced id exists either in the live catalog or in
    /// `batch` (components being staged in the same verify-all pass).
    ///
    /// # Errors
    /// Returns [`Error::Validation`] if the content is malformed, or [`Error::NotFound`] if a
    /// project references a component that exists neither live nor in `batch`.
    pub async fn verify(
        &self,
        kind: ComponentKind,
        id: &str,
        raw: &str,
        batch: &BatchContext,
    ) -> Result<(), Error> {
        match kind {
            ComponentKind::Project => {
                let dataflow = Dataflow::parse(id, raw)?;
                for reference in dataflow.references() {
                    let exists = self.catalog.get(reference.kind, &reference.id).is_some()
                        || batch.contains(reference.kind, &reference.id);
                    if !exists {
                        return Err(Error::not_found(reference.kind, reference.id.to_string()));
                    }
                }
                Ok(())
            }
            _ => self.runtime.verify(kind, id, raw).await,
        }
    }

    /// Builds the in-memory instance for `(kind, id)` from already-verified `raw`.
    ///
    /// For plugins, construction also installs the instance into the catalog: per spec §4.6,
    /// plugins are name-addressed singletons and insertion is part of construction, not a
    /// separate PCM step. The caller may still call [`Catalog::set`] afterward; doing so again
    /// is harmless.
    ///
    /// # Errors
    /// Returns [`Error`] if the runtime rejects `raw` or the catalog write fails.
    pub async fn construct(&self, kind: ComponentKind, id: &str, raw: &str) -> Result<ComponentInstance, Error> {
        match kind {
            ComponentKind::Project => {
                let dataflow = Dataflow::parse(id, raw)?;
                Ok(ComponentInstance {
                    dataflow: Some(dataflow),
                    ..ComponentInstance::new(id.to_string(), raw.to_string())
                })
            }
            ComponentKind::Plugin => {
                self.runtime.construct(kind, id, raw).await?;
                let instance = ComponentInstance::new(id.to_string(), raw.to_string());
                self.catalog
                    .set(kind, instance.clone())
                    .map_err(|e| Error::Internal { message: e.to_string() })?;
                Ok(instance)
            }
            _ => {
                self.runtime.construct(kind, id, raw).await?;
                Ok(ComponentInstance::new(id.to_string(), raw.to_string()))
            }
        }
    }

    /// Starts `(kind, id)`. For a project, cascades: any referenced component not already
    /// running is started first, then the project itself is marked `Running`.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the instance isn't in the catalog, or whatever error a
    /// cascaded or runtime-level start produces.
    pub async fn start(&self, kind: ComponentKind, id: &str) -> Result<(), Error> {
        match kind {
            ComponentKind::Project => self.start_project(id).await,
            _ => {
                self.runtime.start(kind, id).await?;
                self.catalog.set_status(kind, id, ComponentStatus::Running);
                Ok(())
            }
        }
    }

    /// Stops `(kind, id)`. For a project, cascades: any referenced component that no other
    /// running project still needs is stopped too.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the instance isn't in the catalog, or whatever error a
    /// cascaded or runtime-level stop produces.
    pub async fn stop(&self, kind: ComponentKind, id: &str) -> Result<(), Error> {
        match kind {
            ComponentKind::Project => self.stop_project(id).await,
            _ => {
                self.runtime.stop(kind, id).await?;
                self.catalog.set_status(kind, id, ComponentStatus::Stopped);
                Ok(())
            }
        }
    }

    async fn start_project(&self, id: &str) -> Result<(), Error> {
        let instance = self
            .catalog
            .get(ComponentKind::Project, id)
            .ok_or_else(|| Error::not_found(ComponentKind::Project, id.to_string()))?;
        let dataflow = instance
            .dataflow
            .ok_or_else(|| Error::Internal { message: format!("project {id} has no parsed dataflow") })?;

        self.catalog.set_status(ComponentKind::Project, id, ComponentStatus::Starting);
        for reference in dataflow.references() {
            let referenced = self
                .catalog
                .get(reference.kind, &reference.id)
                .ok_or_else(|| Error::not_found(reference.kind, reference.id.to_string()))?;
            if !referenced.status.is_running() {
                if let Err(err) = self.start(reference.kind, &reference.id).await {
                    self.catalog.set_status(ComponentKind::Project, id, ComponentStatus::Error);
                    return Err(err);
                }
            }
        }
        self.catalog.set_status(ComponentKind::Project, id, ComponentStatus::Running);
        Ok(())
    }

    async fn stop_project(&self, id: &str) -> Result<(), Error> {
        let instance = self
            .catalog
            .get(ComponentKind::Project, id)
            .ok_or_else(|| Error::not_found(ComponentKind::Project, id.to_string()))?;
        let dataflow = instance
            .dataflow
            .ok_or_else(|| Error::Internal { message: format!("project {id} has no parsed dataflow") })?;

        self.catalog.set_status(ComponentKind::Project, id, ComponentStatus::Stopping);
        for reference in dataflow.references() {
            if self.depgraph.count_running_projects_using(reference.kind, &reference.id, Some(id)) == 0 {
                self.stop(reference.kind, &reference.id).await?;
            }
        }
        self.catalog.set_status(ComponentKind::Project, id, ComponentStatus::Stopped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, Arc<Catalog>, Arc<DepGraph>, LifecycleAdapter) {
        let dir = tempfile::tempdir().unwrap();
        for kind in ComponentKind::APPLY_ORDER {
            std::fs::create_dir_all(dir.path().join(kind.dir_name())).unwrap();
        }
        let catalog = Arc::new(Catalog::new(dir.path()));
        let depgraph = Arc::new(DepGraph::new(catalog.clone()));
        let runtime = Arc::new(StaticRuntime::new());
        let adapter = LifecycleAdapter::new(catalog.clone(), depgraph.clone(), runtime);
        (dir, catalog, depgraph, adapter)
    }

    #[tokio::test]
    async fn project_verify_accepts_batch_staged_references() {
        let (_dir, _catalog, _depgraph, adapter) = setup();
        let mut batch = BatchContext::new();
        batch.stage(ComponentKind::Input, "i1");
        batch.stage(ComponentKind::Ruleset, "r1");
        batch.stage(ComponentKind::Output, "o1");

        adapter
            .verify(ComponentKind::Project, "p1", "INPUT.i1 -> RULESET.r1 -> OUTPUT.o1", &batch)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn project_verify_rejects_missing_reference() {
        let (_dir, _catalog, _depgraph, adapter) = setup();
        let err = adapter
            .verify(ComponentKind::Project, "p1", "INPUT.i1 -> RULESET.r1 -> OUTPUT.o1", &BatchContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn start_project_cascades_to_referenced_components() {
        let (_dir, catalog, depgraph, adapter) = setup();
        adapter.construct(ComponentKind::Input, "i1", "type: kafka").await.unwrap();
        catalog
            .set(ComponentKind::Input, ComponentInstance::new("i1", "type: kafka"))
            .unwrap();
        adapter.construct(ComponentKind::Ruleset, "r1", "<root><rule id=\"r\"/></root>").await.unwrap();
        catalog
            .set(ComponentKind::Ruleset, ComponentInstance::new("r1", "<root><rule id=\"r\"/></root>"))
            .unwrap();
        adapter.construct(ComponentKind::Output, "o1", "type: print").await.unwrap();
        catalog
            .set(ComponentKind::Output, ComponentInstance::new("o1", "type: print"))
            .unwrap();

        let project = adapter
            .construct(ComponentKind::Project, "p1", "INPUT.i1 -> RULESET.r1 -> OUTPUT.o1")
            .await
            .unwrap();
        catalog.set(ComponentKind::Project, project).unwrap();
        depgraph.rebuild();

        adapter.start(ComponentKind::Project, "p1").await.unwrap();

        assert!(catalog.get(ComponentKind::Input, "i1").unwrap().status.is_running());
        assert!(catalog.get(ComponentKind::Project, "p1").unwrap().status.is_running());
    }

    #[tokio::test]
    async fn stop_project_leaves_shared_component_running_for_other_project() {
        let (_dir, catalog, depgraph, adapter) = setup();
        for (kind, id, raw) in [
            (ComponentKind::Input, "i1", "type: kafka"),
            (ComponentKind::Ruleset, "r1", "<root><rule id=\"r\"/></root>"),
            (ComponentKind::Ruleset, "r2", "<root><rule id=\"r\"/></root>"),
            (ComponentKind::Output, "o1", "type: print"),
            (ComponentKind::Output, "o2", "type: print"),
        ] {
            adapter.construct(kind, id, raw).await.unwrap();
            catalog.set(kind, ComponentInstance::new(id, raw)).unwrap();
        }

        let p1 = adapter
            .construct(ComponentKind::Project, "p1", "INPUT.i1 -> RULESET.r1 -> OUTPUT.o1")
            .await
            .unwrap();
        catalog.set(ComponentKind::Project, p1).unwrap();
        let p2 = adapter
            .construct(ComponentKind::Project, "p2", "INPUT.i1 -> RULESET.r2 -> OUTPUT.o2")
            .await
            .unwrap();
        catalog.set(ComponentKind::Project, p2).unwrap();
        depgraph.rebuild();

        adapter.start(ComponentKind::Project, "p1").await.unwrap();
        adapter.start(ComponentKind::Project, "p2").await.unwrap();
        depgraph.rebuild();

        adapter.stop(ComponentKind::Project, "p1").await.unwrap();

        assert!(catalog.get(ComponentKind::Input, "i1").unwrap().status.is_running());
        assert!(!catalog.get(ComponentKind::Project, "p1").unwrap().status.is_running());
    }
}
