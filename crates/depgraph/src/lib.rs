// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! The Dependency Index (spec §4.3): reverse edges from `(kind, id)` to the set of project ids
//! whose dataflow references them, rebuilt from the Config Store's parsed dataflows rather than
//! maintained incrementally by every writer.

use cplane_catalog::Catalog;
use cplane_core::{ComponentKey, ComponentKind};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Reverse index of which projects reference a given non-project component.
///
/// Rebuilt wholesale from a [`Catalog`] snapshot rather than updated edge-by-edge: project
/// dataflows are small and rewrites are infrequent, so a full rebuild after every project write
/// is simpler than threading incremental edge maintenance through every call site that mutates a
/// project.
pub struct DepGraph {
    catalog: Arc<Catalog>,
    edges: RwLock<HashMap<ComponentKey, HashSet<String>>>,
}

impl DepGraph {
    /// Builds an index over `catalog`, empty until the first [`DepGraph::rebuild`].
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            edges: RwLock::new(HashMap::new()),
        }
    }

    /// Recomputes every reverse edge from the current set of live projects' parsed dataflows.
    pub fn rebuild(&self) {
        let mut edges: HashMap<ComponentKey, HashSet<String>> = HashMap::new();
        for project in self.catalog.list_all(ComponentKind::Project) {
            let Some(dataflow) = &project.dataflow else {
                continue;
            };
            for reference in dataflow.references() {
                edges.entry(reference.clone()).or_default().insert(project.id.to_string());
            }
        }
        *self.edges.write() = edges;
    }

    /// Every project id (regardless of its current status) whose dataflow references `(kind,
    /// id)`.
    #[must_use]
    pub fn projects_referencing(&self, kind: ComponentKind, id: &str) -> Vec<String> {
        let key = ComponentKey::new(kind, id.to_string());
        self.edges
            .read()
            .get(&key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Counts how many projects referencing `(kind, id)` are currently `Running`, excluding
    /// `excluding` if given. Used to decide whether it is safe to stop a replaced component
    /// during a swap, or whether to tear one down when a project referencing it stops.
    #[must_use]
    pub fn count_running_projects_using(
        &self,
        kind: ComponentKind,
        id: &str,
        excluding: Option<&str>,
    ) -> usize {
        self.projects_referencing(kind, id)
            .into_iter()
            .filter(|project_id| excluding != Some(project_id.as_str()))
            .filter(|project_id| {
                self.catalog
                    .get(ComponentKind::Project, project_id)
                    .is_some_and(|instance| instance.status.is_running())
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cplane_catalog::ComponentInstance;
    use cplane_core::ComponentStatus;

    fn setup() -> (tempfile::TempDir, Arc<Catalog>) {
        let dir = tempfile::tempdir().unwrap();
        for kind in ComponentKind::APPLY_ORDER {
            std::fs::create_dir_all(dir.path().join(kind.dir_name())).unwrap();
        }
        (dir, Arc::new(Catalog::new(dir.path())))
    }

    #[test]
    fn rebuild_indexes_project_dataflow_references() {
        let (_dir, catalog) = setup();
        catalog
            .set(ComponentKind::Project, {
                let mut i = ComponentInstance::new("p1", "INPUT.i1 -> RULESET.r1 -> OUTPUT.o1");
                i.dataflow = Some(cplane_core::Dataflow::parse("p1", &i.raw).unwrap());
                i
            })
            .unwrap();

        let graph = DepGraph::new(catalog);
        graph.rebuild();

        assert_eq!(graph.projects_referencing(ComponentKind::Input, "i1"), vec!["p1"]);
        assert_eq!(graph.projects_referencing(ComponentKind::Output, "o2"), Vec::<String>::new());
    }

    #[test]
    fn count_running_excludes_named_project_and_stopped_projects() {
        let (_dir, catalog) = setup();
        let mut p1 = ComponentInstance::new("p1", "INPUT.i1 -> RULESET.r1 -> OUTPUT.o1");
        p1.dataflow = Some(cplane_core::Dataflow::parse("p1", &p1.raw).unwrap());
        p1.status = ComponentStatus::Running;
        catalog.set(ComponentKind::Project, p1).unwrap();

        let mut p2 = ComponentInstance::new("p2", "INPUT.i1 -> RULESET.r2 -> OUTPUT.o2");
        p2.dataflow = Some(cplane_core::Dataflow::parse("p2", &p2.raw).unwrap());
        p2.status = ComponentStatus::Stopped;
        catalog.set(ComponentKind::Project, p2).unwrap();

        let graph = DepGraph::new(catalog);
        graph.rebuild();

        assert_eq!(graph.count_running_projects_using(ComponentKind::Input, "i1", None), 1);
        assert_eq!(
            graph.count_running_projects_using(ComponentKind::Input, "i1", Some("p1")),
            0
        );
    }
}
