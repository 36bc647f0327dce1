// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! The Config Store (spec §4.1): typed in-memory registries of live components, plus shadow
//! "draft" registries holding uncommitted raw-text edits, mirrored onto a file-backed config
//! root at `<configRoot>/<kind>/<id>.<ext>` with drafts as sibling `<path>.new` files.
//!
//! All mutations go through a single process-wide reader-writer lock. Snapshots for read-only
//! scans copy out keys (or whole instances) and release the lock before doing any per-entry
//! work that might block, per spec §5.

mod disk;
mod registry;

pub use disk::DiskError;

use cplane_core::{ComponentId, ComponentKind, ComponentStatus, Dataflow};
use parking_lot::RwLock;
use registry::Registry;
use std::path::{Path, PathBuf};

/// A live component: its raw configuration text, runtime status, and (for projects) the parsed
/// dataflow description.
#[derive(Debug, Clone)]
pub struct ComponentInstance {
    /// The component id.
    pub id: ComponentId,
    /// The raw configuration text currently live (matches what's on disk).
    pub raw: String,
    /// The runtime status.
    pub status: ComponentStatus,
    /// The parsed dataflow description, present only for `ComponentKind::Project` instances.
    pub dataflow: Option<Dataflow>,
}

impl ComponentInstance {
    /// Builds a new instance in the `Stopped` state with no dataflow.
    #[must_use]
    pub fn new(id: impl Into<ComponentId>, raw: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            raw: raw.into(),
            status: ComponentStatus::Stopped,
            dataflow: None,
        }
    }
}

struct Inner {
    live: [Registry<ComponentInstance>; 5],
    drafts: [Registry<String>; 5],
}

fn slot(kind: ComponentKind) -> usize {
    match kind {
        ComponentKind::Input => 0,
        ComponentKind::Output => 1,
        ComponentKind::Ruleset => 2,
        ComponentKind::Project => 3,
        ComponentKind::Plugin => 4,
    }
}

/// The Config Store: live + draft registries for every component kind, backed by files under
/// `config_root`.
pub struct Catalog {
    config_root: PathBuf,
    inner: RwLock<Inner>,
}

impl Catalog {
    /// Opens (without yet scanning) a catalog rooted at `config_root`.
    #[must_use]
    pub fn new(config_root: impl Into<PathBuf>) -> Self {
        Self {
            config_root: config_root.into(),
            inner: RwLock::new(Inner {
                live: Default::default(),
                drafts: Default::default(),
            }),
        }
    }

    /// The config root directory.
    #[must_use]
    pub fn config_root(&self) -> &Path {
        &self.config_root
    }

    /// The path a live component's file lives at, regardless of whether it currently exists.
    #[must_use]
    pub fn live_path(&self, kind: ComponentKind, id: &str) -> PathBuf {
        disk::live_path(&self.config_root, kind, id)
    }

    /// The path a draft's `.new` file lives at, regardless of whether it currently exists.
    #[must_use]
    pub fn draft_path(&self, kind: ComponentKind, id: &str) -> PathBuf {
        disk::draft_path(&self.config_root, kind, id)
    }

    // -- live registry --------------------------------------------------

    /// Fetches a clone of a live component instance.
    #[must_use]
    pub fn get(&self, kind: ComponentKind, id: &str) -> Option<ComponentInstance> {
        self.inner.read().live[slot(kind)].get(id).cloned()
    }

    /// Installs or replaces a live component instance, and mirrors it to disk.
    ///
    /// # Errors
    /// Returns [`DiskError`] if the file write fails.
    pub fn set(&self, kind: ComponentKind, instance: ComponentInstance) -> Result<(), DiskError> {
        disk::write_live(&self.config_root, kind, &instance.id, &instance.raw)?;
        self.inner.write().live[slot(kind)].insert(instance.id.clone(), instance);
        Ok(())
    }

    /// Removes a live component instance and deletes its on-disk file.
    ///
    /// # Errors
    /// Returns [`DiskError`] if the file removal fails (missing file is not an error).
    pub fn delete(&self, kind: ComponentKind, id: &str) -> Result<Option<ComponentInstance>, DiskError> {
        disk::delete_live(&self.config_root, kind, id)?;
        Ok(self.inner.write().live[slot(kind)].remove(id))
    }

    /// Lists a consistent snapshot of every live instance of a kind. Per spec §4.1, this copies
    /// out of the registry and releases the lock before returning, so callers never hold the
    /// store lock while iterating.
    #[must_use]
    pub fn list_all(&self, kind: ComponentKind) -> Vec<ComponentInstance> {
        self.inner.read().live[slot(kind)].values().cloned().collect()
    }

    /// Updates just the status of a live instance, if it exists.
    pub fn set_status(&self, kind: ComponentKind, id: &str, status: ComponentStatus) {
        if let Some(instance) = self.inner.write().live[slot(kind)].get_mut(id) {
            instance.status = status;
        }
    }

    // -- draft registry ---------------------------------------------------

    /// Fetches a clone of a draft's raw text.
    #[must_use]
    pub fn get_draft(&self, kind: ComponentKind, id: &str) -> Option<String> {
        self.inner.read().drafts[slot(kind)].get(id).cloned()
    }

    /// Stages a draft: writes the `.new` file and records it in the draft registry.
    ///
    /// Per spec §4.6, staging is idempotent: if `raw` equals the current live raw text, no draft
    /// is created and `Ok(false)` is returned.
    ///
    /// # Errors
    /// Returns [`DiskError`] if the file write fails.
    pub fn set_draft(&self, kind: ComponentKind, id: &str, raw: String) -> Result<bool, DiskError> {
        let current_live = self.get(kind, id);
        if let Some(live) = &current_live {
            if live.raw == raw {
                return Ok(false);
            }
        }
        disk::write_draft(&self.config_root, kind, id, &raw)?;
        self.inner.write().drafts[slot(kind)].insert(id.to_string(), raw);
        Ok(true)
    }

    /// Cancels a draft: removes the `.new` file and the draft registry entry.
    ///
    /// # Errors
    /// Returns [`DiskError`] if the file removal fails (missing file is not an error).
    pub fn delete_draft(&self, kind: ComponentKind, id: &str) -> Result<(), DiskError> {
        disk::delete_draft(&self.config_root, kind, id)?;
        let _ = self.inner.write().drafts[slot(kind)].remove(id);
        Ok(())
    }

    /// Lists every `(id, raw)` draft currently staged for a kind.
    #[must_use]
    pub fn list_drafts(&self, kind: ComponentKind) -> Vec<(String, String)> {
        self.inner.read().drafts[slot(kind)]
            .iter()
            .map(|(id, raw)| (id.clone(), raw.clone()))
            .collect()
    }

    // -- startup reconciliation -------------------------------------------

    /// Scans the config root and restores both registries from disk: every `<id>.<ext>` file
    /// becomes a live instance in the `Stopped` state (the caller is expected to run these
    /// through the unified reload / construct path to bring them up), and every `<id>.<ext>.new`
    /// file restores the draft-registry invariant described in spec §4.1.
    ///
    /// Does not construct runtime handles or flip statuses to `Running` — that is the Lifecycle
    /// Adapter's job, invoked by the caller once this scan returns the raw text.
    ///
    /// # Errors
    /// Returns [`DiskError`] if the config root cannot be read.
    pub fn scan_from_disk(&self) -> Result<(), DiskError> {
        let mut inner = self.inner.write();
        for kind in ComponentKind::APPLY_ORDER {
            let (live_files, draft_files) = disk::scan_kind_dir(&self.config_root, kind)?;
            for (id, raw) in live_files {
                inner.live[slot(kind)].insert(id.clone(), ComponentInstance::new(id, raw));
            }
            for (id, raw) in draft_files {
                inner.drafts[slot(kind)].insert(id, raw);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cplane_core::ComponentKind;

    fn catalog() -> (tempfile::TempDir, Catalog) {
        let dir = tempfile::tempdir().unwrap();
        for kind in ComponentKind::APPLY_ORDER {
            std::fs::create_dir_all(dir.path().join(kind.dir_name())).unwrap();
        }
        let catalog = Catalog::new(dir.path());
        (dir, catalog)
    }

    #[test]
    fn staging_identical_raw_is_a_noop() {
        let (_dir, cat) = catalog();
        cat.set(
            ComponentKind::Ruleset,
            ComponentInstance::new("r1", "<root/>"),
        )
        .unwrap();

        let created = cat.set_draft(ComponentKind::Ruleset, "r1", "<root/>".to_string()).unwrap();
        assert!(!created);
        assert!(cat.get_draft(ComponentKind::Ruleset, "r1").is_none());
        assert!(!cat.draft_path(ComponentKind::Ruleset, "r1").exists());
    }

    #[test]
    fn staging_new_raw_creates_draft_file() {
        let (_dir, cat) = catalog();
        cat.set(
            ComponentKind::Ruleset,
            ComponentInstance::new("r1", "<root/>"),
        )
        .unwrap();

        let created = cat
            .set_draft(ComponentKind::Ruleset, "r1", "<root><rule/></root>".to_string())
            .unwrap();
        assert!(created);
        assert!(cat.draft_path(ComponentKind::Ruleset, "r1").exists());
        assert_eq!(
            cat.get_draft(ComponentKind::Ruleset, "r1").unwrap(),
            "<root><rule/></root>"
        );
    }

    #[test]
    fn cancel_removes_draft_file_and_registry_entry() {
        let (_dir, cat) = catalog();
        cat.set_draft(ComponentKind::Input, "i1", "a: 1".to_string()).unwrap();
        assert!(cat.draft_path(ComponentKind::Input, "i1").exists());

        cat.delete_draft(ComponentKind::Input, "i1").unwrap();
        assert!(cat.get_draft(ComponentKind::Input, "i1").is_none());
        assert!(!cat.draft_path(ComponentKind::Input, "i1").exists());
    }

    #[test]
    fn scan_from_disk_restores_draft_invariant() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("input")).unwrap();
        std::fs::write(dir.path().join("input/i1.yaml"), "a: 1").unwrap();
        std::fs::write(dir.path().join("input/i1.yaml.new"), "a: 2").unwrap();

        let catalog = Catalog::new(dir.path());
        catalog.scan_from_disk().unwrap();

        assert_eq!(catalog.get(ComponentKind::Input, "i1").unwrap().raw, "a: 1");
        assert_eq!(catalog.get_draft(ComponentKind::Input, "i1").unwrap(), "a: 2");
    }

    #[test]
    fn delete_removes_file_and_registry_entry() {
        let (_dir, cat) = catalog();
        cat.set(ComponentKind::Output, ComponentInstance::new("o1", "a: 1")).unwrap();
        assert!(cat.live_path(ComponentKind::Output, "o1").exists());

        let removed = cat.delete(ComponentKind::Output, "o1").unwrap();
        assert!(removed.is_some());
        assert!(cat.get(ComponentKind::Output, "o1").is_none());
        assert!(!cat.live_path(ComponentKind::Output, "o1").exists());
    }
}
