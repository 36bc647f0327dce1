// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

use cplane_core::ComponentKind;
use std::path::{Path, PathBuf};

/// Errors from reading or writing the file-backed config root.
#[derive(thiserror::Error, Debug)]
pub enum DiskError {
    /// An I/O error occurred at the given path.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &Path, source: std::io::Error) -> DiskError {
    DiskError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub(crate) fn live_path(root: &Path, kind: ComponentKind, id: &str) -> PathBuf {
    root.join(kind.dir_name()).join(format!("{id}.{}", kind.file_extension()))
}

pub(crate) fn draft_path(root: &Path, kind: ComponentKind, id: &str) -> PathBuf {
    let mut p = live_path(root, kind, id).into_os_string();
    p.push(".new");
    PathBuf::from(p)
}

/// Writes `contents` to `path` atomically: write to a sibling temp file, then rename over the
/// destination. Creates the parent directory if missing.
fn write_atomic(path: &Path, contents: &str) -> Result<(), DiskError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("tmp")
    ));
    std::fs::write(&tmp_path, contents).map_err(|e| io_err(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<(), DiskError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

pub(crate) fn write_live(root: &Path, kind: ComponentKind, id: &str, raw: &str) -> Result<(), DiskError> {
    write_atomic(&live_path(root, kind, id), raw)
}

pub(crate) fn delete_live(root: &Path, kind: ComponentKind, id: &str) -> Result<(), DiskError> {
    remove_if_present(&live_path(root, kind, id))
}

pub(crate) fn write_draft(root: &Path, kind: ComponentKind, id: &str, raw: &str) -> Result<(), DiskError> {
    write_atomic(&draft_path(root, kind, id), raw)
}

pub(crate) fn delete_draft(root: &Path, kind: ComponentKind, id: &str) -> Result<(), DiskError> {
    remove_if_present(&draft_path(root, kind, id))
}

/// Scans `<root>/<kind>/` and returns `(live files, draft files)` as `(id, raw)` pairs.
pub(crate) fn scan_kind_dir(
    root: &Path,
    kind: ComponentKind,
) -> Result<(Vec<(String, String)>, Vec<(String, String)>), DiskError> {
    let dir = root.join(kind.dir_name());
    let mut live = Vec::new();
    let mut drafts = Vec::new();

    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((live, drafts)),
        Err(e) => return Err(io_err(&dir, e)),
    };

    let ext = kind.file_extension();
    let live_suffix = format!(".{ext}");
    let draft_suffix = format!(".{ext}.new");

    for entry in entries {
        let entry = entry.map_err(|e| io_err(&dir, e))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if let Some(id) = name.strip_suffix(&draft_suffix) {
            let raw = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            drafts.push((id.to_string(), raw));
        } else if let Some(id) = name.strip_suffix(&live_suffix) {
            let raw = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            live.push((id.to_string(), raw));
        }
    }

    Ok((live, drafts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_path_appends_new_suffix() {
        let root = PathBuf::from("/cfg");
        let p = draft_path(&root, ComponentKind::Ruleset, "r1");
        assert_eq!(p, PathBuf::from("/cfg/ruleset/r1.xml.new"));
    }

    #[test]
    fn scan_separates_live_from_draft() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("output")).unwrap();
        std::fs::write(dir.path().join("output/o1.yaml"), "a: 1").unwrap();
        std::fs::write(dir.path().join("output/o1.yaml.new"), "a: 2").unwrap();
        std::fs::write(dir.path().join("output/o2.yaml"), "a: 3").unwrap();

        let (live, drafts) = scan_kind_dir(dir.path(), ComponentKind::Output).unwrap();
        assert_eq!(live.len(), 2);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0], ("o1".to_string(), "a: 2".to_string()));
    }
}
