// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! The external-collaborator seam between the lifecycle adapter and whatever actually runs
//! inputs, outputs, rulesets, and plugins. A real deployment would plug in a dataflow engine
//! here; that engine is out of scope for this control plane, so [`StaticRuntime`] stands in with
//! real-but-minimal checks and in-memory running state.

use async_trait::async_trait;
use cplane_core::{ComponentKind, Error};
use parking_lot::Mutex;
use std::collections::HashSet;

/// The contract the lifecycle adapter needs from whatever drives non-project components.
///
/// Takes `kind` as a parameter rather than being implemented once per kind: the four non-project
/// kinds share an identical call shape and only differ in how `raw` is validated, which
/// [`StaticRuntime`] handles with one internal match. A deployment wiring in a real engine would
/// likely do the same, dispatching into per-kind engine plumbing internally.
#[async_trait]
pub trait ComponentRuntime: Send + Sync {
    /// Validates `raw` for `(kind, id)` without side effects.
    async fn verify(&self, kind: ComponentKind, id: &str, raw: &str) -> Result<(), Error>;

    /// Records `(kind, id)` as constructed (known-good), making it eligible for [`start`].
    ///
    /// [`start`]: ComponentRuntime::start
    async fn construct(&self, kind: ComponentKind, id: &str, raw: &str) -> Result<(), Error>;

    /// Marks `(kind, id)` running. Idempotent if already running.
    async fn start(&self, kind: ComponentKind, id: &str) -> Result<(), Error>;

    /// Marks `(kind, id)` stopped. Idempotent if already stopped.
    async fn stop(&self, kind: ComponentKind, id: &str) -> Result<(), Error>;
}

/// Default [`ComponentRuntime`]: performs real, cheap shape checks per kind and tracks "has this
/// id been constructed" / "is this id running" in memory. Does not parse rule logic, compile Go
/// plugins, or move data.
#[derive(Default)]
pub struct StaticRuntime {
    constructed: Mutex<HashSet<(ComponentKind, String)>>,
    running: Mutex<HashSet<(ComponentKind, String)>>,
}

impl StaticRuntime {
    /// Builds an empty runtime: nothing constructed, nothing running.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn check_shape(kind: ComponentKind, id: &str, raw: &str) -> Result<(), Error> {
        match kind {
            ComponentKind::Input | ComponentKind::Output => check_yaml_mapping(kind, id, raw),
            ComponentKind::Ruleset => check_ruleset_xml(kind, id, raw),
            ComponentKind::Plugin => check_plugin_source(kind, id, raw),
            ComponentKind::Project => unreachable!("projects are handled by LifecycleAdapter directly"),
        }
    }
}

#[async_trait]
impl ComponentRuntime for StaticRuntime {
    async fn verify(&self, kind: ComponentKind, id: &str, raw: &str) -> Result<(), Error> {
        Self::check_shape(kind, id, raw)
    }

    async fn construct(&self, kind: ComponentKind, id: &str, raw: &str) -> Result<(), Error> {
        Self::check_shape(kind, id, raw)?;
        self.constructed.lock().insert((kind, id.to_string()));
        Ok(())
    }

    async fn start(&self, kind: ComponentKind, id: &str) -> Result<(), Error> {
        let key = (kind, id.to_string());
        if !self.constructed.lock().contains(&key) {
            return Err(Error::Lifecycle {
                context: cplane_core::Context::component(kind, id.to_string()),
                message: "cannot start a component that has not been constructed".to_string(),
            });
        }
        self.running.lock().insert(key);
        Ok(())
    }

    async fn stop(&self, kind: ComponentKind, id: &str) -> Result<(), Error> {
        self.running.lock().remove(&(kind, id.to_string()));
        Ok(())
    }
}

fn check_yaml_mapping(kind: ComponentKind, id: &str, raw: &str) -> Result<(), Error> {
    let value: serde_yaml::Value = serde_yaml::from_str(raw).map_err(|e| Error::Validation {
        context: cplane_core::Context::component(kind, id.to_string()),
        message: format!("invalid YAML: {e}"),
    })?;
    if !value.is_mapping() {
        return Err(Error::Validation {
            context: cplane_core::Context::component(kind, id.to_string()),
            message: "must be a YAML mapping".to_string(),
        });
    }
    if value.get("type").is_none() {
        return Err(Error::Validation {
            context: cplane_core::Context::component(kind, id.to_string()),
            message: "missing required field `type`".to_string(),
        });
    }
    Ok(())
}

fn check_ruleset_xml(kind: ComponentKind, id: &str, raw: &str) -> Result<(), Error> {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;

    let mut reader = Reader::from_str(raw);
    let mut buf = Vec::new();
    let mut saw_rule = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(tag)) | Ok(Event::Empty(tag)) => {
                if tag.name().as_ref() == b"rule" {
                    saw_rule = true;
                }
            }
            Ok(_) => {}
            Err(e) => {
                return Err(Error::Validation {
                    context: cplane_core::Context::component(kind, id.to_string()),
                    message: format!("malformed XML at byte {}: {e}", reader.buffer_position()),
                });
            }
        }
        buf.clear();
    }
    if !saw_rule {
        return Err(Error::Validation {
            context: cplane_core::Context::component(kind, id.to_string()),
            message: "ruleset has no <rule> elements".to_string(),
        });
    }
    Ok(())
}

fn check_plugin_source(kind: ComponentKind, id: &str, raw: &str) -> Result<(), Error> {
    if !raw.contains("package ") {
        return Err(Error::Validation {
            context: cplane_core::Context::component(kind, id.to_string()),
            message: "plugin source has no package declaration".to_string(),
        });
    }
    if !raw.contains("func ") {
        return Err(Error::Validation {
            context: cplane_core::Context::component(kind, id.to_string()),
            message: "plugin source declares no functions".to_string(),
        });
    }
    let mut depth = 0i32;
    for c in raw.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            break;
        }
    }
    if depth != 0 {
        return Err(Error::Validation {
            context: cplane_core::Context::component(kind, id.to_string()),
            message: "unbalanced braces in plugin source".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yaml_mapping_without_type_is_rejected() {
        let runtime = StaticRuntime::new();
        let err = runtime.verify(ComponentKind::Input, "i1", "foo: 1").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn ruleset_without_rule_element_is_rejected() {
        let runtime = StaticRuntime::new();
        let err = runtime
            .verify(ComponentKind::Ruleset, "r1", "<root></root>")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn plugin_with_unbalanced_braces_is_rejected() {
        let runtime = StaticRuntime::new();
        let err = runtime
            .verify(ComponentKind::Plugin, "p1", "package main\nfunc F() {")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn start_requires_prior_construct() {
        let runtime = StaticRuntime::new();
        let err = runtime.start(ComponentKind::Input, "i1").await.unwrap_err();
        assert!(matches!(err, Error::Lifecycle { .. }));

        runtime.construct(ComponentKind::Input, "i1", "type: kafka").await.unwrap();
        runtime.start(ComponentKind::Input, "i1").await.unwrap();
    }
}
