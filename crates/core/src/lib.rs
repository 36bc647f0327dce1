// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! Shared identifiers, component-kind tagging, and the error taxonomy used across every
//! control-plane crate.
//!
//! Data Model:
//! - cluster
//!   - nodes (one leader, N followers)
//!     - registries (one per [`ComponentKind`])
//!       - components, addressed by `(kind, id)`
//!
//! A component is a typed configuration unit (input, output, ruleset, plugin) or a dataflow
//! composed of them (project). This crate owns only the vocabulary shared by every other
//! crate in the workspace; it has no registries, no locks, and no I/O of its own.

pub mod dataflow;
pub mod error;
mod kind;
mod status;

pub use dataflow::{Dataflow, DataflowStage};
pub use error::{Context, Error};
pub use kind::ComponentKind;
pub use status::ComponentStatus;

use std::borrow::Cow;

/// The id of a component within its kind's registry (unique within that kind, not globally).
pub type ComponentId = Cow<'static, str>;

/// The id of a project.
pub type ProjectId = Cow<'static, str>;

/// A cluster node's identity, which per spec is simply its advertised network address.
pub type NodeId = Cow<'static, str>;

/// Composite key used to address a single pending change or a single live component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKey {
    /// The component's kind.
    pub kind: ComponentKind,
    /// The component's id.
    pub id: ComponentId,
}

impl ComponentKey {
    /// Builds a new key.
    pub fn new(kind: ComponentKind, id: impl Into<ComponentId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl std::fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
