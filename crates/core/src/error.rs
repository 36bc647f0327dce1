// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the control plane, tagged with the error kinds from spec §7 so that the HTTP
//! surface can map each variant to a stable status code.

use crate::ComponentKind;
use miette::Diagnostic;

/// Contextual information attached to most errors: which component and/or project was involved.
#[derive(Debug, Default, Clone)]
pub struct Context {
    /// The component kind involved, if applicable.
    pub kind: Option<ComponentKind>,
    /// The component id involved, if applicable.
    pub id: Option<String>,
    /// The project id involved, if applicable.
    pub project_id: Option<String>,
}

impl Context {
    /// Builds a context for a single component.
    #[must_use]
    pub fn component(kind: ComponentKind, id: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            id: Some(id.into()),
            project_id: None,
        }
    }

    /// Builds a context for a project.
    #[must_use]
    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            kind: None,
            id: None,
            project_id: Some(project_id.into()),
        }
    }
}

impl std::fmt::Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let (Some(kind), Some(id)) = (self.kind, &self.id) {
            write!(f, "{kind}:{id}")?;
        }
        if let Some(project_id) = &self.project_id {
            write!(f, " project:{project_id}")?;
        }
        Ok(())
    }
}

/// The error kinds from spec §7, carried as a workspace-wide enum so every crate shares one
/// vocabulary and `cplane-http` has a single place to map errors to HTTP status codes.
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum Error {
    /// Bad input: malformed raw configuration, unparsable dataflow string, etc.
    #[error("validation failed: {message}\n{context}")]
    #[diagnostic(code(cplane::validation))]
    Validation {
        /// Context describing where validation failed.
        context: Context,
        /// Human-readable description of the failure.
        message: String,
    },

    /// The referenced `(kind, id)` or project does not exist.
    #[error("not found: {context}")]
    #[diagnostic(code(cplane::not_found))]
    NotFound {
        /// Context describing what was not found.
        context: Context,
    },

    /// The operation is not valid given the current state (e.g. `Start` on a running instance).
    #[error("conflict: {message}\n{context}")]
    #[diagnostic(code(cplane::conflict))]
    Conflict {
        /// Context describing the conflicting resource.
        context: Context,
        /// Human-readable description of the conflict.
        message: String,
    },

    /// Missing or mismatched authentication token.
    #[error("authentication failed")]
    #[diagnostic(code(cplane::auth))]
    Auth,

    /// A follower could not be reached or rejected a synchronization instruction.
    #[error("sync error talking to {node_id}: {message}")]
    #[diagnostic(code(cplane::sync))]
    Sync {
        /// The follower node address.
        node_id: String,
        /// Human-readable description of the failure.
        message: String,
    },

    /// The coordination store (KV/pub-sub) is unavailable or timed out.
    #[error("coordination store error: {message}")]
    #[diagnostic(code(cplane::store))]
    Store {
        /// Human-readable description of the failure.
        message: String,
    },

    /// A component adapter's `Verify`/`Construct`/`Start`/`Stop` call failed.
    #[error("lifecycle error: {message}\n{context}")]
    #[diagnostic(code(cplane::lifecycle))]
    Lifecycle {
        /// Context describing which component failed.
        context: Context,
        /// Human-readable description of the failure.
        message: String,
    },

    /// A bug: an invariant the implementation relies on was violated.
    #[error("internal error: {message}")]
    #[diagnostic(code(cplane::internal))]
    Internal {
        /// Human-readable description.
        message: String,
    },
}

impl Error {
    /// Shorthand for a [`Error::Validation`] with no component/project context.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            context: Context::default(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::NotFound`] scoped to a single component.
    pub fn not_found(kind: ComponentKind, id: impl Into<String>) -> Self {
        Error::NotFound {
            context: Context::component(kind, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_includes_kind_and_id() {
        let err = Error::not_found(ComponentKind::Ruleset, "test");
        let rendered = err.to_string();
        assert!(rendered.contains("ruleset:test"), "{rendered}");
    }
}
