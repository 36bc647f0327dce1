// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// The runtime status of a component instance or a project, per spec §3.
///
/// State machine (component): `stopped -> starting -> running` on successful `Start`;
/// `running -> stopping -> stopped` on successful `Stop`; any construction/start failure moves
/// to `error`. An `error` component cannot be restarted implicitly — it requires an explicit
/// `start` once the underlying issue is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    /// Not running.
    #[default]
    Stopped,
    /// Transitioning from stopped to running.
    Starting,
    /// Running and serving.
    Running,
    /// Transitioning from running to stopped.
    Stopping,
    /// Construction or start failed; requires explicit intervention.
    Error,
}

impl ComponentStatus {
    /// Whether `Start` is valid from this state (idempotent with respect to `status`: starting
    /// an already-running instance is an error per spec §4.2).
    #[must_use]
    pub const fn can_start(self) -> bool {
        matches!(self, ComponentStatus::Stopped | ComponentStatus::Error)
    }

    /// Whether `Stop` is a meaningful transition from this state (`Stop` on a non-running
    /// instance is a no-op per spec §4.2, so this is only used to decide whether to actually
    /// invoke the adapter's `Stop`).
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, ComponentStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_state_requires_explicit_start() {
        assert!(ComponentStatus::Error.can_start());
        assert!(!ComponentStatus::Running.can_start());
    }
}
