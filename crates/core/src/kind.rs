// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// The five component kinds the control plane catalogs.
///
/// Plugins are referenced by rulesets; projects reference inputs, outputs, and rulesets (and
/// transitively plugins). The graph is a DAG: projects reference components, components never
/// reference projects, plugins reference nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// A source of raw events.
    Input,
    /// A sink for processed events.
    Output,
    /// A named set of detection/transformation rules.
    Ruleset,
    /// A dataflow composed of inputs, rulesets, and outputs.
    Project,
    /// A name-addressed compiled extension referenced by rulesets.
    Plugin,
}

impl ComponentKind {
    /// All kinds, in the dependency-apply order specified for batch apply
    /// (`plugin, input, output, ruleset, project`).
    pub const APPLY_ORDER: [ComponentKind; 5] = [
        ComponentKind::Plugin,
        ComponentKind::Input,
        ComponentKind::Output,
        ComponentKind::Ruleset,
        ComponentKind::Project,
    ];

    /// The on-disk file extension used to mirror this kind's raw configuration.
    #[must_use]
    pub const fn file_extension(self) -> &'static str {
        match self {
            ComponentKind::Input => "yaml",
            ComponentKind::Output => "yaml",
            ComponentKind::Ruleset => "xml",
            ComponentKind::Project => "yaml",
            ComponentKind::Plugin => "go",
        }
    }

    /// The directory name under the config root that holds this kind's files.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            ComponentKind::Input => "input",
            ComponentKind::Output => "output",
            ComponentKind::Ruleset => "ruleset",
            ComponentKind::Project => "project",
            ComponentKind::Plugin => "plugin",
        }
    }

    /// Parses a kind from its lowercase, snake-case name (as used in URL paths).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "input" => Some(ComponentKind::Input),
            "output" => Some(ComponentKind::Output),
            "ruleset" => Some(ComponentKind::Ruleset),
            "project" => Some(ComponentKind::Project),
            "plugin" => Some(ComponentKind::Plugin),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl From<ComponentKind> for Cow<'static, str> {
    fn from(kind: ComponentKind) -> Self {
        Cow::Borrowed(kind.dir_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_order_matches_spec() {
        assert_eq!(
            ComponentKind::APPLY_ORDER,
            [
                ComponentKind::Plugin,
                ComponentKind::Input,
                ComponentKind::Output,
                ComponentKind::Ruleset,
                ComponentKind::Project,
            ]
        );
    }

    #[test]
    fn parse_round_trips_dir_name() {
        for kind in ComponentKind::APPLY_ORDER {
            assert_eq!(ComponentKind::parse(kind.dir_name()), Some(kind));
        }
        assert_eq!(ComponentKind::parse("bogus"), None);
    }

    #[test]
    fn extensions_match_spec_file_layout() {
        assert_eq!(ComponentKind::Input.file_extension(), "yaml");
        assert_eq!(ComponentKind::Output.file_extension(), "yaml");
        assert_eq!(ComponentKind::Ruleset.file_extension(), "xml");
        assert_eq!(ComponentKind::Project.file_extension(), "yaml");
        assert_eq!(ComponentKind::Plugin.file_extension(), "go");
    }
}
