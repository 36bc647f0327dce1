// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! Parsing for a project's dataflow description: `INPUT.id[,INPUT.id] -> RULESET.id[,…] ->
//! OUTPUT.id[,…]`, i.e. one or more `->`-separated stages, each listing one or more
//! `KIND.id` references separated by commas.

use crate::{ComponentKey, ComponentKind, Context, Error};

/// A single stage of a dataflow: the components referenced at that position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataflowStage {
    /// References at this stage. All references in a stage need not share a kind, though in
    /// practice projects use one kind per stage (inputs, then rulesets, then outputs).
    pub refs: Vec<ComponentKey>,
}

/// A parsed project dataflow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dataflow {
    /// The `->`-separated stages, in order.
    pub stages: Vec<DataflowStage>,
}

impl Dataflow {
    /// Parses a raw dataflow string.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] if the string is empty, a stage is empty, or a reference is
    /// not of the form `KIND.id`.
    pub fn parse(project_id: &str, raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation {
                context: Context::project(project_id),
                message: "dataflow description is empty".to_string(),
            });
        }

        let mut stages = Vec::new();
        for stage_str in trimmed.split("->") {
            let stage_str = stage_str.trim();
            if stage_str.is_empty() {
                return Err(Error::Validation {
                    context: Context::project(project_id),
                    message: "dataflow has an empty stage".to_string(),
                });
            }

            let mut refs = Vec::new();
            for item in stage_str.split(',') {
                let item = item.trim();
                if item.is_empty() {
                    return Err(Error::Validation {
                        context: Context::project(project_id),
                        message: "dataflow stage has an empty reference".to_string(),
                    });
                }
                refs.push(parse_reference(project_id, item)?);
            }
            stages.push(DataflowStage { refs });
        }

        if stages.len() < 2 {
            return Err(Error::Validation {
                context: Context::project(project_id),
                message: "dataflow must have at least two `->`-separated stages".to_string(),
            });
        }

        Ok(Dataflow { stages })
    }

    /// Iterates over every component referenced anywhere in the dataflow.
    pub fn references(&self) -> impl Iterator<Item = &ComponentKey> {
        self.stages.iter().flat_map(|s| s.refs.iter())
    }
}

fn parse_reference(project_id: &str, item: &str) -> Result<ComponentKey, Error> {
    let (kind_str, id) = item.split_once('.').ok_or_else(|| Error::Validation {
        context: Context::project(project_id),
        message: format!("invalid reference `{item}`: expected `KIND.id`"),
    })?;
    let kind = ComponentKind::parse(&kind_str.to_ascii_lowercase()).ok_or_else(|| {
        Error::Validation {
            context: Context::project(project_id),
            message: format!("invalid reference `{item}`: unknown kind `{kind_str}`"),
        }
    })?;
    if id.is_empty() {
        return Err(Error::Validation {
            context: Context::project(project_id),
            message: format!("invalid reference `{item}`: empty id"),
        });
    }
    Ok(ComponentKey::new(kind, id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_stage_dataflow() {
        let df = Dataflow::parse("p1", "INPUT.kafka -> RULESET.test -> OUTPUT.es").unwrap();
        assert_eq!(df.stages.len(), 3);
        assert_eq!(df.stages[0].refs[0].kind, ComponentKind::Input);
        assert_eq!(df.stages[1].refs[0].kind, ComponentKind::Ruleset);
        assert_eq!(df.stages[2].refs[0].kind, ComponentKind::Output);
    }

    #[test]
    fn parses_multi_ref_stage() {
        let df = Dataflow::parse("p1", "INPUT.a,INPUT.b -> RULESET.r -> OUTPUT.o").unwrap();
        assert_eq!(df.stages[0].refs.len(), 2);
    }

    #[test]
    fn rejects_empty_string() {
        assert!(Dataflow::parse("p1", "").is_err());
    }

    #[test]
    fn rejects_malformed_reference() {
        assert!(Dataflow::parse("p1", "INPUT -> OUTPUT.o").is_err());
        assert!(Dataflow::parse("p1", "BOGUS.x -> OUTPUT.o").is_err());
    }

    #[test]
    fn rejects_single_stage() {
        assert!(Dataflow::parse("p1", "INPUT.a").is_err());
    }

    #[test]
    fn references_iterates_all_stages() {
        let df = Dataflow::parse("p1", "INPUT.a -> RULESET.r -> OUTPUT.o").unwrap();
        let refs: Vec<_> = df.references().cloned().collect();
        assert_eq!(refs.len(), 3);
    }
}
