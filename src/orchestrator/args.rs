//! Argument assembly for node execution: type validation against a stored
//! query's declared parameters, union-merging of multi-edge argument sets,
//! and projection of a merged set onto individual parameter groups.

use std::collections::HashMap;

use crate::binding::{ArgumentSet, Binding};
use crate::entity::{ArgumentTermKind, StoredQuery};
use crate::error::{EngineError, Result};

/// Check every argument value against the stored query's allowed types.
///
/// Unknown variable names are tolerated with a warning — they may simply be
/// ignored downstream. An empty allowed-type list accepts anything.
pub(crate) fn validate_arguments(
    stored: &StoredQuery,
    args: &ArgumentSet,
    source: &str,
    target_node: &str,
) -> Result<()> {
    let mut allowed: HashMap<&str, &[ArgumentTermKind]> = HashMap::new();
    for group in &stored.parameters {
        for parameter in &group.vars {
            allowed.insert(
                parameter.param_name.as_str(),
                parameter.allowed_types.as_slice(),
            );
        }
    }

    for (row_index, row) in args.arguments.iter().enumerate() {
        for (name, term) in row {
            match allowed.get(name.as_str()) {
                Some(types) if !types.is_empty() => {
                    if !types.iter().any(|t| t.matches(term.kind)) {
                        return Err(EngineError::TypeMismatch {
                            param: name.clone(),
                            expected: types.iter().map(ToString::to_string).collect(),
                            got: term.kind.to_string(),
                            row: row_index,
                            source: source.to_string(),
                            target_node: target_node.to_string(),
                        });
                    }
                }
                Some(_) => {}
                None => {
                    tracing::warn!(
                        param = %name,
                        source,
                        target_node,
                        "argument does not match any declared parameter"
                    );
                }
            }
        }
    }
    Ok(())
}

/// UNION-merge argument sets from multiple incoming edges: the head is the
/// ordered union of the incoming heads, rows are concatenated in edge
/// iteration order.
pub(crate) fn union_merge(sets: Vec<ArgumentSet>) -> ArgumentSet {
    let mut vars: Vec<String> = Vec::new();
    let mut rows: Vec<Binding> = Vec::new();
    for set in sets {
        for var in set.head.vars {
            if !vars.contains(&var) {
                vars.push(var);
            }
        }
        rows.extend(set.arguments);
    }
    ArgumentSet::new(vars, rows)
}

/// Project the merged arguments onto each parameter group so the applier
/// sees exactly one set per group with matching variable names. Rows that
/// bind none of a group's variables are dropped from that group's set.
pub(crate) fn per_group_sets(groups: &[Vec<String>], merged: &ArgumentSet) -> Vec<ArgumentSet> {
    groups
        .iter()
        .map(|group_vars| {
            let rows: Vec<Binding> = merged
                .arguments
                .iter()
                .filter_map(|row| {
                    let projected: Binding = row
                        .iter()
                        .filter(|(name, _)| group_vars.contains(*name))
                        .map(|(name, term)| (name.clone(), term.clone()))
                        .collect();
                    (!projected.is_empty()).then_some(projected)
                })
                .collect();
            ArgumentSet::new(group_vars.clone(), rows)
        })
        .collect()
}
