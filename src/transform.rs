//! Result-to-argument transformation.
//!
//! An edge's parameter mappings turn the source node's SELECT result set
//! into the argument set presented to the target node: each `fromParam`
//! output variable is renamed to its `toParam` parameter name, everything
//! else is dropped.

use indexmap::IndexMap;

use crate::binding::{ArgumentSet, Binding};
use crate::entity::ParameterMapping;

/// Convert a result set into an argument set under `mappings`.
///
/// With no mappings the transformer is the identity: the head and every
/// row are copied verbatim (the initial-argument case). Otherwise the
/// output head is the `toParam` names in first-seen order and rows that end
/// up binding nothing are dropped.
pub fn map_results(
    results: &crate::binding::ResultSet,
    mappings: &[ParameterMapping],
) -> ArgumentSet {
    if mappings.is_empty() {
        return ArgumentSet::new(results.head.vars.clone(), results.bindings().to_vec());
    }

    let mut vars: Vec<String> = Vec::new();
    for mapping in mappings {
        if !vars.contains(&mapping.to_param) {
            vars.push(mapping.to_param.clone());
        }
    }

    let mut arguments = Vec::new();
    for row in results.bindings() {
        let mut out: Binding = IndexMap::new();
        for mapping in mappings {
            if let Some(value) = row.get(&mapping.from_param) {
                out.insert(mapping.to_param.clone(), value.clone());
            }
        }
        if !out.is_empty() {
            arguments.push(out);
        }
    }

    ArgumentSet::new(vars, arguments)
}
