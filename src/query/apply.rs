//! Argument substitution.
//!
//! `apply_arguments` replaces the all-UNDEF placeholder rows of each
//! parameter group with caller-supplied rows. Pre-existing concrete rows in
//! the same `VALUES` block are preserved and the new rows appended. The
//! rewrite is all-or-nothing: argument rows are converted to terms before
//! the AST is touched.

use std::collections::BTreeSet;

use spargebra::algebra::GraphPattern;
use spargebra::term::{GroundTerm, Literal, NamedNode, Variable};

use super::{ParsedQuery, detect, walk};
use crate::binding::{ArgumentSet, Binding, BoundTerm, TermKind};
use crate::error::{EngineError, Result};

const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

/// Substitute `arg_sets` into the parameter groups of `parsed`.
///
/// Fails with `ArityMismatch` when the number of argument sets differs from
/// the number of detected groups, `VariableMismatch` when a set binds a
/// different variable set than its group declares, and
/// `IllegalArgumentType` on `bnode` values. An empty argument list leaves
/// the group's UNDEF row in place and logs a warning.
pub(crate) fn apply_arguments(parsed: &mut ParsedQuery, arg_sets: &[ArgumentSet]) -> Result<()> {
    // Collect each group's declared variable tuple in document order.
    let mut declared: Vec<Vec<Variable>> = Vec::new();
    walk::visit_operation(&parsed.op, &mut |pattern| {
        if let GraphPattern::Values {
            variables,
            bindings,
        } = pattern
        {
            if detect::has_placeholder_row(bindings) {
                declared.push(variables.clone());
            }
        }
    });

    if declared.len() != arg_sets.len() {
        return Err(EngineError::ArityMismatch {
            expected: declared.len(),
            actual: arg_sets.len(),
        });
    }

    // Convert everything up front so a bad row cannot leave the AST half
    // rewritten.
    let mut converted: Vec<Option<Vec<Vec<Option<GroundTerm>>>>> = Vec::new();
    for (index, (variables, args)) in declared.iter().zip(arg_sets).enumerate() {
        let group_vars: BTreeSet<&str> = variables.iter().map(|v| v.as_str()).collect();
        let supplied_vars: BTreeSet<&str> = args.head.vars.iter().map(String::as_str).collect();
        if group_vars != supplied_vars {
            let mut expected: Vec<String> = group_vars.iter().map(|s| s.to_string()).collect();
            expected.sort();
            return Err(EngineError::VariableMismatch {
                index,
                expected,
                actual: args.head.vars.clone(),
            });
        }

        if args.arguments.is_empty() {
            tracing::warn!(
                group = index,
                vars = ?args.head.vars,
                "argument list is empty; placeholder row retained"
            );
            converted.push(None);
            continue;
        }

        let rows = args
            .arguments
            .iter()
            .map(|row| convert_row(variables, row))
            .collect::<Result<Vec<_>>>()?;
        converted.push(Some(rows));
    }

    // Second pass: splice the converted rows in, same traversal order.
    let mut index = 0usize;
    let mut mutated = false;
    walk::visit_operation_mut(&mut parsed.op, &mut |pattern| {
        if let GraphPattern::Values { bindings, .. } = pattern {
            if !detect::has_placeholder_row(bindings) {
                return;
            }
            let Some(slot) = converted.get(index) else {
                return;
            };
            index += 1;
            if let Some(rows) = slot {
                bindings.retain(|row| !row.iter().all(Option::is_none));
                bindings.extend(rows.iter().cloned());
                mutated = true;
            }
        }
    });

    if mutated {
        parsed.mark_rewritten();
    }
    Ok(())
}

/// Convert one argument row into a `VALUES` row following the block's
/// declared variable order. Missing keys become UNDEF.
fn convert_row(variables: &[Variable], row: &Binding) -> Result<Vec<Option<GroundTerm>>> {
    variables
        .iter()
        .map(|var| match row.get(var.as_str()) {
            None => Ok(None),
            Some(term) => to_ground_term(var.as_str(), term).map(Some),
        })
        .collect()
}

/// Translate a typed binding value into an AST term.
///
/// IRIs and language tags go through the validating constructors so a
/// malformed argument can never smuggle raw text into the generated query.
fn to_ground_term(var: &str, term: &BoundTerm) -> Result<GroundTerm> {
    match term.kind {
        TermKind::Uri => checked_iri(var, &term.value).map(GroundTerm::from),
        TermKind::Literal => {
            let literal = if let Some(lang) = &term.lang {
                Literal::new_language_tagged_literal(term.value.clone(), lang.clone()).map_err(
                    |err| EngineError::IllegalArgumentType {
                        var: var.to_string(),
                        kind: format!("literal with language tag '{lang}' ({err})"),
                    },
                )?
            } else {
                match term.datatype.as_deref() {
                    None | Some(XSD_STRING) => Literal::new_simple_literal(term.value.clone()),
                    Some(datatype) => {
                        Literal::new_typed_literal(term.value.clone(), checked_iri(var, datatype)?)
                    }
                }
            };
            Ok(literal.into())
        }
        TermKind::Bnode => Err(EngineError::IllegalArgumentType {
            var: var.to_string(),
            kind: TermKind::Bnode.to_string(),
        }),
    }
}

fn checked_iri(var: &str, value: &str) -> Result<NamedNode> {
    NamedNode::new(value).map_err(|err| EngineError::IllegalArgumentType {
        var: var.to_string(),
        kind: format!("uri '{value}' ({err})"),
    })
}

/// Replace the first `LIMIT` placeholder literal with a concrete value.
///
/// Returns the text unchanged when no placeholder is present.
pub fn apply_limit(text: &str, value: u64) -> String {
    replace_placeholder(text, "LIMIT", value)
}

/// Replace the first `OFFSET` placeholder literal with a concrete value.
pub fn apply_offset(text: &str, value: u64) -> String {
    replace_placeholder(text, "OFFSET", value)
}

fn replace_placeholder(text: &str, keyword: &str, value: u64) -> String {
    let pattern = format!(r"(?i)\b{keyword}\s+0{{3}}\d*\b");
    let Ok(re) = regex::Regex::new(&pattern) else {
        return text.to_string();
    };
    re.replace(text, format!("{keyword} {value}")).into_owned()
}
