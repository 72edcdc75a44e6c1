//! Parameter detection.
//!
//! A parameter group is a `VALUES` block containing at least one row in
//! which every position is UNDEF. Detection runs over the parsed algebra in
//! document order so that applied argument sets line up positionally.
//!
//! `LIMIT`/`OFFSET` placeholders (three or more leading zeros) are scanned
//! textually: the grammar folds numeric literals into plain integers, so the
//! leading zeros only exist in the source text.

use once_cell::sync::Lazy;
use regex::Regex;
use spargebra::algebra::GraphPattern;
use spargebra::term::GroundTerm;

use super::walk;
use super::{ParsedQuery, Placeholder, SparqlOperation};
use crate::error::Result;

/// Output of the parameter detector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectedParameters {
    /// One entry per parameter group in document order; variable names are
    /// sorted lexicographically inside each entry.
    pub values: Vec<Vec<String>>,
    /// `LIMIT` placeholder literals in document order.
    pub limits: Vec<String>,
    /// `OFFSET` placeholder literals in document order.
    pub offsets: Vec<String>,
}

/// Parse `text` and report its parameter groups and placeholders.
pub fn detect(text: &str) -> Result<DetectedParameters> {
    Ok(ParsedQuery::parse(text)?.parameters())
}

/// Whether a `VALUES` block qualifies as a parameter group.
pub(crate) fn has_placeholder_row(bindings: &[Vec<Option<GroundTerm>>]) -> bool {
    bindings.iter().any(|row| row.iter().all(Option::is_none))
}

/// Variable-name sets of every parameter group, in document order.
pub(crate) fn values_groups(op: &SparqlOperation) -> Vec<Vec<String>> {
    let mut groups = Vec::new();
    walk::visit_operation(op, &mut |pattern| {
        if let GraphPattern::Values {
            variables,
            bindings,
        } = pattern
        {
            if has_placeholder_row(bindings) {
                let mut names: Vec<String> =
                    variables.iter().map(|v| v.as_str().to_string()).collect();
                names.sort();
                groups.push(names);
            }
        }
    });
    groups
}

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(LIMIT|OFFSET)\s+(0{3}\d*)\b").expect("valid regex"));

/// Scan source text for placeholder literals, in document order.
pub(crate) fn scan_placeholders(text: &str) -> (Vec<Placeholder>, Vec<Placeholder>) {
    let mut limits = Vec::new();
    let mut offsets = Vec::new();
    for captures in PLACEHOLDER_RE.captures_iter(text) {
        let keyword = captures[1].to_ascii_uppercase();
        let digits = captures[2].to_string();
        let trimmed = digits.trim_start_matches('0');
        let value = if trimmed.is_empty() {
            0
        } else {
            trimmed.parse::<u64>().unwrap_or(u64::MAX)
        };
        let placeholder = Placeholder {
            literal: format!("{keyword} {digits}"),
            digits,
            value,
        };
        if keyword == "LIMIT" {
            limits.push(placeholder);
        } else {
            offsets.push(placeholder);
        }
    }
    (limits, offsets)
}
