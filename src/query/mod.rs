//! Parsing and serialization of SPARQL operations.
//!
//! [`ParsedQuery`] wraps the grammar library's AST together with the
//! `LIMIT`/`OFFSET` placeholder literals captured from the source text. The
//! grammar normalizes numeric literals, so placeholders only survive a
//! rewrite round trip because the generator re-inserts them.

pub mod apply;
pub mod detect;
pub mod outputs;
pub(crate) mod walk;

use std::str::FromStr;

use spargebra::{Query, Update};

use crate::binding::ArgumentSet;
use crate::error::{EngineError, Result};

pub use detect::DetectedParameters;

/// The form of a parsed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryForm {
    Select,
    Construct,
    Describe,
    Ask,
    Update,
}

impl std::fmt::Display for QueryForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryForm::Select => write!(f, "SELECT"),
            QueryForm::Construct => write!(f, "CONSTRUCT"),
            QueryForm::Describe => write!(f, "DESCRIBE"),
            QueryForm::Ask => write!(f, "ASK"),
            QueryForm::Update => write!(f, "UPDATE"),
        }
    }
}

/// A parsed SPARQL query or update.
#[derive(Debug, Clone)]
pub(crate) enum SparqlOperation {
    Query(Query),
    Update(Update),
}

/// A numeric placeholder captured from the source text, e.g. `LIMIT 000100`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Normalized literal text (`LIMIT 000100`).
    pub literal: String,
    /// The digit string as written (`000100`).
    pub digits: String,
    /// The numeric value the grammar sees (`100`).
    pub value: u64,
}

/// A SPARQL operation parsed into the grammar library's AST, plus the
/// placeholder literals the grammar would otherwise normalize away.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub(crate) op: SparqlOperation,
    source: String,
    limit_placeholders: Vec<Placeholder>,
    offset_placeholders: Vec<Placeholder>,
    rewritten: bool,
}

const UPDATE_KEYWORDS: &[&str] = &[
    "INSERT", "DELETE", "LOAD", "CREATE", "DROP", "CLEAR", "WITH", "COPY", "MOVE", "ADD",
];

fn looks_like_update(text: &str) -> bool {
    let mut rest = text.trim_start();
    // skip BASE/PREFIX prologue lines to reach the first operation keyword
    loop {
        let upper = rest.to_ascii_uppercase();
        if upper.starts_with("PREFIX") || upper.starts_with("BASE") {
            match rest.find('>') {
                Some(pos) => rest = rest[pos + 1..].trim_start(),
                None => return false,
            }
        } else {
            return UPDATE_KEYWORDS
                .iter()
                .any(|kw| upper.starts_with(kw));
        }
    }
}

impl ParsedQuery {
    /// Parse SPARQL text into an AST, capturing placeholder literals.
    pub fn parse(text: &str) -> Result<Self> {
        let op = if looks_like_update(text) {
            match Update::from_str(text) {
                Ok(update) => SparqlOperation::Update(update),
                Err(err) => {
                    return Err(EngineError::Parse {
                        message: err.to_string(),
                    });
                }
            }
        } else {
            match Query::from_str(text) {
                Ok(query) => SparqlOperation::Query(query),
                Err(query_err) => match Update::from_str(text) {
                    Ok(update) => SparqlOperation::Update(update),
                    Err(_) => {
                        return Err(EngineError::Parse {
                            message: query_err.to_string(),
                        });
                    }
                },
            }
        };
        let (limit_placeholders, offset_placeholders) = detect::scan_placeholders(text);
        Ok(Self {
            op,
            source: text.to_string(),
            limit_placeholders,
            offset_placeholders,
            rewritten: false,
        })
    }

    /// The operation's form.
    pub fn form(&self) -> QueryForm {
        match &self.op {
            SparqlOperation::Query(Query::Select { .. }) => QueryForm::Select,
            SparqlOperation::Query(Query::Construct { .. }) => QueryForm::Construct,
            SparqlOperation::Query(Query::Describe { .. }) => QueryForm::Describe,
            SparqlOperation::Query(Query::Ask { .. }) => QueryForm::Ask,
            SparqlOperation::Update(_) => QueryForm::Update,
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(self.op, SparqlOperation::Update(_))
    }

    /// Detected parameters: VALUES groups plus placeholder literals.
    pub fn parameters(&self) -> DetectedParameters {
        DetectedParameters {
            values: detect::values_groups(&self.op),
            limits: self
                .limit_placeholders
                .iter()
                .map(|p| p.literal.clone())
                .collect(),
            offsets: self
                .offset_placeholders
                .iter()
                .map(|p| p.literal.clone())
                .collect(),
        }
    }

    /// SELECT projection variable names, sorted; empty for non-SELECT.
    pub fn output_variables(&self) -> Vec<String> {
        outputs::output_variables(&self.op)
    }

    /// Substitute argument rows into the UNDEF placeholder rows.
    ///
    /// See [`apply::apply_arguments`] for the full contract.
    pub fn apply_arguments(&mut self, arg_sets: &[ArgumentSet]) -> Result<()> {
        apply::apply_arguments(self, arg_sets)
    }

    /// Serialize back to SPARQL text.
    ///
    /// Until the AST is mutated this returns the original text verbatim;
    /// after a rewrite the text is regenerated from the AST and any
    /// unapplied placeholder literals are restored so they remain
    /// detectable.
    pub fn to_sparql(&self) -> String {
        if !self.rewritten {
            return self.source.clone();
        }
        let generated = match &self.op {
            SparqlOperation::Query(query) => query.to_string(),
            SparqlOperation::Update(update) => update.to_string(),
        };
        let generated = restore_placeholders(generated, "LIMIT", &self.limit_placeholders);
        restore_placeholders(generated, "OFFSET", &self.offset_placeholders)
    }

    pub(crate) fn mark_rewritten(&mut self) {
        self.rewritten = true;
    }
}

impl std::fmt::Display for ParsedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_sparql())
    }
}

/// Re-insert placeholder literals into regenerated text.
///
/// The generator prints `KEYWORD <value>` without leading zeros; each
/// captured placeholder replaces the first remaining occurrence of its value
/// in emission order.
fn restore_placeholders(text: String, keyword: &str, placeholders: &[Placeholder]) -> String {
    if placeholders.is_empty() {
        return text;
    }
    let mut out = text;
    let mut cursor = 0usize;
    for placeholder in placeholders {
        let pattern = format!(r"\b{keyword}\s+{}\b", placeholder.value);
        let Ok(re) = regex::Regex::new(&pattern) else {
            continue;
        };
        if let Some(found) = re.find(&out[cursor..]) {
            let start = cursor + found.start();
            let end = cursor + found.end();
            out.replace_range(start..end, &placeholder.literal);
            cursor = start + placeholder.literal.len();
        }
    }
    out
}
