//! SPARQL-JSON shapes: typed terms, binding rows, result sets and the
//! argument-set envelope consumed by the rewriter.
//!
//! These are the only types that cross the wire; serialization happens at
//! the I/O edge and the rest of the engine works on the deserialized sums.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One solution row: variable name (without the leading `?`) to typed value.
///
/// `IndexMap` keeps key order stable across a parse/serialize round trip.
pub type Binding = IndexMap<String, BoundTerm>;

/// The `type` discriminator of a SPARQL-JSON term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermKind {
    Uri,
    Literal,
    Bnode,
}

impl std::fmt::Display for TermKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TermKind::Uri => write!(f, "uri"),
            TermKind::Literal => write!(f, "literal"),
            TermKind::Bnode => write!(f, "bnode"),
        }
    }
}

/// A typed value inside a binding row, in the SPARQL 1.1 JSON results shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundTerm {
    #[serde(rename = "type")]
    pub kind: TermKind,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(rename = "xml:lang", default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl BoundTerm {
    pub fn uri(value: impl Into<String>) -> Self {
        Self {
            kind: TermKind::Uri,
            value: value.into(),
            datatype: None,
            lang: None,
        }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            kind: TermKind::Literal,
            value: value.into(),
            datatype: None,
            lang: None,
        }
    }

    pub fn literal_typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            kind: TermKind::Literal,
            value: value.into(),
            datatype: Some(datatype.into()),
            lang: None,
        }
    }

    pub fn literal_lang(value: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            kind: TermKind::Literal,
            value: value.into(),
            datatype: None,
            lang: Some(lang.into()),
        }
    }

    pub fn bnode(value: impl Into<String>) -> Self {
        Self {
            kind: TermKind::Bnode,
            value: value.into(),
            datatype: None,
            lang: None,
        }
    }
}

/// The `head` section shared by result sets and argument sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Head {
    #[serde(default)]
    pub vars: Vec<String>,
}

/// The `results` section of a SELECT result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingRows {
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

/// A SPARQL 1.1 JSON result set. SELECT fills `results`; ASK fills `boolean`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    #[serde(default)]
    pub head: Head,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<BindingRows>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boolean: Option<bool>,
}

impl ResultSet {
    /// Build a SELECT-shaped result set.
    pub fn select(vars: Vec<String>, bindings: Vec<Binding>) -> Self {
        Self {
            head: Head { vars },
            results: Some(BindingRows { bindings }),
            boolean: None,
        }
    }

    /// Build an ASK-shaped result set.
    pub fn ask(value: bool) -> Self {
        Self {
            head: Head::default(),
            results: None,
            boolean: Some(value),
        }
    }

    /// Solution rows, empty for ASK results.
    pub fn bindings(&self) -> &[Binding] {
        self.results.as_ref().map(|r| r.bindings.as_slice()).unwrap_or(&[])
    }
}

/// Rows to be substituted into a query's `VALUES` placeholders.
///
/// Invariant: every row's keys are a subset of `head.vars`; a missing key
/// denotes UNDEF at that position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgumentSet {
    #[serde(default)]
    pub head: Head,
    #[serde(default)]
    pub arguments: Vec<Binding>,
}

impl ArgumentSet {
    pub fn new(vars: Vec<String>, arguments: Vec<Binding>) -> Self {
        Self {
            head: Head { vars },
            arguments,
        }
    }

    /// An argument set that binds nothing (the documented no-op case).
    pub fn empty(vars: Vec<String>) -> Self {
        Self::new(vars, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }
}

/// Convenience for building rows in tests and fixtures.
pub fn binding(pairs: Vec<(&str, BoundTerm)>) -> Binding {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
