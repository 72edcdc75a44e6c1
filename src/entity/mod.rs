//! Stored entities: queries, nodes, edges, groups and backends.
//!
//! These are the persisted shapes the engine receives at request time. They
//! are plain serde models with camelCase wire names; references between
//! them are ids, resolved through the [`EntityRegister`].

pub mod register;

use serde::{Deserialize, Serialize};

use crate::binding::TermKind;
use crate::error::Result;
use crate::query::{ParsedQuery, QueryForm};

/// A term kind admissible in `allowed_types`: only IRIs and literals may be
/// declared, matching what a `VALUES` row can carry. Deserialization rejects
/// anything else, so the restriction holds from the moment an entity loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentTermKind {
    Uri,
    Literal,
}

impl ArgumentTermKind {
    /// Whether an argument value of `kind` satisfies this declaration.
    pub fn matches(self, kind: TermKind) -> bool {
        matches!(
            (self, kind),
            (ArgumentTermKind::Uri, TermKind::Uri)
                | (ArgumentTermKind::Literal, TermKind::Literal)
        )
    }
}

impl std::fmt::Display for ArgumentTermKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgumentTermKind::Uri => write!(f, "uri"),
            ArgumentTermKind::Literal => write!(f, "literal"),
        }
    }
}

pub use register::{EntityRef, EntityRegister, RefStub};

/// Entities addressable by id.
pub trait HasId {
    fn id(&self) -> &str;
}

/// A stored SPARQL query plus its introspected parameter metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredQuery {
    pub id: String,
    pub name: String,
    pub query_text: String,
    pub query_type: QueryForm,
    #[serde(default)]
    pub parameters: Vec<QueryParameterGroup>,
    #[serde(default)]
    pub output_vars: Vec<String>,
    #[serde(default)]
    pub has_limit_parameter: bool,
    #[serde(default)]
    pub has_offset_parameter: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_backend: Option<String>,
}

impl StoredQuery {
    /// Build a stored query by introspecting `query_text`: parameter groups,
    /// output variables and placeholder flags are derived rather than
    /// hand-maintained, so they always match what the detector would find.
    pub fn introspect(
        id: impl Into<String>,
        name: impl Into<String>,
        query_text: impl Into<String>,
    ) -> Result<Self> {
        let query_text = query_text.into();
        let parsed = ParsedQuery::parse(&query_text)?;
        let detected = parsed.parameters();
        Ok(Self {
            id: id.into(),
            name: name.into(),
            query_type: parsed.form(),
            parameters: detected
                .values
                .into_iter()
                .map(|vars| QueryParameterGroup {
                    vars: vars
                        .into_iter()
                        .map(|param_name| QueryParameter {
                            param_name,
                            allowed_types: Vec::new(),
                        })
                        .collect(),
                })
                .collect(),
            output_vars: parsed.output_variables(),
            has_limit_parameter: !detected.limits.is_empty(),
            has_offset_parameter: !detected.offsets.is_empty(),
            default_backend: None,
            query_text,
        })
    }

    /// Restrict a parameter's accepted argument types.
    pub fn with_allowed_types(mut self, param: &str, allowed: Vec<ArgumentTermKind>) -> Self {
        for group in &mut self.parameters {
            for var in &mut group.vars {
                if var.param_name == param {
                    var.allowed_types = allowed.clone();
                }
            }
        }
        self
    }
}

impl HasId for StoredQuery {
    fn id(&self) -> &str {
        &self.id
    }
}

/// One `VALUES` parameter group of a stored query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameterGroup {
    pub vars: Vec<QueryParameter>,
}

/// A single parameter with its accepted argument types.
///
/// An empty `allowed_types` list accepts any non-bnode argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameter {
    pub param_name: String,
    #[serde(default)]
    pub allowed_types: Vec<ArgumentTermKind>,
}

/// A node of a query group: a stored query plus an optional backend pin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryNode {
    pub id: String,
    pub query_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_id: Option<String>,
}

impl HasId for QueryNode {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A directed edge routing one node's outputs into another's parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryEdge {
    pub id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    #[serde(default)]
    pub mappings: Vec<ParameterMapping>,
}

impl HasId for QueryEdge {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Rename directive on an edge: source output variable → target parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterMapping {
    pub from_param: String,
    pub to_param: String,
}

/// A DAG of query nodes and edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryGroup {
    pub id: String,
    #[serde(default)]
    pub nodes: Vec<EntityRef<QueryNode>>,
    #[serde(default)]
    pub edges: Vec<EntityRef<QueryEdge>>,
    #[serde(default)]
    pub start_node_ids: Vec<String>,
    #[serde(default)]
    pub end_node_ids: Vec<String>,
}

impl HasId for QueryGroup {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Supported backend adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendType {
    #[serde(rename = "HTTP")]
    Http,
    OxigraphMemory,
}

/// Credentials for HTTP Basic authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A backend a node can be pinned to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    pub id: String,
    pub backend_type: BackendType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

impl HasId for Backend {
    fn id(&self) -> &str {
        &self.id
    }
}
