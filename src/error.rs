//! Error taxonomy for the parameterized-query engine.
//!
//! Every failure the engine can surface is one of the variants below, each
//! carrying the structured payload a caller needs to react programmatically.
//! The applier, detector and transformer fail eagerly; the orchestrator
//! downgrades per-edge failures to warnings and only propagates the kinds
//! reported by [`EngineError::is_fatal`].

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// The kind of entity a register lookup failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Query,
    Node,
    Edge,
    Group,
    Backend,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Query => write!(f, "stored query"),
            EntityKind::Node => write!(f, "query node"),
            EntityKind::Edge => write!(f, "query edge"),
            EntityKind::Group => write!(f, "query group"),
            EntityKind::Backend => write!(f, "backend"),
        }
    }
}

/// Classification of backend failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Non-2xx HTTP response.
    Http,
    /// Transport or local I/O failure.
    Io,
    /// The call exceeded its deadline.
    Timeout,
    /// The backend answered with a body the negotiated format cannot parse.
    Protocol,
    /// The adapter does not implement the requested operation.
    Unsupported,
}

impl std::fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendErrorKind::Http => write!(f, "http"),
            BackendErrorKind::Io => write!(f, "io"),
            BackendErrorKind::Timeout => write!(f, "timeout"),
            BackendErrorKind::Protocol => write!(f, "protocol"),
            BackendErrorKind::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Errors produced by parsing, rewriting, validation and group execution.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input SPARQL was rejected by the grammar.
    #[error("failed to parse SPARQL: {message}")]
    Parse { message: String },

    /// Number of supplied argument sets differs from the number of detected
    /// parameter groups.
    #[error("query declares {expected} parameter group(s) but {actual} argument set(s) were supplied")]
    ArityMismatch { expected: usize, actual: usize },

    /// An argument set binds a different variable set than its parameter
    /// group declares.
    #[error("parameter group {index} declares variables {expected:?} but arguments bind {actual:?}")]
    VariableMismatch {
        index: usize,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// A `bnode` (or unknown) typed value appeared in an argument row.
    #[error("argument '{var}' has type '{kind}', which cannot appear in a VALUES row")]
    IllegalArgumentType { var: String, kind: String },

    /// An argument value's type is outside the parameter's allowed types.
    #[error(
        "argument '{param}' from {source} (row {row}) has type '{got}' but target node '{target_node}' allows {expected:?}"
    )]
    TypeMismatch {
        param: String,
        expected: Vec<String>,
        got: String,
        row: usize,
        source: String,
        target_node: String,
    },

    /// Start nodes could not be derived unambiguously.
    #[error("cannot derive a unique start node set for group '{group}'")]
    AmbiguousStartSet { group: String },

    /// The group's node/edge structure contains a cycle.
    #[error("group '{group}' is cyclic: {pending} node(s) can never become ready")]
    CyclicGraph { group: String, pending: usize },

    /// A referenced entity is missing from the register.
    #[error("{kind} '{id}' is not present in the entity register")]
    UnresolvedReference { kind: EntityKind, id: String },

    /// An UPDATE operation was encountered inside a query group.
    #[error("node '{node}' holds an update operation; updates cannot run inside a query group")]
    UpdateNotAllowed { node: String },

    /// The stored query's declared type disagrees with the parsed form.
    #[error("stored query '{query}' is declared as {declared} but parses as {parsed}")]
    UnsupportedQueryType {
        query: String,
        declared: String,
        parsed: String,
    },

    /// A backend call failed.
    #[error("backend failure ({kind}{}): {message}", .status.map(|s| format!(", status {s}")).unwrap_or_default())]
    Backend {
        kind: BackendErrorKind,
        status: Option<u16>,
        message: String,
    },

    /// Traversal finished without producing a selectable final result.
    #[error("group '{group}' finished without producing a result")]
    NoResult { group: String },
}

impl EngineError {
    /// Whether the orchestrator must abort the whole execution on this error
    /// instead of skipping the offending edge.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::CyclicGraph { .. }
                | EngineError::UpdateNotAllowed { .. }
                | EngineError::NoResult { .. }
                | EngineError::AmbiguousStartSet { .. }
        )
    }

    /// Short machine-readable tag, used in log fields.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Parse { .. } => "parse_error",
            EngineError::ArityMismatch { .. } => "arity_mismatch",
            EngineError::VariableMismatch { .. } => "variable_mismatch",
            EngineError::IllegalArgumentType { .. } => "illegal_argument_type",
            EngineError::TypeMismatch { .. } => "type_mismatch",
            EngineError::AmbiguousStartSet { .. } => "ambiguous_start_set",
            EngineError::CyclicGraph { .. } => "cyclic_graph",
            EngineError::UnresolvedReference { .. } => "unresolved_reference",
            EngineError::UpdateNotAllowed { .. } => "update_not_allowed",
            EngineError::UnsupportedQueryType { .. } => "unsupported_query_type",
            EngineError::Backend { .. } => "backend_error",
            EngineError::NoResult { .. } => "no_result",
        }
    }
}
