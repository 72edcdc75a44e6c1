//! Parameterized SPARQL query engine.
//!
//! The crate parses SPARQL 1.1 into an AST, detects *parameters* —
//! `VALUES` blocks containing an all-UNDEF row, plus `LIMIT 000N` /
//! `OFFSET 000N` placeholder literals — rewrites queries by substituting
//! typed argument rows into those placeholders, and orchestrates DAGs of
//! stored queries whose edges route one node's output bindings into the
//! next node's parameters.
//!
//! ```no_run
//! use parql::query::detect::detect;
//!
//! let detected = detect(
//!     "SELECT * WHERE { VALUES (?s ?p) { (UNDEF UNDEF) } ?s ?p ?o } LIMIT 000100",
//! )?;
//! assert_eq!(detected.values, vec![vec!["p".to_string(), "s".to_string()]]);
//! assert_eq!(detected.limits, vec!["LIMIT 000100"]);
//! # Ok::<_, parql::EngineError>(())
//! ```

pub mod binding;
pub mod config;
pub mod entity;
pub mod error;
pub mod executor;
pub mod logging;
pub mod orchestrator;
pub mod query;
pub mod transform;

pub use binding::{ArgumentSet, Binding, BoundTerm, Head, ResultSet, TermKind};
pub use config::{Config, DefaultBackendKind};
pub use entity::{
    ArgumentTermKind, Backend, BackendType, Credentials, EntityRef, EntityRegister,
    ParameterMapping, QueryEdge, QueryGroup, QueryNode, QueryParameter, QueryParameterGroup,
    StoredQuery,
};
pub use error::{BackendErrorKind, EngineError, EntityKind, Result};
pub use executor::{
    ByteStream, ExecOptions, Executor, HttpExecutor, HttpExecutorConfig, MemoryExecutor,
};
pub use logging::{LogFormat, LoggingConfig, init_logging};
pub use orchestrator::{ExecutionContext, ExecutionRequest, GroupPlan, GroupRunner, QueryOutcome};
pub use query::apply::{apply_limit, apply_offset};
pub use query::{DetectedParameters, ParsedQuery, QueryForm};
pub use transform::map_results;
