//! Backend adapters.
//!
//! [`Executor`] is the single abstraction the orchestrator talks to:
//! evaluate a parsed operation against a SPARQL store and hand back results
//! in the engine's own shapes. Adapters exist for remote HTTP endpoints and
//! for a shared in-process store.

pub mod http;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::binding::ResultSet;
use crate::error::{BackendErrorKind, EngineError, Result};
use crate::query::ParsedQuery;

pub use http::{HttpExecutor, HttpExecutorConfig};
pub use memory::MemoryExecutor;

/// Default Accept header for SELECT and ASK.
pub const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";
/// Default Accept header for parsed CONSTRUCT/DESCRIBE results.
pub const N_QUADS: &str = "application/n-quads";
/// Default Accept header for streamed CONSTRUCT/DESCRIBE results.
pub const N_TRIPLES: &str = "application/n-triples";

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Overrides the operation's default Accept header.
    pub accept: Option<String>,
    /// Deadline for the whole call; elapsing surfaces as a timeout error.
    pub deadline: Option<Duration>,
}

impl ExecOptions {
    pub(crate) fn accept_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.accept.as_deref().unwrap_or(default)
    }
}

/// A byte stream tagged with its negotiated media type.
pub struct ByteStream {
    pub media_type: String,
    pub stream: BoxStream<'static, Result<Bytes>>,
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStream")
            .field("media_type", &self.media_type)
            .finish_non_exhaustive()
    }
}

fn unsupported(operation: &str) -> EngineError {
    EngineError::Backend {
        kind: BackendErrorKind::Unsupported,
        status: None,
        message: format!("this backend does not implement {operation}"),
    }
}

/// Evaluates parsed operations against a SPARQL backend.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Evaluate a SELECT query into a parsed result set.
    async fn select(&self, query: &ParsedQuery, opts: &ExecOptions) -> Result<ResultSet>;

    /// Evaluate a CONSTRUCT or DESCRIBE query into an RDF string in the
    /// negotiated format.
    async fn construct(&self, query: &ParsedQuery, opts: &ExecOptions) -> Result<String>;

    /// Evaluate an ASK query.
    async fn ask(&self, query: &ParsedQuery, opts: &ExecOptions) -> Result<bool>;

    /// Run an update operation.
    async fn update(&self, update: &ParsedQuery) -> Result<()>;

    /// Stream SELECT results without parsing them.
    async fn select_stream(&self, query: &ParsedQuery, opts: &ExecOptions) -> Result<ByteStream> {
        let _ = (query, opts);
        Err(unsupported("streamed SELECT"))
    }

    /// Stream CONSTRUCT/DESCRIBE results without parsing them.
    async fn construct_stream(
        &self,
        query: &ParsedQuery,
        opts: &ExecOptions,
    ) -> Result<ByteStream> {
        let _ = (query, opts);
        Err(unsupported("streamed CONSTRUCT"))
    }
}
