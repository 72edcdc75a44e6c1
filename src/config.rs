//! Environment-driven configuration.
//!
//! The engine recognizes a fixed set of environment knobs; everything else
//! is wired explicitly through an [`ExecutionContext`]. Unknown values fall
//! back to defaults with a warning rather than refusing to start.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use crate::entity::{Credentials, EntityRegister};
use crate::error::{BackendErrorKind, EngineError, Result};
use crate::executor::{Executor, HttpExecutor, HttpExecutorConfig, MemoryExecutor};
use crate::orchestrator::ExecutionContext;

pub const ENV_BACKEND_TYPE: &str = "INTERNAL_BACKEND_TYPE";
pub const ENV_SPARQL_ENDPOINT: &str = "LIBRARY_STORAGE_SPARQL_ENDPOINT";
pub const ENV_SPARQL_UPDATE_ENDPOINT: &str = "LIBRARY_STORAGE_SPARQL_UPDATE_ENDPOINT";
pub const ENV_SPARQL_USERNAME: &str = "LIBRARY_STORAGE_SPARQL_USERNAME";
pub const ENV_SPARQL_PASSWORD: &str = "LIBRARY_STORAGE_SPARQL_PASSWORD";
pub const ENV_OXIGRAPH_DB_PATH: &str = "INTERNAL_OXIGRAPH_DB_PATH";
pub const ENV_TIMING_LOGS: &str = "ENABLE_TIMING_LOGS";

/// Which adapter serves queries when a node pins no backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultBackendKind {
    Http,
    #[default]
    OxigraphMemory,
}

/// Recognized configuration, resolved from the process environment.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub backend_type: DefaultBackendKind,
    pub sparql_endpoint: Option<String>,
    pub sparql_update_endpoint: Option<String>,
    pub sparql_username: Option<String>,
    pub sparql_password: Option<String>,
    pub oxigraph_db_path: Option<PathBuf>,
    pub enable_timing_logs: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve configuration through an arbitrary lookup, which keeps the
    /// parsing testable without mutating process state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let backend_type = match lookup(ENV_BACKEND_TYPE).as_deref() {
            Some("http") => DefaultBackendKind::Http,
            Some("oxigraph-memory") | None => DefaultBackendKind::OxigraphMemory,
            Some(other) => {
                tracing::warn!(
                    value = other,
                    "unknown {ENV_BACKEND_TYPE}; defaulting to oxigraph-memory"
                );
                DefaultBackendKind::OxigraphMemory
            }
        };
        Self {
            backend_type,
            sparql_endpoint: lookup(ENV_SPARQL_ENDPOINT),
            sparql_update_endpoint: lookup(ENV_SPARQL_UPDATE_ENDPOINT),
            sparql_username: lookup(ENV_SPARQL_USERNAME),
            sparql_password: lookup(ENV_SPARQL_PASSWORD),
            oxigraph_db_path: lookup(ENV_OXIGRAPH_DB_PATH).map(PathBuf::from),
            enable_timing_logs: lookup(ENV_TIMING_LOGS)
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(false),
        }
    }

    fn credentials(&self) -> Option<Credentials> {
        match (&self.sparql_username, &self.sparql_password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    /// Build the shared in-process executor, persistent when a database
    /// path is configured.
    pub fn memory_executor(&self) -> Result<MemoryExecutor> {
        match &self.oxigraph_db_path {
            Some(path) => MemoryExecutor::open(path),
            None => MemoryExecutor::new(),
        }
    }

    /// Build the default executor selected by `INTERNAL_BACKEND_TYPE`.
    pub fn default_executor(&self) -> Result<Arc<dyn Executor>> {
        match self.backend_type {
            DefaultBackendKind::Http => {
                let query_url =
                    self.sparql_endpoint
                        .clone()
                        .ok_or_else(|| EngineError::Backend {
                            kind: BackendErrorKind::Io,
                            status: None,
                            message: format!(
                                "{ENV_SPARQL_ENDPOINT} must be set when {ENV_BACKEND_TYPE} is http"
                            ),
                        })?;
                let executor = HttpExecutor::new(HttpExecutorConfig {
                    query_url,
                    update_url: self.sparql_update_endpoint.clone(),
                    credentials: self.credentials(),
                })?;
                Ok(Arc::new(executor))
            }
            DefaultBackendKind::OxigraphMemory => Ok(Arc::new(self.memory_executor()?)),
        }
    }

    /// Assemble a ready-to-run execution context over `register`.
    ///
    /// With a memory default, one store instance serves both the default
    /// slot and `OxigraphMemory`-pinned nodes.
    pub fn build_context(&self, register: Arc<EntityRegister>) -> Result<ExecutionContext> {
        let ctx = match self.backend_type {
            DefaultBackendKind::OxigraphMemory => {
                let memory = Arc::new(self.memory_executor()?);
                ExecutionContext::new(register, memory.clone()).with_memory_executor(memory)
            }
            DefaultBackendKind::Http => ExecutionContext::new(register, self.default_executor()?),
        };
        Ok(ctx.with_timing_logs(self.enable_timing_logs))
    }
}
