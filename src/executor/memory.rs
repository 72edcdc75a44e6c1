//! In-process store adapter.
//!
//! Wraps a shared `oxigraph` store: in-memory by default, or opened from a
//! filesystem path for a persistent variant. Evaluation is synchronous in
//! oxigraph, so calls are moved onto the blocking pool and bounded by the
//! caller's deadline.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use oxigraph::model::Term;
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;

use super::{ExecOptions, Executor};
use crate::binding::{Binding, BoundTerm, ResultSet};
use crate::error::{BackendErrorKind, EngineError, Result};
use crate::query::ParsedQuery;

const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

/// `Executor` backed by a shared in-process store.
#[derive(Clone)]
pub struct MemoryExecutor {
    store: Store,
}

impl MemoryExecutor {
    /// A fresh in-memory store.
    pub fn new() -> Result<Self> {
        Store::new()
            .map(|store| Self { store })
            .map_err(store_error)
    }

    /// A store persisted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Store::open(path)
            .map(|store| Self { store })
            .map_err(store_error)
    }

    /// Direct access to the underlying store, e.g. for loading data.
    pub fn store(&self) -> &Store {
        &self.store
    }
}

fn store_error(err: impl std::fmt::Display) -> EngineError {
    EngineError::Backend {
        kind: BackendErrorKind::Io,
        status: None,
        message: err.to_string(),
    }
}

fn protocol_error(message: impl Into<String>) -> EngineError {
    EngineError::Backend {
        kind: BackendErrorKind::Protocol,
        status: None,
        message: message.into(),
    }
}

/// Run a blocking store call with an optional deadline.
async fn run_blocking<T: Send + 'static>(
    deadline: Option<Duration>,
    call: impl FnOnce() -> Result<T> + Send + 'static,
) -> Result<T> {
    let task = tokio::task::spawn_blocking(call);
    let joined = match deadline {
        Some(deadline) => tokio::time::timeout(deadline, task)
            .await
            .map_err(|_| EngineError::Backend {
                kind: BackendErrorKind::Timeout,
                status: None,
                message: "store call exceeded its deadline".into(),
            })?,
        None => task.await,
    };
    joined.map_err(|err| store_error(err))?
}

fn term_to_bound(term: &Term) -> BoundTerm {
    match term {
        Term::NamedNode(node) => BoundTerm::uri(node.as_str()),
        Term::BlankNode(node) => BoundTerm::bnode(node.as_str()),
        Term::Literal(literal) => {
            if let Some(lang) = literal.language() {
                BoundTerm::literal_lang(literal.value(), lang)
            } else if literal.datatype().as_str() == XSD_STRING {
                BoundTerm::literal(literal.value())
            } else {
                BoundTerm::literal_typed(literal.value(), literal.datatype().as_str())
            }
        }
        other => BoundTerm::literal(other.to_string()),
    }
}

#[async_trait]
impl Executor for MemoryExecutor {
    async fn select(&self, query: &ParsedQuery, opts: &ExecOptions) -> Result<ResultSet> {
        let store = self.store.clone();
        let text = query.to_sparql();
        run_blocking(opts.deadline, move || {
            match store.query(text.as_str()).map_err(store_error)? {
                QueryResults::Solutions(solutions) => {
                    let vars: Vec<String> = solutions
                        .variables()
                        .iter()
                        .map(|v| v.as_str().to_string())
                        .collect();
                    let mut rows = Vec::new();
                    for solution in solutions {
                        let solution = solution.map_err(store_error)?;
                        let mut row = Binding::new();
                        for (var, term) in solution.iter() {
                            row.insert(var.as_str().to_string(), term_to_bound(term));
                        }
                        rows.push(row);
                    }
                    Ok(ResultSet::select(vars, rows))
                }
                _ => Err(protocol_error("query did not produce solutions")),
            }
        })
        .await
    }

    async fn construct(&self, query: &ParsedQuery, opts: &ExecOptions) -> Result<String> {
        let store = self.store.clone();
        let text = query.to_sparql();
        run_blocking(opts.deadline, move || {
            match store.query(text.as_str()).map_err(store_error)? {
                QueryResults::Graph(triples) => {
                    let mut out = String::new();
                    for triple in triples {
                        let triple = triple.map_err(store_error)?;
                        out.push_str(&triple.to_string());
                        out.push_str(" .\n");
                    }
                    Ok(out)
                }
                _ => Err(protocol_error("query did not produce a graph")),
            }
        })
        .await
    }

    async fn ask(&self, query: &ParsedQuery, opts: &ExecOptions) -> Result<bool> {
        let store = self.store.clone();
        let text = query.to_sparql();
        run_blocking(opts.deadline, move || {
            match store.query(text.as_str()).map_err(store_error)? {
                QueryResults::Boolean(value) => Ok(value),
                _ => Err(protocol_error("query did not produce a boolean")),
            }
        })
        .await
    }

    async fn update(&self, update: &ParsedQuery) -> Result<()> {
        let store = self.store.clone();
        let text = update.to_sparql();
        run_blocking(None, move || {
            store.update(text.as_str()).map_err(store_error)
        })
        .await
    }
}
