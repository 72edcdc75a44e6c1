//! Remote SPARQL endpoint adapter.
//!
//! Queries go out as `GET endpoint?query=…`, updates as a form-encoded
//! `POST update=…`, both with HTTP Basic auth when credentials are
//! configured. The underlying client keeps connections alive across calls.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};

use super::{ByteStream, ExecOptions, Executor, N_QUADS, N_TRIPLES, SPARQL_RESULTS_JSON};
use crate::binding::ResultSet;
use crate::entity::Credentials;
use crate::error::{BackendErrorKind, EngineError, Result};
use crate::query::ParsedQuery;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const ERROR_BODY_SNIPPET: usize = 256;

/// Connection parameters for a remote endpoint.
#[derive(Debug, Clone)]
pub struct HttpExecutorConfig {
    /// Query endpoint URL.
    pub query_url: String,
    /// Update endpoint URL; falls back to `query_url` when absent.
    pub update_url: Option<String>,
    pub credentials: Option<Credentials>,
}

impl HttpExecutorConfig {
    pub fn new(query_url: impl Into<String>) -> Self {
        Self {
            query_url: query_url.into(),
            update_url: None,
            credentials: None,
        }
    }
}

/// `Executor` backed by a remote SPARQL protocol endpoint.
pub struct HttpExecutor {
    client: Client,
    config: HttpExecutorConfig,
}

impl HttpExecutor {
    pub fn new(config: HttpExecutorConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()
            .map_err(|err| EngineError::Backend {
                kind: BackendErrorKind::Io,
                status: None,
                message: err.to_string(),
            })?;
        Ok(Self { client, config })
    }

    async fn run_query(&self, query: &ParsedQuery, accept: &str, deadline: Option<Duration>) -> Result<Response> {
        let mut request = self
            .client
            .get(&self.config.query_url)
            .query(&[("query", query.to_sparql())])
            .header(ACCEPT, accept);
        if let Some(credentials) = &self.config.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }
        if let Some(deadline) = deadline {
            request = request.timeout(deadline);
        }
        let response = request.send().await.map_err(map_transport_error)?;
        check_status(response).await
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn select(&self, query: &ParsedQuery, opts: &ExecOptions) -> Result<ResultSet> {
        let response = self
            .run_query(query, opts.accept_or(SPARQL_RESULTS_JSON), opts.deadline)
            .await?;
        response
            .json::<ResultSet>()
            .await
            .map_err(|err| protocol_error("SELECT response is not SPARQL-JSON", err))
    }

    async fn construct(&self, query: &ParsedQuery, opts: &ExecOptions) -> Result<String> {
        let response = self
            .run_query(query, opts.accept_or(N_QUADS), opts.deadline)
            .await?;
        response.text().await.map_err(map_transport_error)
    }

    async fn ask(&self, query: &ParsedQuery, opts: &ExecOptions) -> Result<bool> {
        let response = self
            .run_query(query, opts.accept_or(SPARQL_RESULTS_JSON), opts.deadline)
            .await?;
        let results = response
            .json::<ResultSet>()
            .await
            .map_err(|err| protocol_error("ASK response is not SPARQL-JSON", err))?;
        results.boolean.ok_or_else(|| EngineError::Backend {
            kind: BackendErrorKind::Protocol,
            status: None,
            message: "ASK response carries no boolean field".into(),
        })
    }

    async fn update(&self, update: &ParsedQuery) -> Result<()> {
        let url = self
            .config
            .update_url
            .as_deref()
            .unwrap_or(&self.config.query_url);
        let mut request = self
            .client
            .post(url)
            .form(&[("update", update.to_sparql())]);
        if let Some(credentials) = &self.config.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }
        let response = request.send().await.map_err(map_transport_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn select_stream(&self, query: &ParsedQuery, opts: &ExecOptions) -> Result<ByteStream> {
        let accept = opts.accept_or(SPARQL_RESULTS_JSON).to_string();
        let response = self.run_query(query, &accept, opts.deadline).await?;
        Ok(into_byte_stream(response, accept))
    }

    async fn construct_stream(
        &self,
        query: &ParsedQuery,
        opts: &ExecOptions,
    ) -> Result<ByteStream> {
        let accept = opts.accept_or(N_TRIPLES).to_string();
        let response = self.run_query(query, &accept, opts.deadline).await?;
        Ok(into_byte_stream(response, accept))
    }
}

fn into_byte_stream(response: Response, accept: String) -> ByteStream {
    let media_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
        .unwrap_or(accept);
    let stream = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(map_transport_error))
        .boxed();
    ByteStream { media_type, stream }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(ERROR_BODY_SNIPPET).collect();
    Err(EngineError::Backend {
        kind: BackendErrorKind::Http,
        status: Some(status.as_u16()),
        message: snippet,
    })
}

fn protocol_error(context: &str, err: reqwest::Error) -> EngineError {
    EngineError::Backend {
        kind: BackendErrorKind::Protocol,
        status: None,
        message: format!("{context}: {err}"),
    }
}

fn map_transport_error(err: reqwest::Error) -> EngineError {
    let kind = if err.is_timeout() {
        BackendErrorKind::Timeout
    } else {
        BackendErrorKind::Io
    };
    EngineError::Backend {
        kind,
        status: err.status().map(|s| s.as_u16()),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_update_url_to_query_url() {
        let config = HttpExecutorConfig::new("http://localhost:3030/ds/sparql");
        assert!(config.update_url.is_none());
        let executor = HttpExecutor::new(config).unwrap();
        assert_eq!(
            executor
                .config
                .update_url
                .as_deref()
                .unwrap_or(&executor.config.query_url),
            "http://localhost:3030/ds/sparql"
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_io_error() {
        // Reserved TEST-NET-1 address; nothing listens there.
        let executor = HttpExecutor::new(HttpExecutorConfig {
            query_url: "http://192.0.2.1:1/sparql".into(),
            update_url: None,
            credentials: None,
        })
        .unwrap();
        let parsed = ParsedQuery::parse("ASK { ?s ?p ?o }").unwrap();
        let opts = ExecOptions {
            accept: None,
            deadline: Some(Duration::from_millis(250)),
        };
        let err = executor.ask(&parsed, &opts).await.unwrap_err();
        match err {
            EngineError::Backend { kind, .. } => {
                assert!(matches!(
                    kind,
                    BackendErrorKind::Io | BackendErrorKind::Timeout
                ));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
