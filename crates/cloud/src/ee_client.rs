//! Async client for the Earth Engine REST API (`value:compute`).
//!
//! Supports the production and high-volume endpoints out of the box, plus
//! arbitrary base URLs via [`EeEndpoint::Custom`] (proxies, test servers).

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::{BearerAuth, CloudAuth, NoAuth};
use crate::backend::ComputeBackend;
use crate::error::{CloudError, Result};
use crate::expr::Expression;

/// Environment variable holding the Cloud project used in request paths.
pub const PROJECT_ENV: &str = "EARTHENGINE_PROJECT";

// ---------------------------------------------------------------------------
// Endpoint enum
// ---------------------------------------------------------------------------

/// Well-known Earth Engine endpoints plus custom base URLs.
#[derive(Debug, Clone, PartialEq)]
pub enum EeEndpoint {
    /// `https://earthengine.googleapis.com`
    Production,
    /// `https://earthengine-highvolume.googleapis.com`
    HighVolume,
    /// Any base URL, e.g. `"http://localhost:8080"`.
    Custom(String),
}

impl EeEndpoint {
    pub fn base_url(&self) -> &str {
        match self {
            Self::Production => "https://earthengine.googleapis.com",
            Self::HighVolume => "https://earthengine-highvolume.googleapis.com",
            Self::Custom(base) => base.trim_end_matches('/'),
        }
    }

    /// Full `value:compute` URL for `project`.
    pub fn compute_url(&self, project: &str) -> String {
        format!("{}/v1/projects/{}/value:compute", self.base_url(), project)
    }

    /// Parse a shorthand string into an endpoint.
    ///
    /// Recognized shorthands: `"prod"`, `"production"`, `"hv"`,
    /// `"highvolume"`, `"high-volume"`. Anything else is treated as a base URL.
    pub fn from_str_or_url(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "hv" | "highvolume" | "high-volume" => Self::HighVolume,
            _ => Self::Custom(s.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`EeClient`].
pub struct EeClientOptions {
    /// Per-request timeout (default: none, the transport default applies).
    pub request_timeout: Option<Duration>,
    /// Retries on transient failures: transport errors, 429 and 5xx (default 0).
    pub max_retries: u32,
    /// Authentication provider (default: [`NoAuth`]).
    pub auth: Box<dyn CloudAuth>,
}

impl Default for EeClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: None,
            max_retries: 0,
            auth: Box::new(NoAuth),
        }
    }
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ComputeResponse {
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Extract a readable message from an error response body.
fn remote_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => match env.error.status {
            Some(status) => format!("{}: {}", status, env.error.message),
            None => env.error.message,
        },
        Err(_) => body.chars().take(500).collect(),
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Async client for expression evaluation.
pub struct EeClient {
    endpoint: EeEndpoint,
    project: String,
    client: reqwest::Client,
    options: EeClientOptions,
}

impl EeClient {
    /// Create a new client for `project`.
    pub fn new(
        endpoint: EeEndpoint,
        project: impl Into<String>,
        options: EeClientOptions,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        Self::with_http_client(endpoint, project, options, builder)
    }

    fn with_http_client(
        endpoint: EeEndpoint,
        project: impl Into<String>,
        options: EeClientOptions,
        builder: reqwest::ClientBuilder,
    ) -> Result<Self> {
        let project = project.into();
        if project.trim().is_empty() {
            return Err(CloudError::InvalidQuery("project id is empty".into()));
        }

        let client = builder
            .build()
            .map_err(|e| CloudError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint,
            project,
            client,
            options,
        })
    }

    /// Production endpoint, project from `EARTHENGINE_PROJECT`, bearer
    /// token from `EARTHENGINE_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let project = std::env::var(PROJECT_ENV)
            .map_err(|_| CloudError::Auth(format!("{PROJECT_ENV} not set")))?;
        let options = EeClientOptions {
            auth: Box::new(BearerAuth::from_env()?),
            ..EeClientOptions::default()
        };
        Self::new(EeEndpoint::Production, project, options)
    }

    pub fn endpoint(&self) -> &EeEndpoint {
        &self.endpoint
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Evaluate an expression and return its JSON value.
    pub async fn compute(&self, expression: &Expression) -> Result<serde_json::Value> {
        let url = self.endpoint.compute_url(&self.project);
        let body = expression.to_request_body();

        let mut headers = Vec::new();
        self.options.auth.sign_request(&url, "POST", &mut headers)?;

        let mut last_err = None;

        for attempt in 0..=self.options.max_retries {
            if attempt > 0 {
                // Exponential backoff: 500ms, 1s, 2s, ...
                let delay = Duration::from_millis(500 * (1 << (attempt - 1).min(6)));
                warn!(attempt, ?delay, "retrying value:compute");
                tokio::time::sleep(delay).await;
            }

            debug!(%url, nodes = expression.values.len(), "POST value:compute");

            let mut req = self.client.post(&url).json(&body);
            for (key, value) in &headers {
                req = req.header(key.as_str(), value.as_str());
            }

            match req.send().await {
                Ok(r) if r.status().is_success() => {
                    let text = r
                        .text()
                        .await
                        .map_err(|e| CloudError::Network(format!("reading response body: {e}")))?;
                    let parsed: ComputeResponse = serde_json::from_str(&text)
                        .map_err(|e| CloudError::Decode(format!("value:compute response: {e}")))?;
                    return Ok(parsed.result);
                }
                Ok(r) => {
                    let status = r.status();
                    let text = r.text().await.unwrap_or_default();
                    let err = match status.as_u16() {
                        401 | 403 => CloudError::Auth(remote_message(&text)),
                        code => CloudError::Remote {
                            status: code,
                            message: remote_message(&text),
                        },
                    };
                    if !is_retryable(status) {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_err = Some(CloudError::Http(e));
                }
                Err(e) => return Err(CloudError::Http(e)),
            }
        }

        Err(last_err.unwrap_or_else(|| CloudError::Network("value:compute failed".into())))
    }
}

impl ComputeBackend for EeClient {
    async fn compute(&self, expression: &Expression) -> Result<serde_json::Value> {
        EeClient::compute(self, expression).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{ComputedObject, ImageCollection};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Local server answering every request with the same canned response.
    /// Returns its base URL and a counter of accepted requests.
    async fn canned_server(status: &'static str, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (base, hits)
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    fn local_client(base: &str, max_retries: u32) -> EeClient {
        let options = EeClientOptions {
            max_retries,
            ..EeClientOptions::default()
        };
        let builder = reqwest::Client::builder().no_proxy();
        EeClient::with_http_client(EeEndpoint::Custom(base.into()), "p", options, builder).unwrap()
    }

    fn size_query() -> Expression {
        ImageCollection::load("COPERNICUS/S1_GRD").size().encode()
    }

    #[tokio::test]
    async fn compute_returns_result_member() {
        let (base, hits) = canned_server("200 OK", r#"{"result": 42}"#).await;
        let value = local_client(&base, 0).compute(&size_query()).await.unwrap();
        assert_eq!(value, serde_json::json!(42));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forbidden_maps_to_auth_without_retry() {
        let body = r#"{"error": {"code": 403, "message": "denied", "status": "PERMISSION_DENIED"}}"#;
        let (base, hits) = canned_server("403 Forbidden", body).await;
        let err = local_client(&base, 2).compute(&size_query()).await.unwrap_err();
        assert!(matches!(&err, CloudError::Auth(m) if m == "PERMISSION_DENIED: denied"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn client_error_maps_to_remote_without_retry() {
        let body = r#"{"error": {"code": 400, "message": "bad id", "status": "INVALID_ARGUMENT"}}"#;
        let (base, hits) = canned_server("400 Bad Request", body).await;
        let err = local_client(&base, 2).compute(&size_query()).await.unwrap_err();
        assert!(matches!(
            &err,
            CloudError::Remote { status: 400, message } if message == "INVALID_ARGUMENT: bad id"
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_error_is_retried() {
        let body = r#"{"error": {"code": 503, "message": "busy", "status": "UNAVAILABLE"}}"#;
        let (base, hits) = canned_server("503 Service Unavailable", body).await;
        let err = local_client(&base, 1).compute(&size_query()).await.unwrap_err();
        assert!(matches!(err, CloudError::Remote { status: 503, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn compute_urls() {
        assert_eq!(
            EeEndpoint::Production.compute_url("my-proj"),
            "https://earthengine.googleapis.com/v1/projects/my-proj/value:compute"
        );
        assert_eq!(
            EeEndpoint::HighVolume.compute_url("p"),
            "https://earthengine-highvolume.googleapis.com/v1/projects/p/value:compute"
        );
        // Trailing slash
        assert_eq!(
            EeEndpoint::Custom("http://localhost:8080/".into()).compute_url("p"),
            "http://localhost:8080/v1/projects/p/value:compute"
        );
    }

    #[test]
    fn endpoint_from_str_or_url() {
        assert_eq!(EeEndpoint::from_str_or_url("prod"), EeEndpoint::Production);
        assert_eq!(EeEndpoint::from_str_or_url("HV"), EeEndpoint::HighVolume);
        assert_eq!(
            EeEndpoint::from_str_or_url("http://proxy:9000"),
            EeEndpoint::Custom("http://proxy:9000".into())
        );
    }

    #[test]
    fn remote_message_prefers_error_envelope() {
        let body = r#"{"error": {"code": 400, "message": "Collection.size: bad", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(remote_message(body), "INVALID_ARGUMENT: Collection.size: bad");
        assert_eq!(remote_message("plain text"), "plain text");
    }

    #[test]
    fn retry_policy() {
        assert!(is_retryable(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable(reqwest::StatusCode::BAD_REQUEST));
    }

    #[test]
    fn empty_project_is_rejected() {
        let err = EeClient::new(EeEndpoint::Production, " ", EeClientOptions::default());
        assert!(matches!(err, Err(CloudError::InvalidQuery(_))));
    }
}
