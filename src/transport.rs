//! The HTTP seam.
//!
//! Steps talk to the target API through [`Transport`] so classification and
//! metric recording can be exercised against synthetic responses. Every outcome
//! is a value: status codes, timeouts and connection failures all come back as
//! an [`HttpOutcome`], never as an error.

use async_trait::async_trait;
use reqwest::{Client, Method};
use std::time::Duration;

use crate::{error::TransportError, sink::MetricSink};

/// Total number of HTTP requests issued, including retries.
pub const HTTP_REQS: &str = "http_reqs";
/// Wall-clock duration of every HTTP request, in milliseconds.
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
/// Rate of HTTP requests that failed (transport error or status >= 400).
pub const HTTP_REQ_FAILED: &str = "http_req_failed";

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpOutcome {
    Status(u16),
    Timeout,
    /// Connection refused, DNS failure, broken body, ...
    Failed(String),
}

impl HttpOutcome {
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpOutcome::Status(code) => Some(*code),
            _ => None,
        }
    }

    /// k6 semantics for `http_req_failed`.
    pub fn is_failure(&self) -> bool {
        !matches!(self, HttpOutcome::Status(code) if *code < 400)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> HttpOutcome;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self::from_client(Self::client(timeout)?))
    }

    /// The client every outbound call uses: per-request `timeout`, loadgate user agent.
    pub fn client(timeout: Duration) -> Result<Client, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("loadgate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(client)
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> HttpOutcome {
        let mut builder = self.client.request(request.method, &request.url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                // Drain the body so the connection can be reused.
                match response.bytes().await {
                    Ok(_) => HttpOutcome::Status(status),
                    Err(e) if e.is_timeout() => HttpOutcome::Timeout,
                    Err(e) => HttpOutcome::Failed(e.to_string()),
                }
            }
            Err(e) if e.is_timeout() => HttpOutcome::Timeout,
            Err(e) => HttpOutcome::Failed(e.to_string()),
        }
    }
}

/// Record the built-in per-request metrics.
pub fn record_http_metrics(sink: &MetricSink, outcome: &HttpOutcome, elapsed: Duration) {
    sink.record_counter(HTTP_REQS);
    sink.record_trend(HTTP_REQ_DURATION, as_millis_f64(elapsed));
    sink.record_rate(HTTP_REQ_FAILED, outcome.is_failure());
}

pub(crate) fn as_millis_f64(elapsed: Duration) -> f64 {
    elapsed.as_nanos() as f64 / 1_000_000.0
}
