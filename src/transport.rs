// src/transport.rs
//! Network seam. The orchestrator only talks to `Transport`, so tests can
//! swap in fakes and production uses `ReqwestTransport`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::FetchError;
use crate::registry::Method;
use crate::request::RequestSpec;

/// Upstream error bodies are kept for diagnostics, but only this much of them.
const ERROR_BODY_MAX: usize = 512;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one request. 2xx with a JSON body is `Ok`; everything else is
    /// a runtime `FetchError`.
    async fn send(&self, request: &RequestSpec) -> Result<Value, FetchError>;
    fn name(&self) -> &'static str;
}

/// Longest TCP/TLS handshake allowed, whatever the call deadline.
const CONNECT_TIMEOUT_MAX: Duration = Duration::from_secs(4);

/// HTTPS transport on a shared `reqwest::Client`.
///
/// Only the connect phase is bounded here. The whole-call deadline is per
/// call and enforced by the orchestrator.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    connect_timeout: Duration,
}

impl ReqwestTransport {
    /// `timeout` is the default call deadline; the connect timeout is capped by it.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let connect_timeout = CONNECT_TIMEOUT_MAX.min(timeout);
        let http = reqwest::Client::builder()
            .user_agent(concat!("cryptoverse-client/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| FetchError::Network(format!("building http client: {e}")))?;
        Ok(Self {
            http,
            connect_timeout,
        })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            connect_timeout: CONNECT_TIMEOUT_MAX,
        }
    }

    fn map_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            // Without a client-wide deadline only the connect phase can time out here.
            FetchError::Timeout {
                after_ms: self.connect_timeout.as_millis() as u64,
            }
        } else {
            // Without the URL: query strings may carry credentials.
            FetchError::Network(e.without_url().to_string())
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &RequestSpec) -> Result<Value, FetchError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let mut req = self.http.request(method, &request.url);
        for (k, v) in &request.headers {
            req = req.header(k, v);
        }

        let resp = req.send().await.map_err(|e| self.map_error(e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.ok().map(|mut b| {
                if b.len() > ERROR_BODY_MAX {
                    let mut cut = ERROR_BODY_MAX;
                    while !b.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    b.truncate(cut);
                }
                b
            });
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await.map_err(|e| self.map_error(e))?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::MalformedBody(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}
