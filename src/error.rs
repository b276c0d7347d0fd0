// src/error.rs
//! Error kinds surfaced by the client layer.
//!
//! Configuration errors (`UnknownEndpoint`, `MalformedDescriptor`,
//! `MissingRequiredParam`) are programmer errors and never reach the network.
//! Runtime errors (`Network`, `HttpStatus`, `Timeout`, `MalformedBody`) are
//! captured as a Failed cache state and handed back as values.
//! `UnexpectedSchema` means the upstream contract drifted.

use thiserror::Error;

/// Every failure the client can report. `Clone` so one in-flight call can fan
/// its outcome out to all joined callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    // -- Configuration --
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("malformed descriptor `{name}`: {reason}")]
    MalformedDescriptor { name: String, reason: String },

    #[error("missing required parameter: {0}")]
    MissingRequiredParam(String),

    // -- Runtime --
    #[error("network error: {0}")]
    Network(String),

    #[error("upstream returned HTTP {status}")]
    HttpStatus { status: u16, body: Option<String> },

    #[error("request timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("response body is not valid JSON: {0}")]
    MalformedBody(String),

    // -- Projection --
    #[error("unexpected schema from `{endpoint}`: {detail}")]
    UnexpectedSchema { endpoint: String, detail: String },
}

impl FetchError {
    /// Stable snake_case tag, used in logs and API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::UnknownEndpoint(_) => "unknown_endpoint",
            FetchError::MalformedDescriptor { .. } => "malformed_descriptor",
            FetchError::MissingRequiredParam(_) => "missing_required_param",
            FetchError::Network(_) => "network_error",
            FetchError::HttpStatus { .. } => "http_status_error",
            FetchError::Timeout { .. } => "timeout_error",
            FetchError::MalformedBody(_) => "malformed_body",
            FetchError::UnexpectedSchema { .. } => "unexpected_schema",
        }
    }

    /// Programmer errors: wrong name, wrong params, broken descriptor table.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            FetchError::UnknownEndpoint(_)
                | FetchError::MalformedDescriptor { .. }
                | FetchError::MissingRequiredParam(_)
        )
    }

    /// Failures worth another attempt by a caller-side retry.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout { .. } => true,
            FetchError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn schema(endpoint: &str, detail: impl ToString) -> Self {
        FetchError::UnexpectedSchema {
            endpoint: endpoint.to_string(),
            detail: detail.to_string(),
        }
    }
}
