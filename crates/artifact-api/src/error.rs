//! Error types for artifact-api

use thiserror::Error;

/// Failures raised by a [`Transport`](crate::transport::Transport) before any
/// HTTP status is available.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The endpoint could not be reached
    #[error("connection failed: {0}")]
    Connection(String),

    /// The request did not complete within the configured timeout
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The configured endpoint is not a usable URL
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Any other HTTP client failure
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connection(err.to_string())
        } else if err.is_builder() {
            TransportError::InvalidEndpoint(err.to_string())
        } else {
            TransportError::Http(err.to_string())
        }
    }
}

/// Errors returned by the artifact operations.
///
/// Every variant is per-call; nothing here leaves the client unusable.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Caller input rejected before any request was issued
    #[error("invalid request: {0}")]
    Validation(String),

    /// The batch already carries a server-assigned ID
    #[error("batch already submitted as {batch_id}")]
    AlreadySubmitted { batch_id: String },

    /// Transport failure, surfaced unchanged
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a non-2xx status
    #[error("{method} {path} returned HTTP {status}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    /// The request body could not be serialized
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// The response body could not be decoded
    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Positional correspondence broken: ID count differs from artifact count
    #[error("server returned {actual} artifact IDs for {expected} submitted artifacts")]
    ArtifactIdMismatch { expected: usize, actual: usize },
}

impl ApiError {
    /// HTTP status of a `Status` error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
