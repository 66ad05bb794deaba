//! Transport seam between the artifact operations and the wire.
//!
//! The operations build an [`ApiRequest`] and interpret the [`ApiResponse`];
//! connection handling, authentication and any retry policy belong to the
//! `Transport` implementation. [`HttpTransport`](crate::http::HttpTransport)
//! is the production implementation and
//! [`MemoryArtifactService`](crate::fakes::MemoryArtifactService) the
//! in-memory one.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ApiError, TransportError};

/// HTTP methods used by the artifact endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request relative to the API endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path without a leading slash, e.g. `jobs/{id}/artifacts`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// Attach a JSON body.
    pub fn with_json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body).map_err(ApiError::Encode)?);
        Ok(self)
    }
}

/// Raw response: status code plus undecoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        ApiResponse {
            status,
            body: body.into(),
        }
    }

    /// Serialize `value` as a JSON response body.
    pub fn json<T: Serialize>(status: u16, value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(status, serde_json::to_vec(value)?))
    }

    pub fn empty(status: u16) -> Self {
        Self::new(status, Vec::new())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Fail with [`ApiError::Status`] unless the status is 2xx.
    pub fn error_for_status(self, request: &ApiRequest) -> Result<Self, ApiError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(ApiError::Status {
            method: request.method.to_string(),
            path: request.path.clone(),
            status: self.status,
            body: self.text(),
        })
    }

    /// Decode the body as JSON.
    pub fn decode<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|source| ApiError::Decode {
            path: request.path.clone(),
            source,
        })
    }
}

/// Performs authenticated requests against the artifact API.
///
/// Implementations must be safe to share between concurrent callers.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        (**self).send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_for_status_keeps_response_body() {
        let request = ApiRequest::put("jobs/job-1/artifacts");
        let err = ApiResponse::new(422, "bad state")
            .error_for_status(&request)
            .unwrap_err();

        match err {
            ApiError::Status {
                method,
                path,
                status,
                body,
            } => {
                assert_eq!(method, "PUT");
                assert_eq!(path, "jobs/job-1/artifacts");
                assert_eq!(status, 422);
                assert_eq!(body, "bad state");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_failure_is_distinct() {
        let request = ApiRequest::get("builds/b/artifacts/search");
        let err = ApiResponse::new(200, "not json")
            .decode::<Vec<String>>(&request)
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }

    #[test]
    fn test_success_range() {
        assert!(ApiResponse::empty(200).is_success());
        assert!(ApiResponse::empty(204).is_success());
        assert!(!ApiResponse::empty(301).is_success());
        assert!(!ApiResponse::empty(500).is_success());
    }
}
