//! HTTP transport for the artifact API
//!
//! A thin reqwest wrapper: endpoint joining, token authentication and the
//! agent `User-Agent` header. It does not retry.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::build_info::BuildInfo;
use crate::error::TransportError;
use crate::transport::{ApiRequest, ApiResponse, Method, Transport};

/// Default API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://agent.buildkite.com/v3";

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Artifact API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL; request paths are joined onto it
    pub endpoint: String,
    /// Agent access token
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            endpoint: std::env::var("ARTIFACT_API_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            token: std::env::var("ARTIFACT_API_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("ARTIFACT_API_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        }
    }
}

impl ApiConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific endpoint
    pub fn new(endpoint: &str) -> Self {
        ApiConfig {
            endpoint: endpoint.to_string(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Absolute URL for a relative API path.
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// reqwest-backed [`Transport`]
pub struct HttpTransport {
    config: ApiConfig,
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport that identifies itself with `build_info`.
    pub fn new(config: ApiConfig, build_info: &BuildInfo) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .user_agent(build_info.user_agent())
            .timeout(config.timeout)
            .build()?;

        Ok(HttpTransport {
            config,
            http_client,
        })
    }

    /// Create transport from environment variables
    pub fn from_env() -> Result<Self, TransportError> {
        Self::new(ApiConfig::from_env(), &BuildInfo::current())
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.config.url_for(&request.path);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };

        let mut builder = self.http_client.request(method, &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &self.config.token {
            builder = builder.header(reqwest::header::AUTHORIZATION, format!("Token {token}"));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, url = %url, "sending artifact API request");
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        debug!(method = %request.method, url = %url, status, "artifact API response");

        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_config_default() {
        let config = ApiConfig::default();
        assert!(!config.endpoint.is_empty());
        assert!(config.timeout.as_secs() > 0);
    }

    #[test]
    fn test_api_config_new() {
        let config = ApiConfig::new("https://ci.example.com/v3");
        assert_eq!(config.endpoint, "https://ci.example.com/v3");
        assert_eq!(config.token, None);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_api_config_builders() {
        let config = ApiConfig::new("https://ci.example.com")
            .with_token("secret-token")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.token, Some("secret-token".to_string()));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_url_for_joins_single_slash() {
        let config = ApiConfig::new("https://ci.example.com/v3/");
        assert_eq!(
            config.url_for("jobs/job-1/artifacts"),
            "https://ci.example.com/v3/jobs/job-1/artifacts"
        );
        assert_eq!(
            config.url_for("/builds/b/artifacts/search"),
            "https://ci.example.com/v3/builds/b/artifacts/search"
        );
    }

    const EMPTY_LIST_RESPONSE: &str =
        "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n[]";

    /// Accept one connection on a local port, return the endpoint and a handle
    /// resolving to the raw request once `response` has been written back.
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/v3", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                if let Some(end) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&raw[..end]).to_string();
                    let body_len = header(&head, "content-length")
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + body_len {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8(raw).unwrap()
        });

        (endpoint, handle)
    }

    fn header(raw: &str, name: &str) -> Option<String> {
        raw.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim().to_string())
        })
    }

    #[tokio::test]
    async fn test_request_carries_agent_token_and_query() {
        let (endpoint, server) = serve_once(EMPTY_LIST_RESPONSE).await;
        let build_info = BuildInfo::new("artifact-agent", "1.2.3")
            .with_build_number("42")
            .with_platform("linux", "amd64");
        let config = ApiConfig::new(&endpoint).with_token("secret-token");
        let transport = HttpTransport::new(config, &build_info).unwrap();

        let response = transport
            .send(
                ApiRequest::get("builds/build-1/artifacts/search").with_query(vec![
                    ("query".to_string(), "dist/app bin".to_string()),
                    ("scope".to_string(), "job-1".to_string()),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"[]");

        let raw = server.await.unwrap();
        let request_line = raw.lines().next().unwrap();
        assert_eq!(
            request_line,
            "GET /v3/builds/build-1/artifacts/search?query=dist%2Fapp+bin&scope=job-1 HTTP/1.1"
        );
        assert_eq!(header(&raw, "user-agent"), Some(build_info.user_agent()));
        assert_eq!(
            header(&raw, "authorization").as_deref(),
            Some("Token secret-token")
        );
    }

    #[tokio::test]
    async fn test_put_sends_json_body_without_token() {
        let (endpoint, server) =
            serve_once("HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let transport =
            HttpTransport::new(ApiConfig::new(&endpoint), &BuildInfo::current()).unwrap();
        let body = serde_json::json!({"artifacts": [{"id": "art-1", "state": "finished"}]});

        let response = transport
            .send(
                ApiRequest::put("jobs/job-1/artifacts")
                    .with_json(&body)
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.is_success());

        let raw = server.await.unwrap();
        let (head, sent_body) = raw.split_once("\r\n\r\n").unwrap();
        assert!(head.starts_with("PUT /v3/jobs/job-1/artifacts HTTP/1.1"));
        assert_eq!(
            header(head, "content-type").as_deref(),
            Some("application/json")
        );
        assert_eq!(header(head, "authorization"), None);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(sent_body).unwrap(),
            body
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let config =
            ApiConfig::new("http://127.0.0.1:9").with_timeout(Duration::from_millis(500));
        let transport = HttpTransport::new(config, &BuildInfo::current()).unwrap();

        let result = transport
            .send(ApiRequest::get("builds/b/artifacts/search"))
            .await;

        assert!(result.is_err());
    }
}
