//! Artifact API client
//!
//! Implements the operation traits over any [`Transport`]. The client is
//! stateless: share one instance (or clone the transport behind an `Arc`)
//! across concurrent callers.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ApiError;
use crate::http::HttpTransport;
use crate::model::{
    Artifact, ArtifactBatch, ArtifactState, BatchCreateResult, CreateBatchResponse,
    SearchOptions, SearchResults, StateUpdate, UpdateStatesRequest,
};
use crate::obs;
use crate::service::{ArtifactRegistry, ArtifactSearch, StateReporter};
use crate::transport::{ApiRequest, ApiResponse, Transport};
use crate::Result;

/// Client for the artifact batch endpoints
pub struct ArtifactClient<T> {
    transport: T,
}

impl<T: Transport> ArtifactClient<T> {
    pub fn new(transport: T) -> Self {
        ArtifactClient { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `request` and fail on transport errors or non-2xx statuses.
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let response = self.transport.send(request.clone()).await?;
        response.error_for_status(request)
    }

    async fn create_batch_inner(
        &self,
        job_id: &str,
        batch: &mut ArtifactBatch,
    ) -> Result<BatchCreateResult> {
        batch.validate_for_submit(job_id)?;
        require_path_segment("job ID", job_id)?;

        let request =
            ApiRequest::post(format!("jobs/{job_id}/artifacts")).with_json(&batch.to_request())?;
        let response = self.execute(&request).await?;
        let result = BatchCreateResult::from(response.decode::<CreateBatchResponse>(&request)?);

        result.apply(batch)?;
        obs::emit_batch_created(job_id, &result.id, batch.len());
        Ok(result)
    }

    async fn update_states_inner(
        &self,
        job_id: &str,
        states: &HashMap<String, ArtifactState>,
    ) -> Result<()> {
        require_path_segment("job ID", job_id)?;
        if states.keys().any(|id| id.trim().is_empty()) {
            return Err(ApiError::Validation(
                "state update contains an empty artifact ID".to_string(),
            ));
        }
        if states.is_empty() {
            debug!(job_id = %job_id, "no artifact states to report");
            return Ok(());
        }

        let payload = UpdateStatesRequest {
            artifacts: states
                .iter()
                .map(|(id, state)| StateUpdate {
                    id: id.clone(),
                    state: state.clone(),
                })
                .collect(),
        };
        let request = ApiRequest::put(format!("jobs/{job_id}/artifacts")).with_json(&payload)?;
        self.execute(&request).await?;

        obs::emit_states_updated(job_id, payload.artifacts.len());
        Ok(())
    }

    async fn search_inner(&self, build_id: &str, options: &SearchOptions) -> Result<SearchResults> {
        require_path_segment("build ID", build_id)?;

        let request = ApiRequest::get(format!("builds/{build_id}/artifacts/search"))
            .with_query(options.query_pairs());
        let response = self.execute(&request).await?;
        let artifacts: Vec<Artifact> = response.decode(&request)?;

        obs::emit_search_completed(build_id, artifacts.len());
        Ok(SearchResults::from_vec(artifacts))
    }
}

impl ArtifactClient<HttpTransport> {
    /// Create an HTTP client configured from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(HttpTransport::from_env()?))
    }
}

#[async_trait]
impl<T: Transport> ArtifactRegistry for ArtifactClient<T> {
    async fn create_batch(
        &self,
        job_id: &str,
        batch: &mut ArtifactBatch,
    ) -> Result<BatchCreateResult> {
        self.create_batch_inner(job_id, batch)
            .await
            .map_err(|e| log_failure("create_batch", e))
    }
}

#[async_trait]
impl<T: Transport> StateReporter for ArtifactClient<T> {
    async fn update_states(
        &self,
        job_id: &str,
        states: &HashMap<String, ArtifactState>,
    ) -> Result<()> {
        self.update_states_inner(job_id, states)
            .await
            .map_err(|e| log_failure("update_states", e))
    }
}

#[async_trait]
impl<T: Transport> ArtifactSearch for ArtifactClient<T> {
    async fn search(&self, build_id: &str, options: &SearchOptions) -> Result<SearchResults> {
        self.search_inner(build_id, options)
            .await
            .map_err(|e| log_failure("search", e))
    }
}

fn log_failure(operation: &str, error: ApiError) -> ApiError {
    obs::emit_request_failed(operation, &error);
    error
}

/// IDs are interpolated into request paths.
fn require_path_segment(kind: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{kind} is empty")));
    }
    if matches!(value, "." | "..") || value.contains(['/', '\\', '?', '#', '%']) {
        return Err(ApiError::Validation(format!(
            "{kind} {value:?} is not a valid path segment"
        )));
    }
    Ok(())
}
