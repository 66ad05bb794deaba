//! In-memory fakes for the artifact protocol (testing only)
//!
//! `MemoryArtifactService` speaks the artifact wire contract as a
//! [`Transport`], so a real [`ArtifactClient`](crate::ArtifactClient) can be
//! exercised end to end without a network. `RecordingUploader` stands in for
//! the byte transfer.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::TransportError;
use crate::lifecycle::{UploadCoordinator, UploadFailure};
use crate::model::{
    Artifact, ArtifactState, CreateBatchRequest, CreateBatchResponse, UpdateStatesRequest,
    UploadAction, UploadInstructions,
};
use crate::transport::{ApiRequest, ApiResponse, Method, Transport};

// ---------------------------------------------------------------------------
// MemoryArtifactService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredArtifact {
    id: String,
    job_id: String,
    build_id: String,
    artifact: Artifact,
    state: ArtifactState,
}

#[derive(Debug, Default)]
struct ServiceState {
    /// job ID -> build ID
    jobs: HashMap<String, String>,
    artifacts: Vec<StoredArtifact>,
    batches: Vec<String>,
    requests: Vec<ApiRequest>,
    /// Status to inject, optionally only for one method
    fail_next: Option<(Option<Method>, u16)>,
    truncate_next_ids: bool,
}

/// In-memory artifact service.
///
/// Jobs must be registered with their build before artifacts can be created
/// for them. IDs are fresh UUIDs, so repeated creation never deduplicates.
#[derive(Debug)]
pub struct MemoryArtifactService {
    state: Mutex<ServiceState>,
    download_base: String,
}

impl Default for MemoryArtifactService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryArtifactService {
    pub fn new() -> Self {
        MemoryArtifactService {
            state: Mutex::new(ServiceState::default()),
            download_base: "https://artifacts.example.com".to_string(),
        }
    }

    /// Register `job_id` as part of `build_id`.
    pub fn with_job(self, job_id: &str, build_id: &str) -> Self {
        self.register_job(job_id, build_id);
        self
    }

    pub fn register_job(&self, job_id: &str, build_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.jobs.insert(job_id.to_string(), build_id.to_string());
    }

    /// Answer the next request with `status` instead of handling it.
    pub fn fail_next_request(&self, status: u16) {
        self.state.lock().unwrap().fail_next = Some((None, status));
    }

    /// Answer the next `method` request with `status`. Requests with other
    /// methods are handled normally until then.
    pub fn fail_next_request_with(&self, method: Method, status: u16) {
        self.state.lock().unwrap().fail_next = Some((Some(method), status));
    }

    /// Drop the last artifact ID from the next batch creation response.
    pub fn truncate_next_batch_ids(&self) {
        self.state.lock().unwrap().truncate_next_ids = true;
    }

    /// Every request received, in arrival order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn batch_count(&self) -> usize {
        self.state.lock().unwrap().batches.len()
    }

    pub fn artifact_count(&self) -> usize {
        self.state.lock().unwrap().artifacts.len()
    }

    /// Current state of an artifact, if it exists.
    pub fn artifact_state(&self, artifact_id: &str) -> Option<ArtifactState> {
        let state = self.state.lock().unwrap();
        state
            .artifacts
            .iter()
            .find(|a| a.id == artifact_id)
            .map(|a| a.state.clone())
    }

    fn instructions(&self) -> UploadInstructions {
        UploadInstructions {
            data: [(
                "key".to_string(),
                "artifacts/${artifact:id}/${artifact:path}".to_string(),
            )]
            .into_iter()
            .collect(),
            action: UploadAction {
                url: Some(self.download_base.clone()),
                method: "POST".to_string(),
                path: String::new(),
                file_input: "file".to_string(),
            },
        }
    }

    fn create_batch(
        &self,
        state: &mut ServiceState,
        job_id: &str,
        request: &ApiRequest,
    ) -> ApiResponse {
        let Some(build_id) = state.jobs.get(job_id).cloned() else {
            return ApiResponse::new(404, format!("job {job_id} not found"));
        };
        let body: CreateBatchRequest = match decode_body(request) {
            Ok(body) => body,
            Err(response) => return response,
        };
        if body.artifacts.is_empty() {
            return ApiResponse::new(422, "batch has no artifacts");
        }

        let batch_id = Uuid::new_v4().to_string();
        let mut artifact_ids = Vec::with_capacity(body.artifacts.len());
        for mut artifact in body.artifacts {
            if artifact.upload_destination.is_none() && !body.upload_destination.is_empty() {
                artifact.upload_destination = Some(body.upload_destination.clone());
            }
            let id = Uuid::new_v4().to_string();
            artifact_ids.push(id.clone());
            state.artifacts.push(StoredArtifact {
                id,
                job_id: job_id.to_string(),
                build_id: build_id.clone(),
                artifact,
                state: ArtifactState::default(),
            });
        }
        state.batches.push(batch_id.clone());

        if std::mem::take(&mut state.truncate_next_ids) {
            artifact_ids.pop();
        }

        json_response(
            201,
            &CreateBatchResponse {
                id: batch_id,
                artifact_ids,
                upload_instructions: Some(self.instructions()),
            },
        )
    }

    fn update_states(
        &self,
        state: &mut ServiceState,
        job_id: &str,
        request: &ApiRequest,
    ) -> ApiResponse {
        if !state.jobs.contains_key(job_id) {
            return ApiResponse::new(404, format!("job {job_id} not found"));
        }
        let body: UpdateStatesRequest = match decode_body(request) {
            Ok(body) => body,
            Err(response) => return response,
        };

        // Whole request is rejected if any ID is unknown to this job.
        let known: HashSet<&str> = state
            .artifacts
            .iter()
            .filter(|a| a.job_id == job_id)
            .map(|a| a.id.as_str())
            .collect();
        if let Some(missing) = body.artifacts.iter().find(|u| !known.contains(u.id.as_str())) {
            return ApiResponse::new(404, format!("artifact {} not found", missing.id));
        }

        for update in body.artifacts {
            if let Some(stored) = state.artifacts.iter_mut().find(|a| a.id == update.id) {
                if update.state.as_str() == ArtifactState::FINISHED {
                    stored.artifact.url = Some(format!(
                        "{}/{}/{}",
                        self.download_base, stored.id, stored.artifact.path
                    ));
                }
                stored.state = update.state;
            }
        }
        ApiResponse::empty(200)
    }

    fn search(&self, state: &ServiceState, build_id: &str, request: &ApiRequest) -> ApiResponse {
        let param = |key: &str| {
            request
                .query
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
                .filter(|v| !v.is_empty())
        };
        let query = param("query");
        let scope = param("scope");

        let matches: Vec<serde_json::Value> = state
            .artifacts
            .iter()
            .filter(|a| a.build_id == build_id)
            .filter(|a| scope.map_or(true, |s| a.job_id == s))
            .filter(|a| query.map_or(true, |q| a.artifact.path.contains(q)))
            .map(|a| {
                let mut value = serde_json::to_value(&a.artifact).unwrap_or_default();
                value["id"] = serde_json::Value::String(a.id.clone());
                value
            })
            .collect();

        json_response(200, &matches)
    }
}

#[async_trait]
impl Transport for MemoryArtifactService {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());

        if let Some((only, status)) = state.fail_next {
            if only.map_or(true, |method| method == request.method) {
                state.fail_next = None;
                return Ok(ApiResponse::new(status, "injected failure"));
            }
        }

        let segments: Vec<&str> = request.path.split('/').collect();
        let response = match (request.method, segments.as_slice()) {
            (Method::Post, ["jobs", job_id, "artifacts"]) => {
                self.create_batch(&mut state, job_id, &request)
            }
            (Method::Put, ["jobs", job_id, "artifacts"]) => {
                self.update_states(&mut state, job_id, &request)
            }
            (Method::Get, ["builds", build_id, "artifacts", "search"]) => {
                self.search(&state, build_id, &request)
            }
            _ => ApiResponse::new(
                404,
                format!("no route for {} {}", request.method, request.path),
            ),
        };
        Ok(response)
    }
}

fn decode_body<T: serde::de::DeserializeOwned>(request: &ApiRequest) -> Result<T, ApiResponse> {
    let body = request
        .body
        .clone()
        .ok_or_else(|| ApiResponse::new(400, "missing request body"))?;
    serde_json::from_value(body).map_err(|e| ApiResponse::new(400, e.to_string()))
}

fn json_response<T: Serialize>(status: u16, value: &T) -> ApiResponse {
    ApiResponse::json(status, value).unwrap_or_else(|e| ApiResponse::new(500, e.to_string()))
}

// ---------------------------------------------------------------------------
// RecordingUploader
// ---------------------------------------------------------------------------

/// Upload coordinator that records transfers and fails chosen paths.
#[derive(Debug, Default)]
pub struct RecordingUploader {
    failing_paths: HashSet<String>,
    uploaded: Mutex<Vec<String>>,
}

impl RecordingUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail transfers of the given artifact paths.
    pub fn failing<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RecordingUploader {
            failing_paths: paths.into_iter().map(Into::into).collect(),
            uploaded: Mutex::new(Vec::new()),
        }
    }

    /// Paths of every attempted transfer.
    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl UploadCoordinator for RecordingUploader {
    async fn upload(
        &self,
        artifact: &Artifact,
        _instructions: &UploadInstructions,
    ) -> Result<(), UploadFailure> {
        self.uploaded.lock().unwrap().push(artifact.path.clone());
        if self.failing_paths.contains(&artifact.path) {
            return Err(UploadFailure::new(format!(
                "simulated failure for {}",
                artifact.path
            )));
        }
        Ok(())
    }
}
