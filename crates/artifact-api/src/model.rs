//! Data model and wire contract for artifact batches.
//!
//! Field names on the JSON types are fixed by the server contract. Fields the
//! server assigns (`id`) or that only matter locally (`upload_instructions`,
//! `content_type`) are never serialized on outbound requests.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ApiError;
use crate::Result;

/// Decode a JSON `null` the same way as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// One file considered for upload.
///
/// The `id` starts empty and is assigned exactly once, positionally, when the
/// owning batch is created (see [`BatchCreateResult::apply`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default, skip_serializing)]
    id: Option<String>,

    /// Path relative to the working directory
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: String,

    /// Absolute path on the agent host
    #[serde(default, deserialize_with = "null_as_default")]
    pub absolute_path: String,

    /// Glob pattern that matched this file
    #[serde(default, deserialize_with = "null_as_default")]
    pub glob_path: String,

    /// Size in bytes
    #[serde(default, deserialize_with = "null_as_default")]
    pub file_size: u64,

    /// SHA-1 of the file contents, hex encoded
    #[serde(default, deserialize_with = "null_as_default")]
    pub sha1sum: String,

    /// Download URL, present once the upload has finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Caller-specified destination, e.g. a bucket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_destination: Option<String>,

    #[serde(skip)]
    upload_instructions: Option<Arc<UploadInstructions>>,

    /// Content-Type override used by the uploader
    #[serde(skip)]
    pub content_type: Option<String>,
}

impl Artifact {
    /// Create an unregistered artifact with its size and checksum already computed.
    pub fn new(path: impl Into<String>, file_size: u64, sha1sum: impl Into<String>) -> Self {
        Artifact {
            path: path.into(),
            file_size,
            sha1sum: sha1sum.into(),
            ..Default::default()
        }
    }

    pub fn with_absolute_path(mut self, absolute_path: impl Into<String>) -> Self {
        self.absolute_path = absolute_path.into();
        self
    }

    pub fn with_glob_path(mut self, glob_path: impl Into<String>) -> Self {
        self.glob_path = glob_path.into();
        self
    }

    pub fn with_upload_destination(mut self, destination: impl Into<String>) -> Self {
        self.upload_destination = Some(destination.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Server-assigned ID, `None` until the batch is created.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_registered(&self) -> bool {
        self.id.is_some()
    }

    /// Instructions shared by every artifact of the owning batch.
    pub fn upload_instructions(&self) -> Option<&UploadInstructions> {
        self.upload_instructions.as_deref()
    }

    /// Check the fields the server requires before registration.
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(ApiError::Validation("artifact path is empty".to_string()));
        }
        if self.sha1sum.trim().is_empty() {
            return Err(ApiError::Validation(format!(
                "artifact {} has no sha1sum",
                self.path
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ArtifactBatch
// ---------------------------------------------------------------------------

/// Ordered set of artifacts registered together.
///
/// The artifact sequence cannot be reordered through this type; its order is
/// what ties returned IDs to artifacts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactBatch {
    id: Option<String>,
    artifacts: Vec<Artifact>,
    pub upload_destination: Option<String>,
}

impl ArtifactBatch {
    pub fn new(artifacts: Vec<Artifact>) -> Self {
        ArtifactBatch {
            id: None,
            artifacts,
            upload_destination: None,
        }
    }

    pub fn with_upload_destination(mut self, destination: impl Into<String>) -> Self {
        self.upload_destination = Some(destination.into());
        self
    }

    /// Append an artifact. Fails once the batch has been submitted.
    pub fn push(&mut self, artifact: Artifact) -> Result<()> {
        if let Some(batch_id) = &self.id {
            return Err(ApiError::AlreadySubmitted {
                batch_id: batch_id.clone(),
            });
        }
        self.artifacts.push(artifact);
        Ok(())
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_submitted(&self) -> bool {
        self.id.is_some()
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn into_artifacts(self) -> Vec<Artifact> {
        self.artifacts
    }

    /// Validate the batch for submission to `job_id`.
    pub(crate) fn validate_for_submit(&self, job_id: &str) -> Result<()> {
        if job_id.trim().is_empty() {
            return Err(ApiError::Validation("job ID is empty".to_string()));
        }
        if let Some(batch_id) = &self.id {
            return Err(ApiError::AlreadySubmitted {
                batch_id: batch_id.clone(),
            });
        }
        if self.artifacts.is_empty() {
            return Err(ApiError::Validation("batch has no artifacts".to_string()));
        }
        for artifact in &self.artifacts {
            artifact.validate()?;
        }
        Ok(())
    }

    pub(crate) fn to_request(&self) -> CreateBatchRequest {
        CreateBatchRequest {
            artifacts: self.artifacts.clone(),
            upload_destination: self.upload_destination.clone().unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// UploadInstructions
// ---------------------------------------------------------------------------

/// How to transfer artifact bytes to storage. One per batch.
///
/// `action.path` is a template the uploader interpolates per artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadInstructions {
    /// Extra form fields, e.g. policy and signature tokens
    #[serde(default, alias = "Data", deserialize_with = "null_as_default")]
    pub data: BTreeMap<String, String>,

    #[serde(default, alias = "Action", deserialize_with = "null_as_default")]
    pub action: UploadAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: String,
    /// Name of the form field carrying the file payload
    #[serde(default, deserialize_with = "null_as_default")]
    pub file_input: String,
}

// ---------------------------------------------------------------------------
// Batch creation
// ---------------------------------------------------------------------------

/// Request body for `POST /jobs/{job_id}/artifacts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateBatchRequest {
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub upload_destination: String,
}

/// Response body for `POST /jobs/{job_id}/artifacts`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateBatchResponse {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub artifact_ids: Vec<String>,
    #[serde(default)]
    pub upload_instructions: Option<UploadInstructions>,
}

/// Outcome of a successful batch creation.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCreateResult {
    pub id: String,
    /// One ID per submitted artifact, in submission order
    pub artifact_ids: Vec<String>,
    pub upload_instructions: Option<Arc<UploadInstructions>>,
}

impl From<CreateBatchResponse> for BatchCreateResult {
    fn from(response: CreateBatchResponse) -> Self {
        BatchCreateResult {
            id: response.id,
            artifact_ids: response.artifact_ids,
            upload_instructions: response.upload_instructions.map(Arc::new),
        }
    }
}

impl BatchCreateResult {
    /// Assign this result onto the batch it was created from.
    ///
    /// `artifact_ids[i]` belongs to `batch.artifacts()[i]`; no other field is
    /// consulted. Nothing is written unless the lengths match exactly.
    pub fn apply(&self, batch: &mut ArtifactBatch) -> Result<()> {
        if let Some(batch_id) = &batch.id {
            return Err(ApiError::AlreadySubmitted {
                batch_id: batch_id.clone(),
            });
        }
        if self.artifact_ids.len() != batch.artifacts.len() {
            return Err(ApiError::ArtifactIdMismatch {
                expected: batch.artifacts.len(),
                actual: self.artifact_ids.len(),
            });
        }

        for (artifact, id) in batch.artifacts.iter_mut().zip(&self.artifact_ids) {
            artifact.id = Some(id.clone());
            artifact.upload_instructions = self.upload_instructions.clone();
        }
        batch.id = Some(self.id.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Artifact state
// ---------------------------------------------------------------------------

/// Outcome tag reported for an artifact.
///
/// Open-ended: any string is passed through to the server unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactState(String);

impl ArtifactState {
    pub const NEW: &'static str = "new";
    pub const UPLOADING: &'static str = "uploading";
    pub const FINISHED: &'static str = "finished";
    pub const ERROR: &'static str = "error";

    pub fn new(state: impl Into<String>) -> Self {
        ArtifactState(state.into())
    }

    pub fn uploading() -> Self {
        Self::new(Self::UPLOADING)
    }

    pub fn finished() -> Self {
        Self::new(Self::FINISHED)
    }

    pub fn error() -> Self {
        Self::new(Self::ERROR)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is one of the four values known to this client.
    pub fn is_well_known(&self) -> bool {
        matches!(
            self.0.as_str(),
            Self::NEW | Self::UPLOADING | Self::FINISHED | Self::ERROR
        )
    }
}

impl Default for ArtifactState {
    fn default() -> Self {
        Self::new(Self::NEW)
    }
}

impl From<&str> for ArtifactState {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ArtifactState {
    fn from(s: String) -> Self {
        ArtifactState(s)
    }
}

impl std::fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of a state update. Matched by `id` on the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateUpdate {
    pub id: String,
    pub state: ArtifactState,
}

/// Request body for `PUT /jobs/{job_id}/artifacts`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatesRequest {
    pub artifacts: Vec<StateUpdate>,
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Optional narrowing for [`ArtifactSearch::search`](crate::ArtifactSearch::search).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Path pattern; empty matches broadly
    pub query: Option<String>,
    /// e.g. a job ID within the build
    pub scope: Option<String>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Query-string pairs, omitting empty values.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        [("query", &self.query), ("scope", &self.scope)]
            .into_iter()
            .filter_map(|(key, value)| match value.as_deref() {
                Some(v) if !v.is_empty() => Some((key.to_string(), v.to_string())),
                _ => None,
            })
            .collect()
    }
}

/// Artifacts returned by a search, consumed once.
#[derive(Debug)]
pub struct SearchResults {
    inner: std::vec::IntoIter<Artifact>,
}

impl SearchResults {
    pub(crate) fn from_vec(artifacts: Vec<Artifact>) -> Self {
        SearchResults {
            inner: artifacts.into_iter(),
        }
    }
}

impl Iterator for SearchResults {
    type Item = Artifact;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for SearchResults {}
