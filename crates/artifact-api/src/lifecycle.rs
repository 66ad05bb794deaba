//! Batch lifecycle orchestration: register, transfer, report.
//!
//! [`ArtifactUploader`] drives one batch through the protocol. The physical
//! transfer is delegated to an [`UploadCoordinator`]; the uploader only
//! decides which state each artifact ends in.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::model::{Artifact, ArtifactBatch, ArtifactState, UploadInstructions};
use crate::obs;
use crate::service::{ArtifactRegistry, StateReporter};

/// Default number of transfers in flight
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;

/// Why a single transfer failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct UploadFailure(pub String);

impl UploadFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        UploadFailure(reason.into())
    }
}

/// Performs the byte transfer for one artifact following the batch
/// instructions (multipart form post, presigned PUT, ...).
#[async_trait]
pub trait UploadCoordinator: Send + Sync {
    async fn upload(
        &self,
        artifact: &Artifact,
        instructions: &UploadInstructions,
    ) -> Result<(), UploadFailure>;
}

/// An artifact that ended in the `error` state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUpload {
    pub artifact_id: String,
    pub path: String,
    pub reason: String,
}

/// Outcome of [`ArtifactUploader::upload_batch`]. Both lists follow batch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub batch_id: String,
    pub finished: Vec<String>,
    pub failed: Vec<FailedUpload>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Why [`ArtifactUploader::upload_batch`] did not complete
#[derive(Error, Debug)]
pub enum UploadError {
    /// Batch creation failed; nothing was transferred.
    #[error("batch creation failed: {0}")]
    Create(#[source] ApiError),

    /// Transfers ran but the final state report was not accepted. `report`
    /// records which artifacts were transferred.
    #[error("state report for batch {} failed: {source}", .report.batch_id)]
    Report {
        report: UploadReport,
        #[source]
        source: ApiError,
    },
}

impl UploadError {
    /// The protocol error behind this failure.
    pub fn api_error(&self) -> &ApiError {
        match self {
            UploadError::Create(source) | UploadError::Report { source, .. } => source,
        }
    }

    /// Transfer outcomes, if transfers ran before the failure.
    pub fn report(&self) -> Option<&UploadReport> {
        match self {
            UploadError::Create(_) => None,
            UploadError::Report { report, .. } => Some(report),
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.api_error().status()
    }
}

/// Runs create → transfer → report for a batch.
pub struct ArtifactUploader<C, U> {
    client: C,
    coordinator: U,
    concurrency: usize,
}

impl<C, U> ArtifactUploader<C, U>
where
    C: ArtifactRegistry + StateReporter,
    U: UploadCoordinator,
{
    pub fn new(client: C, coordinator: U) -> Self {
        ArtifactUploader {
            client,
            coordinator,
            concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }

    /// Set the number of concurrent transfers (at least one).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn coordinator(&self) -> &U {
        &self.coordinator
    }

    /// Register `batch`, transfer every artifact and report final states.
    ///
    /// Batch creation is attempted once; on failure nothing is uploaded and
    /// [`UploadError::Create`] is returned. Transfer failures do not abort the
    /// pass: they are reported as `error` and listed in the returned report.
    /// If the state report itself fails, the report comes back inside
    /// [`UploadError::Report`].
    pub async fn upload_batch(
        &self,
        job_id: &str,
        batch: &mut ArtifactBatch,
    ) -> Result<UploadReport, UploadError> {
        let created = self
            .client
            .create_batch(job_id, batch)
            .await
            .map_err(UploadError::Create)?;
        let coordinator = &self.coordinator;

        let outcomes: Vec<(String, String, Result<(), UploadFailure>)> =
            stream::iter(batch.artifacts())
                .map(move |artifact| async move {
                    let id = artifact.id().unwrap_or_default().to_string();
                    let outcome = match artifact.upload_instructions() {
                        Some(instructions) => {
                            debug!(
                                artifact_id = %id,
                                path = %artifact.path,
                                "uploading artifact"
                            );
                            coordinator.upload(artifact, instructions).await
                        }
                        None => Err(UploadFailure::new("no upload instructions for batch")),
                    };
                    (id, artifact.path.clone(), outcome)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut report = UploadReport {
            batch_id: created.id.clone(),
            ..Default::default()
        };
        let mut states = HashMap::with_capacity(outcomes.len());
        for (artifact_id, path, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    states.insert(artifact_id.clone(), ArtifactState::finished());
                    report.finished.push(artifact_id);
                }
                Err(failure) => {
                    warn!(
                        artifact_id = %artifact_id,
                        path = %path,
                        error = %failure,
                        "artifact upload failed"
                    );
                    states.insert(artifact_id.clone(), ArtifactState::error());
                    report.failed.push(FailedUpload {
                        artifact_id,
                        path,
                        reason: failure.0,
                    });
                }
            }
        }

        if let Err(source) = self.client.update_states(job_id, &states).await {
            return Err(UploadError::Report { report, source });
        }
        obs::emit_upload_finished(&report.batch_id, report.finished.len(), report.failed.len());
        Ok(report)
    }
}
