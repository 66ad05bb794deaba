//! Operation traits for the artifact batch protocol
//!
//! - `ArtifactRegistry`: register a batch and receive upload instructions
//! - `StateReporter`: report per-artifact outcome states
//! - `ArtifactSearch`: find artifacts previously registered for a build
//!
//! Each call is one request/response exchange. Implementations hold no
//! mutable state between calls; sequencing and duplicate-submission avoidance
//! belong to the caller.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::model::{ArtifactBatch, ArtifactState, BatchCreateResult, SearchOptions, SearchResults};
use crate::Result;

/// Registers artifact batches.
///
/// Guarantees:
/// - On success every artifact in the batch carries the ID at its position in
///   `BatchCreateResult::artifact_ids`, and the batch carries the batch ID.
/// - On any error the batch is left unmodified.
/// - Not idempotent: each successful call creates a new server-side batch.
#[async_trait]
pub trait ArtifactRegistry: Send + Sync {
    async fn create_batch(
        &self,
        job_id: &str,
        batch: &mut ArtifactBatch,
    ) -> Result<BatchCreateResult>;
}

/// Reports artifact states after upload attempts.
///
/// All-or-nothing: one request for the whole mapping, no per-artifact result.
#[async_trait]
pub trait StateReporter: Send + Sync {
    async fn update_states(
        &self,
        job_id: &str,
        states: &HashMap<String, ArtifactState>,
    ) -> Result<()>;
}

/// Searches artifacts of a build.
#[async_trait]
pub trait ArtifactSearch: Send + Sync {
    async fn search(&self, build_id: &str, options: &SearchOptions) -> Result<SearchResults>;
}
