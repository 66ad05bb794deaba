//! Structured tracing events for the artifact lifecycle.
//!
//! Events are emitted at `info!` level except failures, which use `warn!`.
//! Filtering and JSON output are configured via [`crate::telemetry`].

use tracing::{info, warn};

/// Emit event: batch created and IDs assigned.
///
/// # Example
///
/// ```ignore
/// emit_batch_created("job-1", "batch-1", 2);
/// // logs: event=batch.created job_id=job-1 batch_id=batch-1 artifact_count=2
/// ```
pub fn emit_batch_created(job_id: &str, batch_id: &str, artifact_count: usize) {
    info!(
        event = "batch.created",
        job_id = %job_id,
        batch_id = %batch_id,
        artifact_count = artifact_count,
    );
}

/// Emit event: artifact states reported.
pub fn emit_states_updated(job_id: &str, artifact_count: usize) {
    info!(event = "states.updated", job_id = %job_id, artifact_count = artifact_count);
}

/// Emit event: search returned results.
pub fn emit_search_completed(build_id: &str, result_count: usize) {
    info!(event = "search.completed", build_id = %build_id, result_count = result_count);
}

/// Emit event: an upload pass over a batch finished.
pub fn emit_upload_finished(batch_id: &str, finished: usize, failed: usize) {
    info!(
        event = "upload.finished",
        batch_id = %batch_id,
        finished = finished,
        failed = failed,
    );
}

/// Emit event: an artifact API request failed (warning level).
pub fn emit_request_failed(operation: &str, error: &dyn std::fmt::Display) {
    warn!(event = "request.failed", operation = %operation, error = %error);
}
