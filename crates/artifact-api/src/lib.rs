//! Artifact API: the artifact batch lifecycle protocol for CI agents
//!
//! A job's local files become server-known artifacts in three steps:
//!
//! 1. [`ArtifactRegistry::create_batch`] registers an ordered batch and
//!    assigns server IDs positionally, along with one shared set of
//!    [`UploadInstructions`].
//! 2. An [`UploadCoordinator`] transfers the bytes (outside this crate's
//!    concern beyond the trait).
//! 3. [`StateReporter::update_states`] reports each artifact's final state.
//!
//! [`ArtifactSearch::search`] later finds uploaded artifacts by build.
//!
//! ## Key Components
//!
//! - `ArtifactClient`: implements the three operations over any `Transport`
//! - `HttpTransport`: reqwest-backed transport with token auth
//! - `ArtifactUploader`: drives create → transfer → report for one batch
//! - `BuildInfo`: immutable agent build metadata and `User-Agent`
//! - `fakes`: in-memory service and uploader for tests

pub mod build_info;
pub mod client;
mod error;
pub mod fakes;
pub mod http;
pub mod lifecycle;
pub mod model;
pub mod obs;
pub mod service;
pub mod telemetry;
pub mod transport;

pub use build_info::BuildInfo;
pub use client::ArtifactClient;
pub use error::{ApiError, TransportError};
pub use http::{ApiConfig, HttpTransport};
pub use lifecycle::{
    ArtifactUploader, FailedUpload, UploadCoordinator, UploadError, UploadFailure, UploadReport,
};
pub use model::{
    Artifact, ArtifactBatch, ArtifactState, BatchCreateResult, SearchOptions, SearchResults,
    StateUpdate, UploadAction, UploadInstructions,
};
pub use obs::{
    emit_batch_created, emit_request_failed, emit_search_completed, emit_states_updated,
    emit_upload_finished,
};
pub use service::{ArtifactRegistry, ArtifactSearch, StateReporter};
pub use telemetry::init_tracing;
pub use transport::{ApiRequest, ApiResponse, Method, Transport};

/// Result type for artifact operations
pub type Result<T> = std::result::Result<T, ApiError>;
