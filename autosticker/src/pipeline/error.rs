//! Error types for the pipeline module.

use crate::codec::CodecError;
use crate::job::JobError;
use crate::providers::ServiceError;
use thiserror::Error;

/// Errors that abort a whole pipeline call.
///
/// Per-job generation failures never show up here; they are absorbed at the
/// generation stage and only shrink the result.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The caller handed the pipeline nothing to work with.
    #[error("EmptyInput: at least one input image is required")]
    EmptyInput,

    /// A captioning call failed; captions are load-bearing for the prompt.
    #[error("CaptionError: {0}")]
    Caption(#[source] ServiceError),

    /// The prompt-expansion call failed.
    #[error("ExpandError: {0}")]
    Expand(#[source] ServiceError),
}

/// Errors from fetching and decoding one output artifact.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The artifact fetch failed below the application layer.
    #[error("HttpError: {0}")]
    Http(#[from] reqwest::Error),

    /// The artifact host answered with a non-success status.
    #[error("StatusError ({0})")]
    Status(reqwest::StatusCode),

    /// The downloaded bytes were not a decodable image.
    #[error("DecodeError: {0}")]
    Decode(#[from] CodecError),
}

/// Everything that can sink one generation job.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The job spec could not be built or submitted.
    #[error("ServiceError: {0}")]
    Service(#[from] ServiceError),

    /// The job failed, was canceled, or timed out while polling.
    #[error("JobError: {0}")]
    Job(#[from] JobError),

    /// An output artifact could not be fetched or decoded.
    #[error("DownloadError: {0}")]
    Download(#[from] DownloadError),
}
