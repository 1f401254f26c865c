//! Error taxonomy for the pipeline stages.
//!
//! Every stage returns one of these kinds; the run loop is the only place
//! that catches them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("transaction source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("inference error: {0}")]
    InferenceError(String),

    #[error("archive write error: {0}")]
    ArchiveWriteError(String),

    #[error("store write error: {0}")]
    StoreWriteError(String),
}

impl PipelineError {
    /// Stable label used in log fields and failure counters.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::SourceUnavailable(_) => "source_unavailable",
            PipelineError::MalformedPayload(_) => "malformed_payload",
            PipelineError::SchemaMismatch(_) => "schema_mismatch",
            PipelineError::InferenceError(_) => "inference_error",
            PipelineError::ArchiveWriteError(_) => "archive_write_error",
            PipelineError::StoreWriteError(_) => "store_write_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
