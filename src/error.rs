//! Pipeline error taxonomy.
//!
//! Every failure the pipeline can surface to a user is a [`PipelineError`].
//! Variants are grouped into an [`ErrorKind`] so frontends (CLI, HTTP) can
//! decide how to report them without matching on every variant.
//!
//! Artifact I/O problems are deliberately absent: the packager records them
//! as warnings and keeps going.

use thiserror::Error;

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad upload or bad request; prior state is untouched.
    InputValidation,
    /// A query arrived before any document was indexed.
    NoDocumentIndexed,
    /// The embedding service or the oracle failed.
    Upstream,
    /// Invalid configuration or prompt template.
    Config,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no documents were uploaded")]
    NoDocuments,

    #[error("file format '{media_type}' of '{name}' is not supported; upload a PDF or TXT file")]
    UnsupportedMediaType { name: String, media_type: String },

    #[error("'{name}' is not a Software Requirements Specification (SRS) document")]
    MissingMarker { name: String },

    #[error("could not read text from '{name}': {reason}")]
    Unreadable { name: String, reason: String },

    #[error("document text produced no chunks to index")]
    NothingToIndex,

    #[error("user story must not be empty")]
    EmptyQuery,

    #[error("number of test cases must be between 1 and 5, got {0}")]
    InvalidCount(u8),

    #[error("no document indexed; upload an SRS document first")]
    NoDocumentIndexed,

    #[error("embedding service failed: {0}")]
    Embedding(String),

    #[error("oracle request failed: {0}")]
    Oracle(String),

    #[error("invalid prompt template: {0}")]
    Template(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::NoDocuments
            | PipelineError::UnsupportedMediaType { .. }
            | PipelineError::MissingMarker { .. }
            | PipelineError::Unreadable { .. }
            | PipelineError::NothingToIndex
            | PipelineError::EmptyQuery
            | PipelineError::InvalidCount(_) => ErrorKind::InputValidation,
            PipelineError::NoDocumentIndexed => ErrorKind::NoDocumentIndexed,
            PipelineError::Embedding(_) | PipelineError::Oracle(_) => ErrorKind::Upstream,
            PipelineError::Template(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn embedding(err: impl std::fmt::Display) -> Self {
        PipelineError::Embedding(err.to_string())
    }

    pub(crate) fn oracle(err: impl std::fmt::Display) -> Self {
        PipelineError::Oracle(err.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
