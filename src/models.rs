//! Core data models used throughout Story2Test.
//!
//! These types represent the uploads, chunks, exchanges, and extracted test
//! cases that flow through the generation pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A document as uploaded by the user, before text extraction.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    /// Display name, usually the original file name.
    pub name: String,
    /// Declared media type (`application/pdf` or `text/plain`).
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }
}

/// A contiguous, overlapping segment of the extracted document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position in the chunk sequence, starting at 0.
    pub index: usize,
    /// Offset of the first char of this chunk in the source text, in chars.
    pub start: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A retrieved chunk together with its similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// One query/answer pair in a session's history.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub query: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

/// One structured test case extracted from an oracle answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCaseRecord {
    /// Identifier as emitted by the oracle, e.g. `"1"` or `"2a"`.
    pub id: String,
    /// Descriptive text between the header and the script marker.
    pub body: String,
    pub script: Option<String>,
}
