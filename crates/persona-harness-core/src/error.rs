//! Error taxonomy shared by the ingestion and retrieval pipeline.
//!
//! "Nothing matched" is never an error: searches and context building
//! return empty collections instead.

use thiserror::Error;

/// Errors surfaced by ingestion and knowledge operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KnowledgeError {
    /// Every extraction backend failed (corrupt, encrypted, image-only, or not a PDF).
    #[error("unreadable PDF: {reason}")]
    UnreadablePdf { reason: String },

    /// The upload exceeds the configured byte ceiling. No extraction was attempted.
    #[error("file too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: usize, limit: usize },

    /// `random_quote` was called with no quotes stored.
    #[error("no quotes available")]
    EmptyStore,

    /// A manual addition or chunking parameter failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl KnowledgeError {
    /// Machine-readable code used by the HTTP error contract and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            KnowledgeError::UnreadablePdf { .. } => "unreadable_pdf",
            KnowledgeError::FileTooLarge { .. } => "file_too_large",
            KnowledgeError::EmptyStore => "empty_store",
            KnowledgeError::InvalidInput(_) => "invalid_input",
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        KnowledgeError::InvalidInput(msg.into())
    }
}
