//! Error types for the triage pipeline.
//!
//! Fatal errors (rubric, config) abort the run. Per-document errors
//! (classification, discovery, timeout) are recorded against the document
//! and never stop the batch. Cache I/O errors degrade the pipeline to
//! no-cache mode.

use thiserror::Error;

/// Triage error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Rubric file missing or unreadable. Fatal.
    #[error("rubric not found: {0}")]
    RubricNotFound(String),

    /// Rubric file readable but structurally invalid. Fatal.
    #[error("invalid rubric: {0}")]
    RubricFormat(String),

    /// Configuration invalid. Fatal.
    #[error("configuration error: {0}")]
    Config(String),

    /// A single document could not be classified (LLM failure or an
    /// unusable response). Recorded as a batch failure.
    #[error("classification failed for {document_id}: {reason}")]
    Classification { document_id: String, reason: String },

    /// A drive entry could not be normalized or fetched. The entry is
    /// skipped and counted.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// A document exceeded the per-document deadline.
    #[error("classification timed out for {document_id} after {secs}s")]
    Timeout { document_id: String, secs: u64 },

    /// Cache backend failure. Callers degrade to no-cache mode.
    #[error("cache I/O error: {0}")]
    CacheIo(String),

    /// LLM transport or endpoint failure, before any response parsing.
    #[error("llm error: {0}")]
    Llm(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLite error from the cache backend.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    /// True for errors that abort the whole run rather than a single
    /// document.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::RubricNotFound(_) | Error::RubricFormat(_) | Error::Config(_)
        )
    }
}

/// Result type alias for triage operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_flagged() {
        assert!(Error::RubricNotFound("x".into()).is_fatal());
        assert!(Error::RubricFormat("x".into()).is_fatal());
        assert!(Error::Config("x".into()).is_fatal());
        assert!(!Error::Discovery("x".into()).is_fatal());
        assert!(!Error::Classification {
            document_id: "d1".into(),
            reason: "bad json".into()
        }
        .is_fatal());
    }

    #[test]
    fn timeout_display_names_document() {
        let err = Error::Timeout {
            document_id: "doc-9".into(),
            secs: 30,
        };
        assert_eq!(
            err.to_string(),
            "classification timed out for doc-9 after 30s"
        );
    }
}
