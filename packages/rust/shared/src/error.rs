//! Error types for firmfacts.
//!
//! Library crates use [`FirmfactsError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all firmfacts operations.
#[derive(Debug, thiserror::Error)]
pub enum FirmfactsError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network or per-page failure during a crawl. Non-fatal at the page
    /// level; the frontier continues.
    #[error("crawl error: {0}")]
    Crawl(String),

    /// Third-party document retrieval (filing index/API) failure.
    #[error("document retrieval error: {0}")]
    DocumentRetrieval(String),

    /// Pattern or LLM extraction failure for one section or chunk.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Every retry attempt for a tier failed. Recorded on the tier result;
    /// the orchestrator proceeds to the next tier.
    #[error("tier {tier} exhausted after {attempts} attempts: {message}")]
    TierExhausted {
        tier: u8,
        attempts: u32,
        message: String,
    },

    /// The job's wall-clock budget was exceeded.
    #[error("deadline exceeded after {elapsed_secs}s")]
    DeadlineExceeded { elapsed_secs: u64 },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Data validation error (bad domain, invalid job state, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FirmfactsError>;

impl FirmfactsError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a crawl error from any displayable message.
    pub fn crawl(msg: impl Into<String>) -> Self {
        Self::Crawl(msg.into())
    }

    /// Create a document retrieval error from any displayable message.
    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::DocumentRetrieval(msg.into())
    }

    /// Create an extraction error from any displayable message.
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = FirmfactsError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = FirmfactsError::TierExhausted {
            tier: 2,
            attempts: 3,
            message: "HTTP 503".into(),
        };
        assert!(err.to_string().contains("tier 2 exhausted after 3 attempts"));

        let err = FirmfactsError::DeadlineExceeded { elapsed_secs: 1801 };
        assert!(err.to_string().contains("1801s"));
    }
}
