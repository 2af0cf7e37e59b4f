//! Error types for the chapter video pipeline.

use thiserror::Error;

use crate::defaults::FORBIDDEN_STATUS;
use crate::models::ChapterId;

/// Result type alias using the pipeline's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The chapter does not exist in the chapter store
    #[error("Chapter not found: {0}")]
    ChapterNotFound(ChapterId),

    /// The chapter exists but has nothing to search for
    #[error("Chapter {0} has an empty search query")]
    EmptySearchQuery(ChapterId),

    /// Chapter store read or write failed
    #[error("Store error: {0}")]
    Store(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The service is shutting down and no longer accepts work
    #[error("Service is shutting down")]
    ShuttingDown,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error was raised while validating a submission.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::ChapterNotFound(_) | Error::EmptySearchQuery(_))
    }
}

/// Error reported by a search provider or fast-path resolver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The provider explicitly asked not to be retried.
    #[error("Do not retry: {0}")]
    DoNotRetry(String),

    /// Any other provider failure.
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Create an HTTP error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Whether further attempts must be abandoned after this error.
    pub fn is_abort(&self) -> bool {
        match self {
            ProviderError::Http { status, .. } => *status == FORBIDDEN_STATUS,
            ProviderError::DoNotRetry(_) => true,
            ProviderError::Other(_) => false,
        }
    }
}
