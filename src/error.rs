//! Relay error taxonomy
//!
//! Every request-level failure is one of these variants. The HTTP boundary
//! turns all of them into `{"error": ...}` responses except `Corrupted`,
//! which aborts the request.

use hyper::StatusCode;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum RelayError {
    /// Missing required input (url or file)
    #[error("{0}")]
    Validation(String),

    /// Unknown token, or a token whose file is gone
    #[error("{0}")]
    NotFound(&'static str),

    /// Disk read/write failure
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Remote fetch failure
    #[error("{0}")]
    Network(String),

    /// The persisted mapping could not be parsed
    #[error("mapping store is corrupted: {0}")]
    Corrupted(#[from] serde_json::Error),
}

impl RelayError {
    pub const INVALID_LINK: &'static str = "Invalid or expired link";
    pub const FILE_NOT_FOUND: &'static str = "File not found";

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Ingestion errors are reported as ordinary responses; only lookup misses get 404.
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Corrupted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation(_) | Self::Io(_) | Self::Network(_) => StatusCode::OK,
        }
    }

    /// Whether the error must escape the request handler instead of becoming a response
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Corrupted(_))
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<multer::Error> for RelayError {
    fn from(err: multer::Error) -> Self {
        Self::Validation(err.to_string())
    }
}
