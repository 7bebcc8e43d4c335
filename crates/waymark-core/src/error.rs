//! Error taxonomy shared by every waymark operation.
//!
//! Query functions in `waymark-db` return `anyhow::Result`; anything that
//! escapes them unclassified ends up as [`CoreError::Internal`]. The
//! generation client and the normalizer have their own error enums which
//! convert into the matching variants here.

use std::time::Duration;

use thiserror::Error;

use crate::generation::GenerationError;
use crate::roadmap::normalize::NormalizeError;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed request. Never forwarded downstream.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Missing entity, or one the caller does not own.
    #[error("{0} not found")]
    NotFound(String),

    #[error("generation service unavailable at {0}")]
    ServiceUnavailable(String),

    #[error("generation service rejected the request ({status}): {message}")]
    ServiceRejected { status: u16, message: String },

    #[error("generation service timed out after {}s", .0.as_secs())]
    ServiceTimeout(Duration),

    #[error("generation service failed: {0}")]
    ServiceUnknownFailure(String),

    #[error("generated roadmap could not be normalized: {0}")]
    NormalizationFailure(#[from] NormalizeError),

    /// A duplicate-key race the store refused.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// True for faults of the Generation Service or of its payload. These
    /// are reported to the user as an assistant message before the error
    /// is returned.
    pub fn is_service_fault(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable(_)
                | Self::ServiceRejected { .. }
                | Self::ServiceTimeout(_)
                | Self::ServiceUnknownFailure(_)
                | Self::NormalizationFailure(_)
        )
    }
}

impl From<GenerationError> for CoreError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Unavailable(url) => Self::ServiceUnavailable(url),
            GenerationError::Rejected { status, message } => {
                Self::ServiceRejected { status, message }
            }
            GenerationError::Timeout(after) => Self::ServiceTimeout(after),
            GenerationError::Unknown(reason) => Self::ServiceUnknownFailure(reason),
        }
    }
}
