use castor_schema::DecodeError;
use reqwest::StatusCode;
use thiserror::Error as ThisError;

use super::IsRetryable;
use super::transport::TransportError;

/// Why one attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum AttemptFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("service responded with {status}")]
    Service {
        status: StatusCode,
        body_preview: String,
    },
}

impl AttemptFailure {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AttemptFailure::Service { status, .. } => Some(*status),
            AttemptFailure::Transport(_) => None,
        }
    }
}

/// The only error type that crosses the pipeline boundary.
///
/// Intermediate attempt failures never surface here; they are visible through attempt
/// observers such as [`crate::HistoryRecorder`].
#[derive(Debug, ThisError)]
pub enum CastorError {
    /// Invalid endpoint/mode combination or a write routed away from the primary.
    /// Raised before any attempt is made.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("operation cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    /// Retries exhausted or a non-retryable outcome; wraps the last failure.
    #[error("operation failed after {attempts} attempt(s): {failure}")]
    Terminal {
        attempts: u32,
        failure: AttemptFailure,
        /// The retry policy classified `failure` as transient, i.e. the budget ran out.
        transient: bool,
    },

    #[error("failed to load configuration: {0}")]
    Config(#[from] figment::Error),
}

impl CastorError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        CastorError::Configuration(message.into())
    }

    /// Attempts issued before the error was returned; zero for errors raised before sending.
    pub fn attempts(&self) -> u32 {
        match self {
            CastorError::Cancelled { attempts } | CastorError::Terminal { attempts, .. } => {
                *attempts
            }
            CastorError::Configuration(_) | CastorError::Decode(_) | CastorError::Config(_) => 0,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            CastorError::Terminal { failure, .. } => failure.status(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CastorError::Cancelled { .. })
    }
}

impl IsRetryable for CastorError {
    /// Whether re-issuing the whole operation later might succeed.
    fn is_retryable(&self) -> bool {
        match self {
            CastorError::Terminal { transient, .. } => *transient,
            CastorError::Cancelled { .. }
            | CastorError::Configuration(_)
            | CastorError::Decode(_)
            | CastorError::Config(_) => false,
        }
    }
}
