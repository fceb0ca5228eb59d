use thiserror::Error;

/// Errors surfaced by the memory core to the caller of `turn` or `select`.
///
/// None of these are retried internally. A failed turn keeps whatever was
/// already appended; the log stays append-only consistent.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Invalid session id: {reason}")]
    InvalidSessionId { reason: String },

    #[error("Cost estimation failed: {0}")]
    EstimationFailed(#[source] anyhow::Error),

    #[error("Generation failed: {0}")]
    GenerationFailed(#[source] anyhow::Error),

    #[error("Turn cancelled")]
    Cancelled,
}

impl MemoryError {
    pub fn invalid_session_id(reason: impl Into<String>) -> Self {
        MemoryError::InvalidSessionId {
            reason: reason.into(),
        }
    }

    /// Stable short code, handy for logs and host output
    pub fn code(&self) -> &'static str {
        match self {
            MemoryError::InvalidSessionId { .. } => "InvalidSessionId",
            MemoryError::EstimationFailed(_) => "EstimationFailed",
            MemoryError::GenerationFailed(_) => "GenerationFailed",
            MemoryError::Cancelled => "Cancelled",
        }
    }
}

pub type MemoryResult<T> = Result<T, MemoryError>;
