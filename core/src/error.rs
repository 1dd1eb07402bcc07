use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Bad input shape or range. Rejected before any mutation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Duplicate batch fingerprint or an illegal state-machine transition.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// The split invariant or a status-regression guard would be violated.
    /// Indicates a defect; aborts the surrounding transaction.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        EngineError::Conflict(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        EngineError::Integrity(msg.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
