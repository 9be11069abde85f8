use thiserror::Error;

/// Errors from the decision-generation collaborator.
///
/// The transient variants are the only ones worth retrying; everything
/// else is surfaced immediately.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("provider overloaded: {0}")]
    Overloaded(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("decision did not match schema '{schema}': {message}")]
    SchemaMismatch { schema: String, message: String },

    #[error("empty decision response")]
    EmptyResponse,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DecisionError {
    /// Whether a retry with backoff has any chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DecisionError::RateLimited { .. }
                | DecisionError::Overloaded(_)
                | DecisionError::Provider { .. }
        )
    }
}

/// Errors from the conversation store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation not found")]
    NotFound,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors from the email, calendar, and booking backends.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}
