use granta_core::error::CoreError;
use granta_core::su::SuBoundsError;

/// Error type for the accounting engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A domain-level error from `granta_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: granta_core::types::DbId) -> Self {
        Self::Core(CoreError::NotFound { entity, id })
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Core(CoreError::Validation(message.into()))
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Core(CoreError::Invariant(message.into()))
    }

    /// Whether the error indicates a data-integrity problem rather than bad
    /// input. Invariant violations map to server errors at the HTTP edge.
    pub fn is_invariant(&self) -> bool {
        matches!(self, Self::Core(CoreError::Invariant(_)))
    }
}

impl From<SuBoundsError> for EngineError {
    fn from(err: SuBoundsError) -> Self {
        Self::validation(err.to_string())
    }
}
