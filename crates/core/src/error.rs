use crate::types::DbId;

/// Domain-level error type shared across the workspace.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An entity lookup by ID returned nothing.
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// An input failed validation; the message embeds the offending value.
    #[error("{0}")]
    Validation(String),

    /// A data-integrity invariant was violated (e.g. a duplicate row where
    /// exactly one is expected). Never retried: retrying cannot fix it.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// An unclassified internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
