use crate::types::Id;

/// Domain error taxonomy for the caption engine.
///
/// Per-file pipeline errors are caught inside the job worker and recorded on
/// the job; lifecycle operations surface these synchronously.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A job, file, or target set does not exist.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: Id },

    /// Bad parameters, an unsupported backend id, or zero eligible files.
    #[error("Invalid request: {0}")]
    Invalid(String),

    /// The vision backend is unreachable, timed out, or returned non-2xx.
    /// Carries the response body (or transport error) for inspection.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// An unexpected failure escaping the worker loop.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for [`CoreError::NotFound`].
    pub fn not_found(entity: &'static str, id: Id) -> Self {
        CoreError::NotFound { entity, id }
    }
}
