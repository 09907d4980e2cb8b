use thiserror::Error;

/// JSON conversion errors.
#[derive(Debug, Error)]
pub enum JsonError {
    #[error("expected a JSON array, object or null at the top level, found {found}")]
    NotATable { found: &'static str },

    #[error("table nesting exceeds {limit} levels")]
    TooDeep { limit: usize },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
