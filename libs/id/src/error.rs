use thiserror::Error;

/// Why a string is not a valid ID.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("ID cannot be empty")]
    Empty,

    #[error("ID missing prefix: expected '{expected}', got '{actual}'")]
    MissingPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The text after the prefix is not a UUID.
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),
}

impl IdError {
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }

    pub fn is_prefix_error(&self) -> bool {
        matches!(self, IdError::MissingPrefix { .. })
    }
}
