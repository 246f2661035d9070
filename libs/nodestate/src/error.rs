use thiserror::Error;

/// Errors from NodeAllocationState store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("NodeAllocationState {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("NodeAllocationState {namespace}/{name} already exists")]
    AlreadyExists { namespace: String, name: String },

    /// The stored version moved since the caller read it. Retryable.
    #[error(
        "conflict on NodeAllocationState {namespace}/{name}: expected resource version {expected}, found {actual}"
    )]
    Conflict {
        namespace: String,
        name: String,
        expected: u64,
        actual: u64,
    },

    /// Conflict retries ran out.
    #[error("persistence failed after {attempts} attempts: {last_error}")]
    Persistence { attempts: u32, last_error: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub(crate) fn not_found(namespace: &str, name: &str) -> Self {
        Self::NotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
