//! Controller error types.

use fakedra_id::ClaimUid;
use fakedra_nodestate::{ConflictAware, StoreError};
use thiserror::Error;
use tonic::Status;

/// Errors returned by the allocation driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Claim parameters are out of range.
    #[error("invalid claim parameters: {0}")]
    Validation(String),

    /// A parameters reference names an API group or kind this driver does
    /// not handle.
    #[error("unknown parameters reference: {0}")]
    UnknownKind(String),

    #[error("node {0:?} is not ready")]
    NotReady(String),

    #[error("no pending claim allocation {claim} on node {node:?}")]
    PendingNotFound { claim: ClaimUid, node: String },

    #[error("{kind} {name:?} not found")]
    ParametersNotFound { kind: String, name: String },

    #[error("immediate allocation is not supported: no node selected")]
    ImmediateAllocationUnsupported,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ConflictAware for DriverError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }

    fn exhausted(attempts: u32, last: Self) -> Self {
        Self::Store(StoreError::Persistence {
            attempts,
            last_error: last.to_string(),
        })
    }
}

impl From<DriverError> for Status {
    fn from(e: DriverError) -> Self {
        let message = e.to_string();
        match e {
            DriverError::Validation(_) | DriverError::UnknownKind(_) => {
                Status::invalid_argument(message)
            }
            DriverError::ImmediateAllocationUnsupported => Status::failed_precondition(message),
            DriverError::NotReady(_) => Status::unavailable(message),
            DriverError::PendingNotFound { .. } | DriverError::ParametersNotFound { .. } => {
                Status::not_found(message)
            }
            DriverError::Store(e) if e.is_not_found() => Status::not_found(message),
            DriverError::Store(e) if e.is_conflict() => Status::aborted(message),
            DriverError::Serialization(_) | DriverError::Store(_) => Status::internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_status_codes() {
        let cases = [
            (DriverError::Validation("count=0".to_string()), Code::InvalidArgument),
            (DriverError::ImmediateAllocationUnsupported, Code::FailedPrecondition),
            (DriverError::NotReady("node-a".to_string()), Code::Unavailable),
            (
                DriverError::Store(StoreError::NotFound {
                    namespace: "default".to_string(),
                    name: "node-a".to_string(),
                }),
                Code::NotFound,
            ),
            (
                DriverError::Store(StoreError::Conflict {
                    namespace: "default".to_string(),
                    name: "node-a".to_string(),
                    expected: 1,
                    actual: 2,
                }),
                Code::Aborted,
            ),
            (
                DriverError::Store(StoreError::Persistence {
                    attempts: 5,
                    last_error: "conflict".to_string(),
                }),
                Code::Internal,
            ),
        ];
        for (error, code) in cases {
            assert_eq!(Status::from(error).code(), code);
        }
    }
}
