//! Error types for segvault core.

use crate::types::{ReplicaId, ReplicaState};
use std::io;
use thiserror::Error;

/// Result type for replica operations.
pub type ReplicaResult<T> = Result<T, ReplicaError>;

/// Errors that can occur in replica operations.
#[derive(Debug, Error)]
pub enum ReplicaError {
    /// The operation is not allowed in the replica's current state.
    #[error("cannot {operation} replica {replica} in state {state}")]
    WrongState {
        /// The replica.
        replica: ReplicaId,
        /// State the replica was in.
        state: ReplicaState,
        /// The rejected operation.
        operation: &'static str,
    },

    /// Storage has no frame left for the replica.
    #[error("no storage frame available for replica {replica}: {source}")]
    ResourceExhausted {
        /// The replica.
        replica: ReplicaId,
        /// The allocation failure.
        #[source]
        source: segvault_storage::StorageError,
    },

    /// Recovery segments could not be built from the replica's content.
    #[error("recovery of replica {replica} failed: {reason}")]
    RecoveryFailed {
        /// The replica.
        replica: ReplicaId,
        /// Why the build failed.
        reason: String,
    },

    /// A recovery segment index past the number of partitions.
    #[error(
        "recovery segment {requested} requested from replica {replica} \
         but there are only {available} partitions"
    )]
    PartitionOutOfBounds {
        /// The replica.
        replica: ReplicaId,
        /// Index the caller asked for.
        requested: usize,
        /// Number of partitions built.
        available: usize,
    },

    /// An argument is out of range for the replica.
    #[error("invalid argument for replica {replica}: {message}")]
    InvalidArgument {
        /// The replica.
        replica: ReplicaId,
        /// Description of the problem.
        message: String,
    },

    /// Configuration does not fit the storage it is used with.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] segvault_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ReplicaError {
    /// Returns the replica the error is about, if it names one.
    #[must_use]
    pub fn replica(&self) -> Option<ReplicaId> {
        match self {
            Self::WrongState { replica, .. }
            | Self::ResourceExhausted { replica, .. }
            | Self::RecoveryFailed { replica, .. }
            | Self::PartitionOutOfBounds { replica, .. }
            | Self::InvalidArgument { replica, .. } => Some(*replica),
            Self::InvalidConfig { .. } | Self::Storage(_) | Self::Io(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ServerId;

    fn replica() -> ReplicaId {
        ReplicaId::new(ServerId::new(99, 0), 88)
    }

    #[test]
    fn wrong_state_message() {
        let err = ReplicaError::WrongState {
            replica: replica(),
            state: ReplicaState::Uninit,
            operation: "close",
        };
        assert_eq!(
            err.to_string(),
            "cannot close replica <99.0,88> in state UNINIT"
        );
        assert_eq!(err.replica(), Some(replica()));
    }

    #[test]
    fn out_of_bounds_message() {
        let err = ReplicaError::PartitionOutOfBounds {
            replica: replica(),
            requested: 0,
            available: 0,
        };
        assert_eq!(
            err.to_string(),
            "recovery segment 0 requested from replica <99.0,88> but there are only 0 partitions"
        );
    }

    #[test]
    fn storage_error_converts() {
        let err: ReplicaError = segvault_storage::StorageError::UnknownFrame(3).into();
        assert!(matches!(err, ReplicaError::Storage(_)));
        assert_eq!(err.replica(), None);
    }
}
