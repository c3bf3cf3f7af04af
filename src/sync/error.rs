//! Sync error types.

use super::store::StoreError;
use crate::models::ValidationError;

/// Hard failures of a batch.
///
/// Guard mismatches are not errors and never show up here. `index` is the
/// position of the failing operation in its batch; operations before it
/// have already been applied and stay applied. A failed read of the list
/// after the batch carries no index, since every operation has run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("list not found: {list_id}")]
    NotFound { list_id: String },

    #[error("operation {index} rejected: {source}")]
    Validation {
        index: usize,
        #[source]
        source: ValidationError,
    },

    #[error("store unavailable at operation {index}: {source}")]
    StoreUnavailable {
        index: usize,
        #[source]
        source: StoreError,
    },

    #[error("could not read list {list_id}: {source}")]
    ReadFailed {
        list_id: String,
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    /// Short machine-readable name for responses.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::NotFound { .. } => "not_found",
            SyncError::Validation { .. } => "validation",
            SyncError::StoreUnavailable { .. } | SyncError::ReadFailed { .. } => {
                "store_unavailable"
            }
        }
    }

    /// Index of the failing operation, if the failure is tied to one.
    pub fn index(&self) -> Option<usize> {
        match self {
            SyncError::NotFound { .. } | SyncError::ReadFailed { .. } => None,
            SyncError::Validation { index, .. } | SyncError::StoreUnavailable { index, .. } => {
                Some(*index)
            }
        }
    }
}
