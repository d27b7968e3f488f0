//! # Store Error Types
//!
//! Errors fall into two classes:
//!
//! - **Corruption** ([`StoreError::CorruptedSequence`],
//!   [`StoreError::CorruptedIndex`], [`StoreError::CorruptedRecord`]) means
//!   persisted state cannot be trusted. A corrupted index is repaired by
//!   reindexing at open; the others abort startup.
//! - **Contract** errors ([`StoreError::EntityNotFound`],
//!   [`StoreError::DuplicateEntity`], [`StoreError::IncompleteRecord`],
//!   [`StoreError::NoSearchCriteria`]) are returned to callers to handle.

use thiserror::Error;

use vdir_core::ValidationError;

/// Errors surfaced by the record store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The persisted id counter is unreadable or behind the stored records.
    #[error("corrupted sequence: {0}")]
    CorruptedSequence(String),

    /// A persisted index entry could not be decoded.
    #[error("corrupted index: {0}")]
    CorruptedIndex(String),

    /// A primary record could not be decoded.
    #[error("corrupted record at {key}: {reason}")]
    CorruptedRecord { key: String, reason: String },

    /// A required field is missing or a record invariant does not hold.
    #[error("incomplete record: {0}")]
    IncompleteRecord(#[from] ValidationError),

    /// No record with the requested key exists.
    #[error("{kind} not found: {key}")]
    EntityNotFound { kind: &'static str, key: String },

    /// A unique constraint would be violated.
    #[error("duplicate {kind}: {key}")]
    DuplicateEntity { kind: &'static str, key: String },

    /// A search was issued with neither name nor country criteria.
    #[error("search requires at least one name or country criterion")]
    NoSearchCriteria,

    /// The connection string names no supported backend.
    #[error("unsupported database connection string: {0}")]
    InvalidDsn(String),

    /// Record serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The SQLite backend failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Whether this error indicates persisted state that cannot be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CorruptedSequence(_) | Self::CorruptedIndex(_) | Self::CorruptedRecord { .. }
        )
    }

    pub(crate) fn vasp_not_found(key: impl ToString) -> Self {
        Self::EntityNotFound {
            kind: "vasp",
            key: key.to_string(),
        }
    }

    pub(crate) fn certreq_not_found(key: impl ToString) -> Self {
        Self::EntityNotFound {
            kind: "certificate request",
            key: key.to_string(),
        }
    }
}
