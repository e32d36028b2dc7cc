//! Error types for the store.
//!
//! The taxonomy is deliberately small and carried as data, not as a
//! hierarchy: callers must handle a version conflict differently from a
//! transient storage fault, so the two are distinct variants rather than
//! one generic failure. Absence of a stream or snapshot is a normal read
//! outcome and is expressed structurally (empty `Vec` / `None`), never as
//! an error.

use chronik_types::StreamId;

/// Errors that can occur in the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The caller's expected stream version is stale, or a concurrent
    /// writer committed first.
    ///
    /// Not safe to retry as-is: the caller must re-derive the expected
    /// version (via `stream_version` or by re-reading the stream tail)
    /// before retrying, or the same conflict will recur.
    #[error("version conflict on stream {stream}: expected {expected}, found {actual}")]
    Conflict {
        /// The stream the append was aimed at.
        stream: StreamId,
        /// The version the writer based its append on.
        expected: u64,
        /// The stream's current version at detection time.
        actual: u64,
    },

    /// A `PostgreSQL` operation failed (connectivity, timeout, or any
    /// database error that is not a version conflict).
    ///
    /// Safe to retry with the same expected version, unlike
    /// [`StoreError::Conflict`].
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A payload, metadata, or snapshot state value could not be encoded
    /// or decoded.
    ///
    /// Distinct from [`StoreError::Storage`] so callers know the data
    /// itself, not the infrastructure, is at fault.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration error (for example an unparsable database URL).
    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether this error is a version conflict.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether this error is a transient infrastructure fault that may be
    /// retried with the same expected version.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
