//! Snapshot persistence: point-in-time aggregate-state checkpoints.
//!
//! A snapshot records the serialized state of one stream's aggregate at a
//! specific version, so callers can bound replay cost to the events after
//! it. The store persists and retrieves snapshots; it never validates that
//! a snapshot's content is causally consistent with the stream -- cadence
//! and correctness are the caller's side of the contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chronik_types::{Snapshot, StreamId};
use sqlx::PgPool;

use crate::error::StoreError;
use crate::postgres::PostgresPool;

/// Interface for snapshot persistence.
///
/// Two implementations exist: [`PgSnapshotStore`] against `PostgreSQL` and
/// `MemorySnapshotStore` for tests. Multiple snapshots may exist per
/// stream; [`SnapshotStore::prune`] keeps the newest K.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot of `stream` at `version`.
    ///
    /// Idempotent per `(stream, version)`: saving the same version again
    /// overwrites the stored state.
    async fn save(
        &self,
        stream: &StreamId,
        version: u64,
        state_data: Vec<u8>,
    ) -> Result<(), StoreError>;

    /// The highest-version snapshot for `stream`, or `None` if the stream
    /// has no snapshots. Absence is a normal outcome, not an error.
    async fn latest(&self, stream: &StreamId) -> Result<Option<Snapshot>, StoreError>;

    /// The snapshot at exactly `version`, or `None`.
    async fn at_version(
        &self,
        stream: &StreamId,
        version: u64,
    ) -> Result<Option<Snapshot>, StoreError>;

    /// Delete all but the `keep_count` highest-version snapshots for
    /// `stream`, returning how many were deleted.
    ///
    /// Idempotent; a no-op if the stream has `keep_count` or fewer.
    async fn prune(&self, stream: &StreamId, keep_count: u32) -> Result<u64, StoreError>;
}

/// Snapshot operations against the `snapshots` table.
#[derive(Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    /// Create a snapshot store bound to a connection pool.
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool().clone(),
        }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn save(
        &self,
        stream: &StreamId,
        version: u64,
        state_data: Vec<u8>,
    ) -> Result<(), StoreError> {
        let version_i64 = i64::try_from(version).unwrap_or(i64::MAX);

        sqlx::query(
            r"INSERT INTO snapshots (stream_id, version, state_data, created_at)
              VALUES ($1, $2, $3, $4)
              ON CONFLICT (stream_id, version) DO UPDATE SET
                state_data = EXCLUDED.state_data,
                created_at = EXCLUDED.created_at",
        )
        .bind(stream.as_str())
        .bind(version_i64)
        .bind(&state_data)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        tracing::debug!(stream = %stream, version, "Saved snapshot");
        Ok(())
    }

    async fn latest(&self, stream: &StreamId) -> Result<Option<Snapshot>, StoreError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r"SELECT stream_id, version, state_data, created_at
              FROM snapshots
              WHERE stream_id = $1
              ORDER BY version DESC
              LIMIT 1",
        )
        .bind(stream.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Snapshot::from))
    }

    async fn at_version(
        &self,
        stream: &StreamId,
        version: u64,
    ) -> Result<Option<Snapshot>, StoreError> {
        let version_i64 = i64::try_from(version).unwrap_or(i64::MAX);

        let row = sqlx::query_as::<_, SnapshotRow>(
            r"SELECT stream_id, version, state_data, created_at
              FROM snapshots
              WHERE stream_id = $1 AND version = $2",
        )
        .bind(stream.as_str())
        .bind(version_i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Snapshot::from))
    }

    async fn prune(&self, stream: &StreamId, keep_count: u32) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r"DELETE FROM snapshots
              WHERE stream_id = $1
                AND version NOT IN (
                    SELECT version FROM snapshots
                    WHERE stream_id = $1
                    ORDER BY version DESC
                    LIMIT $2
                )",
        )
        .bind(stream.as_str())
        .bind(i64::from(keep_count))
        .execute(&self.pool)
        .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            tracing::debug!(stream = %stream, deleted, keep_count, "Pruned snapshots");
        }
        Ok(deleted)
    }
}

/// A row from the `snapshots` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct SnapshotRow {
    /// Stream the snapshot belongs to.
    stream_id: String,
    /// Last event version folded into the state.
    version: i64,
    /// Opaque state bytes.
    state_data: Vec<u8>,
    /// Save timestamp.
    created_at: DateTime<Utc>,
}

impl From<SnapshotRow> for Snapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            stream_id: StreamId::new(row.stream_id),
            version: u64::try_from(row.version).unwrap_or(0),
            state_data: row.state_data,
            timestamp: row.created_at,
        }
    }
}
