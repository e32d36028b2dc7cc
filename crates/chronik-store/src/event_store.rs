//! The event log: ordered append under optimistic concurrency, plus the
//! read paths.
//!
//! Events are the source of truth. Every append is one atomic transaction:
//! the batch receives sequential versions and either commits whole or not
//! at all. Conflict detection is two-layered: an explicit version check
//! inside the transaction, and -- as the authoritative backstop against the
//! check-then-act race -- the `(stream_id, version)` uniqueness constraint
//! at insert time. Both layers surface the identical
//! [`StoreError::Conflict`] shape.
//!
//! Readers run snapshot-isolated: they never block appends and are never
//! blocked by them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chronik_types::{CorrelationId, NewEvent, RecordedEvent, StreamId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::postgres::PostgresPool;

/// Name of the unique constraint on `(stream_id, version)`.
///
/// The append fallback matches this exact constraint, so a unique violation
/// on any other constraint is never mistaken for a version conflict.
const STREAM_VERSION_CONSTRAINT: &str = "events_stream_id_version_key";

/// Interface for event persistence.
///
/// Two implementations exist: [`PgEventStore`] against `PostgreSQL` and
/// `MemoryEventStore` for tests. Callers hold `Arc<dyn EventStore>` and
/// never name a backend.
///
/// All operations are cancel-safe by drop: dropping an in-flight `append`
/// future before its transaction commits rolls the transaction back, so a
/// partial batch is never observable.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an ordered batch of events to a stream.
    ///
    /// Each event in the batch receives the next sequential version
    /// (`current + 1`, `+2`, ...) and a fresh global position; all events
    /// commit atomically or none do. Events that carry no correlation id
    /// share one freshly generated id for the batch.
    ///
    /// When `expected_version` is `Some(v)` and the stream's current
    /// version differs from `v`, the append fails with
    /// [`StoreError::Conflict`] and persists nothing. When it is `None`,
    /// versions continue from whatever the current version is; a
    /// concurrent writer losing the insert race still receives a conflict,
    /// not a generic failure.
    ///
    /// An empty batch is a no-op that performs no write and returns
    /// `Ok(())`.
    async fn append(
        &self,
        stream: &StreamId,
        batch: &[NewEvent],
        expected_version: Option<u64>,
    ) -> Result<(), StoreError>;

    /// Append a single event; equivalent to a one-element batch.
    async fn append_one(
        &self,
        stream: &StreamId,
        event: NewEvent,
        expected_version: Option<u64>,
    ) -> Result<(), StoreError> {
        self.append(stream, core::slice::from_ref(&event), expected_version)
            .await
    }

    /// Read one stream's events in ascending version order, within the
    /// inclusive range `[from_version, to_version]`.
    ///
    /// `to_version = None` means unbounded. A stream with no events in
    /// range yields an empty `Vec`, not an error.
    async fn read_stream(
        &self,
        stream: &StreamId,
        from_version: u64,
        to_version: Option<u64>,
    ) -> Result<Vec<RecordedEvent>, StoreError>;

    /// Read up to `max_count` events across all streams in ascending
    /// global order, strictly after `from_position`.
    ///
    /// Passing the last returned event's `global_id` back as
    /// `from_position` yields resumable, cursor-based iteration. Position 0
    /// starts from the beginning of the log.
    async fn read_forward(
        &self,
        from_position: i64,
        max_count: u32,
    ) -> Result<Vec<RecordedEvent>, StoreError>;

    /// Read up to `max_count` events of one type, optionally bounded to a
    /// commit-time window (inclusive), in ascending timestamp order.
    async fn read_by_event_type(
        &self,
        event_type: &str,
        from_timestamp: Option<DateTime<Utc>>,
        to_timestamp: Option<DateTime<Utc>>,
        max_count: u32,
    ) -> Result<Vec<RecordedEvent>, StoreError>;

    /// Read every event sharing a correlation id, across all streams, in
    /// ascending timestamp order.
    async fn read_by_correlation(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Vec<RecordedEvent>, StoreError>;

    /// Current max version for the stream, or 0 if the stream has never
    /// been written.
    ///
    /// This is the basis both for concurrency checks and for caller-side
    /// snapshot-cadence decisions.
    async fn stream_version(&self, stream: &StreamId) -> Result<u64, StoreError>;
}

/// Event log operations against the `events` table.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Create an event store bound to a connection pool.
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool().clone(),
        }
    }

    /// Remap an append failure: a unique violation on the
    /// `(stream_id, version)` constraint becomes [`StoreError::Conflict`]
    /// with a freshly re-queried actual version; anything else propagates
    /// as [`StoreError::Storage`].
    ///
    /// `based_on` is the version the failed insert assumed -- the caller's
    /// expected version, or the version read inside the transaction when
    /// no expectation was given.
    async fn remap_append_error(
        &self,
        stream: &StreamId,
        based_on: u64,
        err: sqlx::Error,
    ) -> StoreError {
        if is_version_conflict(&err) {
            match fetch_version(&self.pool, stream).await {
                Ok(actual) => StoreError::Conflict {
                    stream: stream.clone(),
                    expected: based_on,
                    actual,
                },
                Err(requery_err) => requery_err,
            }
        } else {
            StoreError::Storage(err)
        }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(
        &self,
        stream: &StreamId,
        batch: &[NewEvent],
        expected_version: Option<u64>,
    ) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        let current = fetch_version(&mut *tx, stream).await?;
        if let Some(expected) = expected_version {
            if expected != current {
                // Dropping the transaction rolls it back.
                return Err(StoreError::Conflict {
                    stream: stream.clone(),
                    expected,
                    actual: current,
                });
            }
        }

        // Pre-allocate arrays for the UNNEST-based batch insert. One
        // commit timestamp and (for events without one) one correlation id
        // per batch.
        let len = batch.len();
        let committed_at = Utc::now();
        let batch_correlation = CorrelationId::new();

        let mut event_types = Vec::with_capacity(len);
        let mut payloads = Vec::with_capacity(len);
        let mut metadata: Vec<Option<Vec<u8>>> = Vec::with_capacity(len);
        let mut versions = Vec::with_capacity(len);
        let mut timestamps = Vec::with_capacity(len);
        let mut correlations: Vec<Uuid> = Vec::with_capacity(len);

        let mut version = current;
        for event in batch {
            version = version.saturating_add(1);
            event_types.push(event.event_type.clone());
            payloads.push(event.payload.clone());
            metadata.push(event.metadata.clone());
            versions.push(i64::try_from(version).unwrap_or(i64::MAX));
            timestamps.push(committed_at);
            correlations.push(
                event
                    .correlation_id
                    .unwrap_or(batch_correlation)
                    .into_inner(),
            );
        }

        // Multi-row INSERT using UNNEST: one round-trip for the whole
        // batch. The unique constraint on (stream_id, version) fires here
        // if a concurrent writer committed between our version read and
        // this insert.
        let insert_result = sqlx::query(
            r"INSERT INTO events (stream_id, event_type, payload, metadata, version, created_at, correlation_id)
              SELECT $1::TEXT, u.* FROM UNNEST($2::TEXT[], $3::BYTEA[], $4::BYTEA[], $5::BIGINT[], $6::TIMESTAMPTZ[], $7::UUID[]) AS u",
        )
        .bind(stream.as_str())
        .bind(&event_types)
        .bind(&payloads)
        .bind(&metadata)
        .bind(&versions)
        .bind(&timestamps)
        .bind(&correlations)
        .execute(&mut *tx)
        .await;

        let based_on = expected_version.unwrap_or(current);
        if let Err(err) = insert_result {
            drop(tx);
            return Err(self.remap_append_error(stream, based_on, err).await);
        }

        if let Err(err) = tx.commit().await {
            return Err(self.remap_append_error(stream, based_on, err).await);
        }

        tracing::debug!(stream = %stream, count = len, "Appended events (batch UNNEST)");
        Ok(())
    }

    async fn read_stream(
        &self,
        stream: &StreamId,
        from_version: u64,
        to_version: Option<u64>,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let from = i64::try_from(from_version).unwrap_or(i64::MAX);
        let to = to_version.map_or(i64::MAX, |v| i64::try_from(v).unwrap_or(i64::MAX));

        let rows = sqlx::query_as::<_, EventRow>(
            r"SELECT global_id, stream_id, event_type, payload, metadata, version, created_at, correlation_id
              FROM events
              WHERE stream_id = $1 AND version >= $2 AND version <= $3
              ORDER BY version",
        )
        .bind(stream.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(RecordedEvent::from).collect())
    }

    async fn read_forward(
        &self,
        from_position: i64,
        max_count: u32,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r"SELECT global_id, stream_id, event_type, payload, metadata, version, created_at, correlation_id
              FROM events
              WHERE global_id > $1
              ORDER BY global_id
              LIMIT $2",
        )
        .bind(from_position)
        .bind(i64::from(max_count))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(RecordedEvent::from).collect())
    }

    async fn read_by_event_type(
        &self,
        event_type: &str,
        from_timestamp: Option<DateTime<Utc>>,
        to_timestamp: Option<DateTime<Utc>>,
        max_count: u32,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r"SELECT global_id, stream_id, event_type, payload, metadata, version, created_at, correlation_id
              FROM events
              WHERE event_type = $1
                AND ($2::TIMESTAMPTZ IS NULL OR created_at >= $2)
                AND ($3::TIMESTAMPTZ IS NULL OR created_at <= $3)
              ORDER BY created_at, global_id
              LIMIT $4",
        )
        .bind(event_type)
        .bind(from_timestamp)
        .bind(to_timestamp)
        .bind(i64::from(max_count))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(RecordedEvent::from).collect())
    }

    async fn read_by_correlation(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r"SELECT global_id, stream_id, event_type, payload, metadata, version, created_at, correlation_id
              FROM events
              WHERE correlation_id = $1
              ORDER BY created_at, global_id",
        )
        .bind(correlation_id.into_inner())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(RecordedEvent::from).collect())
    }

    async fn stream_version(&self, stream: &StreamId) -> Result<u64, StoreError> {
        fetch_version(&self.pool, stream).await
    }
}

/// Query a stream's current max version, 0 if the stream has no events.
async fn fetch_version<'e, E>(executor: E, stream: &StreamId) -> Result<u64, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let current: i64 =
        sqlx::query_scalar(r"SELECT COALESCE(MAX(version), 0) FROM events WHERE stream_id = $1")
            .bind(stream.as_str())
            .fetch_one(executor)
            .await?;

    Ok(u64::try_from(current).unwrap_or(0))
}

/// Whether an error is a unique violation on the `(stream_id, version)`
/// constraint, i.e. a lost append race.
///
/// Matched structurally on the driver's error kind and constraint name,
/// never on message text.
fn is_version_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() && db.constraint() == Some(STREAM_VERSION_CONSTRAINT)
        }
        _ => false,
    }
}

/// A row from the `events` table.
///
/// Uses runtime types rather than compile-time checked types to avoid
/// requiring a live database during builds.
#[derive(Debug, Clone, sqlx::FromRow)]
struct EventRow {
    /// Store-assigned global position.
    global_id: i64,
    /// Stream the event belongs to.
    stream_id: String,
    /// Event type tag.
    event_type: String,
    /// Opaque payload bytes.
    payload: Vec<u8>,
    /// Opaque metadata bytes, if any.
    metadata: Option<Vec<u8>>,
    /// 1-based version within the stream.
    version: i64,
    /// Commit timestamp.
    created_at: DateTime<Utc>,
    /// Correlation id.
    correlation_id: Uuid,
}

impl From<EventRow> for RecordedEvent {
    fn from(row: EventRow) -> Self {
        Self {
            global_id: row.global_id,
            stream_id: StreamId::new(row.stream_id),
            event_type: row.event_type,
            payload: row.payload,
            metadata: row.metadata,
            version: u64::try_from(row.version).unwrap_or(0),
            timestamp: row.created_at,
            correlation_id: CorrelationId::from(row.correlation_id),
        }
    }
}
