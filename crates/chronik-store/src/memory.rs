//! In-memory store implementations for tests and local development.
//!
//! Same contract as the `PostgreSQL` implementations -- identical conflict
//! semantics, ordering, and absence behavior -- with a single global log
//! and per-stream versioning held under a [`tokio::sync::RwLock`]. The
//! write lock stands in for the transactional isolation the real backend
//! provides: the version check and the insert happen under one guard, so
//! concurrent writers to one stream still produce exactly one winner.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chronik_types::{CorrelationId, NewEvent, RecordedEvent, Snapshot, StreamId};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::event_store::EventStore;
use crate::snapshot_store::SnapshotStore;

/// Append-only event log held in memory.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    log: RwLock<MemoryLog>,
}

/// The global log: events in commit order plus the next global position.
#[derive(Debug)]
struct MemoryLog {
    events: Vec<RecordedEvent>,
    next_global: i64,
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            next_global: 1,
        }
    }
}

impl MemoryLog {
    /// Current max version for one stream, 0 if unwritten.
    fn version_of(&self, stream: &StreamId) -> u64 {
        self.events
            .iter()
            .filter(|e| e.stream_id == *stream)
            .map(|e| e.version)
            .max()
            .unwrap_or(0)
    }
}

impl MemoryEventStore {
    /// Create an empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(
        &self,
        stream: &StreamId,
        batch: &[NewEvent],
        expected_version: Option<u64>,
    ) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut log = self.log.write().await;

        let current = log.version_of(stream);
        if let Some(expected) = expected_version {
            if expected != current {
                return Err(StoreError::Conflict {
                    stream: stream.clone(),
                    expected,
                    actual: current,
                });
            }
        }

        let committed_at = Utc::now();
        let batch_correlation = CorrelationId::new();

        let mut version = current;
        for event in batch {
            version = version.saturating_add(1);
            let global_id = log.next_global;
            log.next_global = log.next_global.saturating_add(1);
            log.events.push(RecordedEvent {
                global_id,
                stream_id: stream.clone(),
                event_type: event.event_type.clone(),
                payload: event.payload.clone(),
                metadata: event.metadata.clone(),
                version,
                timestamp: committed_at,
                correlation_id: event.correlation_id.unwrap_or(batch_correlation),
            });
        }

        Ok(())
    }

    async fn read_stream(
        &self,
        stream: &StreamId,
        from_version: u64,
        to_version: Option<u64>,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let to = to_version.unwrap_or(u64::MAX);
        let log = self.log.read().await;

        let mut events: Vec<RecordedEvent> = log
            .events
            .iter()
            .filter(|e| e.stream_id == *stream && e.version >= from_version && e.version <= to)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);

        Ok(events)
    }

    async fn read_forward(
        &self,
        from_position: i64,
        max_count: u32,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let log = self.log.read().await;

        let mut events: Vec<RecordedEvent> = log
            .events
            .iter()
            .filter(|e| e.global_id > from_position)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.global_id);
        events.truncate(usize::try_from(max_count).unwrap_or(usize::MAX));

        Ok(events)
    }

    async fn read_by_event_type(
        &self,
        event_type: &str,
        from_timestamp: Option<DateTime<Utc>>,
        to_timestamp: Option<DateTime<Utc>>,
        max_count: u32,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let log = self.log.read().await;

        let mut events: Vec<RecordedEvent> = log
            .events
            .iter()
            .filter(|e| {
                e.event_type == event_type
                    && from_timestamp.is_none_or(|from| e.timestamp >= from)
                    && to_timestamp.is_none_or(|to| e.timestamp <= to)
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.timestamp, e.global_id));
        events.truncate(usize::try_from(max_count).unwrap_or(usize::MAX));

        Ok(events)
    }

    async fn read_by_correlation(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let log = self.log.read().await;

        let mut events: Vec<RecordedEvent> = log
            .events
            .iter()
            .filter(|e| e.correlation_id == correlation_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.timestamp, e.global_id));

        Ok(events)
    }

    async fn stream_version(&self, stream: &StreamId) -> Result<u64, StoreError> {
        Ok(self.log.read().await.version_of(stream))
    }
}

/// Snapshot checkpoints held in memory, keyed by stream and version.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<StreamId, BTreeMap<u64, Snapshot>>>,
}

impl MemorySnapshotStore {
    /// Create an empty in-memory snapshot store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(
        &self,
        stream: &StreamId,
        version: u64,
        state_data: Vec<u8>,
    ) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            stream_id: stream.clone(),
            version,
            state_data,
            timestamp: Utc::now(),
        };

        self.snapshots
            .write()
            .await
            .entry(stream.clone())
            .or_default()
            .insert(version, snapshot);

        Ok(())
    }

    async fn latest(&self, stream: &StreamId) -> Result<Option<Snapshot>, StoreError> {
        Ok(self
            .snapshots
            .read()
            .await
            .get(stream)
            .and_then(|by_version| by_version.last_key_value())
            .map(|(_, snapshot)| snapshot.clone()))
    }

    async fn at_version(
        &self,
        stream: &StreamId,
        version: u64,
    ) -> Result<Option<Snapshot>, StoreError> {
        Ok(self
            .snapshots
            .read()
            .await
            .get(stream)
            .and_then(|by_version| by_version.get(&version))
            .cloned())
    }

    async fn prune(&self, stream: &StreamId, keep_count: u32) -> Result<u64, StoreError> {
        let mut snapshots = self.snapshots.write().await;
        let Some(by_version) = snapshots.get_mut(stream) else {
            return Ok(0);
        };

        let keep = usize::try_from(keep_count).unwrap_or(usize::MAX);
        let excess = by_version.len().saturating_sub(keep);
        let doomed: Vec<u64> = by_version.keys().take(excess).copied().collect();
        for version in &doomed {
            by_version.remove(version);
        }

        Ok(u64::try_from(doomed.len()).unwrap_or(u64::MAX))
    }
}
