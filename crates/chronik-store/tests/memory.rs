//! Contract tests for the in-memory store implementations.
//!
//! These run without any external services and pin down the store
//! contract: version assignment, conflict detection, ordering, absence
//! behavior, and snapshot pruning. The `PostgreSQL` implementations are
//! held to the same contract in `integration.rs`.

// Tests use expect/unwrap extensively for clarity -- panicking on failure
// is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::items_after_statements,
    clippy::missing_panics_doc,
    clippy::too_many_lines,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use chronik_store::{
    Codec, EventStore, JsonCodec, MemoryEventStore, MemorySnapshotStore, SnapshotStore, StoreError,
};
use chronik_types::{CorrelationId, NewEvent, StreamId};
use serde::{Deserialize, Serialize};

fn event(event_type: &str) -> NewEvent {
    NewEvent::new(event_type, event_type.as_bytes().to_vec())
}

// =============================================================================
// Append and version assignment
// =============================================================================

#[tokio::test]
async fn appending_without_expectation_yields_versions_one_through_n() {
    let store = MemoryEventStore::new();
    let stream = StreamId::new("account-1");

    let batch = vec![event("Opened"), event("Deposited"), event("Deposited")];
    store.append(&stream, &batch, None).await.expect("append");

    let events = store
        .read_stream(&stream, 1, None)
        .await
        .expect("read stream");
    let versions: Vec<u64> = events.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
    assert_eq!(store.stream_version(&stream).await.expect("version"), 3);
}

#[tokio::test]
async fn stale_expected_version_fails_and_persists_nothing() {
    let store = MemoryEventStore::new();
    let stream = StreamId::new("account-1");

    store
        .append(&stream, &[event("Opened"), event("Deposited")], None)
        .await
        .expect("append");

    let err = store
        .append(&stream, &[event("Deposited")], Some(1))
        .await
        .expect_err("stale expected version must conflict");
    match err {
        StoreError::Conflict {
            expected, actual, ..
        } => {
            assert_eq!(expected, 1);
            assert_eq!(actual, 2);
        }
        other => panic!("expected Conflict, got {other:?}"),
    }

    // The failed batch left no trace.
    assert_eq!(store.stream_version(&stream).await.expect("version"), 2);
    let events = store.read_stream(&stream, 1, None).await.expect("read");
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn expectation_against_an_unwritten_stream_conflicts_with_zero() {
    let store = MemoryEventStore::new();
    let stream = StreamId::new("ghost");

    let err = store
        .append(&stream, &[event("Opened")], Some(1))
        .await
        .expect_err("must conflict");
    assert!(matches!(
        err,
        StoreError::Conflict {
            expected: 1,
            actual: 0,
            ..
        }
    ));
}

#[tokio::test]
async fn concurrent_appends_with_same_expectation_produce_one_winner() {
    let store = Arc::new(MemoryEventStore::new());
    let stream = StreamId::new("account-1");
    store
        .append(&stream, &[event("Opened")], None)
        .await
        .expect("seed");

    let deposited = [event("Deposited")];
    let withdrawn = [event("Withdrawn")];
    let (a, b) = tokio::join!(
        store.append(&stream, &deposited, Some(1)),
        store.append(&stream, &withdrawn, Some(1)),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one writer must win: {a:?} / {b:?}");
    let loser = if a.is_err() { a } else { b };
    assert!(loser.expect_err("loser").is_conflict());

    assert_eq!(store.stream_version(&stream).await.expect("version"), 2);
}

#[tokio::test]
async fn empty_batch_is_a_noop() {
    let store = MemoryEventStore::new();
    let stream = StreamId::new("account-1");

    store.append(&stream, &[], None).await.expect("empty append");
    // Even a stale expectation is not checked when there is nothing to write.
    store
        .append(&stream, &[], Some(99))
        .await
        .expect("empty append with expectation");

    assert_eq!(store.stream_version(&stream).await.expect("version"), 0);
}

// =============================================================================
// Read paths
// =============================================================================

#[tokio::test]
async fn reading_an_unwritten_stream_is_empty_not_an_error() {
    let store = MemoryEventStore::new();
    let events = store
        .read_stream(&StreamId::new("nothing-here"), 1, None)
        .await
        .expect("read");
    assert!(events.is_empty());
}

#[tokio::test]
async fn read_stream_range_is_inclusive_on_both_ends() {
    let store = MemoryEventStore::new();
    let stream = StreamId::new("account-1");
    let batch: Vec<NewEvent> = (0..5).map(|_| event("Deposited")).collect();
    store.append(&stream, &batch, None).await.expect("append");

    let window = store
        .read_stream(&stream, 2, Some(4))
        .await
        .expect("read range");
    let versions: Vec<u64> = window.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![2, 3, 4]);
}

#[tokio::test]
async fn read_forward_pages_across_streams_in_global_order() {
    let store = MemoryEventStore::new();
    let a = StreamId::new("account-1");
    let b = StreamId::new("account-2");

    store.append(&a, &[event("Opened")], None).await.expect("a1");
    store.append(&b, &[event("Opened")], None).await.expect("b1");
    store
        .append(&a, &[event("Deposited")], None)
        .await
        .expect("a2");

    let first_page = store.read_forward(0, 2).await.expect("page 1");
    assert_eq!(first_page.len(), 2);
    let cursor = first_page.last().expect("last").global_id;

    let second_page = store.read_forward(cursor, 2).await.expect("page 2");
    assert_eq!(second_page.len(), 1);

    let positions: Vec<i64> = first_page
        .iter()
        .chain(second_page.iter())
        .map(|e| e.global_id)
        .collect();
    assert!(positions.is_sorted(), "global order must be ascending");
}

#[tokio::test]
async fn read_by_event_type_filters_and_respects_the_window() {
    let store = MemoryEventStore::new();
    let stream = StreamId::new("account-1");

    store
        .append(&stream, &[event("Opened"), event("Deposited")], None)
        .await
        .expect("first batch");
    let mid = chrono::Utc::now();
    store
        .append(&stream, &[event("Deposited")], None)
        .await
        .expect("second batch");

    let all = store
        .read_by_event_type("Deposited", None, None, 10)
        .await
        .expect("all deposits");
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|e| e.event_type == "Deposited"));

    let late = store
        .read_by_event_type("Deposited", Some(mid), None, 10)
        .await
        .expect("late deposits");
    assert_eq!(late.len(), 1);
    assert_eq!(late[0].version, 3);

    let capped = store
        .read_by_event_type("Deposited", None, None, 1)
        .await
        .expect("capped");
    assert_eq!(capped.len(), 1);
}

#[tokio::test]
async fn read_by_correlation_returns_exactly_the_linked_set() {
    let store = MemoryEventStore::new();
    let correlation = CorrelationId::new();
    let a = StreamId::new("account-1");
    let b = StreamId::new("account-2");

    store
        .append(&a, &[event("Withdrawn").with_correlation(correlation)], None)
        .await
        .expect("debit");
    store
        .append(&b, &[event("Deposited").with_correlation(correlation)], None)
        .await
        .expect("credit");
    store
        .append(&a, &[event("Deposited")], None)
        .await
        .expect("unrelated");

    let linked = store
        .read_by_correlation(correlation)
        .await
        .expect("by correlation");
    assert_eq!(linked.len(), 2);
    assert!(linked.iter().all(|e| e.correlation_id == correlation));
    let streams: Vec<&str> = linked.iter().map(|e| e.stream_id.as_str()).collect();
    assert!(streams.contains(&"account-1"));
    assert!(streams.contains(&"account-2"));
}

#[tokio::test]
async fn events_without_a_correlation_share_one_fresh_id_per_batch() {
    let store = MemoryEventStore::new();
    let stream = StreamId::new("account-1");

    store
        .append(&stream, &[event("Opened"), event("Deposited")], None)
        .await
        .expect("batch 1");
    store
        .append(&stream, &[event("Deposited")], None)
        .await
        .expect("batch 2");

    let events = store.read_stream(&stream, 1, None).await.expect("read");
    assert_eq!(events[0].correlation_id, events[1].correlation_id);
    assert_ne!(events[0].correlation_id, events[2].correlation_id);
}

// =============================================================================
// Snapshots
// =============================================================================

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
struct AccountState {
    balance: u32,
}

#[tokio::test]
async fn snapshot_roundtrip_preserves_state() {
    let snapshots = MemorySnapshotStore::new();
    let codec = JsonCodec;
    let stream = StreamId::new("account-1");

    let state = AccountState { balance: 150 };
    let bytes = codec.encode(&state).expect("encode");
    snapshots.save(&stream, 2, bytes).await.expect("save");

    let latest = snapshots
        .latest(&stream)
        .await
        .expect("latest")
        .expect("must exist");
    assert_eq!(latest.version, 2);
    let decoded: AccountState = codec.decode(&latest.state_data).expect("decode");
    assert_eq!(decoded, state);
}

#[tokio::test]
async fn latest_returns_none_for_an_unsnapshotted_stream() {
    let snapshots = MemorySnapshotStore::new();
    let latest = snapshots
        .latest(&StreamId::new("nothing-here"))
        .await
        .expect("latest");
    assert!(latest.is_none());
}

#[tokio::test]
async fn latest_picks_the_highest_version() {
    let snapshots = MemorySnapshotStore::new();
    let stream = StreamId::new("account-1");

    for version in [10_u64, 30, 20] {
        snapshots
            .save(&stream, version, vec![1])
            .await
            .expect("save");
    }

    let latest = snapshots
        .latest(&stream)
        .await
        .expect("latest")
        .expect("must exist");
    assert_eq!(latest.version, 30);

    let exact = snapshots
        .at_version(&stream, 20)
        .await
        .expect("at version")
        .expect("must exist");
    assert_eq!(exact.version, 20);
    assert!(
        snapshots
            .at_version(&stream, 99)
            .await
            .expect("at version")
            .is_none()
    );
}

#[tokio::test]
async fn prune_keeps_the_k_highest_versions() {
    let snapshots = MemorySnapshotStore::new();
    let stream = StreamId::new("account-1");

    for version in 1..=5_u64 {
        snapshots
            .save(&stream, version, vec![0])
            .await
            .expect("save");
    }

    let deleted = snapshots.prune(&stream, 2).await.expect("prune");
    assert_eq!(deleted, 3);

    assert!(snapshots.at_version(&stream, 3).await.expect("get").is_none());
    assert!(snapshots.at_version(&stream, 4).await.expect("get").is_some());
    assert!(snapshots.at_version(&stream, 5).await.expect("get").is_some());

    // Idempotent: nothing left to prune.
    let deleted_again = snapshots.prune(&stream, 2).await.expect("prune again");
    assert_eq!(deleted_again, 0);

    // A stream with fewer snapshots than keep_count is untouched.
    let sparse = StreamId::new("account-2");
    snapshots.save(&sparse, 1, vec![0]).await.expect("save");
    assert_eq!(snapshots.prune(&sparse, 2).await.expect("prune"), 0);
}

// =============================================================================
// The account-1 scenario, end to end
// =============================================================================

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
enum AccountEvent {
    Opened { balance: u32 },
    Deposited { amount: u32 },
}

#[tokio::test]
async fn account_scenario_conflicts_on_stale_expectation() {
    let store = MemoryEventStore::new();
    let codec = JsonCodec;
    let stream = StreamId::new("account-1");

    let opened = NewEvent::new(
        "Opened",
        codec
            .encode(&AccountEvent::Opened { balance: 100 })
            .expect("encode"),
    );
    store.append_one(&stream, opened, None).await.expect("v1");

    let deposited = NewEvent::new(
        "Deposited",
        codec
            .encode(&AccountEvent::Deposited { amount: 50 })
            .expect("encode"),
    );
    store
        .append_one(&stream, deposited, Some(1))
        .await
        .expect("v2");
    assert_eq!(store.stream_version(&stream).await.expect("version"), 2);

    let stale = NewEvent::new(
        "Deposited",
        codec
            .encode(&AccountEvent::Deposited { amount: 10 })
            .expect("encode"),
    );
    let err = store
        .append(&stream, &[stale], Some(1))
        .await
        .expect_err("stale expectation must conflict");
    assert!(matches!(
        err,
        StoreError::Conflict {
            expected: 1,
            actual: 2,
            ..
        }
    ));

    // Stream unchanged; payloads decode to what was written.
    let events = store.read_stream(&stream, 1, None).await.expect("read");
    assert_eq!(events.len(), 2);
    let first: AccountEvent = codec.decode(&events[0].payload).expect("decode");
    assert_eq!(first, AccountEvent::Opened { balance: 100 });
    let second: AccountEvent = codec.decode(&events[1].payload).expect("decode");
    assert_eq!(second, AccountEvent::Deposited { amount: 50 });
}
