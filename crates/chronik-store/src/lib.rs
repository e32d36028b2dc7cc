//! Append-only event log with optimistic concurrency control and
//! point-in-time snapshots, backed by `PostgreSQL`.
//!
//! Streams are ordered sequences of immutable events, versioned 1..N with
//! no gaps. Appends run under optimistic concurrency: an explicit version
//! check inside one atomic transaction, backstopped by the
//! `(stream_id, version)` uniqueness constraint so a lost race always
//! surfaces as the same conflict error. Snapshots bound replay cost;
//! their cadence and causal correctness belong to the caller.
//!
//! # Architecture
//!
//! ```text
//! Caller (tracks expected version, decides snapshot cadence)
//!     |
//!     +-- encode/decode at the boundary --> Codec (JsonCodec)
//!     |
//!     +-- append / read ----------------> EventStore
//!     |                                     |-- PgEventStore     (production)
//!     |                                     +-- MemoryEventStore (tests)
//!     |
//!     +-- save / load / prune ----------> SnapshotStore
//!                                           |-- PgSnapshotStore     (production)
//!                                           +-- MemorySnapshotStore (tests)
//! ```
//!
//! There is no long-lived state machine and no in-process locking in the
//! production path; correctness is delegated to the backing store's
//! transactions and constraints. Readers are snapshot-isolated and never
//! block writers.
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool, configuration, migrations
//! - [`event_store`] -- The event log: append and read paths
//! - [`snapshot_store`] -- Snapshot persistence and pruning
//! - [`memory`] -- In-memory implementations for tests
//! - [`codec`] -- The opaque-bytes boundary for payloads and state
//! - [`error`] -- Shared error taxonomy

pub mod codec;
pub mod error;
pub mod event_store;
pub mod memory;
pub mod postgres;
pub mod snapshot_store;

// Re-export primary types for convenience.
pub use codec::{Codec, JsonCodec};
pub use error::StoreError;
pub use event_store::{EventStore, PgEventStore};
pub use memory::{MemoryEventStore, MemorySnapshotStore};
pub use postgres::{PostgresConfig, PostgresPool};
pub use snapshot_store::{PgSnapshotStore, SnapshotStore};
