//! Append-only history log for durable workflow executions.
//!
//! Every execution owns one ordered stream of [`HistoryEntry`] values keyed
//! by its [`ExecutionId`]. Appends are guarded by an expected [`Sequence`],
//! so two writers racing on the same execution cannot interleave entries.

pub mod entry;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::ExecutionId;
pub use entry::{EntryId, HistoryEntry, HistoryEntryBuilder, Sequence};
pub use error::{HistoryStoreError, Result};
pub use memory::InMemoryHistoryStore;
pub use postgres::PostgresHistoryStore;
pub use store::{AppendOptions, HistoryStore, HistoryStoreExt};
