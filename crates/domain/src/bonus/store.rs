//! Record store contract for bonus activations.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use super::{BonusActivation, BonusCode};

/// Version of a stored record, bumped on every replace.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordVersion(u64);

impl RecordVersion {
    /// Creates a version from a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RecordVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A record together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBonus {
    pub bonus: BonusActivation,
    pub version: RecordVersion,
}

/// Errors surfaced by a record store. No retry happens at this layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BonusStoreError {
    /// No record exists for the code.
    #[error("Bonus not found: {0}")]
    NotFound(BonusCode),

    /// The record changed since it was read.
    #[error("Version conflict on bonus {id}: expected {expected}, found {actual}")]
    Conflict {
        id: BonusCode,
        expected: RecordVersion,
        actual: RecordVersion,
    },

    /// The backend could not serve the request.
    #[error("Record store error: {0}")]
    Store(String),
}

/// Point read and conditional replace of a bonus record.
#[async_trait]
pub trait BonusStore: Send + Sync {
    /// Reads the record for `id` with its current version.
    async fn read(&self, id: &BonusCode) -> Result<StoredBonus, BonusStoreError>;

    /// Replaces the record only if it still sits at `expected`.
    ///
    /// Returns the stored record with its new version.
    async fn replace(
        &self,
        id: &BonusCode,
        expected: RecordVersion,
        bonus: BonusActivation,
    ) -> Result<StoredBonus, BonusStoreError>;
}

/// In-memory record store for tests and local runs.
///
/// Reads and replaces can be made to fail transiently a given number of
/// times, and both are counted.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBonusStore {
    records: Arc<RwLock<HashMap<BonusCode, StoredBonus>>>,
    failing_reads: Arc<AtomicU32>,
    failing_replaces: Arc<AtomicU32>,
    reads: Arc<AtomicUsize>,
    replaces: Arc<AtomicUsize>,
}

impl InMemoryBonusStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a record at version 1.
    pub async fn insert(&self, bonus: BonusActivation) -> RecordVersion {
        let version = RecordVersion::new(1);
        self.records.write().await.insert(
            bonus.id.clone(),
            StoredBonus {
                bonus,
                version,
            },
        );
        version
    }

    /// Returns the stored record without counting a read.
    pub async fn get(&self, id: &BonusCode) -> Option<StoredBonus> {
        self.records.read().await.get(id).cloned()
    }

    /// Makes the next `times` reads fail with a store error.
    pub fn fail_reads(&self, times: u32) {
        self.failing_reads.store(times, Ordering::SeqCst);
    }

    /// Makes the next `times` replaces fail with a store error.
    pub fn fail_replaces(&self, times: u32) {
        self.failing_replaces.store(times, Ordering::SeqCst);
    }

    /// Number of read calls so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of replace calls so far.
    pub fn replace_count(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BonusStore for InMemoryBonusStore {
    async fn read(&self, id: &BonusCode) -> Result<StoredBonus, BonusStoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_reads) {
            return Err(BonusStoreError::Store("service unavailable".to_string()));
        }

        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| BonusStoreError::NotFound(id.clone()))
    }

    async fn replace(
        &self,
        id: &BonusCode,
        expected: RecordVersion,
        bonus: BonusActivation,
    ) -> Result<StoredBonus, BonusStoreError> {
        self.replaces.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_replaces) {
            return Err(BonusStoreError::Store("service unavailable".to_string()));
        }

        let mut records = self.records.write().await;
        let current = records
            .get_mut(id)
            .ok_or_else(|| BonusStoreError::NotFound(id.clone()))?;

        if current.version != expected {
            return Err(BonusStoreError::Conflict {
                id: id.clone(),
                expected,
                actual: current.version,
            });
        }

        current.bonus = bonus;
        current.version = expected.next();
        tracing::debug!(bonus_code = %id, version = %current.version, "bonus replaced");
        Ok(current.clone())
    }
}
