use std::sync::Arc;

use async_trait::async_trait;

use crate::{ExecutionId, HistoryEntry, HistoryStoreError, Result, Sequence};

/// Options for appending entries to the store.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected current sequence of the execution for optimistic concurrency control.
    /// If None, no sequence check is performed (use with caution).
    pub expected_sequence: Option<Sequence>,
}

impl AppendOptions {
    /// Creates options with no sequence check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the execution to be at a specific sequence.
    pub fn expect_sequence(sequence: Sequence) -> Self {
        Self {
            expected_sequence: Some(sequence),
        }
    }

    /// Creates options expecting the execution to have no history yet.
    pub fn expect_new() -> Self {
        Self {
            expected_sequence: Some(Sequence::initial()),
        }
    }
}

/// Core trait for history store implementations.
///
/// A history store persists the ordered log of every workflow execution.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends entries to one execution's history.
    ///
    /// Entries are appended atomically - either all succeed or none do.
    /// If `options.expected_sequence` is set, the operation will fail with
    /// `ConcurrencyConflict` if the current sequence doesn't match.
    ///
    /// Returns the sequence of the last appended entry.
    async fn append(
        &self,
        entries: Vec<HistoryEntry>,
        options: AppendOptions,
    ) -> Result<Sequence>;

    /// Retrieves the full history of an execution in sequence order.
    async fn load(&self, execution_id: ExecutionId) -> Result<Vec<HistoryEntry>>;

    /// Retrieves the history of an execution starting at `from_sequence`.
    async fn load_from(
        &self,
        execution_id: ExecutionId,
        from_sequence: Sequence,
    ) -> Result<Vec<HistoryEntry>>;

    /// Retrieves entries of one type across all executions, oldest first.
    async fn entries_by_type(&self, entry_type: &str) -> Result<Vec<HistoryEntry>>;

    /// Returns the IDs of every execution with at least one entry.
    async fn list_executions(&self) -> Result<Vec<ExecutionId>>;

    /// Gets the current sequence of an execution.
    ///
    /// Returns None if the execution has no history.
    async fn current_sequence(&self, execution_id: ExecutionId) -> Result<Option<Sequence>>;
}

#[async_trait]
impl<T: HistoryStore + ?Sized> HistoryStore for Arc<T> {
    async fn append(
        &self,
        entries: Vec<HistoryEntry>,
        options: AppendOptions,
    ) -> Result<Sequence> {
        (**self).append(entries, options).await
    }

    async fn load(&self, execution_id: ExecutionId) -> Result<Vec<HistoryEntry>> {
        (**self).load(execution_id).await
    }

    async fn load_from(
        &self,
        execution_id: ExecutionId,
        from_sequence: Sequence,
    ) -> Result<Vec<HistoryEntry>> {
        (**self).load_from(execution_id, from_sequence).await
    }

    async fn entries_by_type(&self, entry_type: &str) -> Result<Vec<HistoryEntry>> {
        (**self).entries_by_type(entry_type).await
    }

    async fn list_executions(&self) -> Result<Vec<ExecutionId>> {
        (**self).list_executions().await
    }

    async fn current_sequence(&self, execution_id: ExecutionId) -> Result<Option<Sequence>> {
        (**self).current_sequence(execution_id).await
    }
}

/// Extension trait providing convenience methods for history stores.
#[async_trait]
pub trait HistoryStoreExt: HistoryStore {
    /// Appends a single entry, expecting the execution to sit right before it.
    async fn append_entry(&self, entry: HistoryEntry) -> Result<Sequence> {
        let expected = Sequence::new(entry.sequence.as_i64() - 1);
        self.append(vec![entry], AppendOptions::expect_sequence(expected))
            .await
    }

    /// Checks if an execution has any history.
    async fn execution_exists(&self, execution_id: ExecutionId) -> Result<bool> {
        Ok(self.current_sequence(execution_id).await?.is_some())
    }
}

// Blanket implementation for all HistoryStore implementations
impl<T: HistoryStore + ?Sized> HistoryStoreExt for T {}

/// Validates entries before appending.
pub fn validate_entries_for_append(entries: &[HistoryEntry]) -> Result<()> {
    let Some(first) = entries.first() else {
        return Err(HistoryStoreError::InvalidEntry(
            "cannot append an empty entry list".to_string(),
        ));
    };

    // All entries must belong to the same execution
    for entry in entries.iter().skip(1) {
        if entry.execution_id != first.execution_id {
            return Err(HistoryStoreError::InvalidEntry(
                "all entries must belong to the same execution".to_string(),
            ));
        }
        if entry.workflow_type != first.workflow_type {
            return Err(HistoryStoreError::InvalidEntry(
                "all entries must have the same workflow type".to_string(),
            ));
        }
    }

    // Sequences must be contiguous
    let mut expected = first.sequence;
    for entry in entries.iter().skip(1) {
        expected = expected.next();
        if entry.sequence != expected {
            return Err(HistoryStoreError::InvalidEntry(format!(
                "entry sequences must be contiguous: expected {}, got {}",
                expected, entry.sequence
            )));
        }
    }

    Ok(())
}
