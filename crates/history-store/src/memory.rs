use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    ExecutionId, HistoryEntry, HistoryStoreError, Result, Sequence,
    store::{AppendOptions, HistoryStore, validate_entries_for_append},
};

/// In-memory history store.
///
/// Keeps every entry in process memory and provides the same interface and
/// conflict semantics as the PostgreSQL implementation. History does not
/// survive the process, which makes it the default for tests and local runs.
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    entries: Arc<RwLock<Vec<HistoryEntry>>>,
}

impl InMemoryHistoryStore {
    /// Creates a new empty in-memory history store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of entries stored.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Drops every entry of an execution after `keep`, simulating a crash
    /// that lost the tail of the log.
    pub async fn truncate(&self, execution_id: ExecutionId, keep: Sequence) {
        self.entries
            .write()
            .await
            .retain(|e| e.execution_id != execution_id || e.sequence <= keep);
    }

    /// Clears all entries.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(
        &self,
        entries: Vec<HistoryEntry>,
        options: AppendOptions,
    ) -> Result<Sequence> {
        validate_entries_for_append(&entries)?;

        let first_entry = &entries[0];
        let execution_id = first_entry.execution_id;

        let mut store = self.entries.write().await;

        let current = store
            .iter()
            .filter(|e| e.execution_id == execution_id)
            .map(|e| e.sequence)
            .max()
            .unwrap_or(Sequence::initial());

        if let Some(expected) = options.expected_sequence
            && current != expected
        {
            return Err(HistoryStoreError::ConcurrencyConflict {
                execution_id,
                expected,
                actual: current,
            });
        }

        // Unique (execution_id, sequence) constraint simulation
        if first_entry.sequence <= current {
            return Err(HistoryStoreError::ConcurrencyConflict {
                execution_id,
                expected: options.expected_sequence.unwrap_or(current),
                actual: current,
            });
        }

        let last = entries
            .last()
            .map(|e| e.sequence)
            .unwrap_or(Sequence::initial());
        let count = entries.len();
        store.extend(entries);

        metrics::counter!("history_entries_appended_total").increment(count as u64);
        Ok(last)
    }

    async fn load(&self, execution_id: ExecutionId) -> Result<Vec<HistoryEntry>> {
        let store = self.entries.read().await;
        let mut entries: Vec<_> = store
            .iter()
            .filter(|e| e.execution_id == execution_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    async fn load_from(
        &self,
        execution_id: ExecutionId,
        from_sequence: Sequence,
    ) -> Result<Vec<HistoryEntry>> {
        let store = self.entries.read().await;
        let mut entries: Vec<_> = store
            .iter()
            .filter(|e| e.execution_id == execution_id && e.sequence >= from_sequence)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    async fn entries_by_type(&self, entry_type: &str) -> Result<Vec<HistoryEntry>> {
        let store = self.entries.read().await;
        let mut entries: Vec<_> = store
            .iter()
            .filter(|e| e.entry_type == entry_type)
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then(a.sequence.cmp(&b.sequence))
        });
        Ok(entries)
    }

    async fn list_executions(&self) -> Result<Vec<ExecutionId>> {
        let store = self.entries.read().await;
        let ids: BTreeSet<ExecutionId> = store.iter().map(|e| e.execution_id).collect();
        Ok(ids.into_iter().collect())
    }

    async fn current_sequence(&self, execution_id: ExecutionId) -> Result<Option<Sequence>> {
        let store = self.entries.read().await;
        Ok(store
            .iter()
            .filter(|e| e.execution_id == execution_id)
            .map(|e| e.sequence)
            .max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HistoryStoreExt;

    fn create_test_entry(
        execution_id: ExecutionId,
        sequence: Sequence,
        entry_type: &str,
    ) -> HistoryEntry {
        HistoryEntry::builder()
            .execution_id(execution_id)
            .workflow_type("TestWorkflow")
            .entry_type(entry_type)
            .sequence(sequence)
            .payload_raw(serde_json::json!({"test": true}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn append_single_entry() {
        let store = InMemoryHistoryStore::new();
        let execution_id = ExecutionId::new();
        let entry = create_test_entry(execution_id, Sequence::first(), "ExecutionStarted");

        let result = store.append(vec![entry], AppendOptions::expect_new()).await;
        assert_eq!(result.unwrap(), Sequence::first());

        let entries = store.load(execution_id).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn append_multiple_entries() {
        let store = InMemoryHistoryStore::new();
        let execution_id = ExecutionId::new();

        let entries = vec![
            create_test_entry(execution_id, Sequence::new(1), "ExecutionStarted"),
            create_test_entry(execution_id, Sequence::new(2), "StepRecorded"),
            create_test_entry(execution_id, Sequence::new(3), "StepRecorded"),
        ];

        let result = store.append(entries, AppendOptions::expect_new()).await;
        assert_eq!(result.unwrap(), Sequence::new(3));
        assert_eq!(store.load(execution_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn concurrency_conflict_on_wrong_sequence() {
        let store = InMemoryHistoryStore::new();
        let execution_id = ExecutionId::new();

        let first = create_test_entry(execution_id, Sequence::first(), "ExecutionStarted");
        store
            .append(vec![first], AppendOptions::expect_new())
            .await
            .unwrap();

        // A second writer that still believes the history is empty
        let second = create_test_entry(execution_id, Sequence::new(1), "ExecutionStarted");
        let result = store
            .append(vec![second], AppendOptions::expect_new())
            .await;

        assert!(matches!(
            result,
            Err(HistoryStoreError::ConcurrencyConflict { actual, .. }) if actual == Sequence::first()
        ));
        assert_eq!(store.entry_count().await, 1);
    }

    #[tokio::test]
    async fn append_entry_derives_expected_sequence() {
        let store = InMemoryHistoryStore::new();
        let execution_id = ExecutionId::new();

        store
            .append_entry(create_test_entry(execution_id, Sequence::first(), "A"))
            .await
            .unwrap();
        store
            .append_entry(create_test_entry(execution_id, Sequence::new(2), "B"))
            .await
            .unwrap();

        let stale = store
            .append_entry(create_test_entry(execution_id, Sequence::new(2), "C"))
            .await;
        assert!(matches!(
            stale,
            Err(HistoryStoreError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn load_from_sequence() {
        let store = InMemoryHistoryStore::new();
        let execution_id = ExecutionId::new();

        let entries = vec![
            create_test_entry(execution_id, Sequence::new(1), "A"),
            create_test_entry(execution_id, Sequence::new(2), "B"),
            create_test_entry(execution_id, Sequence::new(3), "C"),
        ];
        store.append(entries, AppendOptions::new()).await.unwrap();

        let from_2 = store
            .load_from(execution_id, Sequence::new(2))
            .await
            .unwrap();
        assert_eq!(from_2.len(), 2);
        assert_eq!(from_2[0].sequence, Sequence::new(2));
        assert_eq!(from_2[1].sequence, Sequence::new(3));
    }

    #[tokio::test]
    async fn entries_by_type_spans_executions() {
        let store = InMemoryHistoryStore::new();
        let id1 = ExecutionId::new();
        let id2 = ExecutionId::new();

        store
            .append(
                vec![create_test_entry(id1, Sequence::first(), "ExecutionFailed")],
                AppendOptions::new(),
            )
            .await
            .unwrap();
        store
            .append(
                vec![create_test_entry(id2, Sequence::first(), "ExecutionSucceeded")],
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let failed = store.entries_by_type("ExecutionFailed").await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].execution_id, id1);
    }

    #[tokio::test]
    async fn list_executions_is_distinct() {
        let store = InMemoryHistoryStore::new();
        let id1 = ExecutionId::new();
        let id2 = ExecutionId::new();

        store
            .append(
                vec![
                    create_test_entry(id1, Sequence::new(1), "A"),
                    create_test_entry(id1, Sequence::new(2), "B"),
                ],
                AppendOptions::new(),
            )
            .await
            .unwrap();
        store
            .append(
                vec![create_test_entry(id2, Sequence::first(), "A")],
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let mut ids = store.list_executions().await.unwrap();
        ids.sort();
        let mut expected = vec![id1, id2];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn current_sequence_and_truncate() {
        let store = InMemoryHistoryStore::new();
        let execution_id = ExecutionId::new();

        assert!(
            store
                .current_sequence(execution_id)
                .await
                .unwrap()
                .is_none()
        );

        let entries = vec![
            create_test_entry(execution_id, Sequence::new(1), "A"),
            create_test_entry(execution_id, Sequence::new(2), "B"),
        ];
        store.append(entries, AppendOptions::new()).await.unwrap();
        assert_eq!(
            store.current_sequence(execution_id).await.unwrap(),
            Some(Sequence::new(2))
        );

        store.truncate(execution_id, Sequence::first()).await;
        assert_eq!(
            store.current_sequence(execution_id).await.unwrap(),
            Some(Sequence::first())
        );
    }
}
