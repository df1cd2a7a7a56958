//! Durable per-execution history with serialized appends.

use common::ExecutionId;
use domain::{Aggregate, DomainEvent};
use history_store::{AppendOptions, HistoryEntry, HistoryStore};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::events::{StepOutcome, WorkflowEvent};
use crate::execution::WorkflowExecution;

/// The open history of one execution.
///
/// Holds the folded [`WorkflowExecution`] behind a lock so that concurrent
/// steps of the same execution append one at a time, each expecting the
/// sequence the previous append left behind.
pub struct ExecutionJournal<'a, H: HistoryStore + ?Sized> {
    store: &'a H,
    execution_id: ExecutionId,
    execution: Mutex<WorkflowExecution>,
}

impl<'a, H: HistoryStore + ?Sized> ExecutionJournal<'a, H> {
    /// Loads and folds the history of `execution_id`.
    pub async fn open(store: &'a H, execution_id: ExecutionId) -> Result<Self> {
        let entries = store.load(execution_id).await?;
        let execution = WorkflowExecution::from_entries(&entries)?;
        Ok(Self {
            store,
            execution_id,
            execution: Mutex::new(execution),
        })
    }

    /// Returns the execution ID.
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Returns a copy of the folded execution.
    pub async fn snapshot(&self) -> WorkflowExecution {
        self.execution.lock().await.clone()
    }

    /// Returns the recorded outcome of a step, if any.
    pub async fn recorded(&self, step_name: &str) -> Option<StepOutcome> {
        self.execution.lock().await.step(step_name).cloned()
    }

    /// Appends an event and folds it into the execution.
    ///
    /// Fails with a history error if another writer appended first.
    pub async fn record(&self, event: WorkflowEvent) -> Result<()> {
        let mut execution = self.execution.lock().await;
        let current = execution.version();
        let sequence = current.next();

        let (bonus_code, request_id) = match &event {
            WorkflowEvent::ExecutionStarted(data) => (
                Some(data.claim.bonus_code.to_string()),
                Some(data.reference.request_id.clone()),
            ),
            _ => (
                execution.claim().map(|c| c.bonus_code.to_string()),
                execution.reference().map(|r| r.request_id.clone()),
            ),
        };

        let mut builder = HistoryEntry::builder()
            .execution_id(self.execution_id)
            .workflow_type(WorkflowExecution::aggregate_type())
            .entry_type(event.event_type())
            .sequence(sequence)
            .payload(&event)?;
        if let Some(code) = bonus_code {
            builder = builder.metadata("bonus_code", serde_json::Value::String(code));
        }
        if let Some(id) = request_id {
            builder = builder.metadata("request_id", serde_json::Value::String(id));
        }

        self.store
            .append(vec![builder.build()?], AppendOptions::expect_sequence(current))
            .await?;

        execution.apply(event);
        execution.set_version(sequence);
        Ok(())
    }
}
