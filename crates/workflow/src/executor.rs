//! Step executor: retry plus replay-safe outcome recording.

use std::future::Future;

use common::ExecutionId;
use history_store::HistoryStore;
use serde::Serialize;

use crate::error::{Result, StepError};
use crate::events::{StepOutcome, StepResult, WorkflowEvent};
use crate::execution::WorkflowExecution;
use crate::journal::ExecutionJournal;
use crate::retry::{RetryPolicy, run_with_retry};

/// Outcome handed back to the workflow for one step.
#[derive(Debug, Clone)]
pub struct ExecutedStep {
    /// The recorded outcome.
    pub outcome: StepOutcome,
    /// True if the outcome came from history and the operation was not run.
    pub replayed: bool,
}

/// Runs steps of one execution.
///
/// A step whose name already has an outcome in history is never run again;
/// the recorded outcome is returned instead. A fresh step is retried under
/// its policy and its final outcome appended exactly once.
pub struct StepExecutor<'a, H: HistoryStore + ?Sized> {
    journal: ExecutionJournal<'a, H>,
}

impl<'a, H: HistoryStore + ?Sized> StepExecutor<'a, H> {
    /// Opens the history of `execution_id` for step execution.
    pub async fn open(store: &'a H, execution_id: ExecutionId) -> Result<Self> {
        Ok(Self {
            journal: ExecutionJournal::open(store, execution_id).await?,
        })
    }

    /// Returns the execution ID.
    pub fn execution_id(&self) -> ExecutionId {
        self.journal.execution_id()
    }

    /// Returns the folded execution.
    pub async fn snapshot(&self) -> WorkflowExecution {
        self.journal.snapshot().await
    }

    /// Appends a non-step event such as a terminal outcome.
    pub async fn record(&self, event: WorkflowEvent) -> Result<()> {
        self.journal.record(event).await
    }

    /// Executes `operation` as step `step_name`.
    ///
    /// Exhausted retries and permanent errors become a failure outcome; only
    /// history faults are returned as errors.
    pub async fn execute<T, F, Fut>(
        &self,
        step_name: &str,
        policy: &RetryPolicy,
        operation: F,
    ) -> Result<ExecutedStep>
    where
        T: Serialize,
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, StepError>>,
    {
        if let Some(outcome) = self.journal.recorded(step_name).await {
            metrics::counter!("redemption_steps_replayed_total").increment(1);
            tracing::debug!(step = step_name, "step replayed from history");
            return Ok(ExecutedStep {
                outcome,
                replayed: true,
            });
        }

        tracing::info!(step = step_name, "step started");
        let attempted = run_with_retry(step_name, policy, operation).await;

        let result = match attempted.result {
            Ok(value) => StepResult::Success {
                payload: serde_json::to_value(&value)?,
            },
            Err(e) => StepResult::Failure {
                reason: e.message().to_string(),
                permanent: e.is_permanent(),
            },
        };
        let outcome = StepOutcome {
            step_name: step_name.to_string(),
            attempts: attempted.attempts,
            result,
        };

        self.journal
            .record(WorkflowEvent::step_recorded(outcome.clone()))
            .await?;

        match outcome.failure_reason() {
            None => tracing::info!(
                step = step_name,
                attempts = outcome.attempts,
                "step succeeded"
            ),
            Some(reason) => tracing::warn!(
                step = step_name,
                attempts = outcome.attempts,
                reason,
                "step failed"
            ),
        }

        Ok(ExecutedStep {
            outcome,
            replayed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redemption;
    use chrono::Utc;
    use domain::{RedeemedBonus, RequestReference};
    use history_store::InMemoryHistoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn started_executor(store: &InMemoryHistoryStore) -> StepExecutor<'_, InMemoryHistoryStore> {
        let executor = StepExecutor::open(store, ExecutionId::new()).await.unwrap();
        executor
            .record(WorkflowEvent::execution_started(
                executor.execution_id(),
                redemption::WORKFLOW_TYPE,
                RedeemedBonus::new("ABCDEFGHIJKL", Utc::now()),
                RequestReference::new("req-1", "2020-07-15"),
            ))
            .await
            .unwrap();
        executor
    }

    #[tokio::test]
    async fn success_is_recorded_once() {
        let store = InMemoryHistoryStore::new();
        let executor = started_executor(&store).await;

        let step = executor
            .execute("read_bonus", &RetryPolicy::store(), || async {
                Ok::<_, StepError>(7u32)
            })
            .await
            .unwrap();

        assert!(!step.replayed);
        assert_eq!(step.outcome.attempts, 1);
        assert_eq!(step.outcome.decode::<u32>().unwrap().unwrap(), 7);
        assert_eq!(store.entry_count().await, 2);
    }

    #[tokio::test]
    async fn recorded_step_is_not_invoked_again() {
        let store = InMemoryHistoryStore::new();
        let executor = started_executor(&store).await;
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            executor
                .execute("read_bonus", &RetryPolicy::store(), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, StepError>("done") }
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.entry_count().await, 2);
    }

    #[tokio::test]
    async fn replay_after_reopen_returns_recorded_outcome() {
        let store = InMemoryHistoryStore::new();
        let execution_id = {
            let executor = started_executor(&store).await;
            executor
                .execute("replace_bonus", &RetryPolicy::store(), || async {
                    Err::<(), _>(StepError::permanent("conflict"))
                })
                .await
                .unwrap();
            executor.execution_id()
        };

        let reopened = StepExecutor::open(&store, execution_id).await.unwrap();
        let step = reopened
            .execute("replace_bonus", &RetryPolicy::store(), || async {
                Ok::<_, StepError>(())
            })
            .await
            .unwrap();

        assert!(step.replayed);
        assert_eq!(step.outcome.failure_reason(), Some("conflict"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_become_one_failure_outcome() {
        let store = InMemoryHistoryStore::new();
        let executor = started_executor(&store).await;
        let calls = AtomicU32::new(0);

        let step = executor
            .execute("send_notification:A", &RetryPolicy::notification(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(StepError::transient("timeout")) }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(step.outcome.attempts, 10);
        assert_eq!(
            step.outcome.result,
            StepResult::Failure {
                reason: "timeout".to_string(),
                permanent: false,
            }
        );
        // start entry plus a single step entry
        assert_eq!(store.entry_count().await, 2);
    }
}
