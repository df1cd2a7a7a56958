//! Batch coordinator: fan-out of claim workflows and fan-in of their outcomes.

use std::sync::Arc;

use common::ExecutionId;
use domain::{BonusCode, BonusStore, RedeemedBonus, RedemptionBatch, RequestReference};
use futures_util::future::join_all;
use history_store::HistoryStore;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{Result, WorkflowError};
use crate::execution::WorkflowExecution;
use crate::recorder::ErrorSink;
use crate::services::backup::RequestBackup;
use crate::services::notification::NotificationSender;
use crate::state::ExecutionStatus;
use crate::workflow::ClaimWorkflow;

/// Terminal view of one execution, as seen by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionOutcome {
    Succeeded,
    Failed { reason: String },
    /// The execution hit an infrastructure fault and can be resumed later.
    Abandoned { error: String },
}

/// Outcome of one execution within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub execution_id: ExecutionId,
    pub bonus_code: BonusCode,
    #[serde(flatten)]
    pub outcome: ExecutionOutcome,
}

/// Per-execution outcomes of a settled batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub request_id: String,
    /// In claim order.
    pub executions: Vec<ExecutionReport>,
}

impl BatchReport {
    /// Number of executions that succeeded.
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, ExecutionOutcome::Succeeded))
    }

    /// Number of executions that failed.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ExecutionOutcome::Failed { .. }))
    }

    /// Number of executions abandoned on an infrastructure fault.
    pub fn abandoned(&self) -> usize {
        self.count(|o| matches!(o, ExecutionOutcome::Abandoned { .. }))
    }

    fn count(&self, pred: impl Fn(&ExecutionOutcome) -> bool) -> usize {
        self.executions.iter().filter(|e| pred(&e.outcome)).count()
    }
}

enum Job {
    Run {
        execution_id: ExecutionId,
        claim: RedeemedBonus,
        reference: RequestReference,
    },
    Resume {
        execution_id: ExecutionId,
        bonus_code: BonusCode,
    },
}

impl Job {
    fn execution_id(&self) -> ExecutionId {
        match self {
            Job::Run { execution_id, .. } | Job::Resume { execution_id, .. } => *execution_id,
        }
    }

    fn bonus_code(&self) -> BonusCode {
        match self {
            Job::Run { claim, .. } => claim.bonus_code.clone(),
            Job::Resume { bonus_code, .. } => bonus_code.clone(),
        }
    }
}

/// Runs batches of claims through the claim workflow.
///
/// Each claim gets its own execution; no claim's outcome affects another,
/// and a batch settles only once every execution has settled.
pub struct BatchCoordinator<H, S, N, E>
where
    H: HistoryStore,
    S: BonusStore,
    N: NotificationSender,
    E: ErrorSink,
{
    workflow: Arc<ClaimWorkflow<H, S, N, E>>,
    backup: Arc<dyn RequestBackup>,
}

impl<H, S, N, E> BatchCoordinator<H, S, N, E>
where
    H: HistoryStore + 'static,
    S: BonusStore + 'static,
    N: NotificationSender + 'static,
    E: ErrorSink + 'static,
{
    /// Creates a new batch coordinator.
    pub fn new(workflow: ClaimWorkflow<H, S, N, E>, backup: Arc<dyn RequestBackup>) -> Self {
        Self {
            workflow: Arc::new(workflow),
            backup,
        }
    }

    /// Returns the claim workflow.
    pub fn workflow(&self) -> &ClaimWorkflow<H, S, N, E> {
        &self.workflow
    }

    /// Returns the execution IDs the batch maps onto, in claim order.
    pub fn execution_ids(batch: &RedemptionBatch) -> Vec<ExecutionId> {
        batch
            .redeemed_bonuses
            .iter()
            .enumerate()
            .map(|(position, claim)| {
                ExecutionId::for_claim(
                    &batch.reference.request_id,
                    position,
                    claim.bonus_code.as_str(),
                )
            })
            .collect()
    }

    /// Processes a batch and waits for every execution to settle.
    #[tracing::instrument(
        skip(self, batch),
        fields(request_id = %batch.reference.request_id, claims = batch.len())
    )]
    pub async fn process_batch(&self, batch: RedemptionBatch) -> BatchReport {
        let started = std::time::Instant::now();
        self.backup_request(&batch).await;

        let jobs = Self::execution_ids(&batch)
            .into_iter()
            .zip(batch.redeemed_bonuses)
            .map(|(execution_id, claim)| Job::Run {
                execution_id,
                claim,
                reference: batch.reference.clone(),
            })
            .collect();
        let executions = self.fan_out(jobs).await;

        metrics::histogram!("redemption_batch_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        let report = BatchReport {
            request_id: batch.reference.request_id,
            executions,
        };
        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            abandoned = report.abandoned(),
            "batch settled"
        );
        report
    }

    /// Starts processing a batch in the background.
    pub fn submit_batch(self: &Arc<Self>, batch: RedemptionBatch) -> JoinHandle<BatchReport> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.process_batch(batch).await })
    }

    /// Resumes every execution in history that has not reached a terminal
    /// state.
    #[tracing::instrument(skip(self))]
    pub async fn recover_incomplete(&self) -> Result<Vec<ExecutionReport>> {
        let mut jobs = Vec::new();
        for execution_id in self.workflow.history().list_executions().await? {
            let Some(execution) = self.workflow.load(execution_id).await? else {
                continue;
            };
            if execution.status().is_terminal() {
                continue;
            }
            let Some(claim) = execution.claim() else {
                tracing::warn!(%execution_id, "skipping execution without a claim");
                continue;
            };
            jobs.push(Job::Resume {
                execution_id,
                bonus_code: claim.bonus_code.clone(),
            });
        }

        tracing::info!(executions = jobs.len(), "recovering incomplete executions");
        Ok(self.fan_out(jobs).await)
    }

    async fn backup_request(&self, batch: &RedemptionBatch) {
        let path = batch.reference.blob_path();
        let saved = match batch.to_backup_json() {
            Ok(body) => self
                .backup
                .save(&path, &body)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(error) = saved {
            tracing::warn!(%path, %error, "request backup failed, continuing");
        }
    }

    async fn fan_out(&self, jobs: Vec<Job>) -> Vec<ExecutionReport> {
        let permits = Arc::new(Semaphore::new(
            self.workflow.config().max_concurrent_executions.max(1),
        ));

        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let execution_id = job.execution_id();
            let bonus_code = job.bonus_code();
            let workflow = Arc::clone(&self.workflow);
            let permits = Arc::clone(&permits);
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await?;
                match job {
                    Job::Run {
                        execution_id,
                        claim,
                        reference,
                    } => workflow.run(execution_id, claim, reference).await,
                    Job::Resume { execution_id, .. } => workflow.resume(execution_id).await,
                }
            });
            handles.push((execution_id, bonus_code, handle));
        }

        join_all(handles.into_iter().map(
            |(execution_id, bonus_code, handle)| async move {
                let result = handle.await.unwrap_or_else(|e| {
                    Err(WorkflowError::TaskFailed {
                        execution_id,
                        reason: e.to_string(),
                    })
                });
                ExecutionReport {
                    execution_id,
                    bonus_code,
                    outcome: outcome_of(execution_id, result),
                }
            },
        ))
        .await
    }
}

fn outcome_of(execution_id: ExecutionId, result: Result<WorkflowExecution>) -> ExecutionOutcome {
    match result {
        Ok(execution) => match execution.status() {
            ExecutionStatus::Succeeded => ExecutionOutcome::Succeeded,
            ExecutionStatus::Failed => ExecutionOutcome::Failed {
                reason: execution.failure_reason().unwrap_or_default().to_string(),
            },
            status @ (ExecutionStatus::NotStarted | ExecutionStatus::Running) => {
                ExecutionOutcome::Abandoned {
                    error: format!("execution stopped in {status} state"),
                }
            }
        },
        Err(error) => {
            tracing::error!(%execution_id, %error, "execution abandoned");
            ExecutionOutcome::Abandoned {
                error: error.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn batch(codes: &[&str]) -> RedemptionBatch {
        RedemptionBatch::new(
            RequestReference::new("req-1", "2020-07-15"),
            codes
                .iter()
                .map(|code| RedeemedBonus::new(*code, Utc::now()))
                .collect(),
        )
        .unwrap()
    }

    type Coordinator = BatchCoordinator<
        history_store::InMemoryHistoryStore,
        domain::InMemoryBonusStore,
        crate::services::InMemoryNotificationSender,
        crate::recorder::InMemoryErrorSink,
    >;

    #[test]
    fn execution_ids_are_stable_and_positional() {
        let first = Coordinator::execution_ids(&batch(&["AAA", "BBB", "AAA"]));
        let again = Coordinator::execution_ids(&batch(&["AAA", "BBB", "AAA"]));

        assert_eq!(first, again);
        assert_eq!(first.len(), 3);
        assert_ne!(first[0], first[2]);
    }

    #[test]
    fn report_counts_outcomes() {
        let entry = |outcome| ExecutionReport {
            execution_id: ExecutionId::new(),
            bonus_code: BonusCode::from("AAA"),
            outcome,
        };
        let report = BatchReport {
            request_id: "req-1".to_string(),
            executions: vec![
                entry(ExecutionOutcome::Succeeded),
                entry(ExecutionOutcome::Failed {
                    reason: "record not found".to_string(),
                }),
                entry(ExecutionOutcome::Succeeded),
                entry(ExecutionOutcome::Abandoned {
                    error: "history down".to_string(),
                }),
            ],
        };

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.abandoned(), 1);
    }

    #[test]
    fn report_serializes_flat_outcomes() {
        let report = ExecutionReport {
            execution_id: ExecutionId::new(),
            bonus_code: BonusCode::from("AAA"),
            outcome: ExecutionOutcome::Failed {
                reason: "invalid status".to_string(),
            },
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["bonusCode"], "AAA");
        assert_eq!(json["outcome"], "FAILED");
        assert_eq!(json["reason"], "invalid status");
    }
}
