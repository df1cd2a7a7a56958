//! Claim workflow: the redemption state machine for one claim.

use std::sync::Arc;

use common::ExecutionId;
use domain::{
    BonusActivation, BonusStore, BonusStoreError, FiscalCode, MessageContent, RedeemedBonus,
    RequestReference, StoredBonus, redeemed_bonus_message,
};
use futures_util::future::join_all;
use history_store::HistoryStore;
use tokio::sync::Semaphore;

use crate::config::WorkflowConfig;
use crate::error::{Result, StepError, WorkflowError};
use crate::events::WorkflowEvent;
use crate::execution::WorkflowExecution;
use crate::executor::StepExecutor;
use crate::recorder::{ErrorRecord, ErrorRecorder, ErrorSink};
use crate::redemption;
use crate::retry::RetryPolicy;
use crate::services::notification::NotificationSender;
use crate::services::telemetry::{TelemetryEvent, TelemetryEventKind, TelemetrySink};
use crate::state::ExecutionStatus;

enum Verdict {
    Redeemed,
    Rejected(String),
}

struct NotificationReport {
    failed: Vec<FiscalCode>,
    any_fresh: bool,
}

/// Drives one claim from `STARTED` to `SUCCEEDED` or `FAILED`.
///
/// Every external call goes through the [`StepExecutor`], so re-driving an
/// execution after a crash skips the steps already recorded in history and
/// reaches the same terminal state.
pub struct ClaimWorkflow<H, S, N, E>
where
    H: HistoryStore,
    S: BonusStore,
    N: NotificationSender,
    E: ErrorSink,
{
    history: H,
    bonuses: S,
    notifications: N,
    recorder: ErrorRecorder<E>,
    telemetry: Arc<dyn TelemetrySink>,
    config: WorkflowConfig,
}

impl<H, S, N, E> ClaimWorkflow<H, S, N, E>
where
    H: HistoryStore,
    S: BonusStore,
    N: NotificationSender,
    E: ErrorSink,
{
    /// Creates a new claim workflow.
    pub fn new(
        history: H,
        bonuses: S,
        notifications: N,
        error_sink: E,
        telemetry: Arc<dyn TelemetrySink>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            history,
            bonuses,
            notifications,
            recorder: ErrorRecorder::new(error_sink),
            telemetry,
            config,
        }
    }

    /// Returns the workflow configuration.
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Returns the history store.
    pub fn history(&self) -> &H {
        &self.history
    }

    /// Runs the execution for `claim`, starting it if it has no history.
    ///
    /// An execution that already exists is resumed with the claim recorded
    /// in its history; a terminal one is returned as is.
    #[tracing::instrument(
        skip(self, claim, reference),
        fields(bonus_code = %claim.bonus_code, request_id = %reference.request_id)
    )]
    pub async fn run(
        &self,
        execution_id: ExecutionId,
        claim: RedeemedBonus,
        reference: RequestReference,
    ) -> Result<WorkflowExecution> {
        let executor = StepExecutor::open(&self.history, execution_id).await?;
        let execution = executor.snapshot().await;

        if execution.status() == ExecutionStatus::NotStarted {
            metrics::counter!("redemption_executions_total").increment(1);
            let received =
                TelemetryEvent::new(TelemetryEventKind::Received, execution_id, &claim, &reference);
            executor
                .record(WorkflowEvent::execution_started(
                    execution_id,
                    redemption::WORKFLOW_TYPE,
                    claim,
                    reference,
                ))
                .await?;
            self.telemetry.emit(received);
        } else if execution.claim() != Some(&claim) {
            tracing::warn!("execution exists for a different claim, continuing with the recorded one");
        }

        self.drive(&executor).await
    }

    /// Re-drives an existing execution from its history.
    #[tracing::instrument(skip(self))]
    pub async fn resume(&self, execution_id: ExecutionId) -> Result<WorkflowExecution> {
        let executor = StepExecutor::open(&self.history, execution_id).await?;
        if executor.snapshot().await.status() == ExecutionStatus::NotStarted {
            return Err(WorkflowError::ExecutionNotFound(execution_id));
        }
        self.drive(&executor).await
    }

    /// Loads the folded execution without driving it.
    pub async fn load(&self, execution_id: ExecutionId) -> Result<Option<WorkflowExecution>> {
        let entries = self.history.load(execution_id).await?;
        if entries.is_empty() {
            return Ok(None);
        }
        Ok(Some(WorkflowExecution::from_entries(&entries)?))
    }

    async fn drive(&self, executor: &StepExecutor<'_, H>) -> Result<WorkflowExecution> {
        let execution_id = executor.execution_id();
        let execution = executor.snapshot().await;
        if execution.status().is_terminal() {
            tracing::debug!(status = %execution.status(), "execution already terminal");
            return Ok(execution);
        }

        let (Some(claim), Some(reference)) =
            (execution.claim().cloned(), execution.reference().cloned())
        else {
            return Err(WorkflowError::CorruptHistory {
                execution_id,
                reason: "missing claim".to_string(),
            });
        };

        let started = std::time::Instant::now();
        match self.redeem(executor, &claim, &reference).await? {
            Verdict::Redeemed => {
                executor
                    .record(WorkflowEvent::execution_succeeded())
                    .await?;
                metrics::counter!("redemption_succeeded").increment(1);
                self.telemetry.emit(TelemetryEvent::new(
                    TelemetryEventKind::Succeeded,
                    execution_id,
                    &claim,
                    &reference,
                ));
                tracing::info!(%execution_id, "redemption succeeded");
            }
            Verdict::Rejected(reason) => {
                self.fail(executor, &claim, &reference, reason).await?;
            }
        }
        metrics::histogram!("redemption_execution_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        Ok(executor.snapshot().await)
    }

    async fn redeem(
        &self,
        executor: &StepExecutor<'_, H>,
        claim: &RedeemedBonus,
        reference: &RequestReference,
    ) -> Result<Verdict> {
        let execution_id = executor.execution_id();
        let emit = |kind| {
            self.telemetry
                .emit(TelemetryEvent::new(kind, execution_id, claim, reference));
        };

        // STARTED -> RECORD_READ
        let bonuses = &self.bonuses;
        let code = &claim.bonus_code;
        let read = executor
            .execute(
                redemption::STEP_READ_BONUS,
                &self.config.read_policy,
                move || async move { bonuses.read(code).await.map_err(StepError::from) },
            )
            .await?;
        let stored: StoredBonus = match read.outcome.decode() {
            Some(decoded) => decoded?,
            None => return Ok(rejected(read.outcome.failure_reason())),
        };
        if !read.replayed {
            emit(TelemetryEventKind::RecordRead);
        }

        // RECORD_READ -> STATUS_VALIDATED
        if !stored.bonus.status.can_redeem() {
            return Ok(Verdict::Rejected(format!(
                "invalid status: bonus is not active (STATUS={})",
                stored.bonus.status
            )));
        }

        // STATUS_VALIDATED -> RECORD_UPDATED
        let redeemed = stored.bonus.redeem(claim.redeemed_at, execution_id);
        let (read_ref, redeemed_ref) = (&stored, &redeemed);
        let replace = executor
            .execute(
                redemption::STEP_REPLACE_BONUS,
                &self.config.replace_policy,
                move || self.replace_bonus(read_ref, redeemed_ref),
            )
            .await?;
        if !replace.outcome.is_success() {
            return Ok(rejected(replace.outcome.failure_reason()));
        }
        if !replace.replayed {
            emit(TelemetryEventKind::RecordUpdated);
        }

        // RECORD_UPDATED -> NOTIFICATIONS_SENT
        let report = self.notify_all(executor, claim, &redeemed).await?;
        if !report.failed.is_empty() {
            let failed: Vec<&str> = report.failed.iter().map(FiscalCode::as_str).collect();
            return Ok(Verdict::Rejected(format!(
                "Error sending notifications to [{}]",
                failed.join(",")
            )));
        }
        if report.any_fresh {
            emit(TelemetryEventKind::NotificationsSent);
        }

        Ok(Verdict::Redeemed)
    }

    /// Conditional replace at the version returned by the read.
    ///
    /// A conflict is accepted only when the stored record is exactly the
    /// redeemed copy one version later, stamped by this execution: an earlier
    /// attempt of ours already landed. A sibling's identical write does not
    /// match because it carries a different `redeemed_by`.
    async fn replace_bonus(
        &self,
        read: &StoredBonus,
        redeemed: &BonusActivation,
    ) -> std::result::Result<StoredBonus, StepError> {
        match self
            .bonuses
            .replace(&read.bonus.id, read.version, redeemed.clone())
            .await
        {
            Ok(stored) => Ok(stored),
            Err(conflict @ BonusStoreError::Conflict { .. }) => {
                let current = self.bonuses.read(&read.bonus.id).await?;
                let ours = current.bonus.redeemed_by.is_some()
                    && current.bonus.redeemed_by == redeemed.redeemed_by;
                if ours && current.version == read.version.next() && &current.bonus == redeemed {
                    tracing::info!(bonus_code = %read.bonus.id, "replace already applied");
                    Ok(current)
                } else {
                    Err(conflict.into())
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn notify_all(
        &self,
        executor: &StepExecutor<'_, H>,
        claim: &RedeemedBonus,
        redeemed: &BonusActivation,
    ) -> Result<NotificationReport> {
        let recipients = redeemed.sorted_recipients();
        let content = redeemed_bonus_message(claim.redeemed_at);
        let permits = Semaphore::new(self.config.max_concurrent_notifications.max(1));

        let sends = recipients.iter().map(|recipient| {
            let (permits, content) = (&permits, &content);
            async move {
                let _permit = permits.acquire().await?;
                let step_name = redemption::send_notification_step(recipient.as_str());
                let step = executor
                    .execute(
                        &step_name,
                        &self.config.notification_policy,
                        move || self.notify(recipient, content),
                    )
                    .await?;
                Ok::<_, WorkflowError>((recipient, step))
            }
        });

        let mut report = NotificationReport {
            failed: Vec::new(),
            any_fresh: false,
        };
        for result in join_all(sends).await {
            let (recipient, step) = result?;
            report.any_fresh |= !step.replayed;
            if !step.outcome.is_success() {
                report.failed.push(recipient.clone());
            }
        }
        Ok(report)
    }

    async fn notify(
        &self,
        recipient: &FiscalCode,
        content: &MessageContent,
    ) -> std::result::Result<String, StepError> {
        if self.config.check_eligibility && !self.notifications.check_eligible(recipient).await? {
            return Err(StepError::permanent("recipient not eligible"));
        }
        Ok(self.notifications.send(recipient, content).await?)
    }

    async fn fail(
        &self,
        executor: &StepExecutor<'_, H>,
        claim: &RedeemedBonus,
        reference: &RequestReference,
        reason: String,
    ) -> Result<()> {
        let execution_id = executor.execution_id();
        tracing::warn!(%execution_id, reason = %reason, "redemption failed");

        let record = ErrorRecord::for_claim(claim, reference, &reason);
        let recorder = &self.recorder;
        executor
            .execute(
                redemption::STEP_SAVE_ERROR,
                &RetryPolicy::once(),
                move || {
                    let record = record.clone();
                    async move { Ok::<_, StepError>(recorder.record(record).await) }
                },
            )
            .await?;

        executor
            .record(WorkflowEvent::execution_failed(reason.clone()))
            .await?;
        metrics::counter!("redemption_failed").increment(1);
        self.telemetry.emit(
            TelemetryEvent::new(TelemetryEventKind::Failed, execution_id, claim, reference)
                .with_error(reason),
        );
        Ok(())
    }
}

fn rejected(reason: Option<&str>) -> Verdict {
    Verdict::Rejected(reason.unwrap_or("unknown failure").to_string())
}
