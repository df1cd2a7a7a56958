//! Workflow execution aggregate, folded from history.

use chrono::{DateTime, Utc};
use common::ExecutionId;
use domain::{Aggregate, RedeemedBonus, RequestReference, StoredBonus};
use history_store::{HistoryEntry, Sequence};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::events::{StepOutcome, WorkflowEvent};
use crate::redemption;
use crate::state::{ClaimStage, ExecutionStatus};

/// One durable run of the redemption workflow for one claim.
///
/// Rebuilt by folding the execution's history. Completed steps are kept in
/// the order they were recorded and looked up by name during replay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowExecution {
    id: Option<ExecutionId>,
    version: Sequence,
    workflow_type: String,
    claim: Option<RedeemedBonus>,
    reference: Option<RequestReference>,
    status: ExecutionStatus,
    steps: Vec<StepOutcome>,
    failure_reason: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Aggregate for WorkflowExecution {
    type Event = WorkflowEvent;

    fn aggregate_type() -> &'static str {
        redemption::WORKFLOW_TYPE
    }

    fn id(&self) -> Option<ExecutionId> {
        self.id
    }

    fn version(&self) -> Sequence {
        self.version
    }

    fn set_version(&mut self, version: Sequence) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            WorkflowEvent::ExecutionStarted(data) => {
                self.id = Some(data.execution_id);
                self.workflow_type = data.workflow_type;
                self.claim = Some(data.claim);
                self.reference = Some(data.reference);
                self.started_at = Some(data.started_at);
                self.status = ExecutionStatus::Running;
            }
            WorkflowEvent::StepRecorded(outcome) => {
                // The first recorded outcome of a step is the one replayed
                if self.step(&outcome.step_name).is_none() {
                    self.steps.push(outcome);
                }
            }
            WorkflowEvent::ExecutionSucceeded(data) => {
                self.status = ExecutionStatus::Succeeded;
                self.finished_at = Some(data.completed_at);
            }
            WorkflowEvent::ExecutionFailed(data) => {
                self.status = ExecutionStatus::Failed;
                self.failure_reason = Some(data.reason);
                self.finished_at = Some(data.failed_at);
            }
        }
    }
}

impl WorkflowExecution {
    /// Folds history entries into an execution.
    ///
    /// An empty history yields a `NotStarted` execution.
    pub fn from_entries(entries: &[HistoryEntry]) -> Result<Self, WorkflowError> {
        let mut execution = Self::default();
        for entry in entries {
            let event: WorkflowEvent = entry.decode()?;
            if execution.id.is_none() && !matches!(event, WorkflowEvent::ExecutionStarted(_)) {
                return Err(WorkflowError::CorruptHistory {
                    execution_id: entry.execution_id,
                    reason: format!("history starts with {}", entry.entry_type),
                });
            }
            execution.apply(event);
            execution.set_version(entry.sequence);
        }
        Ok(execution)
    }
}

// Query methods
impl WorkflowExecution {
    /// Returns the execution status.
    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    /// Returns the workflow type.
    pub fn workflow_type(&self) -> &str {
        &self.workflow_type
    }

    /// Returns the claim being processed.
    pub fn claim(&self) -> Option<&RedeemedBonus> {
        self.claim.as_ref()
    }

    /// Returns the request reference of the claim.
    pub fn reference(&self) -> Option<&RequestReference> {
        self.reference.as_ref()
    }

    /// Returns recorded step outcomes in recording order.
    pub fn steps(&self) -> &[StepOutcome] {
        &self.steps
    }

    /// Returns the recorded outcome of a step.
    pub fn step(&self, step_name: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.step_name == step_name)
    }

    /// Returns the failure reason, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns when the execution started.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns when the execution reached a terminal state.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Derives the state machine stage from the recorded steps.
    pub fn stage(&self) -> ClaimStage {
        match self.status {
            ExecutionStatus::Succeeded => return ClaimStage::Succeeded,
            ExecutionStatus::Failed => return ClaimStage::Failed,
            ExecutionStatus::NotStarted | ExecutionStatus::Running => {}
        }

        let Some(Ok(stored)) = self
            .step(redemption::STEP_READ_BONUS)
            .and_then(|s| s.decode::<StoredBonus>())
        else {
            return ClaimStage::Started;
        };

        if !stored.bonus.status.can_redeem() {
            return ClaimStage::RecordRead;
        }

        if !self
            .step(redemption::STEP_REPLACE_BONUS)
            .is_some_and(StepOutcome::is_success)
        {
            return ClaimStage::StatusValidated;
        }

        let all_sent = stored.bonus.sorted_recipients().iter().all(|recipient| {
            self.step(&redemption::send_notification_step(recipient.as_str()))
                .is_some_and(StepOutcome::is_success)
        });
        if all_sent {
            ClaimStage::NotificationsSent
        } else {
            ClaimStage::RecordUpdated
        }
    }
}
