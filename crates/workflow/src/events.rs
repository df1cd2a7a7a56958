//! Workflow history events.

use chrono::{DateTime, Utc};
use common::ExecutionId;
use domain::{DomainEvent, RedeemedBonus, RequestReference};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Events recorded in an execution's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WorkflowEvent {
    /// The execution was created for a claim.
    ExecutionStarted(ExecutionStartedData),

    /// A step reached its final outcome.
    StepRecorded(StepOutcome),

    /// The claim was redeemed and every recipient notified.
    ExecutionSucceeded(ExecutionSucceededData),

    /// The claim ended in failure.
    ExecutionFailed(ExecutionFailedData),
}

impl DomainEvent for WorkflowEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::ExecutionStarted(_) => "ExecutionStarted",
            WorkflowEvent::StepRecorded(_) => "StepRecorded",
            WorkflowEvent::ExecutionSucceeded(_) => "ExecutionSucceeded",
            WorkflowEvent::ExecutionFailed(_) => "ExecutionFailed",
        }
    }
}

/// Data for the ExecutionStarted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStartedData {
    /// The execution ID.
    pub execution_id: ExecutionId,
    /// The workflow type (e.g., "ProcessRedeemedBonus").
    pub workflow_type: String,
    /// The claim being processed.
    pub claim: RedeemedBonus,
    /// The request the claim was submitted with.
    pub reference: RequestReference,
    /// When the execution started.
    pub started_at: DateTime<Utc>,
}

/// Data for the ExecutionSucceeded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSucceededData {
    pub completed_at: DateTime<Utc>,
}

/// Data for the ExecutionFailed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionFailedData {
    /// Reason for failure.
    pub reason: String,
    /// When the execution failed.
    pub failed_at: DateTime<Utc>,
}

/// Final outcome of one step, recorded once per logical step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Step name, unique within the execution.
    pub step_name: String,
    /// Attempts made before the outcome was reached.
    pub attempts: u32,
    /// Success payload or failure reason.
    pub result: StepResult,
}

/// Result half of a [`StepOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepResult {
    Success {
        payload: serde_json::Value,
    },
    Failure {
        reason: String,
        /// False when the retry budget ran out on transient errors.
        permanent: bool,
    },
}

impl StepOutcome {
    /// Returns true if the step succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self.result, StepResult::Success { .. })
    }

    /// Returns the failure reason, if the step failed.
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.result {
            StepResult::Failure { reason, .. } => Some(reason),
            StepResult::Success { .. } => None,
        }
    }

    /// Decodes the success payload. Returns None for failures.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        match &self.result {
            StepResult::Success { payload } => Some(serde_json::from_value(payload.clone())),
            StepResult::Failure { .. } => None,
        }
    }
}

// Convenience constructors
impl WorkflowEvent {
    /// Creates an ExecutionStarted event.
    pub fn execution_started(
        execution_id: ExecutionId,
        workflow_type: impl Into<String>,
        claim: RedeemedBonus,
        reference: RequestReference,
    ) -> Self {
        WorkflowEvent::ExecutionStarted(ExecutionStartedData {
            execution_id,
            workflow_type: workflow_type.into(),
            claim,
            reference,
            started_at: Utc::now(),
        })
    }

    /// Creates a StepRecorded event.
    pub fn step_recorded(outcome: StepOutcome) -> Self {
        WorkflowEvent::StepRecorded(outcome)
    }

    /// Creates an ExecutionSucceeded event.
    pub fn execution_succeeded() -> Self {
        WorkflowEvent::ExecutionSucceeded(ExecutionSucceededData {
            completed_at: Utc::now(),
        })
    }

    /// Creates an ExecutionFailed event.
    pub fn execution_failed(reason: impl Into<String>) -> Self {
        WorkflowEvent::ExecutionFailed(ExecutionFailedData {
            reason: reason.into(),
            failed_at: Utc::now(),
        })
    }
}
