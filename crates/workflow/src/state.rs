//! Execution status and claim stages.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a workflow execution.
///
/// State transitions:
/// ```text
/// NotStarted ──► Running ──┬──► Succeeded
///                          └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// No history has been recorded.
    #[default]
    NotStarted,

    /// Steps are being executed.
    Running,

    /// The claim was redeemed and every recipient notified (terminal state).
    Succeeded,

    /// The claim was rejected or a step failed (terminal state).
    Failed,
}

impl ExecutionStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Succeeded | ExecutionStatus::Failed)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::NotStarted => "NOT_STARTED",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Succeeded => "SUCCEEDED",
            ExecutionStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Position of a claim in the redemption state machine.
///
/// ```text
/// Started ──► RecordRead ──► StatusValidated ──► RecordUpdated ──► NotificationsSent ──► Succeeded
///    └────────────┴──────────────┴──────────────────┴──────────────────┴──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStage {
    Started,
    RecordRead,
    StatusValidated,
    RecordUpdated,
    NotificationsSent,
    Succeeded,
    Failed,
}

impl ClaimStage {
    /// Returns true if this is a terminal stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClaimStage::Succeeded | ClaimStage::Failed)
    }

    /// Returns the stage name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStage::Started => "STARTED",
            ClaimStage::RecordRead => "RECORD_READ",
            ClaimStage::StatusValidated => "STATUS_VALIDATED",
            ClaimStage::RecordUpdated => "RECORD_UPDATED",
            ClaimStage::NotificationsSent => "NOTIFICATIONS_SENT",
            ClaimStage::Succeeded => "SUCCEEDED",
            ClaimStage::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for ClaimStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
