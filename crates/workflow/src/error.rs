//! Workflow error types.

use common::ExecutionId;
use domain::BonusStoreError;
use history_store::HistoryStoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::notification::NotificationError;

/// Classified failure of one step attempt.
///
/// Transient failures are retried by the step executor until the retry
/// policy is exhausted. Permanent failures end the step immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StepError {
    /// Retry-eligible fault (network, timeout, store busy).
    #[error("{0}")]
    Transient(String),

    /// Fault that retrying cannot fix.
    #[error("{0}")]
    Permanent(String),
}

impl StepError {
    /// Creates a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        StepError::Transient(message.into())
    }

    /// Creates a permanent error.
    pub fn permanent(message: impl Into<String>) -> Self {
        StepError::Permanent(message.into())
    }

    /// Returns true if retrying cannot help.
    pub fn is_permanent(&self) -> bool {
        matches!(self, StepError::Permanent(_))
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        match self {
            StepError::Transient(m) | StepError::Permanent(m) => m,
        }
    }
}

impl From<BonusStoreError> for StepError {
    fn from(e: BonusStoreError) -> Self {
        match e {
            BonusStoreError::NotFound(_) => StepError::permanent("record not found"),
            BonusStoreError::Conflict { .. } => StepError::Permanent(e.to_string()),
            BonusStoreError::Store(message) => StepError::Transient(message),
        }
    }
}

impl From<NotificationError> for StepError {
    fn from(e: NotificationError) -> Self {
        match e {
            NotificationError::Transient(message) => StepError::Transient(message),
            NotificationError::Permanent(message) => StepError::Permanent(message),
        }
    }
}

/// Infrastructure faults that stop an execution from making durable progress.
///
/// An execution that hits one of these is abandoned as if the process had
/// crashed; it can be resumed from its history later. Claim outcomes are
/// never reported through this type.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The history log could not be read or appended.
    #[error("History store error: {0}")]
    History(#[from] HistoryStoreError),

    /// No history exists for the execution.
    #[error("Execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    /// The history exists but cannot be replayed.
    #[error("Corrupt history for execution {execution_id}: {reason}")]
    CorruptHistory {
        execution_id: ExecutionId,
        reason: String,
    },

    /// A recorded payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A concurrency limiter was closed while waiting for a slot.
    #[error("Concurrency limiter closed")]
    LimiterClosed(#[from] tokio::sync::AcquireError),

    /// The task driving an execution panicked or was cancelled.
    #[error("Execution {execution_id} task failed: {reason}")]
    TaskFailed {
        execution_id: ExecutionId,
        reason: String,
    },
}

/// Convenience type alias for workflow results.
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{BonusCode, RecordVersion};

    #[test]
    fn store_errors_are_classified() {
        let not_found = StepError::from(BonusStoreError::NotFound(BonusCode::from("X")));
        assert_eq!(not_found, StepError::permanent("record not found"));

        let conflict = StepError::from(BonusStoreError::Conflict {
            id: BonusCode::from("X"),
            expected: RecordVersion::new(1),
            actual: RecordVersion::new(2),
        });
        assert!(conflict.is_permanent());
        assert!(conflict.message().contains("conflict"));

        let busy = StepError::from(BonusStoreError::Store("busy".to_string()));
        assert_eq!(busy, StepError::transient("busy"));
    }

    #[test]
    fn notification_errors_map_one_to_one() {
        assert_eq!(
            StepError::from(NotificationError::Transient("timeout".into())),
            StepError::transient("timeout")
        );
        assert_eq!(
            StepError::from(NotificationError::Permanent("unauthorized".into())),
            StepError::permanent("unauthorized")
        );
    }

    #[tokio::test]
    async fn closed_limiter_is_an_infrastructure_fault() {
        let permits = tokio::sync::Semaphore::new(1);
        permits.close();

        let error = WorkflowError::from(permits.acquire().await.unwrap_err());

        assert!(matches!(error, WorkflowError::LimiterClosed(_)));
        assert_eq!(error.to_string(), "Concurrency limiter closed");
    }
}
