//! Durable workflow engine for bonus redemption.
//!
//! Each redemption claim runs as one execution of the claim workflow:
//! 1. Read the bonus record
//! 2. Validate that it is active
//! 3. Replace it with the redeemed copy, conditioned on the read version
//! 4. Notify every family member
//!
//! Every external call is a named step whose final outcome is appended to
//! the execution's history. Re-driving an execution replays recorded
//! outcomes instead of repeating side effects, so a crashed execution can be
//! resumed without sending a notification or writing a record twice.
//!
//! The batch coordinator fans a batch of claims out to independent
//! executions and waits for all of them to settle.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod execution;
pub mod executor;
pub mod journal;
pub mod recorder;
pub mod redemption;
pub mod retry;
pub mod services;
pub mod state;
pub mod workflow;

pub use config::WorkflowConfig;
pub use coordinator::{BatchCoordinator, BatchReport, ExecutionOutcome, ExecutionReport};
pub use error::{StepError, WorkflowError};
pub use events::{StepOutcome, StepResult, WorkflowEvent};
pub use execution::WorkflowExecution;
pub use executor::{ExecutedStep, StepExecutor};
pub use journal::ExecutionJournal;
pub use recorder::{ErrorRecord, ErrorRecorder, ErrorSink, InMemoryErrorSink, RecorderError};
pub use retry::{Attempted, RetryPolicy, run_with_retry};
pub use services::{
    BackupError, FileRequestBackup, InMemoryNotificationSender, InMemoryRequestBackup,
    InMemoryTelemetry, NotificationError, NotificationSender, RequestBackup, TelemetryEvent,
    TelemetryEventKind, TelemetrySink, TracingTelemetry,
};
pub use state::{ClaimStage, ExecutionStatus};
pub use workflow::ClaimWorkflow;
