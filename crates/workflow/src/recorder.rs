//! Best-effort diagnostic recording for failed executions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{BonusCode, RedeemedBonus, RequestReference};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Diagnostic entry for manual remediation of a failed claim.
///
/// Keyed by `(id, recorded_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// The bonus the claim targeted.
    pub id: BonusCode,
    /// When the diagnostic was written.
    pub recorded_at: DateTime<Utc>,
    /// Path of the request backup the claim came from.
    pub request_id: String,
    /// The claim as JSON.
    pub request_payload: String,
    /// Why the claim failed.
    pub message: String,
}

impl ErrorRecord {
    /// Builds the diagnostic for a failed claim, stamped now.
    pub fn for_claim(
        claim: &RedeemedBonus,
        reference: &RequestReference,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: claim.bonus_code.clone(),
            recorded_at: Utc::now(),
            request_id: reference.blob_path(),
            request_payload: serde_json::to_string(claim).unwrap_or_default(),
            message: message.into(),
        }
    }
}

/// Errors raised by an error sink. Always swallowed by [`ErrorRecorder`].
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Error sink unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Append-only store of diagnostic entries.
#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn write(&self, record: &ErrorRecord) -> Result<(), RecorderError>;
}

/// In-memory error sink for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryErrorSink {
    records: Arc<Mutex<Vec<ErrorRecord>>>,
    fail_on_write: Arc<AtomicBool>,
}

impl InMemoryErrorSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the sink to fail every write.
    pub fn set_fail_on_write(&self, fail: bool) {
        self.fail_on_write.store(fail, Ordering::SeqCst);
    }

    /// Returns every stored record.
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the records stored for one bonus.
    pub fn records_for(&self, id: &BonusCode) -> Vec<ErrorRecord> {
        self.records()
            .into_iter()
            .filter(|r| &r.id == id)
            .collect()
    }
}

#[async_trait]
impl ErrorSink for InMemoryErrorSink {
    async fn write(&self, record: &ErrorRecord) -> Result<(), RecorderError> {
        if self.fail_on_write.load(Ordering::SeqCst) {
            return Err(RecorderError::Unavailable("table storage offline".to_string()));
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// Writes diagnostics, discarding any failure of the sink.
#[derive(Debug, Clone)]
pub struct ErrorRecorder<E: ErrorSink> {
    sink: E,
}

impl<E: ErrorSink> ErrorRecorder<E> {
    /// Creates a recorder over `sink`.
    pub fn new(sink: E) -> Self {
        Self { sink }
    }

    /// Returns the underlying sink.
    pub fn sink(&self) -> &E {
        &self.sink
    }

    /// Writes `record` once. Returns whether the write landed.
    #[tracing::instrument(skip(self, record), fields(bonus_code = %record.id))]
    pub async fn record(&self, record: ErrorRecord) -> bool {
        match self.sink.write(&record).await {
            Ok(()) => {
                tracing::info!(reason = %record.message, "error record saved");
                true
            }
            Err(e) => {
                metrics::counter!("redemption_error_records_dropped_total").increment(1);
                tracing::warn!(error = %e, "error record dropped");
                false
            }
        }
    }
}
