//! Fire-and-forget telemetry for workflow transitions.

use std::sync::{Arc, Mutex, PoisonError};

use common::ExecutionId;
use domain::{BonusCode, RedeemedBonus, RequestReference};
use serde::Serialize;

/// Named transitions reported by the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TelemetryEventKind {
    Received,
    RecordRead,
    RecordUpdated,
    NotificationsSent,
    Succeeded,
    Failed,
}

impl TelemetryEventKind {
    /// Returns the event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryEventKind::Received => "received",
            TelemetryEventKind::RecordRead => "record-read",
            TelemetryEventKind::RecordUpdated => "record-updated",
            TelemetryEventKind::NotificationsSent => "notifications-sent",
            TelemetryEventKind::Succeeded => "succeeded",
            TelemetryEventKind::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One telemetry event with its correlation identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryEvent {
    pub kind: TelemetryEventKind,
    pub execution_id: ExecutionId,
    /// Correlation ID of the claim.
    pub bonus_code: BonusCode,
    /// Batch ID.
    pub request_id: String,
    pub error_message: Option<String>,
}

impl TelemetryEvent {
    /// Creates an event for a claim.
    pub fn new(
        kind: TelemetryEventKind,
        execution_id: ExecutionId,
        claim: &RedeemedBonus,
        reference: &RequestReference,
    ) -> Self {
        Self {
            kind,
            execution_id,
            bonus_code: claim.bonus_code.clone(),
            request_id: reference.request_id.clone(),
            error_message: None,
        }
    }

    /// Attaches an error message.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Receives telemetry events. Never awaited and never fails.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Telemetry sink that writes events to the tracing log and a metrics counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn emit(&self, event: TelemetryEvent) {
        metrics::counter!("redemption_telemetry_events_total", "event" => event.kind.as_str())
            .increment(1);
        match &event.error_message {
            Some(error) => tracing::warn!(
                target: "telemetry",
                event = %event.kind,
                execution_id = %event.execution_id,
                bonus_code = %event.bonus_code,
                request_id = %event.request_id,
                error = %error,
                "workflow event"
            ),
            None => tracing::info!(
                target: "telemetry",
                event = %event.kind,
                execution_id = %event.execution_id,
                bonus_code = %event.bonus_code,
                request_id = %event.request_id,
                "workflow event"
            ),
        }
    }
}

/// Telemetry sink that keeps events in memory for assertions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTelemetry {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl InMemoryTelemetry {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every event emitted so far.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the event kinds emitted for one execution, in order.
    pub fn kinds_for(&self, execution_id: ExecutionId) -> Vec<TelemetryEventKind> {
        self.events()
            .into_iter()
            .filter(|e| e.execution_id == execution_id)
            .map(|e| e.kind)
            .collect()
    }
}

impl TelemetrySink for InMemoryTelemetry {
    fn emit(&self, event: TelemetryEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn event_names() {
        assert_eq!(TelemetryEventKind::RecordRead.as_str(), "record-read");
        assert_eq!(
            serde_json::to_value(TelemetryEventKind::NotificationsSent).unwrap(),
            "notifications-sent"
        );
    }

    #[test]
    fn in_memory_sink_filters_by_execution() {
        let sink = InMemoryTelemetry::new();
        let claim = RedeemedBonus::new("ABCDEFGHIJKL", Utc::now());
        let reference = RequestReference::new("req-1", "2020-07-15");
        let first = ExecutionId::new();
        let second = ExecutionId::new();

        sink.emit(TelemetryEvent::new(
            TelemetryEventKind::Received,
            first,
            &claim,
            &reference,
        ));
        sink.emit(TelemetryEvent::new(
            TelemetryEventKind::Received,
            second,
            &claim,
            &reference,
        ));
        sink.emit(
            TelemetryEvent::new(TelemetryEventKind::Failed, first, &claim, &reference)
                .with_error("Bonus is not active"),
        );

        assert_eq!(
            sink.kinds_for(first),
            vec![TelemetryEventKind::Received, TelemetryEventKind::Failed]
        );
        assert_eq!(sink.events().len(), 3);
    }

    #[test]
    fn tracing_sink_does_not_panic_without_subscriber() {
        let claim = RedeemedBonus::new("ABCDEFGHIJKL", Utc::now());
        let reference = RequestReference::new("req-1", "2020-07-15");
        TracingTelemetry.emit(TelemetryEvent::new(
            TelemetryEventKind::Succeeded,
            ExecutionId::new(),
            &claim,
            &reference,
        ));
    }
}
