//! Core aggregate and domain event traits.

use common::ExecutionId;
use history_store::Sequence;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    ///
    /// This is stored as the entry type of the history log.
    fn event_type(&self) -> &'static str;
}

/// Trait for state that is rebuilt by folding a history of events.
///
/// Aggregates:
/// - Are rebuilt by replaying events in sequence order
/// - Apply events to update state (pure, deterministic)
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate consumes.
    type Event: DomainEvent;

    /// Returns the aggregate type name.
    ///
    /// Used as the workflow type of history entries.
    fn aggregate_type() -> &'static str;

    /// Returns the execution this aggregate was built from.
    ///
    /// Returns None before the first event has been applied.
    fn id(&self) -> Option<ExecutionId>;

    /// Returns the sequence of the last applied event.
    ///
    /// Starts at [`Sequence::initial`] for an empty history.
    fn version(&self) -> Sequence;

    /// Sets the aggregate version.
    ///
    /// Called after loading entries from the history store.
    fn set_version(&mut self, version: Sequence);

    /// Applies an event to the aggregate, updating its state.
    ///
    /// This method must be pure and deterministic:
    /// - Given the same state and event, it must always produce the same new state
    /// - It must not have side effects
    /// - It must not fail (events represent facts that have happened)
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}
