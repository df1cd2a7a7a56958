use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ExecutionId, HistoryStoreError, Result};

/// Unique identifier for a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Creates a new random entry ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an entry ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an entry inside one execution's history.
///
/// Sequences start at 1 for the first entry and increment by 1 for each
/// subsequent entry of the same execution. An execution with no history
/// sits at [`Sequence::initial`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(i64);

impl Sequence {
    /// Creates a sequence from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial sequence (0) of an empty history.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the sequence (1) of the first entry.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next sequence.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw sequence value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Sequence {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// One durable record in an execution's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique identifier for this entry.
    pub entry_id: EntryId,

    /// The kind of entry (e.g., "ExecutionStarted", "StepRecorded").
    pub entry_type: String,

    /// The execution this entry belongs to.
    pub execution_id: ExecutionId,

    /// The workflow the execution runs (e.g., "ProcessRedeemedBonus").
    pub workflow_type: String,

    /// Position of the entry in the execution's history.
    pub sequence: Sequence,

    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,

    /// The entry payload as JSON.
    pub payload: serde_json::Value,

    /// Additional metadata, such as correlation identifiers.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl HistoryEntry {
    /// Creates a new entry builder.
    pub fn builder() -> HistoryEntryBuilder {
        HistoryEntryBuilder::default()
    }

    /// Deserializes the payload into a concrete type.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Builder for constructing history entries.
#[derive(Debug, Default)]
pub struct HistoryEntryBuilder {
    entry_id: Option<EntryId>,
    entry_type: Option<String>,
    execution_id: Option<ExecutionId>,
    workflow_type: Option<String>,
    sequence: Option<Sequence>,
    recorded_at: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
}

impl HistoryEntryBuilder {
    /// Sets the entry ID. If not set, a new ID will be generated.
    pub fn entry_id(mut self, id: EntryId) -> Self {
        self.entry_id = Some(id);
        self
    }

    /// Sets the entry type.
    pub fn entry_type(mut self, entry_type: impl Into<String>) -> Self {
        self.entry_type = Some(entry_type.into());
        self
    }

    /// Sets the execution ID.
    pub fn execution_id(mut self, id: ExecutionId) -> Self {
        self.execution_id = Some(id);
        self
    }

    /// Sets the workflow type.
    pub fn workflow_type(mut self, workflow_type: impl Into<String>) -> Self {
        self.workflow_type = Some(workflow_type.into());
        self
    }

    /// Sets the sequence.
    pub fn sequence(mut self, sequence: Sequence) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Sets the recording time. If not set, the current time will be used.
    pub fn recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = Some(recorded_at);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Adds a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Builds the entry, failing with [`HistoryStoreError::InvalidEntry`]
    /// when a required field is missing.
    pub fn build(self) -> Result<HistoryEntry> {
        let missing = |field: &str| HistoryStoreError::InvalidEntry(format!("{field} is required"));
        Ok(HistoryEntry {
            entry_id: self.entry_id.unwrap_or_default(),
            entry_type: self.entry_type.ok_or_else(|| missing("entry_type"))?,
            execution_id: self.execution_id.ok_or_else(|| missing("execution_id"))?,
            workflow_type: self.workflow_type.ok_or_else(|| missing("workflow_type"))?,
            sequence: self.sequence.ok_or_else(|| missing("sequence"))?,
            recorded_at: self.recorded_at.unwrap_or_else(Utc::now),
            payload: self.payload.ok_or_else(|| missing("payload"))?,
            metadata: self.metadata,
        })
    }
}
