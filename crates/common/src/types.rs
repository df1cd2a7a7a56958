use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for deriving execution ids from claim coordinates.
const EXECUTION_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_2c3a_8b4e_4f7a_9d21_5e3c_7a90_b1c4);

/// Unique identifier for one workflow execution.
///
/// Wraps a UUID to provide type safety and prevent mixing up
/// execution IDs with other UUID-based identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    /// Creates a new random execution ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derives the execution ID for the claim at `position` of request `request_id`.
    ///
    /// The same coordinates always yield the same ID, so a redelivered
    /// request lands on the executions it already started.
    pub fn for_claim(request_id: &str, position: usize, bonus_code: &str) -> Self {
        let name = format!("{request_id}/{position}/{bonus_code}");
        Self(Uuid::new_v5(&EXECUTION_NAMESPACE, name.as_bytes()))
    }

    /// Creates an execution ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ExecutionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for ExecutionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<ExecutionId> for Uuid {
    fn from(id: ExecutionId) -> Self {
        id.0
    }
}
