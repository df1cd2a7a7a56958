//! The bonus activation record and its status machine.

use chrono::{DateTime, Utc};
use common::ExecutionId;
use serde::{Deserialize, Serialize};

/// Code identifying one bonus activation record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BonusCode(String);

impl BonusCode {
    /// Creates a bonus code from a string.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BonusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BonusCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BonusCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for BonusCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fiscal code of a family member, the recipient of notifications.
///
/// Ordering is lexical on the raw code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FiscalCode(String);

impl FiscalCode {
    /// Creates a fiscal code from a string.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FiscalCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FiscalCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FiscalCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle status of a bonus activation.
///
/// ```text
/// PROCESSING ──► ACTIVE ──► REDEEMED
///      │
///      └──► FAILED
/// ```
///
/// Only `ACTIVE` bonuses can be redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BonusStatus {
    /// Activation still being processed.
    Processing,
    /// Activated and spendable.
    Active,
    /// Activation failed.
    Failed,
    /// Spent.
    Redeemed,
}

impl BonusStatus {
    /// Returns true if a bonus in this status may transition to `REDEEMED`.
    pub fn can_redeem(&self) -> bool {
        matches!(self, BonusStatus::Active)
    }

    /// Returns the wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            BonusStatus::Processing => "PROCESSING",
            BonusStatus::Active => "ACTIVE",
            BonusStatus::Failed => "FAILED",
            BonusStatus::Redeemed => "REDEEMED",
        }
    }
}

impl std::fmt::Display for BonusStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The record being redeemed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusActivation {
    /// Bonus code, the record key.
    pub id: BonusCode,

    /// Current status.
    pub status: BonusStatus,

    /// When the bonus was spent, set once redeemed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemed_at: Option<DateTime<Utc>>,

    /// Execution that redeemed the bonus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemed_by: Option<ExecutionId>,

    /// Family members entitled to the bonus.
    pub family_members: Vec<FiscalCode>,
}

impl BonusActivation {
    /// Creates an activation with no redemption date.
    pub fn new(
        id: impl Into<BonusCode>,
        status: BonusStatus,
        family_members: impl IntoIterator<Item = FiscalCode>,
    ) -> Self {
        Self {
            id: id.into(),
            status,
            redeemed_at: None,
            redeemed_by: None,
            family_members: family_members.into_iter().collect(),
        }
    }

    /// Returns the redeemed copy of this record, stamped with the execution
    /// that redeems it.
    ///
    /// The status check is the caller's job; this only builds the target state.
    pub fn redeem(&self, redeemed_at: DateTime<Utc>, redeemed_by: ExecutionId) -> Self {
        Self {
            status: BonusStatus::Redeemed,
            redeemed_at: Some(redeemed_at),
            redeemed_by: Some(redeemed_by),
            ..self.clone()
        }
    }

    /// Returns the family members sorted lexically, without duplicates.
    pub fn sorted_recipients(&self) -> Vec<FiscalCode> {
        let mut recipients = self.family_members.clone();
        recipients.sort();
        recipients.dedup();
        recipients
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn activation(status: BonusStatus, members: &[&str]) -> BonusActivation {
        BonusActivation::new(
            "ABCDEFGHIJKL",
            status,
            members.iter().copied().map(FiscalCode::from),
        )
    }

    #[test]
    fn only_active_can_redeem() {
        assert!(BonusStatus::Active.can_redeem());
        assert!(!BonusStatus::Processing.can_redeem());
        assert!(!BonusStatus::Failed.can_redeem());
        assert!(!BonusStatus::Redeemed.can_redeem());
    }

    #[test]
    fn status_wire_format() {
        let json = serde_json::to_string(&BonusStatus::Redeemed).unwrap();
        assert_eq!(json, "\"REDEEMED\"");
        let status: BonusStatus = serde_json::from_str("\"PROCESSING\"").unwrap();
        assert_eq!(status, BonusStatus::Processing);
        assert_eq!(BonusStatus::Active.to_string(), "ACTIVE");
    }

    #[test]
    fn redeem_sets_status_and_date() {
        let at = Utc.with_ymd_and_hms(2020, 7, 15, 10, 0, 0).unwrap();
        let bonus = activation(BonusStatus::Active, &["B", "A"]);

        let by = ExecutionId::new();

        let redeemed = bonus.redeem(at, by);

        assert_eq!(redeemed.status, BonusStatus::Redeemed);
        assert_eq!(redeemed.redeemed_at, Some(at));
        assert_eq!(redeemed.redeemed_by, Some(by));
        assert_eq!(redeemed.family_members, bonus.family_members);
        assert_eq!(bonus.status, BonusStatus::Active);
    }

    #[test]
    fn redeemed_copies_differ_by_execution() {
        let at = Utc.with_ymd_and_hms(2020, 7, 15, 10, 0, 0).unwrap();
        let bonus = activation(BonusStatus::Active, &["A"]);

        assert_ne!(
            bonus.redeem(at, ExecutionId::new()),
            bonus.redeem(at, ExecutionId::new())
        );
    }

    #[test]
    fn recipients_are_sorted_and_unique() {
        let bonus = activation(BonusStatus::Active, &["B", "A", "C", "A"]);
        let recipients: Vec<_> = bonus
            .sorted_recipients()
            .into_iter()
            .map(|r| r.as_str().to_string())
            .collect();
        assert_eq!(recipients, vec!["A", "B", "C"]);
    }

    #[test]
    fn record_uses_camel_case() {
        let at = Utc.with_ymd_and_hms(2020, 7, 15, 10, 0, 0).unwrap();
        let redeemed = activation(BonusStatus::Active, &["A"]).redeem(at, ExecutionId::new());
        let json = serde_json::to_value(redeemed).unwrap();
        assert_eq!(json["status"], "REDEEMED");
        assert_eq!(json["familyMembers"], serde_json::json!(["A"]));
        assert!(json.get("redeemedAt").is_some());
        assert!(json.get("redeemedBy").is_some());

        let active = serde_json::to_value(activation(BonusStatus::Active, &["A"])).unwrap();
        assert!(active.get("redeemedBy").is_none());
    }
}
