//! Redemption claims and the batch they arrive in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::BonusCode;
use crate::error::DomainError;

/// One redemption claim: spend `bonus_code` at `redeemed_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemedBonus {
    /// The bonus being spent.
    pub bonus_code: BonusCode,
    /// When it was spent.
    pub redeemed_at: DateTime<Utc>,
}

impl RedeemedBonus {
    /// Creates a claim.
    pub fn new(bonus_code: impl Into<BonusCode>, redeemed_at: DateTime<Utc>) -> Self {
        Self {
            bonus_code: bonus_code.into(),
            redeemed_at,
        }
    }
}

/// Reference to the request a claim was submitted with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestReference {
    /// Identifier of the submitted request, used as the batch id.
    pub request_id: String,
    /// Day the request was accepted, `YYYY-MM-DD`.
    pub request_date: String,
}

impl RequestReference {
    /// Creates a reference.
    pub fn new(request_id: impl Into<String>, request_date: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            request_date: request_date.into(),
        }
    }

    /// Creates a reference dated on the UTC day of `accepted_at`.
    pub fn accepted_at(request_id: impl Into<String>, accepted_at: DateTime<Utc>) -> Self {
        Self::new(request_id, accepted_at.format("%Y-%m-%d").to_string())
    }

    /// Path of the request backup blob: `{request_date}/{request_id}.json`.
    pub fn blob_path(&self) -> String {
        format!("{}/{}.json", self.request_date, self.request_id)
    }

    /// Checks that both parts are usable as path segments.
    pub fn validate(&self) -> Result<(), DomainError> {
        for (name, value) in [
            ("request_id", &self.request_id),
            ("request_date", &self.request_date),
        ] {
            if value.trim().is_empty() {
                return Err(DomainError::InvalidReference(format!("{name} is empty")));
            }
            if value.contains(['/', '\\']) || value == ".." {
                return Err(DomainError::InvalidReference(format!(
                    "{name} is not a valid path segment: {value}"
                )));
            }
        }
        Ok(())
    }
}

/// A validated batch of claims sharing one request reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionBatch {
    /// The request the batch came from.
    pub reference: RequestReference,
    /// Claims in submission order.
    pub redeemed_bonuses: Vec<RedeemedBonus>,
}

impl RedemptionBatch {
    /// Builds a batch, rejecting an empty claim list, blank bonus codes and
    /// references that cannot address a backup blob.
    pub fn new(
        reference: RequestReference,
        redeemed_bonuses: Vec<RedeemedBonus>,
    ) -> Result<Self, DomainError> {
        reference.validate()?;
        if redeemed_bonuses.is_empty() {
            return Err(DomainError::EmptyBatch);
        }
        for (position, claim) in redeemed_bonuses.iter().enumerate() {
            if claim.bonus_code.as_str().trim().is_empty() {
                return Err(DomainError::InvalidClaim {
                    position,
                    reason: "bonus code is empty".to_string(),
                });
            }
        }
        Ok(Self {
            reference,
            redeemed_bonuses,
        })
    }

    /// Returns the number of claims.
    pub fn len(&self) -> usize {
        self.redeemed_bonuses.len()
    }

    /// Returns true if the batch has no claims.
    pub fn is_empty(&self) -> bool {
        self.redeemed_bonuses.is_empty()
    }

    /// Serializes the whole batch for the request backup.
    pub fn to_backup_json(&self) -> Result<Vec<u8>, DomainError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 7, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn blob_path_joins_date_and_id() {
        let reference = RequestReference::new("req-1", "2020-07-15");
        assert_eq!(reference.blob_path(), "2020-07-15/req-1.json");
    }

    #[test]
    fn accepted_at_formats_utc_day() {
        let reference = RequestReference::accepted_at("req-1", at());
        assert_eq!(reference.request_date, "2020-07-15");
    }

    #[test]
    fn reference_rejects_path_separators() {
        let reference = RequestReference::new("../etc", "2020-07-15");
        assert!(matches!(
            reference.validate(),
            Err(DomainError::InvalidReference(_))
        ));
        assert!(RequestReference::new("", "2020-07-15").validate().is_err());
    }

    #[test]
    fn batch_rejects_empty_claims() {
        let result = RedemptionBatch::new(RequestReference::new("r", "2020-07-15"), vec![]);
        assert!(matches!(result, Err(DomainError::EmptyBatch)));
    }

    #[test]
    fn batch_reports_blank_code_position() {
        let result = RedemptionBatch::new(
            RequestReference::new("r", "2020-07-15"),
            vec![RedeemedBonus::new("AAA", at()), RedeemedBonus::new(" ", at())],
        );
        assert!(matches!(
            result,
            Err(DomainError::InvalidClaim { position: 1, .. })
        ));
    }

    #[test]
    fn claim_wire_format() {
        let claim: RedeemedBonus = serde_json::from_value(serde_json::json!({
            "bonusCode": "ABCDEFGHIJKL",
            "redeemedAt": "2020-07-15T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(claim, RedeemedBonus::new("ABCDEFGHIJKL", at()));
    }
}
