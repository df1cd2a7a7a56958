//! Bonus record and redemption claim model.

mod activation;
mod claim;
mod message;
mod store;

pub use activation::{BonusActivation, BonusCode, BonusStatus, FiscalCode};
pub use claim::{RedeemedBonus, RedemptionBatch, RequestReference};
pub use message::{MessageContent, redeemed_bonus_message};
pub use store::{BonusStore, BonusStoreError, InMemoryBonusStore, RecordVersion, StoredBonus};
