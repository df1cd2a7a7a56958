//! Domain layer for bonus redemption.
//!
//! This crate provides:
//! - Aggregate and DomainEvent traits for state rebuilt from history
//! - The bonus record model and its redemption transition
//! - Redemption claims, batches and request references
//! - The record store contract with an in-memory implementation

pub mod aggregate;
pub mod bonus;
pub mod error;

pub use aggregate::{Aggregate, DomainEvent};
pub use bonus::{
    BonusActivation, BonusCode, BonusStatus, BonusStore, BonusStoreError, FiscalCode,
    InMemoryBonusStore, MessageContent, RecordVersion, RedeemedBonus, RedemptionBatch,
    RequestReference, StoredBonus, redeemed_bonus_message,
};
pub use error::DomainError;
