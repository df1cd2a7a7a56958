//! Shared identifiers for the bonus redemption workflow crates.

pub mod types;

pub use types::ExecutionId;
