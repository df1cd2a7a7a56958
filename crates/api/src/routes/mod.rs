pub mod executions;
pub mod health;
pub mod metrics;
pub mod recoveries;
pub mod redemptions;
