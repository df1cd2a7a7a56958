//! Workflow tuning.

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Retry policies, eligibility toggle and fan-out bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Policy for reading the bonus record.
    pub read_policy: RetryPolicy,
    /// Policy for replacing the bonus record.
    pub replace_policy: RetryPolicy,
    /// Policy for each recipient's notification.
    pub notification_policy: RetryPolicy,
    /// Check recipient eligibility before sending.
    pub check_eligibility: bool,
    /// Claims of one batch (or recovery sweep) running at once.
    pub max_concurrent_executions: usize,
    /// Recipients of one claim notified at once.
    pub max_concurrent_notifications: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            read_policy: RetryPolicy::store(),
            replace_policy: RetryPolicy::store(),
            notification_policy: RetryPolicy::notification(),
            check_eligibility: true,
            max_concurrent_executions: 64,
            max_concurrent_notifications: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = WorkflowConfig::default();
        assert_eq!(config.read_policy.max_attempts, 5);
        assert_eq!(config.notification_policy.max_attempts, 10);
        assert!(config.check_eligibility);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: WorkflowConfig = serde_json::from_value(serde_json::json!({
            "check_eligibility": false,
            "max_concurrent_executions": 4
        }))
        .unwrap();

        assert!(!config.check_eligibility);
        assert_eq!(config.max_concurrent_executions, 4);
        assert_eq!(config.replace_policy, RetryPolicy::store());
    }
}
