//! Step names of the redemption workflow.

/// Workflow type recorded on every history entry.
pub const WORKFLOW_TYPE: &str = "ProcessRedeemedBonus";

/// Step name for reading the bonus record.
pub const STEP_READ_BONUS: &str = "read_bonus";

/// Step name for replacing the bonus record with its redeemed copy.
pub const STEP_REPLACE_BONUS: &str = "replace_bonus";

/// Step name for recording the diagnostic of a failed execution.
pub const STEP_SAVE_ERROR: &str = "save_error";

const SEND_NOTIFICATION_PREFIX: &str = "send_notification:";

/// Step name for notifying one recipient.
pub fn send_notification_step(recipient: &str) -> String {
    format!("{SEND_NOTIFICATION_PREFIX}{recipient}")
}

/// Returns the recipient of a notification step name.
pub fn notification_recipient(step_name: &str) -> Option<&str> {
    step_name.strip_prefix(SEND_NOTIFICATION_PREFIX)
}
