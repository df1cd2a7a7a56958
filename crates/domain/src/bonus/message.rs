//! Notification content sent to family members after a redemption.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subject and markdown body of one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub subject: String,
    pub markdown: String,
}

const SUBJECT: &str = "Your holiday bonus has been redeemed successfully!";

/// Builds the message announcing that the family bonus was spent.
///
/// Depends only on `redeemed_at`, so replaying a send produces the same text.
pub fn redeemed_bonus_message(redeemed_at: DateTime<Utc>) -> MessageContent {
    let date = redeemed_at.format("%d/%m/%Y");
    let markdown = format!(
        "\n**The holiday bonus granted to your family was spent on {date}**.\n\n\
         From now on you will find it in the Payments section, marked as \"Used\".\n\n\
         The person named on the invoice issued by the accommodation can deduct the \
         amount shown in the bonus details in the next tax return.\n\
         Note: if the price paid is lower than the maximum bonus amount, the deduction \
         is recalculated as 20% of the amount paid to the accommodation.\n"
    );
    MessageContent {
        subject: SUBJECT.to_string(),
        markdown,
    }
}
