//! Notification sender trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use domain::{FiscalCode, MessageContent};
use thiserror::Error;

/// Failure of an eligibility check or a send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    /// Worth retrying.
    #[error("{0}")]
    Transient(String),

    /// Retrying cannot help (e.g. unauthorized recipient).
    #[error("{0}")]
    Permanent(String),
}

/// Delivers notifications to one recipient at a time.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Returns whether the recipient can receive notifications.
    async fn check_eligible(&self, recipient: &FiscalCode) -> Result<bool, NotificationError>;

    /// Sends `content` to the recipient and returns the message ID.
    async fn send(
        &self,
        recipient: &FiscalCode,
        content: &MessageContent,
    ) -> Result<String, NotificationError>;
}

#[derive(Debug, Clone, Copy)]
enum Script {
    /// Fail this many sends with a transient error, then succeed.
    TransientFor(u32),
    /// Every send fails transiently.
    AlwaysTransient,
    /// Every send fails permanently.
    Permanent,
    /// Eligibility check answers false.
    Ineligible,
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    scripts: HashMap<FiscalCode, Script>,
    attempts: Vec<FiscalCode>,
    eligibility_checks: Vec<FiscalCode>,
    delivered: Vec<(FiscalCode, MessageContent)>,
    next_id: u32,
}

/// In-memory notification sender for testing.
///
/// Every recipient is eligible and every send succeeds unless scripted
/// otherwise. Send attempts are logged in call order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationSender {
    state: Arc<Mutex<InMemoryNotificationState>>,
}

impl InMemoryNotificationSender {
    /// Creates a new in-memory notification sender.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryNotificationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn script(&self, recipient: impl Into<FiscalCode>, script: Script) {
        self.state().scripts.insert(recipient.into(), script);
    }

    /// Fails the next `times` sends to the recipient with a transient error.
    pub fn fail_transiently(&self, recipient: impl Into<FiscalCode>, times: u32) {
        self.script(recipient, Script::TransientFor(times));
    }

    /// Fails every send to the recipient with a transient error.
    pub fn fail_always(&self, recipient: impl Into<FiscalCode>) {
        self.script(recipient, Script::AlwaysTransient);
    }

    /// Rejects every send to the recipient permanently.
    pub fn reject(&self, recipient: impl Into<FiscalCode>) {
        self.script(recipient, Script::Permanent);
    }

    /// Marks the recipient as not eligible.
    pub fn set_ineligible(&self, recipient: impl Into<FiscalCode>) {
        self.script(recipient, Script::Ineligible);
    }

    /// Recipients of every send attempt, in call order.
    pub fn attempts(&self) -> Vec<FiscalCode> {
        self.state().attempts.clone()
    }

    /// Recipients in the order of their first send attempt.
    pub fn first_attempt_order(&self) -> Vec<FiscalCode> {
        let mut order: Vec<FiscalCode> = Vec::new();
        for recipient in self.state().attempts.iter() {
            if !order.contains(recipient) {
                order.push(recipient.clone());
            }
        }
        order
    }

    /// Recipients that passed through the eligibility check, in call order.
    pub fn eligibility_checks(&self) -> Vec<FiscalCode> {
        self.state().eligibility_checks.clone()
    }

    /// Recipients that received a message, in delivery order.
    pub fn delivered(&self) -> Vec<FiscalCode> {
        self.state()
            .delivered
            .iter()
            .map(|(recipient, _)| recipient.clone())
            .collect()
    }

    /// Messages delivered to one recipient.
    pub fn messages_to(&self, recipient: &FiscalCode) -> Vec<MessageContent> {
        self.state()
            .delivered
            .iter()
            .filter(|(r, _)| r == recipient)
            .map(|(_, content)| content.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationSender for InMemoryNotificationSender {
    async fn check_eligible(&self, recipient: &FiscalCode) -> Result<bool, NotificationError> {
        let mut state = self.state();
        state.eligibility_checks.push(recipient.clone());
        Ok(!matches!(state.scripts.get(recipient), Some(Script::Ineligible)))
    }

    async fn send(
        &self,
        recipient: &FiscalCode,
        content: &MessageContent,
    ) -> Result<String, NotificationError> {
        let mut state = self.state();
        state.attempts.push(recipient.clone());

        match state.scripts.get(recipient).copied() {
            Some(Script::TransientFor(remaining)) if remaining > 0 => {
                state
                    .scripts
                    .insert(recipient.clone(), Script::TransientFor(remaining - 1));
                return Err(NotificationError::Transient(
                    "notification service unavailable".to_string(),
                ));
            }
            Some(Script::AlwaysTransient) => {
                return Err(NotificationError::Transient(
                    "notification service unavailable".to_string(),
                ));
            }
            Some(Script::Permanent) => {
                return Err(NotificationError::Permanent(
                    "recipient not authorized".to_string(),
                ));
            }
            _ => {}
        }

        state.next_id += 1;
        let message_id = format!("MSG-{:04}", state.next_id);
        state.delivered.push((recipient.clone(), content.clone()));
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::redeemed_bonus_message;

    #[tokio::test]
    async fn send_succeeds_by_default() {
        let sender = InMemoryNotificationSender::new();
        let recipient = FiscalCode::from("AAA");
        let content = redeemed_bonus_message(Utc::now());

        assert!(sender.check_eligible(&recipient).await.unwrap());
        let id = sender.send(&recipient, &content).await.unwrap();

        assert!(id.starts_with("MSG-"));
        assert_eq!(sender.delivered(), vec![recipient.clone()]);
        assert_eq!(sender.messages_to(&recipient), vec![content]);
    }

    #[tokio::test]
    async fn transient_script_is_consumed() {
        let sender = InMemoryNotificationSender::new();
        sender.fail_transiently("AAA", 2);
        let recipient = FiscalCode::from("AAA");
        let content = redeemed_bonus_message(Utc::now());

        assert!(matches!(
            sender.send(&recipient, &content).await,
            Err(NotificationError::Transient(_))
        ));
        assert!(sender.send(&recipient, &content).await.is_err());
        assert!(sender.send(&recipient, &content).await.is_ok());
        assert_eq!(sender.attempts().len(), 3);
        assert_eq!(sender.first_attempt_order(), vec![recipient]);
    }

    #[tokio::test]
    async fn ineligible_and_rejected_recipients() {
        let sender = InMemoryNotificationSender::new();
        sender.set_ineligible("AAA");
        sender.reject("BBB");
        let content = redeemed_bonus_message(Utc::now());

        assert!(!sender.check_eligible(&FiscalCode::from("AAA")).await.unwrap());
        assert!(matches!(
            sender.send(&FiscalCode::from("BBB"), &content).await,
            Err(NotificationError::Permanent(_))
        ));
        assert!(sender.delivered().is_empty());
    }
}
