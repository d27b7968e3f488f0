//! The delivery seam and its in-memory implementation.

use parking_lot::Mutex;

use crate::error::EmailError;
use crate::message::Message;

/// Delivers rendered messages.
///
/// Implementations must be `Send + Sync` so one mailer can be shared by the
/// API handlers and the cert manager's download tasks.
pub trait Mailer: Send + Sync {
    /// Deliver one message.
    fn send(&self, message: &Message) -> Result<(), EmailError>;

    /// Implementation name for logs.
    fn adapter_name(&self) -> &'static str;
}

/// Records messages instead of sending them.
#[derive(Debug, Default)]
pub struct MockMailer {
    sent: Mutex<Vec<Message>>,
    failure: Mutex<Option<String>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages delivered so far, oldest first.
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    /// Messages delivered to `address`.
    pub fn sent_to(&self, address: &str) -> Vec<Message> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.to.address == address)
            .cloned()
            .collect()
    }

    /// Make every send fail with `reason` until cleared with `None`.
    pub fn set_failure(&self, reason: Option<&str>) {
        *self.failure.lock() = reason.map(str::to_string);
    }
}

impl Mailer for MockMailer {
    fn send(&self, message: &Message) -> Result<(), EmailError> {
        if let Some(reason) = self.failure.lock().clone() {
            return Err(EmailError::Unavailable { reason });
        }
        tracing::debug!(
            to = %message.to.address,
            subject = %message.subject,
            attachments = message.attachments.len(),
            "mock mailer recorded message"
        );
        self.sent.lock().push(message.clone());
        Ok(())
    }

    fn adapter_name(&self) -> &'static str {
        "MockMailer"
    }
}
