//! # vdir-email — Outbound Email
//!
//! The directory sends three kinds of message:
//!
//! - **Verify contact**: one per contact with an email address, carrying the
//!   one-time token the contact submits to prove the address.
//! - **Review request**: to the administrators once the first contact is
//!   verified, carrying the registration JSON and the admin review token.
//! - **Certificate delivery**: to the technical contact (administrative as a
//!   fallback) once a certificate is issued, with the archive attached.
//!
//! [`Notifier`] renders and addresses those messages; a [`Mailer`] delivers
//! them. [`SendGridMailer`] posts to the SendGrid v3 API; [`MockMailer`]
//! records messages in memory and is selected automatically when no API key
//! is configured.

pub mod config;
pub mod error;
pub mod mailer;
pub mod message;
pub mod notifier;
pub mod sendgrid;
pub mod templates;

use std::sync::Arc;

pub use config::EmailConfig;
pub use error::EmailError;
pub use mailer::{Mailer, MockMailer};
pub use message::{Attachment, Email, Message};
pub use notifier::Notifier;
pub use sendgrid::SendGridMailer;

/// Mailer selected by configuration: SendGrid when an API key is set,
/// otherwise an in-memory mock.
pub fn build_mailer(config: &EmailConfig) -> Result<Arc<dyn Mailer>, EmailError> {
    match &config.sendgrid_api_key {
        Some(key) => Ok(Arc::new(SendGridMailer::new(
            config.sendgrid_url.clone(),
            key,
            config.timeout_secs,
        )?)),
        None => {
            tracing::warn!("SENDGRID_API_KEY not set; outbound email is recorded, not sent");
            Ok(Arc::new(MockMailer::new()))
        }
    }
}
