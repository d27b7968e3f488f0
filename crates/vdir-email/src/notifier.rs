//! Addressing and rendering of directory notifications.

use std::sync::Arc;

use vdir_core::Vasp;

use crate::config::EmailConfig;
use crate::error::EmailError;
use crate::mailer::Mailer;
use crate::message::{Attachment, Email, Message};
use crate::templates::{
    DeliverCertificate, Rendered, ReviewRequest, VerifyContact, DELIVER_CERTIFICATE_SUBJECT,
    REVIEW_REQUEST_SUBJECT, VERIFY_CONTACT_SUBJECT,
};

/// Display name on every outbound message.
pub const SENDER_NAME: &str = "TRISA Directory Service";

/// Display name of the review request recipient.
pub const ADMIN_RECIPIENT_NAME: &str = "TRISA Admins";

/// Sends the directory's notifications through a [`Mailer`].
///
/// Tokens are generated and persisted by the caller before a notification
/// is sent; the notifier only reads them from the record.
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    service_email: String,
    admin_email: String,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("mailer", &self.mailer.adapter_name())
            .field("service_email", &self.service_email)
            .field("admin_email", &self.admin_email)
            .finish()
    }
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, config: &EmailConfig) -> Self {
        Self {
            mailer,
            service_email: config.service_email.clone(),
            admin_email: config.admin_email.clone(),
        }
    }

    pub fn mailer(&self) -> &Arc<dyn Mailer> {
        &self.mailer
    }

    fn message(&self, to: Email, subject: &str, body: Rendered) -> Message {
        Message {
            from: Email::new(SENDER_NAME, &self.service_email),
            to,
            subject: subject.to_string(),
            text: body.text,
            html: body.html,
            attachments: Vec::new(),
        }
    }

    /// Send a verification token to every contact with an email address.
    ///
    /// Returns the number of messages sent. Fails before sending anything if
    /// any addressed contact is missing its token.
    pub fn verify_contacts(&self, vasp: &Vasp) -> Result<usize, EmailError> {
        let vasp_id = vasp.id.to_string();
        let mut messages = Vec::new();
        for contact in vasp.contacts.iter().filter(|c| c.has_email()) {
            let token = contact.token.as_deref().ok_or(EmailError::MissingToken {
                message: "contact verification",
                field: "contact token",
            })?;
            let body = VerifyContact {
                name: &contact.name,
                vasp_id: &vasp_id,
                token,
            }
            .render();
            messages.push(self.message(
                Email::new(&contact.name, &contact.email),
                VERIFY_CONTACT_SUBJECT,
                body,
            ));
        }
        if messages.is_empty() {
            return Err(EmailError::NoRecipient { vasp_id });
        }

        for message in &messages {
            self.mailer.send(message)?;
        }
        tracing::info!(vasp = %vasp.id, sent = messages.len(), "contact verification emails sent");
        Ok(messages.len())
    }

    /// Ask the administrators to review a registration.
    pub fn review_request(&self, vasp: &Vasp) -> Result<(), EmailError> {
        let token = vasp
            .admin_verification_token
            .as_deref()
            .ok_or(EmailError::MissingToken {
                message: "review request",
                field: "admin verification token",
            })?;
        let request = serde_json::to_string_pretty(vasp)?;
        let vasp_id = vasp.id.to_string();
        let body = ReviewRequest {
            vasp_id: &vasp_id,
            token,
            request: &request,
        }
        .render();
        let message = self.message(
            Email::new(ADMIN_RECIPIENT_NAME, &self.admin_email),
            REVIEW_REQUEST_SUBJECT,
            body,
        );
        self.mailer.send(&message)?;
        tracing::info!(vasp = %vasp.id, "review request email sent");
        Ok(())
    }

    /// Deliver an issued certificate archive to the record's delivery contact.
    pub fn deliver_certificate(
        &self,
        vasp: &Vasp,
        filename: &str,
        archive: Vec<u8>,
    ) -> Result<(), EmailError> {
        let vasp_id = vasp.id.to_string();
        let contact = vasp
            .contacts
            .delivery_contact()
            .ok_or_else(|| EmailError::NoRecipient {
                vasp_id: vasp_id.clone(),
            })?;
        let body = DeliverCertificate {
            name: &contact.name,
            vasp_id: &vasp_id,
            common_name: &vasp.common_name,
            filename,
        }
        .render();
        let mut message = self.message(
            Email::new(&contact.name, &contact.email),
            DELIVER_CERTIFICATE_SUBJECT,
            body,
        );
        message.attachments.push(Attachment {
            filename: filename.to_string(),
            content_type: "application/zip".to_string(),
            content: archive,
        });
        self.mailer.send(&message)?;
        tracing::info!(vasp = %vasp.id, to = %contact.email, "certificate delivered");
        Ok(())
    }
}
