//! # SendGrid Mailer
//!
//! [`Mailer`] over the SendGrid v3 `mail/send` endpoint. Attachments are
//! base64 encoded into the request body. Transport failures and 5xx
//! responses surface as [`EmailError::Unavailable`]; any other non-2xx
//! status is a rejection carrying the response body.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use url::Url;
use zeroize::Zeroizing;

use crate::error::EmailError;
use crate::mailer::Mailer;
use crate::message::{Email, Message};

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    name: &'a str,
}

impl<'a> From<&'a Email> for Address<'a> {
    fn from(e: &'a Email) -> Self {
        Self {
            email: &e.address,
            name: &e.name,
        }
    }
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

#[derive(Serialize)]
struct AttachmentBody<'a> {
    content: String,
    #[serde(rename = "type")]
    kind: &'a str,
    filename: &'a str,
    disposition: &'static str,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentBody<'a>>,
}

impl<'a> From<&'a Message> for SendRequest<'a> {
    fn from(m: &'a Message) -> Self {
        Self {
            personalizations: vec![Personalization {
                to: vec![Address::from(&m.to)],
            }],
            from: Address::from(&m.from),
            subject: &m.subject,
            content: vec![
                Content {
                    kind: "text/plain",
                    value: &m.text,
                },
                Content {
                    kind: "text/html",
                    value: &m.html,
                },
            ],
            attachments: m
                .attachments
                .iter()
                .map(|a| AttachmentBody {
                    content: STANDARD.encode(&a.content),
                    kind: &a.content_type,
                    filename: &a.filename,
                    disposition: "attachment",
                })
                .collect(),
        }
    }
}

/// Live SendGrid client.
pub struct SendGridMailer {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Zeroizing<String>,
    timeout_secs: u64,
}

impl std::fmt::Debug for SendGridMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendGridMailer")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl SendGridMailer {
    pub fn new(base_url: Url, api_key: &str, timeout_secs: u64) -> Result<Self, EmailError> {
        let endpoint = base_url
            .join("/v3/mail/send")
            .map_err(|e| EmailError::NotConfigured {
                reason: format!("invalid SendGrid URL: {e}"),
            })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EmailError::NotConfigured {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint,
            api_key: Zeroizing::new(api_key.to_string()),
            timeout_secs,
        })
    }

    async fn post(&self, message: &Message) -> Result<(), EmailError> {
        let body = SendRequest::from(message);
        let resp = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.api_key.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmailError::Timeout {
                        elapsed_ms: self.timeout_secs * 1000,
                    }
                } else {
                    EmailError::Unavailable {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(EmailError::Unavailable {
                reason: format!("HTTP {status}: {text}"),
            });
        }
        Err(EmailError::Rejected {
            status: status.as_u16(),
            body: text,
        })
    }
}

impl Mailer for SendGridMailer {
    fn send(&self, message: &Message) -> Result<(), EmailError> {
        let rt = tokio::runtime::Handle::try_current().map_err(|_| EmailError::NotConfigured {
            reason: "no async runtime available for HTTP request".into(),
        })?;
        rt.block_on(self.post(message))?;
        tracing::info!(to = %message.to.address, subject = %message.subject, "email sent");
        Ok(())
    }

    fn adapter_name(&self) -> &'static str {
        "SendGridMailer"
    }
}
