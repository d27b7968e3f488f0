//! Email delivery errors.

/// Errors from rendering or delivering email.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// The provider is unreachable or returned a 5xx status.
    #[error("email provider unavailable: {reason}")]
    Unavailable { reason: String },

    /// The request timed out.
    #[error("email provider timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// The provider refused the message.
    #[error("email provider rejected message: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The record has no contact able to receive this message.
    #[error("no deliverable contact for vasp {vasp_id}")]
    NoRecipient { vasp_id: String },

    /// A token the message must carry has not been generated.
    #[error("cannot send {message}: {field} has not been generated")]
    MissingToken {
        message: &'static str,
        field: &'static str,
    },

    /// The mailer cannot run.
    #[error("email client not configured: {reason}")]
    NotConfigured { reason: String },

    /// The record could not be serialized into the message body.
    #[error("could not render message: {0}")]
    Render(#[from] serde_json::Error),

    /// Configuration is invalid.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}
