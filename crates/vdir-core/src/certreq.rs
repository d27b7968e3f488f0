//! # Certificate Request Lifecycle
//!
//! A [`CertificateRequest`] tracks one issuance attempt for a VASP through
//! the external certificate authority.
//!
//! ## States
//!
//! ```text
//! INITIALIZED ──▶ READY_TO_SUBMIT ──▶ PROCESSING ──▶ DOWNLOADING ──▶ DOWNLOADED ──▶ COMPLETED
//!      │                                  │  ▲            │
//!      │                                  └──┘            ▼
//!      ▼                                  ├──────▶ CR_ERRORED
//! CR_REJECTED ◀───────────────────────────┘
//! ```
//!
//! `COMPLETED`, `CR_REJECTED` and `CR_ERRORED` are terminal.
//!
//! ## Invariants
//!
//! - `batch_id` is present in `PROCESSING`, `DOWNLOADING`, `DOWNLOADED` and
//!   `COMPLETED`, and absent in `INITIALIZED` and `READY_TO_SUBMIT`.
//! - The PKCS12 password is only ever held as ciphertext plus signature.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TransitionError, ValidationError};
use crate::identity::{CertReqId, VaspId};
use crate::vasp::Certificate;

/// Status of a certificate request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateRequestState {
    /// Created at email verification, awaiting administrator review.
    #[default]
    Initialized,
    /// Approved; the cert manager will submit it on the next tick.
    ReadyToSubmit,
    /// Submitted to the CA; batch is being processed.
    Processing,
    /// The CA batch is ready and a download task owns the request.
    Downloading,
    /// Archive fetched and certificate extracted; VASP not yet finalized.
    Downloaded,
    /// Certificate attached to the VASP (terminal).
    Completed,
    /// Rejected by an administrator or by the CA (terminal).
    #[serde(rename = "CR_REJECTED")]
    Rejected,
    /// Failed at the CA or during extraction (terminal).
    #[serde(rename = "CR_ERRORED")]
    Errored,
}

impl CertificateRequestState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Errored)
    }

    /// Whether a request in this state must carry a CA batch id.
    pub fn requires_batch(&self) -> bool {
        matches!(
            self,
            Self::Processing | Self::Downloading | Self::Downloaded | Self::Completed
        )
    }

    /// Whether a request in this state must not carry a CA batch id.
    pub fn forbids_batch(&self) -> bool {
        matches!(self, Self::Initialized | Self::ReadyToSubmit)
    }

    /// Whether moving from `self` to `to` is a legal transition.
    ///
    /// `PROCESSING → PROCESSING` is allowed so that a poll can persist
    /// refreshed batch status without changing state.
    pub fn can_transition_to(&self, to: CertificateRequestState) -> bool {
        use CertificateRequestState::*;
        matches!(
            (self, to),
            (Initialized, ReadyToSubmit)
                | (Initialized, Rejected)
                | (ReadyToSubmit, Processing)
                | (Processing, Processing)
                | (Processing, Downloading)
                | (Processing, Rejected)
                | (Processing, Errored)
                | (Downloading, Downloaded)
                | (Downloading, Errored)
                | (Downloaded, Completed)
        )
    }

    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "INITIALIZED",
            Self::ReadyToSubmit => "READY_TO_SUBMIT",
            Self::Processing => "PROCESSING",
            Self::Downloading => "DOWNLOADING",
            Self::Downloaded => "DOWNLOADED",
            Self::Completed => "COMPLETED",
            Self::Rejected => "CR_REJECTED",
            Self::Errored => "CR_ERRORED",
        }
    }
}

impl std::fmt::Display for CertificateRequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One certificate issuance attempt for a VASP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRequest {
    pub id: CertReqId,
    pub vasp: VaspId,
    pub common_name: String,
    pub status: CertificateRequestState,
    /// Encrypted PKCS12 password (`nonce || ciphertext`).
    pub pkcs12_password: Vec<u8>,
    /// HMAC over `pkcs12_password`.
    pub pkcs12_signature: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<i64>,
    #[serde(default)]
    pub batch_name: String,
    /// Raw batch status string as last reported by the CA.
    #[serde(default)]
    pub batch_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<i64>,
    #[serde(default)]
    pub creation_date: String,
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub reject_reason: String,
    /// Extracted certificate, held between `DOWNLOADED` and `COMPLETED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Certificate>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl CertificateRequest {
    /// A new `INITIALIZED` request for `vasp` carrying the encrypted password.
    pub fn new(
        vasp: VaspId,
        common_name: impl Into<String>,
        pkcs12_password: Vec<u8>,
        pkcs12_signature: Vec<u8>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CertReqId::UNASSIGNED,
            vasp,
            common_name: common_name.into(),
            status: CertificateRequestState::Initialized,
            pkcs12_password,
            pkcs12_signature,
            authority_id: None,
            batch_id: None,
            batch_name: String::new(),
            batch_status: String::new(),
            order_number: None,
            creation_date: String::new(),
            profile: String::new(),
            reject_reason: String::new(),
            certificate: None,
            created: now,
            modified: now,
        }
    }

    /// Move to `to`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, to: CertificateRequestState) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.modified = Utc::now();
        Ok(())
    }

    /// Check completeness and the batch id invariant.
    pub fn validate(&self, partial: bool) -> Result<(), ValidationError> {
        if !partial && !self.id.is_assigned() {
            return Err(ValidationError::MissingField { field: "id" });
        }
        if !self.vasp.is_assigned() {
            return Err(ValidationError::MissingField { field: "vasp" });
        }
        if self.common_name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "common_name",
            });
        }
        if self.pkcs12_password.is_empty() || self.pkcs12_signature.is_empty() {
            return Err(ValidationError::MissingField {
                field: "pkcs12_password",
            });
        }
        if self.status.requires_batch() && self.batch_id.is_none() {
            return Err(ValidationError::BatchIdMismatch {
                state: "missing",
                status: self.status.to_string(),
            });
        }
        if self.status.forbids_batch() && self.batch_id.is_some() {
            return Err(ValidationError::BatchIdMismatch {
                state: "present",
                status: self.status.to_string(),
            });
        }
        Ok(())
    }
}
