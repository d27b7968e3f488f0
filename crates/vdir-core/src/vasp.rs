//! # VASP Registry Record
//!
//! One [`Vasp`] per registered organization. The record carries the opaque
//! travel-rule identity document, the TLS identity (`common_name`,
//! `endpoint`), the contacts that verify the registration, and the issued
//! [`Certificate`] once the issuance pipeline completes.
//!
//! ## Verification Lifecycle
//!
//! ```text
//! SUBMITTED ──▶ EMAIL_VERIFIED ──▶ PENDING_REVIEW ──▶ REVIEWED
//!                                        │                │
//!                                        ▼                ▼
//!                                    REJECTED     ISSUING_CERTIFICATE ──▶ VERIFIED
//! ```
//!
//! ## Invariants
//!
//! - `name` is unique across the registry, compared after [`normalize_name`].
//! - A record with a certificate must be `VERIFIED`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::VaspId;

/// Normalize an organization name or common name for index lookups.
///
/// Trims surrounding whitespace and lowercases, so `" Alice VASP "` and
/// `"alice vasp"` collide in the unique index.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Normalize an ISO 3166 country code for the country index.
pub fn normalize_country(country: &str) -> String {
    country.trim().to_uppercase()
}

// ── States ──────────────────────────────────────────────────────────────────

/// Verification status of a VASP registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationState {
    #[default]
    NoVerification,
    Submitted,
    EmailVerified,
    PendingReview,
    Reviewed,
    IssuingCertificate,
    Verified,
    Rejected,
    Appealed,
    Errored,
}

impl VerificationState {
    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoVerification => "NO_VERIFICATION",
            Self::Submitted => "SUBMITTED",
            Self::EmailVerified => "EMAIL_VERIFIED",
            Self::PendingReview => "PENDING_REVIEW",
            Self::Reviewed => "REVIEWED",
            Self::IssuingCertificate => "ISSUING_CERTIFICATE",
            Self::Verified => "VERIFIED",
            Self::Rejected => "REJECTED",
            Self::Appealed => "APPEALED",
            Self::Errored => "ERRORED",
        }
    }
}

impl std::fmt::Display for VerificationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health-check status of the VASP's endpoint.
///
/// The directory records this value but does not contact endpoints itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
    Danger,
    Offline,
    Maintenance,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "UNKNOWN",
            Self::Healthy => "HEALTHY",
            Self::Unhealthy => "UNHEALTHY",
            Self::Danger => "DANGER",
            Self::Offline => "OFFLINE",
            Self::Maintenance => "MAINTENANCE",
        };
        f.write_str(s)
    }
}

// ── Contacts ────────────────────────────────────────────────────────────────

/// A person responsible for some aspect of the VASP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phone: String,
    /// One-time email verification token; cleared once used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

impl Contact {
    /// Whether this contact can receive email.
    pub fn has_email(&self) -> bool {
        !self.email.trim().is_empty()
    }
}

/// The four contact roles a registration may name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical: Option<Contact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administrative: Option<Contact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing: Option<Contact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal: Option<Contact>,
}

impl Contacts {
    /// Present contacts in role order: technical, administrative, billing, legal.
    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        [&self.technical, &self.administrative, &self.billing, &self.legal]
            .into_iter()
            .flatten()
    }

    /// Mutable access to present contacts in role order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Contact> {
        [
            &mut self.technical,
            &mut self.administrative,
            &mut self.billing,
            &mut self.legal,
        ]
        .into_iter()
        .flatten()
    }

    /// The contact that receives issued certificates.
    ///
    /// Falls back to the administrative contact when no technical contact
    /// with an email address was registered.
    pub fn delivery_contact(&self) -> Option<&Contact> {
        self.technical
            .as_ref()
            .filter(|c| c.has_email())
            .or_else(|| self.administrative.as_ref().filter(|c| c.has_email()))
    }

    /// Number of contacts that have verified their email address.
    pub fn verified_count(&self) -> usize {
        self.iter().filter(|c| c.verified).count()
    }
}

// ── Certificate ─────────────────────────────────────────────────────────────

/// Distinguished name fields extracted from an X.509 certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    pub common_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub serial_number: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organization: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organizational_unit: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub street_address: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locality: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub province: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub postal_code: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub country: Vec<String>,
}

/// Public certificate material issued to a VASP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub version: i64,
    /// Serial number as uppercase hex.
    pub serial_number: String,
    pub signature_algorithm: String,
    pub public_key_algorithm: String,
    pub subject: Name,
    pub issuer: Name,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    #[serde(default)]
    pub revoked: bool,
    /// PEM encoding of the leaf certificate.
    pub data: String,
}

// ── VASP ────────────────────────────────────────────────────────────────────

/// A registered organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vasp {
    pub id: VaspId,
    #[serde(default)]
    pub registered_directory: String,
    pub name: String,
    /// Travel-rule legal identity document, stored verbatim.
    #[serde(default)]
    pub entity: serde_json::Value,
    #[serde(default)]
    pub contacts: Contacts,
    pub common_name: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub website: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_category: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub established_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Certificate>,
    #[serde(default)]
    pub verification_status: VerificationState,
    #[serde(default)]
    pub service_status: ServiceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_listed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_on: Option<DateTime<Utc>>,
    /// Token the review email hands to administrators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_verification_token: Option<String>,
}

impl Vasp {
    /// A new, unregistered record with the minimum identifying fields.
    pub fn new(
        name: impl Into<String>,
        common_name: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            id: VaspId::UNASSIGNED,
            registered_directory: String::new(),
            name: name.into(),
            entity: serde_json::Value::Null,
            contacts: Contacts::default(),
            common_name: common_name.into(),
            endpoint: String::new(),
            website: String::new(),
            business_category: None,
            categories: Vec::new(),
            country: country.into(),
            established_on: None,
            certificate: None,
            verification_status: VerificationState::Submitted,
            service_status: ServiceState::Unknown,
            first_listed: None,
            last_updated: None,
            verified_on: None,
            admin_verification_token: None,
        }
    }

    /// Check completeness and cross-field invariants.
    ///
    /// When `partial` is true the record is being registered and need not
    /// have an id yet; otherwise the id must be assigned.
    pub fn validate(&self, partial: bool) -> Result<(), ValidationError> {
        if !partial && !self.id.is_assigned() {
            return Err(ValidationError::MissingField { field: "id" });
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "name" });
        }
        if self.common_name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "common_name",
            });
        }
        let country = self.country.trim();
        if country.is_empty() {
            return Err(ValidationError::MissingField { field: "country" });
        }
        if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::InvalidField {
                field: "country",
                reason: format!("expected ISO 3166 alpha-2 code, got {country:?}"),
            });
        }
        if !self.contacts.iter().any(Contact::has_email) {
            return Err(ValidationError::MissingField { field: "contacts" });
        }
        if self.certificate.is_some() && self.verification_status != VerificationState::Verified {
            return Err(ValidationError::CertificateWithoutVerification {
                status: self.verification_status.to_string(),
            });
        }
        Ok(())
    }

    /// Normalized key for the unique name index.
    pub fn name_key(&self) -> String {
        normalize_name(&self.name)
    }

    /// Normalized key for the unique common name index.
    pub fn common_name_key(&self) -> String {
        normalize_name(&self.common_name)
    }

    /// Normalized key for the country index.
    pub fn country_key(&self) -> String {
        normalize_country(&self.country)
    }

    /// Attach an issued certificate and mark the record verified.
    pub fn attach_certificate(&mut self, certificate: Certificate, now: DateTime<Utc>) {
        self.certificate = Some(certificate);
        self.verification_status = VerificationState::Verified;
        self.verified_on = Some(now);
    }
}
