//! # Certificate Authority Interface
//!
//! Wire types and the [`CertAuthority`] trait.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::CaError;

/// Batch status as reported by the authority.
///
/// Decoded case-insensitively; spaces and hyphens are treated as
/// underscores so `"Ready for download"` and `"READY_FOR_DOWNLOAD"` agree.
/// Anything unrecognized is preserved in [`BatchStatus::Other`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BatchStatus {
    #[default]
    Created,
    Processing,
    ReadyForDownload,
    Rejected,
    NotAcceptable,
    Other(String),
}

impl BatchStatus {
    /// Decode a raw status string.
    pub fn from_wire(raw: &str) -> Self {
        let canonical: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        match canonical.as_str() {
            "CREATED" | "NOT_PROCESSED" => Self::Created,
            "PROCESSING" | "IN_PROCESS" => Self::Processing,
            "READY_FOR_DOWNLOAD" => Self::ReadyForDownload,
            "REJECTED" => Self::Rejected,
            "NOT_ACCEPTABLE" => Self::NotAcceptable,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    /// Canonical name for persistence and logging.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "CREATED",
            Self::Processing => "PROCESSING",
            Self::ReadyForDownload => "READY_FOR_DOWNLOAD",
            Self::Rejected => "REJECTED",
            Self::NotAcceptable => "NOT_ACCEPTABLE",
            Self::Other(raw) => raw,
        }
    }

    /// Whether the authority has refused the batch.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected | Self::NotAcceptable)
    }
}

impl From<String> for BatchStatus {
    fn from(raw: String) -> Self {
        Self::from_wire(&raw)
    }
}

impl From<BatchStatus> for String {
    fn from(status: BatchStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issuing authority available to the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authority {
    pub id: i64,
    #[serde(rename = "ecosystemName", default)]
    pub ecosystem: String,
    #[serde(default)]
    pub profile_name: String,
}

/// Batch metadata returned on submission and by detail lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchResponse {
    pub batch_id: i64,
    pub order_number: i64,
    pub creation_date: String,
    pub profile: String,
    pub size: i64,
    pub status: BatchStatus,
    pub active: bool,
    pub batch_name: String,
    pub reject_reason: String,
}

/// Per-batch certificate counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingInfo {
    pub active: i64,
    pub success: i64,
    pub failed: i64,
}

/// Profile parameters for a single-certificate batch.
#[derive(Clone)]
pub struct BatchParams {
    pub common_name: String,
    pub pkcs12_password: Zeroizing<String>,
}

impl BatchParams {
    pub fn new(common_name: impl Into<String>, pkcs12_password: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            pkcs12_password: Zeroizing::new(pkcs12_password.into()),
        }
    }

    /// The vendor `profileParams` object.
    pub fn to_profile_params(&self) -> serde_json::Value {
        serde_json::json!({
            "commonName": self.common_name,
            "pkcs12Password": self.pkcs12_password.as_str(),
        })
    }
}

impl std::fmt::Debug for BatchParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchParams")
            .field("common_name", &self.common_name)
            .field("pkcs12_password", &"[REDACTED]")
            .finish()
    }
}

/// Certificate authority operations.
///
/// Methods are synchronous; HTTP implementations drive their own futures on
/// the ambient Tokio runtime and must be called from a blocking context
/// (`spawn_blocking` or a thread that entered the runtime).
pub trait CertAuthority: Send + Sync {
    /// Obtain fresh credentials, replacing any cached token.
    fn authenticate(&self) -> Result<(), CaError>;

    /// Authorities the account may issue against.
    fn list_authorities(&self) -> Result<Vec<Authority>, CaError>;

    /// Certificates remaining on an authority.
    fn authority_balance(&self, authority_id: i64) -> Result<i64, CaError>;

    /// Submit a single-certificate batch.
    fn submit_batch(
        &self,
        authority_id: i64,
        batch_name: &str,
        params: &BatchParams,
    ) -> Result<BatchResponse, CaError>;

    /// Current batch metadata, including status and reject reason.
    fn batch_detail(&self, batch_id: i64) -> Result<BatchResponse, CaError>;

    /// Active, failed and successful certificate counts for a batch.
    fn processing_status(&self, batch_id: i64) -> Result<ProcessingInfo, CaError>;

    /// The issued ZIP archive.
    fn download_batch(&self, batch_id: i64) -> Result<Vec<u8>, CaError>;

    /// Implementation name for logs.
    fn adapter_name(&self) -> &'static str;
}
