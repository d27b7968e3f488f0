//! # Error Types
//!
//! Validation and state-transition errors raised by the domain types.
//! Storage, network and crypto errors are defined by the crates that own
//! those concerns.

use thiserror::Error;

/// A record failed completeness or invariant checks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is empty or absent.
    #[error("incomplete record: missing {field}")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// A field is present but malformed.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A certificate is attached to a record that is not verified.
    #[error("record carries a certificate but verification status is {status}")]
    CertificateWithoutVerification {
        /// The verification status found on the record.
        status: String,
    },

    /// The batch id presence does not agree with the request status.
    #[error("batch id {state} for status {status}")]
    BatchIdMismatch {
        /// "missing" or "present".
        state: &'static str,
        /// The request status.
        status: String,
    },
}

/// A certificate request state transition was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid certificate request transition: {from} -> {to}")]
pub struct TransitionError {
    /// Current state name.
    pub from: String,
    /// Attempted target state name.
    pub to: String,
}
