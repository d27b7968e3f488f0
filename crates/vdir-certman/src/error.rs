//! # Cert Manager Error Types
//!
//! [`CertManError::is_transient`] decides whether a failed step leaves the
//! request where it is for the next tick. Nothing here aborts the worker;
//! the loop logs every error with the request id and carries on.

use thiserror::Error;

use vdir_ca_client::CaError;
use vdir_core::TransitionError;
use vdir_crypto::CryptoError;
use vdir_store::StoreError;

/// Errors from one pipeline step.
#[derive(Error, Debug)]
pub enum CertManError {
    /// No authority reported a strictly positive balance.
    #[error("no authority with available balance out of {authorities} available authorities")]
    NoAuthorityBalance { authorities: usize },

    /// A request that must carry a batch id does not.
    #[error("certificate request {request_id} has no batch id")]
    MissingBatch { request_id: String },

    /// The downloaded archive is not exactly one PKCS12 bundle.
    #[error("malformed certificate archive for batch {batch_id}: {reason}")]
    Archive { batch_id: i64, reason: String },

    /// The stored PKCS12 password could not be decrypted.
    #[error("could not decrypt pkcs12 password: {0}")]
    Password(#[source] CryptoError),

    /// The PKCS12 bundle could not be opened or its certificate read.
    #[error("could not extract certificate: {0}")]
    Extraction(#[source] CryptoError),

    #[error(transparent)]
    Authority(#[from] CaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Archive storage failed.
    #[error("certificate storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl CertManError {
    /// Whether the step may succeed if retried on a later tick.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Authority(e) => e.is_transient(),
            Self::Io(_) => true,
            _ => false,
        }
    }
}
