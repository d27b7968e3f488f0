//! # vdir-core — Domain Types for the VASP Directory
//!
//! Defines the records the directory persists and the lifecycle states that
//! drive certificate issuance. Every other crate in the workspace depends on
//! `vdir-core`; it depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype identifiers.** [`VaspId`] and [`CertReqId`] wrap the `u64`
//!    values handed out by the store's sequence. They share one sequence but
//!    are never interchangeable at the type level.
//!
//! 2. **Closed state enums.** [`VerificationState`], [`ServiceState`] and
//!    [`CertificateRequestState`] serialize as `SCREAMING_SNAKE_CASE` and are
//!    matched exhaustively. Certificate request transitions are validated by
//!    [`CertificateRequestState::can_transition_to`].
//!
//! 3. **Record invariants live with the record.** [`Vasp::validate`] and
//!    [`CertificateRequest::validate`] are the single place the store checks
//!    completeness and cross-field invariants before writing.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `vdir-*` crates.
//! - No `.unwrap()` outside tests.

pub mod certreq;
pub mod error;
pub mod identity;
pub mod vasp;

pub use certreq::{CertificateRequest, CertificateRequestState};
pub use error::{TransitionError, ValidationError};
pub use identity::{CertReqId, VaspId};
pub use vasp::{
    normalize_country, normalize_name, Certificate, Contact, Contacts, Name, ServiceState, Vasp,
    VerificationState,
};
