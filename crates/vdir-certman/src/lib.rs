//! # vdir-certman — Certificate Manager
//!
//! A single background worker that moves certificate requests through the
//! external CA's issuance process:
//!
//! ```text
//! READY_TO_SUBMIT ──▶ PROCESSING ──▶ DOWNLOADING ──▶ DOWNLOADED ──▶ COMPLETED
//!                         │
//!                         ├──▶ CR_REJECTED
//!                         └──▶ CR_ERRORED
//! ```
//!
//! Every tick lists the open requests and advances each one step
//! ([`Pipeline::scan`]). A request that becomes ready for download gets its
//! own task; the loop never waits on downloads.
//!
//! ## Restart Safety
//!
//! Each step persists before returning. A request past `READY_TO_SUBMIT` is
//! never resubmitted. A request found in `DOWNLOADING` or `DOWNLOADED`
//! without a running task is resumed; one found in `DOWNLOADED` is completed
//! from the certificate stored on the request, without downloading again.
//!
//! ## Locking
//!
//! The record store is the only shared state. Its lock is taken per store
//! call and never held across a CA or email call.

pub mod archive;
pub mod config;
pub mod error;
pub mod manager;
pub mod pipeline;

pub use archive::ArchiveStore;
pub use config::{CertManConfig, ConfigError};
pub use error::CertManError;
pub use manager::{CertManager, CertManagerHandle};
pub use pipeline::{CheckOutcome, Pipeline, ScanReport};
