//! # vdir-ca-client — Certificate Authority Client
//!
//! Gateway to the external certificate authority that issues member TLS
//! certificates. The authority works in *batches*: a batch is submitted
//! against an *authority* (an issuing profile with a prepaid balance), is
//! processed asynchronously, and once ready is downloaded as a ZIP archive
//! holding a password-protected PKCS12 bundle.
//!
//! ## Capabilities
//!
//! [`CertAuthority`] is the seam the cert manager and CLI program against:
//!
//! | Operation | Purpose |
//! |-----------|---------|
//! | `authenticate` | Obtain fresh credentials |
//! | `list_authorities` | Authorities available to the account |
//! | `authority_balance` | Remaining certificates on an authority |
//! | `submit_batch` | Request a single certificate |
//! | `batch_detail` | Batch status and reject reason |
//! | `processing_status` | Active/failed/success counts |
//! | `download_batch` | Fetch the issued archive |
//!
//! Two implementations ship: [`HttpCertAuthority`] speaks the vendor REST
//! API and [`MockCertAuthority`] scripts responses in memory for tests and
//! local development.
//!
//! ## Status Decoding
//!
//! Vendor batch status strings are decoded once, at this boundary, into the
//! closed [`BatchStatus`] enum. Callers never compare raw strings.
//!
//! ## Errors
//!
//! [`CaError::is_transient`] separates network failures, timeouts and 5xx
//! responses (retry on the next tick) from everything else.

pub mod authority;
pub mod config;
pub mod error;
pub mod http;
pub mod mock;
pub(crate) mod retry;

pub use authority::{Authority, BatchParams, BatchResponse, BatchStatus, CertAuthority, ProcessingInfo};
pub use config::{ConfigError, SectigoConfig};
pub use error::CaError;
pub use http::HttpCertAuthority;
pub use mock::{MockCertAuthority, SubmittedBatch};
