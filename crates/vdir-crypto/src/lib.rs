//! # vdir-crypto — Cryptographic Glue
//!
//! Provides the small set of cryptographic operations the directory needs:
//!
//! - **[`SecretBox`]** encrypts PKCS12 passwords at rest with AES-256-GCM and
//!   signs the ciphertext with HMAC-SHA256, both keyed by a SHA-256 of the
//!   server secret.
//! - **[`create_token`]** draws verification tokens and passwords from the OS
//!   random number generator.
//! - **[`extract_certificate`]** unlocks a PKCS12 bundle delivered by the CA
//!   and converts its leaf certificate into a [`vdir_core::Certificate`].
//!
//! ## Crate Policy
//!
//! - Depends only on `vdir-core` internally.
//! - Key material is zeroized on drop.
//! - Tests use real primitives; nothing cryptographic is mocked.

pub mod error;
pub mod pkcs12;
pub mod secret;
pub mod token;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::CryptoError;
pub use pkcs12::{certificate_from_x509, extract_certificate};
pub use secret::SecretBox;
pub use token::create_token;
