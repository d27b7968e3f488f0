//! # Cryptographic Error Types

use thiserror::Error;

/// Errors from password encryption and certificate extraction.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The server secret used to derive keys is empty.
    #[error("secret key must not be empty")]
    EmptySecret,

    /// AES-GCM sealing or opening failed.
    #[error("cipher error: {0}")]
    Cipher(String),

    /// Ciphertext is shorter than the nonce prefix.
    #[error("ciphertext too short: {len} bytes")]
    TruncatedCiphertext { len: usize },

    /// The HMAC over the ciphertext does not match.
    ///
    /// Usually means the server secret changed since the value was stored.
    #[error("ciphertext signature mismatch")]
    SignatureMismatch,

    /// Decrypted bytes are not valid UTF-8.
    #[error("decrypted value is not valid UTF-8")]
    InvalidPlaintext,

    /// The PKCS12 bundle could not be parsed or unlocked.
    #[error("PKCS12 error: {0}")]
    Pkcs12(String),

    /// A field of the X.509 certificate could not be read.
    #[error("certificate error: {0}")]
    Certificate(String),
}

impl From<openssl::error::ErrorStack> for CryptoError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        Self::Certificate(err.to_string())
    }
}
