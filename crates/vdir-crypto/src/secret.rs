//! # Password Encryption at Rest
//!
//! PKCS12 passwords are generated once, shown to the registrant once, and
//! otherwise only stored encrypted so the cert manager can hand them to the
//! CA and later unlock the delivered bundle.
//!
//! ## Format
//!
//! ```text
//! key        = SHA-256(server secret)
//! ciphertext = nonce (12 bytes) || AES-256-GCM(key, nonce, plaintext)
//! signature  = HMAC-SHA256(key, ciphertext)
//! ```
//!
//! Decryption verifies the signature before opening the ciphertext. A
//! signature mismatch means the server secret differs from the one used at
//! encryption time, which operators must resolve by configuration.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;

/// Symmetric encrypt-then-MAC box keyed by the server secret.
///
/// Custom `Debug` never prints key material.
pub struct SecretBox {
    key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBox")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl SecretBox {
    /// Derive the box key from the server secret.
    pub fn new(secret: &str) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::EmptySecret);
        }
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&digest);
        Ok(Self { key })
    }

    /// Encrypt `plaintext`, returning `(ciphertext, signature)`.
    pub fn encrypt(&self, plaintext: &str) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(self.key.as_slice())
            .map_err(|e| CryptoError::Cipher(e.to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| CryptoError::Cipher(e.to_string()))?;

        let mut ciphertext = Vec::with_capacity(NONCE_LEN + sealed.len());
        ciphertext.extend_from_slice(&nonce);
        ciphertext.extend_from_slice(&sealed);

        let signature = self.sign(&ciphertext)?;
        Ok((ciphertext, signature))
    }

    /// Verify `signature` over `ciphertext` and decrypt it.
    pub fn decrypt(&self, ciphertext: &[u8], signature: &[u8]) -> Result<String, CryptoError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.key.as_slice())
            .map_err(|e| CryptoError::Cipher(e.to_string()))?;
        mac.update(ciphertext);
        mac.verify_slice(signature)
            .map_err(|_| CryptoError::SignatureMismatch)?;

        if ciphertext.len() <= NONCE_LEN {
            return Err(CryptoError::TruncatedCiphertext {
                len: ciphertext.len(),
            });
        }
        let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);

        let cipher = Aes256Gcm::new_from_slice(self.key.as_slice())
            .map_err(|e| CryptoError::Cipher(e.to_string()))?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(nonce), sealed)
                .map_err(|e| CryptoError::Cipher(e.to_string()))?,
        );

        String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::InvalidPlaintext)
    }

    fn sign(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.key.as_slice())
            .map_err(|e| CryptoError::Cipher(e.to_string()))?;
        mac.update(ciphertext);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}
