//! Random tokens for contact verification, admin review and PKCS12 passwords.

use rand_core::{OsRng, RngCore};

/// Token alphabet. Omits characters that are easy to misread (`O`, `o`, `i`,
/// `l`).
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz1234567890";

/// Create a random token of `length` characters drawn from [`ALPHABET`].
///
/// Uses rejection sampling so every character is equally likely.
pub fn create_token(length: usize) -> String {
    let alphabet_len = ALPHABET.len();
    let limit = (256 / alphabet_len) * alphabet_len;
    let mut token = String::with_capacity(length);
    let mut buf = [0u8; 64];
    while token.len() < length {
        OsRng.fill_bytes(&mut buf);
        for &byte in buf.iter() {
            if token.len() == length {
                break;
            }
            if (byte as usize) < limit {
                token.push(ALPHABET[byte as usize % alphabet_len] as char);
            }
        }
    }
    token
}
