//! Key encoding for the persisted layout.
//!
//! Record ids are encoded big-endian so that a prefix scan returns records
//! in id order.

use vdir_core::{CertReqId, VaspId};

pub const VASP_PREFIX: &[u8] = b"vasp:";
pub const CERTREQ_PREFIX: &[u8] = b"certreq:";
pub const SEQUENCE_KEY: &[u8] = b"sequence";
pub const INDEX_PREFIX: &[u8] = b"index:";
pub const NAMES_PREFIX: &[u8] = b"index:names:";
pub const COMMON_NAMES_PREFIX: &[u8] = b"index:common_names:";
pub const COUNTRIES_PREFIX: &[u8] = b"index:countries:";

fn with_prefix(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + suffix.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(suffix);
    key
}

pub fn vasp_key(id: VaspId) -> Vec<u8> {
    with_prefix(VASP_PREFIX, &id.get().to_be_bytes())
}

pub fn certreq_key(id: CertReqId) -> Vec<u8> {
    with_prefix(CERTREQ_PREFIX, &id.get().to_be_bytes())
}

pub fn name_index_key(normalized: &str) -> Vec<u8> {
    with_prefix(NAMES_PREFIX, normalized.as_bytes())
}

pub fn common_name_index_key(normalized: &str) -> Vec<u8> {
    with_prefix(COMMON_NAMES_PREFIX, normalized.as_bytes())
}

pub fn country_index_key(code: &str) -> Vec<u8> {
    with_prefix(COUNTRIES_PREFIX, code.as_bytes())
}

/// Decode the id suffix of a `vasp:` or `certreq:` key.
pub fn decode_id(prefix: &[u8], key: &[u8]) -> Option<u64> {
    let suffix = key.strip_prefix(prefix)?;
    let bytes: [u8; 8] = suffix.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Human-readable rendering of a key for errors and logs.
pub fn display_key(key: &[u8]) -> String {
    if let Some(id) = decode_id(VASP_PREFIX, key) {
        return format!("vasp:{id}");
    }
    if let Some(id) = decode_id(CERTREQ_PREFIX, key) {
        return format!("certreq:{id}");
    }
    String::from_utf8_lossy(key).into_owned()
}
