//! # Sequence Allocator
//!
//! Issues strictly increasing `u64` ids shared by both record kinds. The
//! incremented value is written to the backend before it is returned, so a
//! crash can burn an id but never hand out the same id twice.

use crate::backend::{BatchOp, KvBackend};
use crate::error::StoreError;
use crate::keys::SEQUENCE_KEY;

/// In-memory mirror of the persisted counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequence {
    current: u64,
}

impl Sequence {
    /// Load the counter. A missing key is a fresh store and starts at zero.
    pub fn load(backend: &dyn KvBackend) -> Result<Self, StoreError> {
        let current = match backend.get(SEQUENCE_KEY)? {
            None => 0,
            Some(raw) => {
                let bytes: [u8; 8] = raw.as_slice().try_into().map_err(|_| {
                    StoreError::CorruptedSequence(format!(
                        "expected 8 bytes, found {}",
                        raw.len()
                    ))
                })?;
                u64::from_be_bytes(bytes)
            }
        };
        Ok(Self { current })
    }

    /// The last issued id (zero when none has been issued).
    pub fn current(&self) -> u64 {
        self.current
    }

    /// Persist and return the next id.
    pub fn next(&mut self, backend: &dyn KvBackend) -> Result<u64, StoreError> {
        let next = self
            .current
            .checked_add(1)
            .ok_or_else(|| StoreError::CorruptedSequence("sequence exhausted".into()))?;
        backend.write_batch(vec![BatchOp::Put(
            SEQUENCE_KEY.to_vec(),
            next.to_be_bytes().to_vec(),
        )])?;
        self.current = next;
        Ok(next)
    }
}
