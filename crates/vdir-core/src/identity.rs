//! # Record Identifiers
//!
//! Newtype wrappers for the two record kinds the directory stores. Both are
//! allocated from the same persisted sequence, so an id is unique across
//! kinds, but the types keep a certificate request id from being used to
//! fetch a VASP.
//!
//! The value `0` is never issued by the sequence and marks a record that has
//! not been created yet.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Identifier of a registered VASP.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VaspId(pub u64);

/// Identifier of a certificate request.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CertReqId(pub u64);

impl VaspId {
    /// The placeholder id carried by a record before the store assigns one.
    pub const UNASSIGNED: VaspId = VaspId(0);

    /// Whether the store has assigned this id.
    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }

    /// The raw sequence value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl CertReqId {
    /// The placeholder id carried by a request before the store assigns one.
    pub const UNASSIGNED: CertReqId = CertReqId(0);

    /// Whether the store has assigned this id.
    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }

    /// The raw sequence value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for VaspId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for CertReqId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn parse_id(field: &'static str, s: &str) -> Result<u64, ValidationError> {
    let value: u64 = s.trim().parse().map_err(|e| ValidationError::InvalidField {
        field,
        reason: format!("{e}"),
    })?;
    if value == 0 {
        return Err(ValidationError::InvalidField {
            field,
            reason: "id must be positive".into(),
        });
    }
    Ok(value)
}

impl FromStr for VaspId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_id("id", s).map(VaspId)
    }
}

impl FromStr for CertReqId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_id("id", s).map(CertReqId)
    }
}
