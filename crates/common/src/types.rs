//! Core identifier and status types shared across the workspace

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::generate_prefixed_uuid;

/// Globally unique, immutable organization identifier
///
/// Assigned once at registration and never reused. Auto-generated ids use
/// a uuid v4 and cannot collide; explicit ids are checked against the
/// registry at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(String);

impl OrgId {
    /// Generate a fresh auto-assigned id
    pub fn generate() -> Self {
        Self(generate_prefixed_uuid("org"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OrgId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for OrgId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a submitted action evaluation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// Generate a fresh action id
    pub fn generate() -> Self {
        Self(generate_prefixed_uuid("action"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of an organization record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrgKind {
    /// Para-autonomous organization: self-governing, no parent
    Pao,
    /// Sub-autonomous organization: actions may require parent approval
    Sao,
}

/// Lifecycle status of an organization record
///
/// `Migrating` doubles as the per-record mutex: any mutating operation must
/// atomically check-and-set this field before proceeding, and clear it on
/// completion or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrgStatus {
    /// Normal operation
    Active,
    /// A governance transition holds the record; no other writes permitted
    Migrating,
    /// Administratively frozen; mutating operations fail
    Frozen,
}

/// An opaque signature carried with a caller proof
///
/// Verification is a collaborator concern (the surrounding transport or
/// ledger); the core treats the bytes as opaque evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    /// An empty placeholder signature
    pub fn empty() -> Self {
        Self(Vec::new())
    }
}
