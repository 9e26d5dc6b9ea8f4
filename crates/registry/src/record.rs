//! Persistent organization records

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use pao_common::{OrgId, OrgKind, OrgStatus};
use pao_governance::GovernanceConfig;

/// Persistent identity and state container for one organization
///
/// The `id` is immutable for the lifetime of the record. A governance
/// transition replaces `governance`, bumps `version` and toggles `status`;
/// it never touches `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationRecord {
    /// Globally unique, immutable identifier
    pub id: OrgId,
    /// Whether this is a PAO or an SAO
    pub kind: OrgKind,
    /// Parent organization; present iff `kind` is SAO
    pub parent: Option<OrgId>,
    /// The currently bound governance configuration
    pub governance: GovernanceConfig,
    /// Opaque organization-owned payload; survives every transition
    pub data: HashMap<String, Value>,
    /// Bumped on every committed transition, never decremented
    pub version: u64,
    /// Lifecycle status, doubling as the per-record mutex
    pub status: OrgStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl OrganizationRecord {
    /// Create a fresh Active record at version 0
    pub fn new(
        id: OrgId,
        kind: OrgKind,
        parent: Option<OrgId>,
        governance: GovernanceConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            parent,
            governance,
            data: HashMap::new(),
            version: 0,
            status: OrgStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the record accepts mutating operations
    pub fn is_active(&self) -> bool {
        self.status == OrgStatus::Active
    }
}
