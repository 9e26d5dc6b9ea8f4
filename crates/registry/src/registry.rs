//! The organization registry
//!
//! Global mapping from organization id to record, and the only authority
//! for creating, freezing and removing organizations. The in-memory arena
//! is the source of truth; every mutation is written through to storage as
//! one JSON record per organization.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use pao_common::{Error, OrgId, OrgKind, OrgStatus, Result};
use pao_governance::GovernanceConfig;
use pao_storage::{JsonStorage, Storage};

use crate::record::OrganizationRecord;

/// Storage key prefix for organization records
const ORGS_PREFIX: &str = "registry/orgs/";

fn org_key(id: &OrgId) -> String {
    format!("{}{}", ORGS_PREFIX, id)
}

/// The global organization registry
pub struct Registry {
    /// Arena of records, indexed by id; per-entry locking serializes
    /// mutations on the same organization
    records: DashMap<OrgId, OrganizationRecord>,
    /// Write-through persistence
    storage: Arc<dyn Storage>,
}

impl Registry {
    /// Create an empty registry over a storage backend
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            records: DashMap::new(),
            storage,
        }
    }

    /// Load a registry, hydrating all persisted organization records
    pub async fn load(storage: Arc<dyn Storage>) -> Result<Self> {
        let registry = Self::new(storage);
        let keys = registry.storage.list(ORGS_PREFIX).await.map_err(Error::from)?;
        for key in keys {
            match registry.storage.get_json::<OrganizationRecord>(&key).await {
                Ok(record) => {
                    registry.records.insert(record.id.clone(), record);
                }
                Err(e) => {
                    warn!(key, error = %e, "skipping unreadable organization record");
                }
            }
        }
        info!(count = registry.records.len(), "registry loaded");
        Ok(registry)
    }

    /// Register a new organization and return its id.
    ///
    /// A PAO carries no parent; an SAO's parent must already exist and be
    /// Active. A caller-supplied id that collides with an existing record
    /// fails with `DuplicateId`; auto-generated ids cannot collide.
    pub async fn register(
        &self,
        kind: OrgKind,
        parent: Option<OrgId>,
        governance: GovernanceConfig,
        explicit_id: Option<OrgId>,
    ) -> Result<OrgId> {
        governance.validate()?;

        match kind {
            OrgKind::Pao => {
                if parent.is_some() {
                    return Err(Error::invalid_parent("a PAO cannot declare a parent"));
                }
                if governance.is_delegated() {
                    return Err(Error::invalid_state(
                        "delegated governance requires a parent organization",
                    ));
                }
            }
            OrgKind::Sao => {
                if parent.is_none() {
                    return Err(Error::invalid_parent("an SAO requires a parent"));
                }
            }
        }

        if let Some(parent_id) = &parent {
            let parent_record = self.records.get(parent_id).ok_or_else(|| {
                Error::invalid_parent(format!("parent {} does not exist", parent_id))
            })?;
            if parent_record.status != OrgStatus::Active {
                return Err(Error::invalid_parent(format!(
                    "parent {} is not active",
                    parent_id
                )));
            }
        }

        let id = explicit_id.unwrap_or_else(OrgId::generate);
        let record = OrganizationRecord::new(id.clone(), kind, parent, governance);

        // Entry-level insert keeps id allocation atomic
        match self.records.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(Error::duplicate_id(format!(
                    "organization {} already exists",
                    id
                )));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record.clone());
            }
        }

        self.persist(&record).await?;
        info!(org = %id, kind = ?kind, "registered organization");
        Ok(id)
    }

    /// Read-only view of an organization record
    pub fn lookup(&self, id: &OrgId) -> Result<OrganizationRecord> {
        self.records
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| Error::not_found(format!("organization {}", id)))
    }

    /// All SAOs whose parent chain includes `id`, directly or transitively
    pub fn list_dependents(&self, id: &OrgId) -> Result<HashSet<OrgId>> {
        if !self.records.contains_key(id) {
            return Err(Error::not_found(format!("organization {}", id)));
        }

        // Snapshot the parent pointers first; walking while holding entry
        // references would hold shard locks across lookups.
        let parents: HashMap<OrgId, Option<OrgId>> = self
            .records
            .iter()
            .map(|r| (r.key().clone(), r.parent.clone()))
            .collect();

        let mut dependents = HashSet::new();
        for (child, _) in parents.iter() {
            if child == id {
                continue;
            }
            let mut current = child.clone();
            // The walk is bounded by the arena size; chains are acyclic by
            // construction since a parent must exist before its children.
            for _ in 0..parents.len() {
                match parents.get(&current).and_then(|p| p.clone()) {
                    Some(parent) => {
                        if &parent == id {
                            dependents.insert(child.clone());
                            break;
                        }
                        current = parent;
                    }
                    None => break,
                }
            }
        }
        Ok(dependents)
    }

    /// Freeze an Active organization; mutating operations fail until thawed
    pub async fn freeze(&self, id: &OrgId) -> Result<()> {
        self.mutate(id, |record| {
            if record.status != OrgStatus::Active {
                return Err(Error::invalid_state(format!(
                    "organization {} is not active",
                    record.id
                )));
            }
            record.status = OrgStatus::Frozen;
            Ok(())
        })
        .await?;
        info!(org = %id, "organization frozen");
        Ok(())
    }

    /// Thaw a Frozen organization back to Active
    pub async fn thaw(&self, id: &OrgId) -> Result<()> {
        self.mutate(id, |record| {
            if record.status != OrgStatus::Frozen {
                return Err(Error::invalid_state(format!(
                    "organization {} is not frozen",
                    record.id
                )));
            }
            record.status = OrgStatus::Active;
            Ok(())
        })
        .await?;
        info!(org = %id, "organization thawed");
        Ok(())
    }

    /// Remove an organization with no remaining dependents.
    ///
    /// Registry-mediated: fails while any SAO depends on `id` or while the
    /// record is not Active.
    pub async fn deregister(&self, id: &OrgId) -> Result<()> {
        let record = self.lookup(id)?;
        if record.status != OrgStatus::Active {
            return Err(Error::invalid_state(format!(
                "organization {} is not active",
                id
            )));
        }
        let dependents = self.list_dependents(id)?;
        if !dependents.is_empty() {
            return Err(Error::invalid_state(format!(
                "organization {} has {} dependent organization(s)",
                id,
                dependents.len()
            )));
        }

        self.records.remove(id);
        self.storage.delete(&org_key(id)).await.map_err(Error::from)?;
        info!(org = %id, "organization deregistered");
        Ok(())
    }

    /// Apply an organization-owned write to the record's `data` payload.
    ///
    /// This is the path governance modules use for their tally sub-records.
    /// Writes are refused while a transition holds the record or while it
    /// is frozen.
    pub async fn update_data<F>(&self, id: &OrgId, f: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, Value>) -> Result<()>,
    {
        self.mutate(id, |record| {
            match record.status {
                OrgStatus::Migrating => {
                    return Err(Error::invalid_state(format!(
                        "organization {} is locked by an in-flight transition",
                        record.id
                    )))
                }
                OrgStatus::Frozen => {
                    return Err(Error::invalid_state(format!(
                        "organization {} is frozen",
                        record.id
                    )))
                }
                OrgStatus::Active => {}
            }
            f(&mut record.data)
        })
        .await
    }

    /// Mutate a record under its entry lock, then write it through.
    ///
    /// The closure runs with the entry held, which is what serializes
    /// status check-and-set against concurrent callers; persistence happens
    /// after the lock is released.
    pub(crate) async fn mutate<T, F>(&self, id: &OrgId, f: F) -> Result<T>
    where
        F: FnOnce(&mut OrganizationRecord) -> Result<T>,
    {
        let (out, snapshot) = {
            let mut entry = self
                .records
                .get_mut(id)
                .ok_or_else(|| Error::not_found(format!("organization {}", id)))?;
            let out = f(entry.value_mut())?;
            entry.updated_at = chrono::Utc::now();
            (out, entry.value().clone())
        };
        self.persist(&snapshot).await?;
        Ok(out)
    }

    async fn persist(&self, record: &OrganizationRecord) -> Result<()> {
        debug!(org = %record.id, version = record.version, "persisting organization record");
        self.storage
            .put_json(&org_key(&record.id), record)
            .await
            .map_err(Error::from)
    }
}
