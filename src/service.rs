//! Abstract service surface over the governance core
//!
//! Binds the registry, transition engine and action service behind one
//! facade, ready to be wired to whatever transport the surrounding system
//! chooses (RPC, ledger transaction, HTTP).

use std::sync::Arc;

use serde_json::Value;

use pao_common::{ActionId, OrgId, OrgKind, Result};
use pao_governance::{ActionKind, ActionProof, Decision, GovernanceConfig};
use pao_registry::{
    ActionService, ActionState, OrganizationRecord, Registry, TransitionEngine, TransitionId,
};
use pao_storage::{MemoryStorage, Storage};

/// One governance-core instance over a shared storage backend
pub struct PaoService {
    registry: Arc<Registry>,
    transitions: Arc<TransitionEngine>,
    actions: Arc<ActionService>,
}

impl PaoService {
    /// Build a service over an existing storage backend
    pub fn with_storage(storage: Arc<dyn Storage>) -> Self {
        let registry = Arc::new(Registry::new(storage.clone()));
        let transitions = Arc::new(TransitionEngine::new(registry.clone(), storage.clone()));
        let actions = Arc::new(ActionService::new(registry.clone(), storage));
        Self {
            registry,
            transitions,
            actions,
        }
    }

    /// Build a service over fresh in-memory storage
    pub fn in_memory() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()))
    }

    /// Rebuild a service over storage that already holds state, restoring
    /// organizations, in-flight transitions and pending actions
    pub async fn load(storage: Arc<dyn Storage>) -> Result<Self> {
        let registry = Arc::new(Registry::load(storage.clone()).await?);
        let transitions =
            Arc::new(TransitionEngine::load(registry.clone(), storage.clone()).await?);
        let actions = Arc::new(ActionService::load(registry.clone(), storage).await?);
        Ok(Self {
            registry,
            transitions,
            actions,
        })
    }

    /// The underlying registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The underlying transition engine
    pub fn transitions(&self) -> &Arc<TransitionEngine> {
        &self.transitions
    }

    /// The underlying action service
    pub fn actions(&self) -> &Arc<ActionService> {
        &self.actions
    }

    /// Register a new organization
    pub async fn register(
        &self,
        kind: OrgKind,
        parent: Option<OrgId>,
        config: GovernanceConfig,
    ) -> Result<OrgId> {
        self.registry.register(kind, parent, config, None).await
    }

    /// Read-only view of an organization record
    pub fn lookup(&self, id: &OrgId) -> Result<OrganizationRecord> {
        self.registry.lookup(id)
    }

    /// Request a governance migration
    pub async fn begin_transition(
        &self,
        id: &OrgId,
        new_config: GovernanceConfig,
        proof: &ActionProof,
    ) -> Result<TransitionId> {
        self.transitions.begin(id, new_config, proof).await
    }

    /// Commit a staged migration
    pub async fn commit_transition(&self, handle: &TransitionId) -> Result<()> {
        self.transitions.commit(handle).await
    }

    /// Abort an in-flight migration
    pub async fn abort_transition(&self, handle: &TransitionId, reason: &str) -> Result<()> {
        self.transitions.abort(handle, reason).await
    }

    /// Submit an action for asynchronous evaluation
    pub async fn submit_action(
        &self,
        org: &OrgId,
        kind: ActionKind,
        title: &str,
        payload: Value,
        proof: &ActionProof,
    ) -> Result<ActionId> {
        self.actions.submit(org, kind, title, payload, proof).await
    }

    /// Poll the state of a submitted action
    pub async fn action_status(&self, id: &ActionId) -> Result<ActionState> {
        self.actions.status(id).await
    }

    /// Cast a vote on a pending action ballot
    pub async fn cast_vote(&self, id: &ActionId, voter: &str, approve: bool) -> Result<Decision> {
        self.actions.cast_vote(id, voter, approve).await
    }
}
