//! The governance transition engine
//!
//! Migrates an organization between governance modes. The request itself is
//! an action subject to the organization's existing rules: the currently
//! bound module (or the chain evaluator, for delegated SAOs) must approve
//! its own replacement, which is what prevents a unilateral takeover.
//!
//! Approved requests stage the new config in the transition record and move
//! the organization to `Migrating`; `commit` swaps the binding and bumps
//! `version` in one step, `abort` discards the staged config with `version`
//! untouched. A request that needs a vote never holds `Migrating` across
//! the wait: the record stays Active until the ballot approves.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use pao_common::utils::generate_prefixed_uuid;
use pao_common::{Error, OrgId, OrgStatus, Result};
use pao_governance::{module_for, ActionProof, Decision, GovernanceConfig, VoteTally};
use pao_storage::{JsonStorage, Storage};

use crate::registry::Registry;
use crate::resolve::{resolve_evaluator, DEFAULT_MAX_DEPTH};

/// Storage key prefix for transition records
const TRANSITIONS_PREFIX: &str = "registry/transitions/";

fn transition_key(id: &TransitionId) -> String {
    format!("{}{}", TRANSITIONS_PREFIX, id)
}

/// Handle for an in-flight governance transition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionId(String);

impl TransitionId {
    fn generate() -> Self {
        Self(generate_prefixed_uuid("transition"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a transition record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionState {
    /// The current module's ballot is still open
    PendingApproval,
    /// Approved; new config staged, record held at `Migrating`
    Staged,
    /// Committed; the new config is live
    Committed,
    /// Aborted after staging; nothing changed
    Aborted,
    /// Declined by the current governance module
    Rejected,
}

/// Durable record of one governance transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Unique handle for this transition
    pub id: TransitionId,
    /// The organization being migrated
    pub org: OrgId,
    /// The organization whose module evaluates the request
    pub evaluated_by: OrgId,
    /// The staged configuration; becomes live only on commit
    pub new_config: GovernanceConfig,
    /// Proof supplied with the request
    pub proof: ActionProof,
    /// Current state
    pub state: TransitionState,
    /// Reason for a rejection or abort
    pub reason: Option<String>,
    /// When the request was made
    pub started_at: DateTime<Utc>,
    /// When the transition reached a terminal state
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Orchestrates governance-mode migrations
pub struct TransitionEngine {
    registry: Arc<Registry>,
    storage: Arc<dyn Storage>,
    transitions: RwLock<HashMap<TransitionId, TransitionRecord>>,
    max_depth: usize,
}

impl TransitionEngine {
    pub fn new(registry: Arc<Registry>, storage: Arc<dyn Storage>) -> Self {
        Self {
            registry,
            storage,
            transitions: RwLock::new(HashMap::new()),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Load an engine, rehydrating persisted transition records.
    ///
    /// Required when restarting over durable storage: an organization
    /// persisted as `Migrating` can only be committed or aborted through
    /// its restored transition record.
    pub async fn load(registry: Arc<Registry>, storage: Arc<dyn Storage>) -> Result<Self> {
        let engine = Self::new(registry, storage);
        let keys = engine
            .storage
            .list(TRANSITIONS_PREFIX)
            .await
            .map_err(Error::from)?;
        let mut transitions = engine.transitions.write().await;
        for key in keys {
            match engine.storage.get_json::<TransitionRecord>(&key).await {
                Ok(tx) => {
                    transitions.insert(tx.id.clone(), tx);
                }
                Err(e) => {
                    warn!(key, error = %e, "skipping unreadable transition record");
                }
            }
        }
        info!(count = transitions.len(), "transition engine loaded");
        drop(transitions);
        Ok(engine)
    }

    /// Request a governance migration for an organization.
    ///
    /// The current governance module evaluates the request. Approval stages
    /// the new config and holds the record at `Migrating`; a module that
    /// needs votes leaves the record Active and opens a ballot resolved via
    /// [`cast_approval`](Self::cast_approval) / [`finalize`](Self::finalize).
    pub async fn begin(
        &self,
        org: &OrgId,
        new_config: GovernanceConfig,
        proof: &ActionProof,
    ) -> Result<TransitionId> {
        new_config.validate()?;

        let record = self.registry.lookup(org)?;
        match record.status {
            OrgStatus::Migrating => {
                return Err(Error::transition_in_progress(format!(
                    "organization {} already has a staged transition",
                    org
                )))
            }
            OrgStatus::Frozen => {
                return Err(Error::invalid_state(format!(
                    "organization {} is frozen",
                    org
                )))
            }
            OrgStatus::Active => {}
        }
        if new_config.is_delegated() && record.parent.is_none() {
            return Err(Error::invalid_state(
                "delegated governance requires a parent organization",
            ));
        }

        let evaluator = resolve_evaluator(&self.registry, org, self.max_depth)?;
        let id = TransitionId::generate();

        let mut tx = TransitionRecord {
            id: id.clone(),
            org: org.clone(),
            evaluated_by: evaluator.id.clone(),
            new_config,
            proof: proof.clone(),
            state: TransitionState::PendingApproval,
            reason: None,
            started_at: Utc::now(),
            resolved_at: None,
        };

        // One transition request per organization at a time, pending votes
        // included. Check and reserve under one write lock; two concurrent
        // requests must never both open a ballot, or the loser would later
        // be resolved against rules the winner already replaced.
        {
            let mut transitions = self.transitions.write().await;
            if transitions
                .values()
                .any(|t| t.org == *org && t.state == TransitionState::PendingApproval)
            {
                return Err(Error::transition_in_progress(format!(
                    "organization {} has an open transition ballot",
                    org
                )));
            }
            transitions.insert(id.clone(), tx.clone());
        }

        let module = module_for(&evaluator.governance);
        let decision = match module.evaluate(id.as_str(), proof, &evaluator.data) {
            Ok(decision) => decision,
            Err(e) => {
                self.release(&id).await;
                return Err(e);
            }
        };

        match decision {
            Decision::Approved => {
                if let Err(e) = self.stage(&mut tx).await {
                    self.release(&id).await;
                    return Err(e);
                }
                self.store_tx(&tx).await?;
                info!(org = %org, transition = %id, "transition staged");
                Ok(id)
            }
            Decision::Pending(reason) => {
                let window = evaluator.governance.voting_window_secs();
                let subject = id.as_str().to_string();
                let opened = self
                    .registry
                    .update_data(&evaluator.id, move |data| {
                        VoteTally::open(&subject, window).store(data)
                    })
                    .await;
                if let Err(e) = opened {
                    self.release(&id).await;
                    return Err(e);
                }
                tx.reason = Some(reason);
                self.store_tx(&tx).await?;
                info!(org = %org, transition = %id, "transition ballot opened");
                Ok(id)
            }
            Decision::Rejected(reason) => {
                tx.state = TransitionState::Rejected;
                tx.reason = Some(reason.clone());
                tx.resolved_at = Some(Utc::now());
                self.store_tx(&tx).await?;
                Err(Error::rejected(reason))
            }
        }
    }

    /// Cast a vote on an open transition ballot, then re-evaluate it
    pub async fn cast_approval(
        &self,
        id: &TransitionId,
        voter: &str,
        approve: bool,
    ) -> Result<Decision> {
        let tx = self.get(id).await?;
        if tx.state != TransitionState::PendingApproval {
            return Err(Error::invalid_state(format!(
                "transition {} has no open ballot",
                id
            )));
        }

        let evaluator = self.registry.lookup(&tx.evaluated_by)?;
        let weight = evaluator
            .governance
            .voter_weight(voter)
            .ok_or_else(|| Error::rejected(format!("{} is not an eligible voter", voter)))?;

        let subject = id.as_str().to_string();
        let voter = voter.to_string();
        self.registry
            .update_data(&tx.evaluated_by, move |data| {
                let mut tally = VoteTally::load(data, &subject)?
                    .ok_or_else(|| Error::internal("ballot tally missing"))?;
                tally.record_vote(&voter, approve, weight);
                tally.store(data)
            })
            .await?;

        self.resolve_ballot(id).await
    }

    /// Re-evaluate an open ballot, e.g. after its voting window elapsed
    pub async fn finalize(&self, id: &TransitionId) -> Result<Decision> {
        let tx = self.get(id).await?;
        if tx.state != TransitionState::PendingApproval {
            return Err(Error::invalid_state(format!(
                "transition {} has no open ballot",
                id
            )));
        }
        self.resolve_ballot(id).await
    }

    /// Cancel an open ballot; the organization is left untouched
    pub async fn cancel(&self, id: &TransitionId, reason: &str) -> Result<()> {
        let mut tx = self.get(id).await?;
        if tx.state != TransitionState::PendingApproval {
            return Err(Error::invalid_state(format!(
                "transition {} has no open ballot",
                id
            )));
        }
        self.clear_ballot(&tx.evaluated_by, id.as_str()).await?;
        tx.state = TransitionState::Rejected;
        tx.reason = Some(reason.to_string());
        tx.resolved_at = Some(Utc::now());
        self.store_tx(&tx).await?;
        info!(transition = %id, reason, "transition ballot cancelled");
        Ok(())
    }

    /// Atomically swap the bound config to the staged one.
    ///
    /// `governance`, `version` and `status` flip together under the record's
    /// entry lock; there is no partial state where they disagree.
    pub async fn commit(&self, id: &TransitionId) -> Result<()> {
        let mut tx = self.get(id).await?;
        if tx.state != TransitionState::Staged {
            return Err(Error::invalid_state(format!(
                "transition {} is not staged",
                id
            )));
        }

        let new_config = tx.new_config.clone();
        self.registry
            .mutate(&tx.org, move |record| {
                if record.status != OrgStatus::Migrating {
                    return Err(Error::invalid_state(format!(
                        "organization {} is not migrating",
                        record.id
                    )));
                }
                record.governance = new_config;
                record.version += 1;
                record.status = OrgStatus::Active;
                Ok(())
            })
            .await?;

        tx.state = TransitionState::Committed;
        tx.resolved_at = Some(Utc::now());
        self.store_tx(&tx).await?;
        info!(org = %tx.org, transition = %id, "transition committed");
        Ok(())
    }

    /// Discard a staged or pending transition; `version` is never touched
    pub async fn abort(&self, id: &TransitionId, reason: &str) -> Result<()> {
        let mut tx = self.get(id).await?;
        match tx.state {
            TransitionState::Staged => {
                self.registry
                    .mutate(&tx.org, |record| {
                        if record.status != OrgStatus::Migrating {
                            return Err(Error::invalid_state(format!(
                                "organization {} is not migrating",
                                record.id
                            )));
                        }
                        record.status = OrgStatus::Active;
                        Ok(())
                    })
                    .await?;
            }
            TransitionState::PendingApproval => {
                self.clear_ballot(&tx.evaluated_by, id.as_str()).await?;
            }
            _ => {
                return Err(Error::invalid_state(format!(
                    "transition {} is not in flight",
                    id
                )))
            }
        }

        tx.state = TransitionState::Aborted;
        tx.reason = Some(reason.to_string());
        tx.resolved_at = Some(Utc::now());
        self.store_tx(&tx).await?;
        info!(org = %tx.org, transition = %id, reason, "transition aborted");
        Ok(())
    }

    /// Read-only view of a transition record
    pub async fn transition(&self, id: &TransitionId) -> Result<TransitionRecord> {
        self.get(id).await
    }

    async fn resolve_ballot(&self, id: &TransitionId) -> Result<Decision> {
        let mut tx = self.get(id).await?;
        let evaluator = self.registry.lookup(&tx.evaluated_by)?;
        let module = module_for(&evaluator.governance);
        let decision = module.evaluate(id.as_str(), &tx.proof, &evaluator.data)?;

        match &decision {
            Decision::Approved => {
                // Drop the tally before the record is held at Migrating;
                // organization-owned writes are refused after that.
                self.clear_ballot(&tx.evaluated_by, id.as_str()).await?;
                self.stage(&mut tx).await?;
                self.store_tx(&tx).await?;
                info!(org = %tx.org, transition = %id, "transition ballot approved; staged");
            }
            Decision::Rejected(reason) => {
                self.clear_ballot(&tx.evaluated_by, id.as_str()).await?;
                tx.state = TransitionState::Rejected;
                tx.reason = Some(reason.clone());
                tx.resolved_at = Some(Utc::now());
                self.store_tx(&tx).await?;
                info!(org = %tx.org, transition = %id, reason, "transition ballot rejected");
            }
            Decision::Pending(_) => {
                debug!(transition = %id, "transition ballot still open");
            }
        }
        Ok(decision)
    }

    /// Check-and-set the record to `Migrating`; exactly one concurrent
    /// request can win this.
    async fn stage(&self, tx: &mut TransitionRecord) -> Result<()> {
        self.registry
            .mutate(&tx.org, |record| match record.status {
                OrgStatus::Active => {
                    record.status = OrgStatus::Migrating;
                    Ok(())
                }
                OrgStatus::Migrating => Err(Error::transition_in_progress(format!(
                    "organization {} already has a staged transition",
                    record.id
                ))),
                OrgStatus::Frozen => Err(Error::invalid_state(format!(
                    "organization {} is frozen",
                    record.id
                ))),
            })
            .await?;
        tx.state = TransitionState::Staged;
        Ok(())
    }

    /// Drop a reservation that never reached a durable state
    async fn release(&self, id: &TransitionId) {
        self.transitions.write().await.remove(id);
    }

    /// Remove a concluded ballot's tally from the evaluator's data payload
    async fn clear_ballot(&self, evaluator: &OrgId, subject: &str) -> Result<()> {
        let subject = subject.to_string();
        self.registry
            .update_data(evaluator, move |data| {
                VoteTally::clear(data, &subject);
                Ok(())
            })
            .await
    }

    async fn get(&self, id: &TransitionId) -> Result<TransitionRecord> {
        self.transitions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("transition {}", id)))
    }

    async fn store_tx(&self, tx: &TransitionRecord) -> Result<()> {
        self.storage
            .put_json(&transition_key(&tx.id), tx)
            .await
            .map_err(Error::from)?;
        self.transitions
            .write()
            .await
            .insert(tx.id.clone(), tx.clone());
        Ok(())
    }
}
