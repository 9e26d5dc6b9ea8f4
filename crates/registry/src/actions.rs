//! Asynchronous action evaluation
//!
//! An action submitted against an organization runs the state machine
//! Submitted, Evaluating, then Approved/Rejected/Pending. A Pending action
//! releases the record and is concluded later by an explicit vote,
//! finalize or cancel call; it can never return to Submitted.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use pao_common::{ActionId, Error, OrgId, OrgStatus, Result};
use pao_governance::{
    module_for, Action, ActionKind, ActionProof, Decision, VoteTally,
};
use pao_storage::{JsonStorage, Storage};

use crate::registry::Registry;
use crate::resolve::{resolve_evaluator, DEFAULT_MAX_DEPTH};

/// Storage key prefix for action records
const ACTIONS_PREFIX: &str = "actions/";

fn action_key(id: &ActionId) -> String {
    format!("{}{}", ACTIONS_PREFIX, id)
}

/// State of an action evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionState {
    /// Accepted, not yet routed to an evaluator
    Submitted,
    /// An evaluator is deciding
    Evaluating,
    /// Terminal: the action may proceed
    Approved,
    /// Terminal: the action was declined
    Rejected,
    /// A ballot is open; concluded by vote, finalize or cancel
    Pending,
}

/// Durable record of one action evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    /// The action id
    pub id: ActionId,
    /// The organization the action was submitted to
    pub org: OrgId,
    /// The organization whose module evaluated it (after resolution)
    pub evaluated_by: Option<OrgId>,
    /// The submitted action
    pub action: Action,
    /// Proof supplied at submission
    pub proof: ActionProof,
    /// Current state
    pub state: ActionState,
    /// Reason attached to a rejection or pending outcome
    pub reason: Option<String>,
    /// Submission time
    pub submitted_at: DateTime<Utc>,
    /// When a terminal state was reached
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Routes submitted actions through the dependency chain and tracks their
/// evaluation state
pub struct ActionService {
    registry: Arc<Registry>,
    storage: Arc<dyn Storage>,
    actions: RwLock<HashMap<ActionId, ActionRecord>>,
    max_depth: usize,
}

impl ActionService {
    pub fn new(registry: Arc<Registry>, storage: Arc<dyn Storage>) -> Self {
        Self::with_max_depth(registry, storage, DEFAULT_MAX_DEPTH)
    }

    /// Override the delegation-depth cap
    pub fn with_max_depth(
        registry: Arc<Registry>,
        storage: Arc<dyn Storage>,
        max_depth: usize,
    ) -> Self {
        Self {
            registry,
            storage,
            actions: RwLock::new(HashMap::new()),
            max_depth,
        }
    }

    /// Load a service, rehydrating persisted action records so pending
    /// ballots survive a restart
    pub async fn load(registry: Arc<Registry>, storage: Arc<dyn Storage>) -> Result<Self> {
        let service = Self::new(registry, storage);
        let keys = service
            .storage
            .list(ACTIONS_PREFIX)
            .await
            .map_err(Error::from)?;
        let mut actions = service.actions.write().await;
        for key in keys {
            match service.storage.get_json::<ActionRecord>(&key).await {
                Ok(entry) => {
                    actions.insert(entry.id.clone(), entry);
                }
                Err(e) => {
                    warn!(key, error = %e, "skipping unreadable action record");
                }
            }
        }
        info!(count = actions.len(), "action service loaded");
        drop(actions);
        Ok(service)
    }

    /// Submit an action for evaluation and return its id.
    ///
    /// The result is asynchronous: poll [`status`](Self::status). A chain
    /// that exceeds the depth cap records the action as Rejected rather
    /// than failing the submission.
    pub async fn submit(
        &self,
        org: &OrgId,
        kind: ActionKind,
        title: &str,
        payload: Value,
        proof: &ActionProof,
    ) -> Result<ActionId> {
        let record = self.registry.lookup(org)?;
        if record.status == OrgStatus::Frozen {
            return Err(Error::invalid_state(format!(
                "organization {} is frozen",
                org
            )));
        }

        let action = Action::new(org.clone(), kind, title, payload, &proof.signer);
        let id = action.id.clone();
        let mut entry = ActionRecord {
            id: id.clone(),
            org: org.clone(),
            evaluated_by: None,
            action,
            proof: proof.clone(),
            state: ActionState::Submitted,
            reason: None,
            submitted_at: Utc::now(),
            resolved_at: None,
        };
        debug!(org = %org, action = %id, "action submitted");

        entry.state = ActionState::Evaluating;
        let evaluator = match resolve_evaluator(&self.registry, org, self.max_depth) {
            Ok(evaluator) => evaluator,
            Err(Error::DepthExceeded(msg)) => {
                entry.state = ActionState::Rejected;
                entry.reason = Some(msg);
                entry.resolved_at = Some(Utc::now());
                self.store(&entry).await?;
                info!(org = %org, action = %id, "action rejected: delegation depth exceeded");
                return Ok(id);
            }
            Err(e) => return Err(e),
        };
        entry.evaluated_by = Some(evaluator.id.clone());

        let module = module_for(&evaluator.governance);
        let decision = module.evaluate(id.as_str(), proof, &evaluator.data)?;
        match decision {
            Decision::Approved => {
                entry.state = ActionState::Approved;
                entry.resolved_at = Some(Utc::now());
                info!(org = %org, action = %id, evaluator = %evaluator.id, "action approved");
            }
            Decision::Rejected(reason) => {
                entry.state = ActionState::Rejected;
                entry.reason = Some(reason);
                entry.resolved_at = Some(Utc::now());
                info!(org = %org, action = %id, evaluator = %evaluator.id, "action rejected");
            }
            Decision::Pending(reason) => {
                let window = evaluator.governance.voting_window_secs();
                let subject = id.as_str().to_string();
                self.registry
                    .update_data(&evaluator.id, move |data| {
                        VoteTally::open(&subject, window).store(data)
                    })
                    .await?;
                entry.state = ActionState::Pending;
                entry.reason = Some(reason);
                info!(org = %org, action = %id, evaluator = %evaluator.id, "action ballot opened");
            }
        }

        self.store(&entry).await?;
        Ok(id)
    }

    /// Current state of an action
    pub async fn status(&self, id: &ActionId) -> Result<ActionState> {
        Ok(self.get(id).await?.state)
    }

    /// Full view of an action record
    pub async fn record(&self, id: &ActionId) -> Result<ActionRecord> {
        self.get(id).await
    }

    /// Cast a vote on a Pending action, then re-evaluate it
    pub async fn cast_vote(&self, id: &ActionId, voter: &str, approve: bool) -> Result<Decision> {
        let entry = self.get(id).await?;
        if entry.state != ActionState::Pending {
            return Err(Error::invalid_state(format!(
                "action {} has no open ballot",
                id
            )));
        }
        let evaluated_by = entry
            .evaluated_by
            .clone()
            .ok_or_else(|| Error::internal("pending action has no evaluator"))?;

        let evaluator = self.registry.lookup(&evaluated_by)?;
        let weight = evaluator
            .governance
            .voter_weight(voter)
            .ok_or_else(|| Error::rejected(format!("{} is not an eligible voter", voter)))?;

        let subject = id.as_str().to_string();
        let voter = voter.to_string();
        self.registry
            .update_data(&evaluated_by, move |data| {
                let mut tally = VoteTally::load(data, &subject)?
                    .ok_or_else(|| Error::internal("ballot tally missing"))?;
                tally.record_vote(&voter, approve, weight);
                tally.store(data)
            })
            .await?;

        self.resolve_ballot(id).await
    }

    /// Re-evaluate a Pending action, e.g. after its voting window elapsed
    pub async fn finalize(&self, id: &ActionId) -> Result<Decision> {
        let entry = self.get(id).await?;
        if entry.state != ActionState::Pending {
            return Err(Error::invalid_state(format!(
                "action {} has no open ballot",
                id
            )));
        }
        self.resolve_ballot(id).await
    }

    /// Cancel a Pending action; modeled as a transition to Rejected
    pub async fn cancel(&self, id: &ActionId, reason: &str) -> Result<()> {
        let mut entry = self.get(id).await?;
        if entry.state != ActionState::Pending {
            return Err(Error::invalid_state(format!(
                "action {} has no open ballot",
                id
            )));
        }
        if let Some(evaluated_by) = entry.evaluated_by.clone() {
            self.clear_ballot(&evaluated_by, id.as_str()).await?;
        }
        entry.state = ActionState::Rejected;
        entry.reason = Some(reason.to_string());
        entry.resolved_at = Some(Utc::now());
        self.store(&entry).await?;
        info!(action = %id, reason, "action cancelled");
        Ok(())
    }

    async fn resolve_ballot(&self, id: &ActionId) -> Result<Decision> {
        let mut entry = self.get(id).await?;
        let evaluated_by = entry
            .evaluated_by
            .clone()
            .ok_or_else(|| Error::internal("pending action has no evaluator"))?;
        let evaluator = self.registry.lookup(&evaluated_by)?;
        let module = module_for(&evaluator.governance);
        let decision = module.evaluate(id.as_str(), &entry.proof, &evaluator.data)?;

        match &decision {
            Decision::Approved => {
                self.clear_ballot(&evaluated_by, id.as_str()).await?;
                entry.state = ActionState::Approved;
                entry.resolved_at = Some(Utc::now());
                self.store(&entry).await?;
                info!(action = %id, "action ballot approved");
            }
            Decision::Rejected(reason) => {
                self.clear_ballot(&evaluated_by, id.as_str()).await?;
                entry.state = ActionState::Rejected;
                entry.reason = Some(reason.clone());
                entry.resolved_at = Some(Utc::now());
                self.store(&entry).await?;
                info!(action = %id, reason, "action ballot rejected");
            }
            Decision::Pending(_) => {
                debug!(action = %id, "action ballot still open");
            }
        }
        Ok(decision)
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

    async fn get(&self, id: &ActionId) -> Result<ActionRecord> {
        self.actions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("action {}", id)))
    }

    async fn store(&self, entry: &ActionRecord) -> Result<()> {
        self.storage
            .put_json(&action_key(&entry.id), entry)
            .await
            .map_err(Error::from)?;
        self.actions
            .write()
            .await
            .insert(entry.id.clone(), entry.clone());
        Ok(())
    }
}
