//! Pluggable governance strategies
//!
//! A governance module decides whether a proposed action is approved for an
//! organization, given the organization's currently bound configuration.
//! Strategies are modeled as a capability-set trait ([`GovernanceModule`])
//! with tagged config variants, not inheritance: new strategies are added by
//! implementing the trait and extending [`GovernanceConfig`].
//!
//! Modules are stateless with respect to the registry. Any in-flight tally
//! state is an opaque sub-record owned by the organization record's `data`
//! payload (see [`tally`]).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use pao_common::utils::timestamp_secs;
use pao_common::{ActionId, Error, OrgId, Result, Signature};

pub mod modules;
pub mod tally;

pub use modules::{module_for, Delegated, DirectSigner, GovernanceModule, ThresholdVoting};
pub use tally::{CastVote, VoteTally};

/// Outcome of a governance evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    /// The action may proceed
    Approved,
    /// The action was declined, with a reason
    Rejected(String),
    /// The outcome is not yet known (e.g. a vote is still open)
    Pending(String),
}

impl Decision {
    /// Whether this decision is terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Decision::Pending(_))
    }
}

/// Kinds of actions an organization can receive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Generic action with an opaque payload
    Generic,
    /// Change to organization-owned configuration data
    ConfigChange,
    /// Domain-specific action kind
    Custom(String),
}

/// An action submitted against an organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Unique identifier for this action
    pub id: ActionId,
    /// The organization the action targets
    pub org: OrgId,
    /// The kind of action
    pub kind: ActionKind,
    /// Short human-readable title
    pub title: String,
    /// Opaque action payload
    pub payload: Value,
    /// Identity of the submitter
    pub submitted_by: String,
    /// Submission time, seconds since the Unix epoch
    pub submitted_at: u64,
}

impl Action {
    /// Create a new action with a fresh id
    pub fn new(
        org: OrgId,
        kind: ActionKind,
        title: &str,
        payload: Value,
        submitted_by: &str,
    ) -> Self {
        Self {
            id: ActionId::generate(),
            org,
            kind,
            title: title.to_string(),
            payload,
            submitted_by: submitted_by.to_string(),
            submitted_at: timestamp_secs(),
        }
    }
}

/// Proof of who is requesting an action
///
/// The core checks the signer against the bound configuration; verifying
/// the signature bytes is a transport/ledger concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionProof {
    /// Identity of the signer
    pub signer: String,
    /// Opaque signature evidence
    pub signature: Signature,
}

impl ActionProof {
    pub fn new(signer: &str, signature: Signature) -> Self {
        Self {
            signer: signer.to_string(),
            signature,
        }
    }

    /// Proof carrying only a signer identity, used in tests and demos
    pub fn unsigned(signer: &str) -> Self {
        Self::new(signer, Signature::empty())
    }
}

/// Parameters of an organization's active governance strategy
///
/// This is the governance-module binding: owned exclusively by the record
/// it is bound to, replaced wholesale on migration and never partially
/// mutated from outside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GovernanceConfig {
    /// A single authority approves directly
    DirectSigner {
        /// Identity whose signature approves actions
        authority: String,
    },
    /// A quorum of weighted voters over a time window
    ThresholdVote {
        /// Eligible voters and their weights
        voters: HashMap<String, f64>,
        /// Fraction of total weight that must participate (0.0 to 1.0]
        quorum: f64,
        /// Fraction of cast weight that must approve (0.0 to 1.0]
        approval_threshold: f64,
        /// Voting window in seconds; 0 means no automatic close
        voting_window_secs: u64,
    },
    /// Defers every decision to the parent organization's module
    Delegated,
}

impl GovernanceConfig {
    /// Whether this binding defers to the parent chain
    pub fn is_delegated(&self) -> bool {
        matches!(self, GovernanceConfig::Delegated)
    }

    /// The voting weight of an eligible voter, if this config votes
    pub fn voter_weight(&self, voter: &str) -> Option<f64> {
        match self {
            GovernanceConfig::ThresholdVote { voters, .. } => voters.get(voter).copied(),
            _ => None,
        }
    }

    /// The voting window, if this config votes
    pub fn voting_window_secs(&self) -> u64 {
        match self {
            GovernanceConfig::ThresholdVote {
                voting_window_secs, ..
            } => *voting_window_secs,
            _ => 0,
        }
    }

    /// Validate the parameters of this binding
    pub fn validate(&self) -> Result<()> {
        match self {
            GovernanceConfig::DirectSigner { authority } => {
                if authority.is_empty() {
                    return Err(Error::validation(
                        "direct-signer config requires a non-empty authority",
                    ));
                }
            }
            GovernanceConfig::ThresholdVote {
                voters,
                quorum,
                approval_threshold,
                ..
            } => {
                if voters.is_empty() {
                    return Err(Error::validation(
                        "threshold-vote config requires at least one voter",
                    ));
                }
                if voters.values().any(|w| *w <= 0.0) {
                    return Err(Error::validation("voter weights must be positive"));
                }
                if !(*quorum > 0.0 && *quorum <= 1.0) {
                    return Err(Error::validation("quorum must be in (0.0, 1.0]"));
                }
                if !(*approval_threshold > 0.0 && *approval_threshold <= 1.0) {
                    return Err(Error::validation(
                        "approval threshold must be in (0.0, 1.0]",
                    ));
                }
            }
            GovernanceConfig::Delegated => {}
        }
        Ok(())
    }
}
