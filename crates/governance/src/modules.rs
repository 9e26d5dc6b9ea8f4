//! Reference governance modules
//!
//! Three strategies ship with the core: direct-signer (a single authority
//! approves), threshold-vote (weighted quorum over a window) and delegated
//! (defers wholesale to the parent chain). Each module evaluates a ballot
//! subject against the caller proof and the owning record's `data` payload
//! and returns a [`Decision`]; modules hold no state of their own.

use std::collections::HashMap;
use std::fmt::Debug;

use serde_json::Value;
use tracing::debug;

use pao_common::utils::timestamp_secs;
use pao_common::{Error, Result};

use crate::tally::VoteTally;
use crate::{ActionProof, Decision, GovernanceConfig};

/// A pluggable governance strategy
pub trait GovernanceModule: Send + Sync + Debug {
    /// Evaluate a ballot subject (an action or transition id) against this
    /// module's policy.
    ///
    /// `data` is the evaluating organization's opaque payload; modules that
    /// tally votes read their sub-record from it and nothing else.
    fn evaluate(
        &self,
        subject: &str,
        proof: &ActionProof,
        data: &HashMap<String, Value>,
    ) -> Result<Decision>;
}

/// Instantiate the module bound by a governance config
pub fn module_for(config: &GovernanceConfig) -> Box<dyn GovernanceModule> {
    match config {
        GovernanceConfig::DirectSigner { authority } => Box::new(DirectSigner {
            authority: authority.clone(),
        }),
        GovernanceConfig::ThresholdVote {
            voters,
            quorum,
            approval_threshold,
            voting_window_secs,
        } => Box::new(ThresholdVoting {
            voters: voters.clone(),
            quorum: *quorum,
            approval_threshold: *approval_threshold,
            voting_window_secs: *voting_window_secs,
        }),
        GovernanceConfig::Delegated => Box::new(Delegated),
    }
}

/// A single authority approves or rejects directly
#[derive(Debug, Clone)]
pub struct DirectSigner {
    authority: String,
}

impl DirectSigner {
    pub fn new(authority: &str) -> Self {
        Self {
            authority: authority.to_string(),
        }
    }
}

impl GovernanceModule for DirectSigner {
    fn evaluate(
        &self,
        _subject: &str,
        proof: &ActionProof,
        _data: &HashMap<String, Value>,
    ) -> Result<Decision> {
        if proof.signer == self.authority {
            Ok(Decision::Approved)
        } else {
            Ok(Decision::Rejected(format!(
                "signer {} is not the bound authority",
                proof.signer
            )))
        }
    }
}

/// Weighted quorum voting over a time window
///
/// Approval is measured against cast weight once the ballot closes, and
/// against total eligible weight before that, so an early outcome cannot be
/// flipped by votes still outstanding.
#[derive(Debug, Clone)]
pub struct ThresholdVoting {
    pub(crate) voters: HashMap<String, f64>,
    pub(crate) quorum: f64,
    pub(crate) approval_threshold: f64,
    pub(crate) voting_window_secs: u64,
}

impl GovernanceModule for ThresholdVoting {
    fn evaluate(
        &self,
        subject: &str,
        _proof: &ActionProof,
        data: &HashMap<String, Value>,
    ) -> Result<Decision> {
        let tally = match VoteTally::load(data, subject)? {
            Some(tally) => tally,
            None => {
                return Ok(Decision::Pending(format!(
                    "ballot open; 0 of {} voters have cast ballots",
                    self.voters.len()
                )))
            }
        };

        let total_weight: f64 = self.voters.values().sum();
        let yes = tally.yes_weight();
        let no = tally.no_weight();
        let participation = (yes + no) / total_weight;

        let everyone_voted = tally.votes.len() >= self.voters.len();
        let closed = everyone_voted || tally.window_closed(timestamp_secs());

        debug!(
            subject,
            yes, no, participation, closed, "tallying threshold-vote ballot"
        );

        if closed {
            if participation + f64::EPSILON < self.quorum {
                return Ok(Decision::Rejected(format!(
                    "quorum not reached: {:.2} of {:.2} required participation",
                    participation, self.quorum
                )));
            }
            let approval = if yes + no > 0.0 { yes / (yes + no) } else { 0.0 };
            if approval + f64::EPSILON >= self.approval_threshold {
                Ok(Decision::Approved)
            } else {
                Ok(Decision::Rejected(format!(
                    "approval threshold not met: {:.2} of {:.2} required",
                    approval, self.approval_threshold
                )))
            }
        } else if participation + f64::EPSILON >= self.quorum
            && yes / total_weight + f64::EPSILON >= self.approval_threshold
        {
            // Enough yes weight that outstanding votes cannot change the outcome
            Ok(Decision::Approved)
        } else if no / total_weight > 1.0 - self.approval_threshold + f64::EPSILON {
            // Approval threshold can no longer be met even if everyone else approves
            Ok(Decision::Rejected(
                "approval threshold can no longer be met".to_string(),
            ))
        } else {
            Ok(Decision::Pending(format!(
                "ballot open; {} of {} voters have cast ballots",
                tally.votes.len(),
                self.voters.len()
            )))
        }
    }
}

/// Defers every decision to the parent chain
///
/// The dependency resolver skips past delegated bindings; evaluating one
/// directly means the chain was never resolved, which is a caller error.
#[derive(Debug, Clone)]
pub struct Delegated;

impl GovernanceModule for Delegated {
    fn evaluate(
        &self,
        _subject: &str,
        _proof: &ActionProof,
        _data: &HashMap<String, Value>,
    ) -> Result<Decision> {
        Err(Error::invalid_state(
            "delegated governance has no local evaluator; resolve through the parent chain",
        ))
    }
}
