//! In-flight vote tallies
//!
//! A tally is the mutable state of one open ballot (an action or a
//! governance transition awaiting votes). It lives as an opaque sub-record
//! inside the owning organization record's `data` payload, keyed by the
//! ballot's subject id, so that no module state exists outside the record
//! that owns it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use pao_common::utils::timestamp_secs;
use pao_common::{Error, Result};

/// A single cast vote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastVote {
    /// Whether the voter approved
    pub approve: bool,
    /// The voter's weight at cast time
    pub weight: f64,
    /// When the vote was cast, seconds since the Unix epoch
    pub cast_at: u64,
}

/// Tally state for one open ballot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteTally {
    /// The ballot this tally belongs to (action or transition id)
    pub subject: String,
    /// When the ballot opened
    pub opened_at: u64,
    /// Voting window in seconds; 0 means no automatic close
    pub window_secs: u64,
    /// Latest vote per voter
    pub votes: HashMap<String, CastVote>,
}

impl VoteTally {
    /// Open a fresh tally for a ballot
    pub fn open(subject: &str, window_secs: u64) -> Self {
        Self {
            subject: subject.to_string(),
            opened_at: timestamp_secs(),
            window_secs,
            votes: HashMap::new(),
        }
    }

    /// The `data` key a ballot's tally is stored under
    pub fn data_key(subject: &str) -> String {
        format!("governance/tally/{}", subject)
    }

    /// Record a vote; a voter's later vote replaces their earlier one
    pub fn record_vote(&mut self, voter: &str, approve: bool, weight: f64) {
        self.votes.insert(
            voter.to_string(),
            CastVote {
                approve,
                weight,
                cast_at: timestamp_secs(),
            },
        );
    }

    /// Total weight of approving votes
    pub fn yes_weight(&self) -> f64 {
        self.votes
            .values()
            .filter(|v| v.approve)
            .map(|v| v.weight)
            .sum()
    }

    /// Total weight of rejecting votes
    pub fn no_weight(&self) -> f64 {
        self.votes
            .values()
            .filter(|v| !v.approve)
            .map(|v| v.weight)
            .sum()
    }

    /// Whether the voting window has elapsed
    pub fn window_closed(&self, now: u64) -> bool {
        self.window_secs > 0 && now >= self.opened_at + self.window_secs
    }

    /// Load a ballot's tally from an organization's `data` payload
    pub fn load(data: &HashMap<String, Value>, subject: &str) -> Result<Option<VoteTally>> {
        match data.get(&Self::data_key(subject)) {
            Some(value) => {
                let tally = serde_json::from_value(value.clone())
                    .map_err(|e| Error::serialization(e.to_string()))?;
                Ok(Some(tally))
            }
            None => Ok(None),
        }
    }

    /// Store this tally back into an organization's `data` payload
    pub fn store(&self, data: &mut HashMap<String, Value>) -> Result<()> {
        let value =
            serde_json::to_value(self).map_err(|e| Error::serialization(e.to_string()))?;
        data.insert(Self::data_key(&self.subject), value);
        Ok(())
    }

    /// Remove a concluded ballot's tally; the `data` payload must not keep
    /// growing with every ballot ever held
    pub fn clear(data: &mut HashMap<String, Value>, subject: &str) {
        data.remove(&Self::data_key(subject));
    }
}
