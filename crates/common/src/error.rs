//! Error types for the PAO governance core

use thiserror::Error;
use std::result;

/// Common result type used throughout the workspace
pub type Result<T> = result::Result<T, Error>;

/// Common error type for governance-core operations
///
/// Every variant is a recoverable, caller-visible outcome. A failed
/// operation on one organization never affects any other record, and the
/// core never retries on the caller's behalf.
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown organization, transition or action id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Dependency rule violation at registration time
    #[error("Invalid parent: {0}")]
    InvalidParent(String),

    /// Operation not valid for the record's current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A concurrent mutation already holds the record
    #[error("Transition in progress: {0}")]
    TransitionInProgress(String),

    /// The bound governance module declined the action
    #[error("Rejected by governance: {0}")]
    Rejected(String),

    /// Delegation chain walk exceeded the configured maximum depth
    #[error("Dependency depth exceeded: {0}")]
    DepthExceeded(String),

    /// Caller-supplied id collides with an existing record
    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    /// Invalid configuration or input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Error in the storage layer
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a new invalid parent error
    pub fn invalid_parent<S: Into<String>>(msg: S) -> Self {
        Error::InvalidParent(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Create a new transition-in-progress error
    pub fn transition_in_progress<S: Into<String>>(msg: S) -> Self {
        Error::TransitionInProgress(msg.into())
    }

    /// Create a new rejection error
    pub fn rejected<S: Into<String>>(msg: S) -> Self {
        Error::Rejected(msg.into())
    }

    /// Create a new depth exceeded error
    pub fn depth_exceeded<S: Into<String>>(msg: S) -> Self {
        Error::DepthExceeded(msg.into())
    }

    /// Create a new duplicate id error
    pub fn duplicate_id<S: Into<String>>(msg: S) -> Self {
        Error::DuplicateId(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a new serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Error::Serialization(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }
}
