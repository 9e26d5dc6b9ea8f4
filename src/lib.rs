//! PAO governance core
//!
//! A governance-registry and state-transition engine for para-autonomous
//! organizations: organizations can change their governance model over time
//! without losing identity or history, and one organization's actions can
//! be gated by another's governance decision.

/// Module version information
pub mod version {
    /// The current version of the library
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Re-export core components for easy access
pub mod core {
    pub use pao_common as common;
    pub use pao_storage as storage;
}

/// Re-export system components
pub mod systems {
    pub use pao_governance as governance;
    pub use pao_registry as registry;
}

mod service;

pub use service::PaoService;

// Convenience re-exports of the types most callers touch
pub use pao_common::{ActionId, Error, OrgId, OrgKind, OrgStatus, Result, Signature};
pub use pao_governance::{
    Action, ActionKind, ActionProof, Decision, GovernanceConfig,
};
pub use pao_registry::{
    ActionRecord, ActionService, ActionState, OrganizationRecord, Registry, TransitionEngine,
    TransitionId, TransitionRecord, TransitionState,
};
