//! Organization registry and state-transition engine
//!
//! This crate is the authority for organization identity and governance
//! state:
//!
//! - [`Registry`] maps organization ids to their records and mediates
//!   creation, freezing and removal.
//! - [`TransitionEngine`] migrates a record between governance modes,
//!   swapping the bound config atomically while the record's `data`
//!   payload survives untouched.
//! - [`resolve_evaluator`] walks an SAO's parent chain to the first
//!   non-delegated level, bounded by a maximum depth.
//! - [`ActionService`] runs the asynchronous action state machine
//!   (Submitted, Evaluating, then Approved/Rejected/Pending).
//!
//! Each record is an independently lockable resource: operations on
//! different ids proceed without coordination, and operations on the same
//! id are serialized through the record's `status` field.

pub mod actions;
pub mod record;
pub mod registry;
pub mod resolve;
pub mod transition;

pub use actions::{ActionRecord, ActionService, ActionState};
pub use record::OrganizationRecord;
pub use registry::Registry;
pub use resolve::{resolve_evaluator, DEFAULT_MAX_DEPTH};
pub use transition::{TransitionEngine, TransitionId, TransitionRecord, TransitionState};
