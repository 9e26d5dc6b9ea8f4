//! Shared foundation for the PAO governance core
//!
//! This crate provides the error taxonomy, identifier and status types,
//! and the logging/timestamp utilities used by every other crate in the
//! workspace.

pub mod error;
pub mod logging;
pub mod types;
pub mod utils;

pub use error::{Error, Result};
pub use types::{ActionId, OrgId, OrgKind, OrgStatus, Signature};
