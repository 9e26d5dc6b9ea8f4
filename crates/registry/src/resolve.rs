//! Dependency-chain resolution
//!
//! When an SAO receives an action, the decision may belong to an ancestor:
//! the walk climbs `parent` pointers past every delegated binding and stops
//! at the first level that evaluates for itself. The walk is iterative over
//! the registry arena, never recursive, and is capped so a pathological
//! chain cannot stall a caller.

use tracing::debug;

use pao_common::{Error, OrgId, Result};

use crate::record::OrganizationRecord;
use crate::registry::Registry;

/// Default cap on delegation-chain depth
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Resolve the organization whose governance module evaluates actions
/// submitted to `org`.
///
/// Returns the first record up the parent chain whose binding is not
/// delegated. Fails with `NotFound` if `org` is unknown, `InvalidState` if
/// a delegated binding has no parent to defer to, and `DepthExceeded` if
/// the walk passes `max_depth` levels.
pub fn resolve_evaluator(
    registry: &Registry,
    org: &OrgId,
    max_depth: usize,
) -> Result<OrganizationRecord> {
    let mut current = registry.lookup(org)?;

    for depth in 0..=max_depth {
        if !current.governance.is_delegated() {
            if depth > 0 {
                debug!(org = %org, evaluator = %current.id, depth, "resolved delegated chain");
            }
            return Ok(current);
        }
        let parent = current.parent.clone().ok_or_else(|| {
            Error::invalid_state(format!(
                "organization {} delegates its governance but has no parent",
                current.id
            ))
        })?;
        current = registry.lookup(&parent)?;
    }

    Err(Error::depth_exceeded(format!(
        "delegation chain from {} exceeds {} levels",
        org, max_depth
    )))
}
