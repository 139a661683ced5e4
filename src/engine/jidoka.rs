//! Jidoka (自働化) - Autonomous anomaly detection.
//!
//! Implements Toyota's Jidoka principle: machines that detect problems
//! and stop automatically to prevent defect propagation.
//!
//! # Anomaly Types
//!
//! 1. **Time reversal**: an event scheduled before the current time
//! 2. **Fixed-node mutation**: any change to a node classed Fixed
//! 3. **Undeclared state**: a node assigned a state the rule table lacks
//!
//! The guard runs before every mutation is committed, so a violation
//! leaves the lattice exactly as it was after the last good event.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::engine::SimTime;
use crate::error::{SimError, SimResult};
use crate::lattice::{BoundaryPolicy, NodeId, NodeState};

/// Jidoka guard configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JidokaConfig {
    /// Reject events whose time precedes the clock.
    pub check_time_monotonic: bool,
    /// Reject mutations of Fixed nodes.
    pub check_fixed_nodes: bool,
    /// Reject states outside the rule table.
    pub check_declared_states: bool,
}

impl Default for JidokaConfig {
    fn default() -> Self {
        Self {
            check_time_monotonic: true,
            check_fixed_nodes: true,
            check_declared_states: true,
        }
    }
}

/// Jidoka guard for autonomous anomaly detection.
///
/// # Example
///
/// ```rust
/// use grainhill::engine::jidoka::{JidokaConfig, JidokaGuard};
/// use grainhill::engine::SimTime;
///
/// let guard = JidokaGuard::new(JidokaConfig::default(), 2);
/// assert!(guard.check_event_time(SimTime::new(1.0), SimTime::new(2.0)).is_ok());
/// assert!(guard.check_event_time(SimTime::new(2.0), SimTime::new(1.0)).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct JidokaGuard {
    /// Configuration.
    config: JidokaConfig,
    /// Number of declared states.
    num_states: usize,
}

impl JidokaGuard {
    /// Create a new Jidoka guard for a model with `num_states` states.
    #[must_use]
    pub const fn new(config: JidokaConfig, num_states: usize) -> Self {
        Self { config, num_states }
    }

    /// Get current configuration.
    #[must_use]
    pub const fn config(&self) -> &JidokaConfig {
        &self.config
    }

    /// Check that an event at `next` may fire when the clock reads `current`.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if `next` precedes `current`.
    pub fn check_event_time(&self, current: SimTime, next: SimTime) -> SimResult<()> {
        if self.config.check_time_monotonic && next < current {
            error!(%current, %next, "event scheduled in the past");
            return Err(SimError::invariant(format!(
                "event at {next} precedes current time {current}"
            )));
        }
        Ok(())
    }

    /// Check that `node` may take `state`.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if the node is Fixed or the state is
    /// undeclared.
    pub fn check_mutation(
        &self,
        boundary: &BoundaryPolicy,
        node: NodeId,
        state: NodeState,
    ) -> SimResult<()> {
        if self.config.check_fixed_nodes && boundary.is_fixed(node) {
            error!(node, %state, "attempted to mutate a fixed node");
            return Err(SimError::invariant(format!(
                "fixed node {node} would change to state {state}"
            )));
        }
        if self.config.check_declared_states && state.index() >= self.num_states {
            error!(node, %state, "attempted to assign an undeclared state");
            return Err(SimError::invariant(format!(
                "node {node} would take undeclared state {state}"
            )));
        }
        Ok(())
    }
}
