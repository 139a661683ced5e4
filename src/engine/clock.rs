//! Simulation clock management.
//!
//! Tracks the current simulated time and how many events of each kind have
//! been applied. Time only moves forward.

use serde::{Deserialize, Serialize};

use crate::engine::SimTime;

/// Simulation clock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimClock {
    /// Current simulation time.
    current: SimTime,
    /// Stochastic transitions applied.
    event_count: u64,
    /// Forcing actions applied.
    forcing_count: u64,
}

impl SimClock {
    /// Create a clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current simulation time.
    #[must_use]
    pub const fn current_time(&self) -> SimTime {
        self.current
    }

    /// Number of stochastic transitions applied.
    #[must_use]
    pub const fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Number of forcing actions applied.
    #[must_use]
    pub const fn forcing_count(&self) -> u64 {
        self.forcing_count
    }

    /// Move the clock to `time`. Earlier times leave the clock unchanged.
    ///
    /// Returns the new time.
    pub fn advance_to(&mut self, time: SimTime) -> SimTime {
        if time > self.current {
            self.current = time;
        }
        self.current
    }

    /// Count one applied transition.
    #[allow(clippy::missing_const_for_fn)]  // Mutable const not stable
    pub fn record_transition(&mut self) {
        self.event_count += 1;
    }

    /// Count one applied forcing action.
    #[allow(clippy::missing_const_for_fn)]  // Mutable const not stable
    pub fn record_forcing(&mut self) {
        self.forcing_count += 1;
    }

    /// Calculate time until a target time.
    #[must_use]
    pub fn time_until(&self, target: SimTime) -> SimTime {
        if target > self.current {
            target - self.current
        } else {
            SimTime::ZERO
        }
    }
}
