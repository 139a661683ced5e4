//! Rate sampling for competing Poisson processes on one link.
//!
//! The outcomes of a link are independent exponential clocks. Their
//! minimum is exponential with the summed rate, and the winning clock is
//! chosen with probability proportional to its own rate, so one waiting
//! time draw plus one weighted choice replaces a clock per outcome.

use crate::engine::rng::SimRng;
use crate::engine::SimTime;
use crate::error::{SimError, SimResult};
use crate::rules::Outcome;

/// An event proposed for a link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proposal {
    /// Absolute time the event fires.
    pub time: SimTime,
    /// Outcome applied when it fires.
    pub outcome: Outcome,
}

/// Draws waiting times and outcome choices.
#[derive(Debug, Clone, Default)]
pub struct RateSampler {
    draws: u64,
    underflows: u64,
}

impl RateSampler {
    /// Create a sampler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events proposed so far.
    #[must_use]
    pub const fn draws(&self) -> u64 {
        self.draws
    }

    /// Number of waiting times that underflowed to zero.
    #[must_use]
    pub const fn underflows(&self) -> u64 {
        self.underflows
    }

    /// Sum of the rates of admitted outcomes.
    pub fn total_rate<F>(outcomes: &[Outcome], admit: F) -> f64
    where
        F: Fn(&Outcome) -> bool,
    {
        outcomes.iter().filter(|o| admit(o)).map(|o| o.rate).sum()
    }

    /// Propose the next event for a link, or `None` if its admitted rate
    /// is zero.
    ///
    /// # Errors
    ///
    /// Returns `NonFiniteValue` if the total rate, the waiting time or the
    /// resulting event time is not finite.
    pub fn sample<F>(
        &mut self,
        rng: &mut SimRng,
        now: SimTime,
        outcomes: &[Outcome],
        admit: F,
    ) -> SimResult<Option<Proposal>>
    where
        F: Fn(&Outcome) -> bool,
    {
        let total = Self::total_rate(outcomes, &admit);
        if !total.is_finite() {
            return Err(SimError::non_finite(format!("total rate {total}")));
        }
        if total <= 0.0 {
            return Ok(None);
        }

        let wait = rng.gen_exp(total);
        if !wait.is_finite() {
            return Err(SimError::non_finite(format!(
                "waiting time for total rate {total}"
            )));
        }
        if wait == 0.0 {
            self.underflows += 1;
        }
        let time = now
            .advance(wait)
            .ok_or_else(|| SimError::non_finite(format!("event time {now} + {wait}")))?;

        let target = rng.gen_f64() * total;
        let mut cumulative = 0.0;
        let mut chosen = None;
        for outcome in outcomes.iter().filter(|o| admit(o)) {
            cumulative += outcome.rate;
            chosen = Some(*outcome);
            if target < cumulative {
                break;
            }
        }

        self.draws += 1;
        Ok(chosen.map(|outcome| Proposal { time, outcome }))
    }
}
