//! Run control: stop conditions, cancellation and run outcomes.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::engine::SimTime;

/// Lifecycle state of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineStatus {
    /// Built, no event processed yet.
    Idle,
    /// Inside `advance_until`.
    Running,
    /// No live events remain.
    Completed,
    /// A stop condition was met; the run can resume.
    StoppedByCaller,
}

/// How an `advance_until` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    /// The event queue ran dry.
    Completed,
    /// The caller's stop condition was met.
    StoppedByCaller,
}

/// Result of one `advance_until` call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Why the call returned.
    pub status: RunStatus,
    /// Simulated time at return.
    pub final_time: SimTime,
    /// Stochastic transitions applied since the engine was built.
    pub event_count: u64,
    /// Forcing actions applied since the engine was built.
    pub forcing_count: u64,
}

/// Why a run stopped before its queue emptied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// The next event lies beyond the simulated-time limit.
    TimeLimit,
    /// The per-call event budget was used up.
    EventLimit,
    /// The wall-clock budget ran out.
    WallClock,
    /// The cancellation token was set.
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TimeLimit => "time limit",
            Self::EventLimit => "event limit",
            Self::WallClock => "wall-clock budget",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Cooperative cancellation flag shared with other threads.
///
/// Checked between events, never in the middle of one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// When an `advance_until` call should return.
///
/// All limits are optional; an empty condition runs until the queue is
/// empty.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use grainhill::engine::{SimTime, StopCondition};
///
/// let stop = StopCondition::until(SimTime::new(1.0e4))
///     .with_max_events(1_000_000)
///     .with_wall_clock(Duration::from_secs(60));
/// assert_eq!(stop.until_time(), Some(SimTime::new(1.0e4)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StopCondition {
    until: Option<SimTime>,
    max_events: Option<u64>,
    wall_clock: Option<Duration>,
    cancel: Option<CancelToken>,
}

impl StopCondition {
    /// No limit at all.
    #[must_use]
    pub fn never() -> Self {
        Self::default()
    }

    /// Stop once simulated time reaches `time`.
    #[must_use]
    pub fn until(time: SimTime) -> Self {
        Self {
            until: Some(time),
            ..Self::default()
        }
    }

    /// Stop after `n` transitions in this call.
    #[must_use]
    pub fn events(n: u64) -> Self {
        Self::never().with_max_events(n)
    }

    /// Add a per-call transition budget.
    #[must_use]
    pub const fn with_max_events(mut self, n: u64) -> Self {
        self.max_events = Some(n);
        self
    }

    /// Add a simulated-time limit.
    #[must_use]
    pub const fn with_until(mut self, time: SimTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Add a wall-clock budget for this call.
    #[must_use]
    pub const fn with_wall_clock(mut self, budget: Duration) -> Self {
        self.wall_clock = Some(budget);
        self
    }

    /// Add a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Simulated-time limit, if any.
    #[must_use]
    pub const fn until_time(&self) -> Option<SimTime> {
        self.until
    }

    /// Check the non-time limits between events.
    pub(crate) fn check(&self, applied: u64, started: Instant) -> Option<StopReason> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Some(StopReason::Cancelled);
        }
        if self.max_events.is_some_and(|max| applied >= max) {
            return Some(StopReason::EventLimit);
        }
        if self
            .wall_clock
            .is_some_and(|budget| started.elapsed() >= budget)
        {
            return Some(StopReason::WallClock);
        }
        None
    }
}
