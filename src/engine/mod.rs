//! Core simulation engine.
//!
//! Implements the event-driven loop with:
//! - Deterministic RNG (PCG with partitioned seeds)
//! - Event scheduling with deterministic ordering and lazy invalidation
//! - Jidoka guards for stop-on-error
//! - Periodic forcing interleaved with stochastic transitions
//!
//! Each iteration pops the earliest live event, moves the clock to its
//! time, applies it, and reschedules the fired link plus every link that
//! touches a node whose state changed. Nothing else is touched, so the cost
//! of an event does not grow with lattice size.

pub mod clock;
pub mod control;
pub mod jidoka;
pub mod rng;
pub mod sampler;
pub mod scheduler;

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

pub use clock::SimClock;
pub use control::{CancelToken, EngineStatus, RunOutcome, RunStatus, StopCondition, StopReason};
pub use jidoka::{JidokaConfig, JidokaGuard};
pub use rng::SimRng;
pub use sampler::{Proposal, RateSampler};
pub use scheduler::{EventKind, EventScheduler, Popped, ScheduledEvent};

use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::forcing::ForcingEvent;
use crate::lattice::{BoundaryPolicy, Lattice, LatticeSnapshot, LinkId, NodeId, NodeState};
use crate::replay::{EventJournal, JournalEvent};
use crate::rules::{Outcome, TransitionRuleTable};

/// Simulation time.
///
/// A finite, non-negative `f64`. Transition rates in geomorphic models span
/// many orders of magnitude (grain settling near 1e8 per year next to
/// weathering near 1e-3 per year), so a floating representation is used
/// and ordering is total.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct SimTime {
    value: f64,
}

impl SimTime {
    /// Zero time (simulation start).
    pub const ZERO: Self = Self { value: 0.0 };

    /// Create a time value.
    ///
    /// # Panics
    ///
    /// Panics if `value` is negative or not finite.
    #[must_use]
    pub fn new(value: f64) -> Self {
        assert!(value >= 0.0, "SimTime cannot be negative");
        assert!(value.is_finite(), "SimTime must be finite");
        // normalizes -0.0
        Self { value: value + 0.0 }
    }

    /// Create a time value, or `None` if negative or not finite.
    #[must_use]
    pub fn try_new(value: f64) -> Option<Self> {
        (value.is_finite() && value >= 0.0).then(|| Self { value: value + 0.0 })
    }

    /// Time as `f64`.
    #[must_use]
    pub const fn as_f64(self) -> f64 {
        self.value
    }

    /// Time `wait` later, or `None` if the result is not finite.
    #[must_use]
    pub fn advance(self, wait: f64) -> Option<Self> {
        if wait < 0.0 {
            return None;
        }
        Self::try_new(self.value + wait)
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.value.total_cmp(&other.value).is_eq()
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.total_cmp(&other.value)
    }
}

impl std::hash::Hash for SimTime {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.to_bits().hash(state);
    }
}

impl TryFrom<f64> for SimTime {
    type Error = SimError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::try_new(value).ok_or_else(|| SimError::non_finite(format!("time value {value}")))
    }
}

impl From<SimTime> for f64 {
    fn from(time: SimTime) -> Self {
        time.value
    }
}

impl std::ops::Add for SimTime {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            value: self.value + rhs.value,
        }
    }
}

impl std::ops::Sub for SimTime {
    type Output = Self;

    /// Saturates at zero.
    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            value: (self.value - rhs.value).max(0.0),
        }
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}", self.value)
    }
}

/// Run options that do not affect the model itself.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Master seed of the run's RNG.
    pub seed: u64,
    /// Keep an [`EventJournal`] of every applied event.
    pub record_journal: bool,
    /// Wall-clock interval between progress log lines.
    pub report_interval: Option<Duration>,
    /// Guard switches.
    pub jidoka: JidokaConfig,
}

/// Everything an engine is built from.
#[derive(Debug, Clone)]
pub struct EngineParts {
    /// Initial lattice.
    pub lattice: Lattice,
    /// Node classification.
    pub boundary: BoundaryPolicy,
    /// Compiled rules.
    pub rules: TransitionRuleTable,
    /// Periodic forcing actions.
    pub forcing: Vec<ForcingEvent>,
    /// Run options.
    pub options: EngineOptions,
}

impl EngineParts {
    /// Parts with no forcing and default options.
    #[must_use]
    pub fn new(lattice: Lattice, boundary: BoundaryPolicy, rules: TransitionRuleTable) -> Self {
        Self {
            lattice,
            boundary,
            rules,
            forcing: Vec::new(),
            options: EngineOptions::default(),
        }
    }

    /// Add a forcing action.
    #[must_use]
    pub fn with_forcing(mut self, event: ForcingEvent) -> Self {
        self.forcing.push(event);
        self
    }

    /// Set the RNG seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.options.seed = seed;
        self
    }

    /// Record a journal of applied events.
    #[must_use]
    pub const fn with_journal(mut self) -> Self {
        self.options.record_journal = true;
        self
    }

    /// Replace all options.
    #[must_use]
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }
}

/// Counters describing engine activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Stochastic transitions applied.
    pub transitions: u64,
    /// Forcing actions applied.
    pub forcing: u64,
    /// Live events in the queue.
    pub live_events: usize,
    /// Heap entries, stale ones included.
    pub queued_entries: usize,
    /// Stale entries dropped so far.
    pub stale_discarded: u64,
    /// Events proposed by the sampler.
    pub proposals: u64,
    /// Proposals whose waiting time underflowed to zero.
    pub zero_waits: u64,
}

/// Main simulation engine.
///
/// Owns its lattice, queue and RNG exclusively. Independent runs are
/// independent engines.
///
/// # Example
///
/// ```rust
/// use grainhill::engine::{EngineParts, RunStatus, SimEngine, StopCondition};
/// use grainhill::lattice::{BoundaryLayout, BoundaryPolicy, GridShape, Lattice, NodeState, Orientation};
/// use grainhill::rules::{TransitionRule, TransitionRuleTable};
///
/// let shape = GridShape::rectangular(1, 3);
/// let lattice = Lattice::new(shape, vec![NodeState(1), NodeState(0), NodeState(0)])?;
/// let boundary = BoundaryPolicy::from_layout(shape, BoundaryLayout::all_interior());
/// let rules = TransitionRuleTable::builder(2)
///     .rule(TransitionRule::new(
///         (NodeState(1), NodeState(0), Orientation::Horizontal),
///         (NodeState(0), NodeState(1)),
///         1.0,
///         "hop",
///     ))
///     .build()?;
///
/// let mut engine = SimEngine::new(EngineParts::new(lattice, boundary, rules).with_seed(7))?;
/// let outcome = engine.advance_until(&StopCondition::never())?;
/// assert_eq!(outcome.status, RunStatus::Completed);
/// assert_eq!(outcome.event_count, 2);
/// # Ok::<(), grainhill::error::SimError>(())
/// ```
#[derive(Debug)]
pub struct SimEngine {
    /// Node states and adjacency.
    lattice: Lattice,
    /// Node classification.
    boundary: BoundaryPolicy,
    /// Compiled rules.
    rules: TransitionRuleTable,
    /// Periodic forcing actions.
    forcing: Vec<ForcingEvent>,
    /// Applications so far, per forcing action.
    forcing_applied: Vec<u64>,
    /// Event scheduler.
    scheduler: EventScheduler,
    /// Waiting-time and outcome sampler.
    sampler: RateSampler,
    /// Random number generator.
    rng: SimRng,
    /// Simulation clock.
    clock: SimClock,
    /// Jidoka guard for anomaly detection.
    jidoka: JidokaGuard,
    /// Applied-event journal, when enabled.
    journal: Option<EventJournal>,
    /// Lifecycle state.
    status: EngineStatus,
    /// Progress log interval.
    report_interval: Option<Duration>,
    /// Per-link epoch marks used to reschedule each link once per event.
    link_epoch: Vec<u32>,
    epoch: u32,
    /// Node changes made by the event being applied.
    changes: Vec<(NodeId, NodeState)>,
}

impl SimEngine {
    /// Build an engine, validating its parts against each other.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the boundary does not cover the
    /// lattice, a node holds a state the rule table does not declare, or a
    /// forcing action is invalid.
    pub fn new(parts: EngineParts) -> SimResult<Self> {
        let EngineParts {
            lattice,
            boundary,
            rules,
            forcing,
            options,
        } = parts;

        boundary.validate_for(&lattice)?;
        if let Some((node, state)) = lattice
            .states()
            .iter()
            .enumerate()
            .find(|&(_, &s)| !rules.contains_state(s))
        {
            return Err(SimError::config(format!(
                "node {node} starts in state {state}, rule table declares {} states",
                rules.num_states()
            )));
        }
        for event in &forcing {
            event.validate(&lattice, &rules)?;
        }

        let orientations = lattice.shape().kind.orientations();
        let unreachable = rules
            .rules()
            .iter()
            .filter(|r| !orientations.contains(&r.orientation))
            .count();
        if unreachable > 0 {
            warn!(
                unreachable,
                kind = ?lattice.shape().kind,
                "rules use orientations this lattice does not have"
            );
        }

        let (interior, fixed, open) = boundary.counts();
        debug!(interior, fixed, open, "boundary classification");

        let num_links = lattice.num_links();
        let forcing_applied = vec![0; forcing.len()];
        let jidoka = JidokaGuard::new(options.jidoka, rules.num_states());
        Ok(Self {
            lattice,
            boundary,
            rules,
            forcing,
            forcing_applied,
            scheduler: EventScheduler::new(num_links),
            sampler: RateSampler::new(),
            rng: SimRng::new(options.seed),
            clock: SimClock::new(),
            jidoka,
            journal: options.record_journal.then(EventJournal::new),
            status: EngineStatus::Idle,
            report_interval: options.report_interval,
            link_epoch: vec![0; num_links],
            epoch: 0,
            changes: Vec::new(),
        })
    }

    /// Build an engine from a configuration document.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn from_config(config: &SimConfig) -> SimResult<Self> {
        Self::new(config.engine_parts()?)
    }

    /// Get current simulation time.
    #[must_use]
    pub const fn current_time(&self) -> SimTime {
        self.clock.current_time()
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn status(&self) -> EngineStatus {
        self.status
    }

    /// Stochastic transitions applied so far.
    #[must_use]
    pub const fn event_count(&self) -> u64 {
        self.clock.event_count()
    }

    /// Forcing actions applied so far.
    #[must_use]
    pub const fn forcing_count(&self) -> u64 {
        self.clock.forcing_count()
    }

    /// The live lattice.
    #[must_use]
    pub const fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    /// Node classification.
    #[must_use]
    pub const fn boundary(&self) -> &BoundaryPolicy {
        &self.boundary
    }

    /// Compiled rules.
    #[must_use]
    pub const fn rules(&self) -> &TransitionRuleTable {
        &self.rules
    }

    /// Master seed of the run.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.rng.master_seed()
    }

    /// Applied-event journal, if recording.
    #[must_use]
    pub const fn journal(&self) -> Option<&EventJournal> {
        self.journal.as_ref()
    }

    /// Copy of the lattice at the current time.
    #[must_use]
    pub fn snapshot(&self) -> LatticeSnapshot {
        self.lattice.snapshot(self.clock.current_time())
    }

    /// Activity counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            transitions: self.clock.event_count(),
            forcing: self.clock.forcing_count(),
            live_events: self.scheduler.live_len(),
            queued_entries: self.scheduler.len(),
            stale_discarded: self.scheduler.stale_discarded(),
            proposals: self.sampler.draws(),
            zero_waits: self.sampler.underflows(),
        }
    }

    /// Process events until the queue is empty or `stop` is met.
    ///
    /// Events at or before the time limit are applied. When the next event
    /// lies beyond it, the clock moves to the limit and the call returns
    /// [`RunStatus::StoppedByCaller`]. Event limits count transitions
    /// applied during this call. The call may be repeated to resume.
    ///
    /// # Errors
    ///
    /// Returns `SimError` if:
    /// - Jidoka violation detected (time reversal, fixed-node mutation)
    /// - A rate produced a non-finite waiting time
    pub fn advance_until(&mut self, stop: &StopCondition) -> SimResult<RunOutcome> {
        match self.status {
            EngineStatus::Completed => return Ok(self.outcome(RunStatus::Completed)),
            EngineStatus::Idle => self.start()?,
            EngineStatus::Running | EngineStatus::StoppedByCaller => {}
        }
        self.status = EngineStatus::Running;

        let started = Instant::now();
        let mut next_report = self.report_interval.map(|interval| started + interval);
        let events_before = self.clock.event_count();
        let limit = stop.until_time();

        loop {
            if let Some(reason) = stop.check(self.clock.event_count() - events_before, started) {
                return Ok(self.stop_by_caller(reason));
            }

            match self.scheduler.pop_earliest_until(limit) {
                Popped::Empty => {
                    self.status = EngineStatus::Completed;
                    info!(
                        time = %self.clock.current_time(),
                        events = self.clock.event_count(),
                        "event queue exhausted"
                    );
                    return Ok(self.outcome(RunStatus::Completed));
                }
                Popped::BeyondLimit => {
                    if let Some(limit) = limit {
                        self.clock.advance_to(limit);
                    }
                    return Ok(self.stop_by_caller(StopReason::TimeLimit));
                }
                Popped::Event(event) => self.apply(&event)?,
            }

            if let (Some(at), Some(interval)) = (next_report, self.report_interval) {
                let now = Instant::now();
                if now >= at {
                    self.report_progress(limit);
                    next_report = Some(now + interval);
                }
            }
        }
    }

    fn outcome(&self, status: RunStatus) -> RunOutcome {
        RunOutcome {
            status,
            final_time: self.clock.current_time(),
            event_count: self.clock.event_count(),
            forcing_count: self.clock.forcing_count(),
        }
    }

    fn stop_by_caller(&mut self, reason: StopReason) -> RunOutcome {
        self.status = EngineStatus::StoppedByCaller;
        debug!(
            reason = %reason,
            time = %self.clock.current_time(),
            events = self.clock.event_count(),
            "run stopped"
        );
        self.outcome(RunStatus::StoppedByCaller)
    }

    fn report_progress(&self, limit: Option<SimTime>) {
        let stats = self.stats();
        let remaining = limit.map(|l| self.clock.time_until(l));
        info!(
            time = %self.clock.current_time(),
            remaining = ?remaining.map(SimTime::as_f64),
            events = stats.transitions,
            forcing = stats.forcing,
            live = stats.live_events,
            "progress"
        );
    }

    /// Schedule every link and queue the first forcing applications.
    fn start(&mut self) -> SimResult<()> {
        for link in 0..self.lattice.num_links() {
            self.schedule_link(link)?;
        }
        for index in 0..self.forcing.len() {
            if let Some(time) = self.forcing[index].time_of(0) {
                self.scheduler.push_forcing(time, index);
            }
        }
        info!(
            nodes = self.lattice.num_nodes(),
            links = self.lattice.num_links(),
            live_events = self.scheduler.live_len(),
            seed = self.rng.master_seed(),
            "engine started"
        );
        Ok(())
    }

    fn apply(&mut self, event: &ScheduledEvent) -> SimResult<()> {
        self.jidoka
            .check_event_time(self.clock.current_time(), event.time)?;
        self.clock.advance_to(event.time);
        match event.kind {
            EventKind::Transition { link, outcome } => {
                self.apply_transition(event.sequence, link, outcome)
            }
            EventKind::Forcing { index } => self.apply_forcing(event.sequence, index),
        }
    }

    fn apply_transition(&mut self, sequence: u64, link_id: LinkId, outcome: Outcome) -> SimResult<()> {
        let link = self.lattice.link(link_id);
        self.changes.clear();
        for (node, next) in [(link.tail, outcome.tail), (link.head, outcome.head)] {
            if self.lattice.state_of(node) != next {
                self.jidoka.check_mutation(&self.boundary, node, next)?;
                self.changes.push((node, next));
            }
        }
        // all checks passed; commit both endpoints
        for &(node, state) in &self.changes {
            self.lattice.set_state(node, state);
        }
        self.clock.record_transition();

        let time = self.clock.current_time();
        trace!(link = link_id, rule = outcome.rule, time = %time, "transition");
        if let Some(journal) = self.journal.as_mut() {
            journal.append(
                time,
                sequence,
                JournalEvent::Transition {
                    link: link_id,
                    rule: outcome.rule,
                },
                self.changes.clone(),
            );
        }

        self.reschedule(Some(link_id))
    }

    fn apply_forcing(&mut self, sequence: u64, index: usize) -> SimResult<()> {
        let plan = self.forcing[index].action.plan(
            &self.lattice,
            &self.boundary,
            self.forcing_applied[index],
        );
        for &(node, state) in &plan {
            self.jidoka.check_mutation(&self.boundary, node, state)?;
        }
        for &(node, state) in &plan {
            self.lattice.set_state(node, state);
        }
        self.forcing_applied[index] += 1;
        self.clock.record_forcing();

        let time = self.clock.current_time();
        debug!(index, changed = plan.len(), time = %time, "forcing applied");
        if let Some(journal) = self.journal.as_mut() {
            journal.append(time, sequence, JournalEvent::Forcing { index }, plan.clone());
        }

        self.changes = plan;
        self.reschedule(None)?;

        if let Some(next) = self.forcing[index].time_of(self.forcing_applied[index]) {
            self.scheduler.push_forcing(next, index);
        }
        Ok(())
    }

    /// Reschedule `fired` and every link touching a changed node, each once.
    fn reschedule(&mut self, fired: Option<LinkId>) -> SimResult<()> {
        self.epoch = self.epoch.wrapping_add(1);
        if self.epoch == 0 {
            self.link_epoch.fill(0);
            self.epoch = 1;
        }

        if let Some(link) = fired {
            self.link_epoch[link] = self.epoch;
            self.schedule_link(link)?;
        }

        for i in 0..self.changes.len() {
            let node = self.changes[i].0;
            for k in 0..self.lattice.links_of(node).len() {
                let link = self.lattice.links_of(node)[k];
                if self.link_epoch[link] == self.epoch {
                    continue;
                }
                self.link_epoch[link] = self.epoch;
                self.scheduler.invalidate(link);
                self.schedule_link(link)?;
            }
        }
        Ok(())
    }

    /// Sample and queue the next event of one link, if it has one.
    fn schedule_link(&mut self, link_id: LinkId) -> SimResult<()> {
        let link = self.lattice.link(link_id);
        if !self.boundary.is_schedulable(&link) {
            return Ok(());
        }
        let current = (
            self.lattice.state_of(link.tail),
            self.lattice.state_of(link.head),
        );
        let outcomes = self.rules.rules_for(current.0, current.1, link.orientation);
        if outcomes.is_empty() {
            return Ok(());
        }

        let boundary = &self.boundary;
        let proposal = self.sampler.sample(
            &mut self.rng,
            self.clock.current_time(),
            outcomes,
            |o| boundary.admits(&link, current, (o.tail, o.head)),
        )?;
        if let Some(p) = proposal {
            self.scheduler.push_transition(p.time, link_id, p.outcome);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::forcing::ForcingAction;
    use crate::lattice::{BoundaryClass, BoundaryLayout, GridShape, Orientation};
    use crate::rules::TransitionRule;
    use tracing_test::traced_test;

    const EMPTY: NodeState = NodeState(0);
    const GRAIN: NodeState = NodeState(1);
    const MARK: NodeState = NodeState(2);

    fn hop(rate: f64) -> TransitionRule {
        TransitionRule::new(
            (GRAIN, EMPTY, Orientation::Horizontal),
            (EMPTY, GRAIN),
            rate,
            "hop",
        )
    }

    fn hop_back(rate: f64) -> TransitionRule {
        TransitionRule::new(
            (EMPTY, GRAIN, Orientation::Horizontal),
            (GRAIN, EMPTY),
            rate,
            "hop back",
        )
    }

    fn line(states: Vec<NodeState>, rules: Vec<TransitionRule>) -> EngineParts {
        let shape = GridShape::rectangular(1, states.len());
        let lattice = Lattice::new(shape, states).unwrap();
        let boundary = BoundaryPolicy::from_layout(shape, BoundaryLayout::all_interior());
        let rules = TransitionRuleTable::builder(3).rules(rules).build().unwrap();
        EngineParts::new(lattice, boundary, rules)
    }

    fn ping_pong(seed: u64) -> SimEngine {
        let parts = line(vec![GRAIN, EMPTY], vec![hop(1.0), hop_back(1.0)])
            .with_seed(seed)
            .with_journal();
        SimEngine::new(parts).unwrap()
    }

    #[test]
    fn test_sim_time_ordering() {
        let t1 = SimTime::new(1.0);
        let t2 = SimTime::new(2.0);
        assert!(t1 < t2);
        assert_eq!(t1, SimTime::new(1.0));
        assert_eq!(SimTime::new(-0.0), SimTime::ZERO);
    }

    #[test]
    fn test_sim_time_arithmetic() {
        let sum = SimTime::new(1.0) + SimTime::new(0.5);
        assert!((sum.as_f64() - 1.5).abs() < 1e-12);
        let diff = SimTime::new(1.0) - SimTime::new(2.0);
        assert_eq!(diff, SimTime::ZERO);
    }

    #[test]
    fn test_sim_time_rejects_invalid() {
        assert!(SimTime::try_new(-1.0).is_none());
        assert!(SimTime::try_new(f64::NAN).is_none());
        assert!(SimTime::try_new(f64::INFINITY).is_none());
        assert!(SimTime::new(1.0).advance(f64::INFINITY).is_none());
        assert!(SimTime::new(1.0).advance(-0.5).is_none());
    }

    #[test]
    fn test_sim_time_serde() {
        let json = serde_json::to_string(&SimTime::new(2.5)).unwrap();
        assert_eq!(json, "2.5");
        assert!(serde_json::from_str::<SimTime>("-1.0").is_err());
    }

    #[test]
    fn test_sim_time_display() {
        assert_eq!(SimTime::new(1.5).to_string(), "1.500000");
    }

    #[test]
    fn test_sim_time_hash() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(SimTime::new(1.0));
        set.insert(SimTime::new(2.0));
        set.insert(SimTime::new(1.0));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_grain_walks_to_end() {
        let mut engine = SimEngine::new(line(vec![GRAIN, EMPTY, EMPTY], vec![hop(1.0)])).unwrap();
        assert_eq!(engine.status(), EngineStatus::Idle);

        let outcome = engine.advance_until(&StopCondition::never()).unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.event_count, 2);
        assert!(outcome.final_time > SimTime::ZERO);
        assert_eq!(engine.status(), EngineStatus::Completed);
        assert_eq!(engine.lattice().states(), &[EMPTY, EMPTY, GRAIN]);
        assert_eq!(engine.snapshot().time, outcome.final_time);
    }

    #[test]
    fn test_zero_rate_never_fires() {
        let mut engine = SimEngine::new(line(vec![GRAIN, EMPTY, EMPTY], vec![hop(0.0)])).unwrap();
        let outcome = engine.advance_until(&StopCondition::never()).unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.event_count, 0);
        assert_eq!(outcome.final_time, SimTime::ZERO);
    }

    #[test]
    fn test_completed_is_sticky() {
        let mut engine = SimEngine::new(line(vec![GRAIN, EMPTY], vec![hop(1.0)])).unwrap();
        let first = engine.advance_until(&StopCondition::never()).unwrap();
        let second = engine
            .advance_until(&StopCondition::until(SimTime::new(1.0e6)))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_mean_first_event_time() {
        let rate = 2.0;
        let runs = 2000;
        let mut total = 0.0;
        for seed in 0..runs {
            let parts = line(vec![GRAIN, EMPTY], vec![hop(rate)]).with_seed(seed);
            let mut engine = SimEngine::new(parts).unwrap();
            let outcome = engine.advance_until(&StopCondition::never()).unwrap();
            assert_eq!(outcome.event_count, 1);
            total += outcome.final_time.as_f64();
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = total / runs as f64;
        assert!((mean - 1.0 / rate).abs() < 0.05, "mean {mean}");
    }

    #[test]
    fn test_fixed_endpoint_filters_outcomes() {
        // fixed | interior | fixed
        let shape = GridShape::rectangular(1, 3);
        let lattice = Lattice::new(shape, vec![GRAIN, EMPTY, EMPTY]).unwrap();
        let boundary = BoundaryPolicy::from_classes(vec![
            BoundaryClass::Fixed,
            BoundaryClass::Interior,
            BoundaryClass::Fixed,
        ]);
        let copy = TransitionRule::new(
            (GRAIN, EMPTY, Orientation::Horizontal),
            (GRAIN, GRAIN),
            1.0,
            "copy",
        );
        let rules = TransitionRuleTable::builder(3)
            .rules([hop(5.0), copy])
            .build()
            .unwrap();
        let mut engine =
            SimEngine::new(EngineParts::new(lattice, boundary, rules).with_journal()).unwrap();

        let outcome = engine.advance_until(&StopCondition::never()).unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.event_count, 1);
        assert_eq!(engine.lattice().states(), &[GRAIN, GRAIN, EMPTY]);
        let journal = engine.journal().unwrap();
        assert_eq!(journal.entries()[0].changes, vec![(1, GRAIN)]);
    }

    #[test]
    fn test_until_moves_clock_to_limit() {
        let mut engine = ping_pong(3);
        let outcome = engine
            .advance_until(&StopCondition::until(SimTime::new(10.0)))
            .unwrap();
        assert_eq!(outcome.status, RunStatus::StoppedByCaller);
        assert_eq!(outcome.final_time, SimTime::new(10.0));
        assert!(outcome.event_count > 0);
        assert_eq!(engine.status(), EngineStatus::StoppedByCaller);

        let resumed = engine
            .advance_until(&StopCondition::until(SimTime::new(20.0)))
            .unwrap();
        assert_eq!(resumed.final_time, SimTime::new(20.0));
        assert!(resumed.event_count > outcome.event_count);
        let journal = engine.journal().unwrap();
        assert!(journal.entries().iter().all(|e| e.time <= SimTime::new(20.0)));
    }

    #[test]
    fn test_event_limit_is_per_call() {
        let mut engine = ping_pong(5);
        let first = engine.advance_until(&StopCondition::events(5)).unwrap();
        assert_eq!(first.status, RunStatus::StoppedByCaller);
        assert_eq!(first.event_count, 5);
        let second = engine.advance_until(&StopCondition::events(5)).unwrap();
        assert_eq!(second.event_count, 10);
        assert!(second.final_time >= first.final_time);
    }

    #[test]
    fn test_cancelled_before_start() {
        let mut engine = ping_pong(1);
        let token = CancelToken::new();
        token.cancel();
        let outcome = engine
            .advance_until(&StopCondition::never().with_cancel(token))
            .unwrap();
        assert_eq!(outcome.status, RunStatus::StoppedByCaller);
        assert_eq!(outcome.event_count, 0);
    }

    #[test]
    fn test_same_seed_same_journal() {
        let stop = StopCondition::until(SimTime::new(50.0));
        let mut a = ping_pong(42);
        let mut b = ping_pong(42);
        let mut c = ping_pong(43);
        a.advance_until(&stop).unwrap();
        b.advance_until(&stop).unwrap();
        c.advance_until(&stop).unwrap();

        let digest = |e: &SimEngine| e.journal().unwrap().digest().unwrap();
        assert_eq!(digest(&a), digest(&b));
        assert_ne!(digest(&a), digest(&c));
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn test_event_times_non_decreasing_and_local() {
        let states = vec![GRAIN, EMPTY, GRAIN, EMPTY, EMPTY, GRAIN];
        let parts = line(states, vec![hop(1.0), hop_back(0.7)])
            .with_seed(9)
            .with_journal();
        let mut engine = SimEngine::new(parts).unwrap();
        engine.advance_until(&StopCondition::events(500)).unwrap();

        let journal = engine.journal().unwrap();
        let mut last = SimTime::ZERO;
        for entry in journal.entries() {
            assert!(entry.time >= last);
            last = entry.time;
            if let JournalEvent::Transition { link, .. } = entry.event {
                let l = engine.lattice().link(link);
                assert!(entry.changes.iter().all(|&(node, _)| l.touches(node)));
            }
        }
        // grains are conserved
        let grains = engine
            .lattice()
            .states()
            .iter()
            .filter(|&&s| s == GRAIN)
            .count();
        assert_eq!(grains, 3);
    }

    #[test]
    fn test_untouched_links_keep_their_events() {
        let states = vec![GRAIN, EMPTY, GRAIN, EMPTY, EMPTY, GRAIN, EMPTY, EMPTY];
        let parts = line(states, vec![hop(1.0), hop_back(0.7)])
            .with_seed(5)
            .with_journal();
        let mut engine = SimEngine::new(parts).unwrap();
        let num_links = engine.lattice().num_links();

        for step in 1..=200 {
            let before: Vec<Option<u64>> = (0..num_links)
                .map(|link| engine.scheduler.live_sequence(link))
                .collect();
            let outcome = engine.advance_until(&StopCondition::events(1)).unwrap();
            assert_eq!(outcome.event_count, step);

            let entry = engine.journal().unwrap().entries().last().unwrap().clone();
            let JournalEvent::Transition { link: fired, .. } = entry.event else {
                continue;
            };
            for link in (0..num_links).filter(|&l| l != fired) {
                let touched = entry
                    .changes
                    .iter()
                    .any(|&(node, _)| engine.lattice().link(link).touches(node));
                if touched {
                    continue;
                }
                assert_eq!(
                    engine.scheduler.live_sequence(link),
                    before[link],
                    "link {link} was rescheduled by a distant event"
                );
                assert_eq!(engine.scheduler.is_live(link), before[link].is_some());
            }
        }
    }

    #[test]
    fn test_forcing_fires_once_per_interval() {
        let parts = line(vec![GRAIN, EMPTY, EMPTY], vec![]).with_forcing(ForcingEvent {
            action: ForcingAction::ReclassifyRow {
                row: 0,
                from: vec![GRAIN],
                to: MARK,
            },
            interval: 1.0,
            until: None,
        });
        let mut engine = SimEngine::new(parts).unwrap();
        for (k, t) in [1.0, 2.0, 3.0].into_iter().enumerate() {
            let outcome = engine
                .advance_until(&StopCondition::until(SimTime::new(t)))
                .unwrap();
            assert_eq!(outcome.forcing_count, k as u64 + 1);
            assert_eq!(outcome.final_time, SimTime::new(t));
        }
        assert_eq!(engine.event_count(), 0);
        assert_eq!(engine.lattice().state_of(0), MARK);
    }

    #[test]
    fn test_forcing_stops_after_until() {
        let parts = line(vec![EMPTY, EMPTY], vec![]).with_forcing(
            ForcingEvent::uplift(GRAIN, 1.0).with_until(2.5),
        );
        let mut engine = SimEngine::new(parts).unwrap();
        let outcome = engine.advance_until(&StopCondition::never()).unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.forcing_count, 2);
        assert_eq!(outcome.final_time, SimTime::new(2.0));
    }

    #[test]
    fn test_forcing_reschedules_changed_links() {
        // the marked node becomes a grain, which can then hop
        let parts = line(vec![MARK, EMPTY], vec![hop(1.0)]).with_forcing(
            ForcingEvent {
                action: ForcingAction::ReclassifyRow {
                    row: 0,
                    from: vec![MARK],
                    to: GRAIN,
                },
                interval: 1.0,
                until: Some(1.0),
            },
        );
        let mut engine = SimEngine::new(parts).unwrap();
        let outcome = engine.advance_until(&StopCondition::never()).unwrap();
        assert_eq!(outcome.forcing_count, 1);
        assert_eq!(outcome.event_count, 1);
        assert!(outcome.final_time >= SimTime::new(1.0));
        assert_eq!(engine.lattice().states(), &[EMPTY, GRAIN]);
    }

    #[test]
    fn test_rejects_undeclared_initial_state() {
        let err = SimEngine::new(line(vec![NodeState(5)], vec![])).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rejects_boundary_mismatch() {
        let mut parts = line(vec![EMPTY, EMPTY], vec![]);
        parts.boundary = BoundaryPolicy::from_classes(vec![BoundaryClass::Interior]);
        assert!(SimEngine::new(parts).is_err());
    }

    #[test]
    fn test_rejects_invalid_forcing() {
        let parts = line(vec![EMPTY], vec![]).with_forcing(ForcingEvent::uplift(GRAIN, -1.0));
        assert!(SimEngine::new(parts).unwrap_err().is_configuration());
    }

    #[test]
    fn test_stats_track_activity() {
        let mut engine = ping_pong(8);
        engine.advance_until(&StopCondition::events(20)).unwrap();
        let stats = engine.stats();
        assert_eq!(stats.transitions, 20);
        assert_eq!(stats.live_events, 1);
        assert!(stats.proposals >= 20);
    }

    #[test]
    fn test_engine_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<SimEngine>();
    }

    #[test]
    #[traced_test]
    fn test_start_is_logged() {
        let mut engine = ping_pong(2);
        engine.advance_until(&StopCondition::events(1)).unwrap();
        assert!(logs_contain("engine started"));
        assert!(logs_contain("run stopped"));
    }
}
