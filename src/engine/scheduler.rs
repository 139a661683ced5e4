//! Event scheduler with deterministic ordering and lazy invalidation.
//!
//! Implements a priority queue that ensures:
//! - Events are processed in time order
//! - Ties are broken by insertion order (sequence number)
//! - At most one live transition event exists per link
//!
//! Invalidating a link does not search the heap. Each link remembers the
//! sequence number of its live event; heap entries whose sequence no longer
//! matches are stale and are dropped when they reach the top.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::debug;

use crate::engine::SimTime;
use crate::lattice::LinkId;
use crate::rules::Outcome;

/// Stale entries tolerated before compaction is considered.
const COMPACT_MIN_STALE: usize = 4096;
/// Compact once stale entries outnumber live ones by this factor.
const COMPACT_FACTOR: usize = 4;

/// What happens when an event fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    /// Apply a rule outcome to a link's endpoints.
    Transition {
        /// Link the outcome applies to.
        link: LinkId,
        /// Pre-chosen outcome.
        outcome: Outcome,
    },
    /// Apply a scheduled forcing action.
    Forcing {
        /// Index into the engine's forcing list.
        index: usize,
    },
}

/// A scheduled event with time and sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEvent {
    /// Scheduled time.
    pub time: SimTime,
    /// Sequence number for deterministic tie-breaking.
    pub sequence: u64,
    /// The event to execute.
    pub kind: EventKind,
}

impl ScheduledEvent {
    /// Create a new scheduled event.
    #[must_use]
    pub const fn new(time: SimTime, sequence: u64, kind: EventKind) -> Self {
        Self {
            time,
            sequence,
            kind,
        }
    }
}

// Custom ordering for BinaryHeap (min-heap by time, then sequence)
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.sequence == other.sequence
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.time.cmp(&other.time) {
            std::cmp::Ordering::Equal => self.sequence.cmp(&other.sequence),
            ord => ord,
        }
    }
}

/// Result of asking for the next event up to a time limit.
#[derive(Debug, Clone, PartialEq)]
pub enum Popped {
    /// The next live event, removed from the queue.
    Event(ScheduledEvent),
    /// A live event exists but lies after the limit; it stays queued.
    BeyondLimit,
    /// No live events remain.
    Empty,
}

/// Priority-ordered event queue.
///
/// # Example
///
/// ```rust
/// use grainhill::engine::scheduler::EventScheduler;
/// use grainhill::engine::SimTime;
///
/// let mut scheduler = EventScheduler::new(0);
/// scheduler.push_forcing(SimTime::new(2.0), 0);
/// scheduler.push_forcing(SimTime::new(1.0), 1);
///
/// let first = scheduler.pop_earliest().map(|e| e.time);
/// assert_eq!(first, Some(SimTime::new(1.0)));
/// ```
#[derive(Debug, Default)]
pub struct EventScheduler {
    /// Min-heap ordered by (time, sequence).
    queue: BinaryHeap<Reverse<ScheduledEvent>>,
    /// Monotonic sequence counter for tie-breaking.
    sequence: u64,
    /// Sequence of each link's live transition event.
    live: Vec<Option<u64>>,
    /// Number of links with a live event.
    live_transitions: usize,
    /// Forcing events still queued.
    pending_forcing: usize,
    /// Stale entries dropped so far.
    stale_discarded: u64,
}

impl EventScheduler {
    /// Create a scheduler for a lattice with `num_links` links.
    #[must_use]
    pub fn new(num_links: usize) -> Self {
        Self {
            live: vec![None; num_links],
            ..Self::default()
        }
    }

    fn next_sequence(&mut self) -> u64 {
        let seq = self.sequence;
        self.sequence += 1;
        seq
    }

    /// Schedule a transition for `link`, superseding any live one.
    ///
    /// Returns the sequence number assigned.
    pub fn push_transition(&mut self, time: SimTime, link: LinkId, outcome: Outcome) -> u64 {
        let seq = self.next_sequence();
        if self.live[link].replace(seq).is_none() {
            self.live_transitions += 1;
        }
        self.queue.push(Reverse(ScheduledEvent::new(
            time,
            seq,
            EventKind::Transition { link, outcome },
        )));
        self.maybe_compact();
        seq
    }

    /// Schedule forcing action `index` at `time`.
    pub fn push_forcing(&mut self, time: SimTime, index: usize) -> u64 {
        let seq = self.next_sequence();
        self.pending_forcing += 1;
        self.queue.push(Reverse(ScheduledEvent::new(
            time,
            seq,
            EventKind::Forcing { index },
        )));
        seq
    }

    /// Mark the live event of `link` stale. Returns whether one existed.
    pub fn invalidate(&mut self, link: LinkId) -> bool {
        let had_live = self.live[link].take().is_some();
        if had_live {
            self.live_transitions -= 1;
        }
        had_live
    }

    /// Sequence number of the live event of `link`, if any.
    #[must_use]
    pub fn live_sequence(&self, link: LinkId) -> Option<u64> {
        self.live[link]
    }

    /// Whether `link` has a live event.
    #[must_use]
    pub fn is_live(&self, link: LinkId) -> bool {
        self.live_sequence(link).is_some()
    }

    fn is_current(live: &[Option<u64>], event: &ScheduledEvent) -> bool {
        match event.kind {
            EventKind::Transition { link, .. } => live[link] == Some(event.sequence),
            EventKind::Forcing { .. } => true,
        }
    }

    fn discard_stale_top(&mut self) {
        while let Some(Reverse(top)) = self.queue.peek() {
            if Self::is_current(&self.live, top) {
                break;
            }
            self.queue.pop();
            self.stale_discarded += 1;
        }
    }

    fn consume(&mut self, event: &ScheduledEvent) {
        match event.kind {
            EventKind::Transition { link, .. } => {
                self.live[link] = None;
                self.live_transitions -= 1;
            }
            EventKind::Forcing { .. } => self.pending_forcing -= 1,
        }
    }

    /// Remove and return the earliest live event.
    pub fn pop_earliest(&mut self) -> Option<ScheduledEvent> {
        self.discard_stale_top();
        let Reverse(event) = self.queue.pop()?;
        self.consume(&event);
        Some(event)
    }

    /// Remove the earliest live event if it fires at or before `limit`.
    ///
    /// With no limit this behaves like [`Self::pop_earliest`].
    pub fn pop_earliest_until(&mut self, limit: Option<SimTime>) -> Popped {
        self.discard_stale_top();
        let next = self.queue.peek().map(|Reverse(e)| e.time);
        match (next, limit) {
            (None, _) => Popped::Empty,
            (Some(next), Some(limit)) if next > limit => Popped::BeyondLimit,
            _ => self.pop_earliest().map_or(Popped::Empty, Popped::Event),
        }
    }

    /// Time of the earliest live event.
    pub fn next_event_time(&mut self) -> Option<SimTime> {
        self.discard_stale_top();
        self.queue.peek().map(|Reverse(e)| e.time)
    }

    /// Number of live events, transitions and forcing.
    #[must_use]
    pub const fn live_len(&self) -> usize {
        self.live_transitions + self.pending_forcing
    }

    /// Number of heap entries, stale ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when no live events remain.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live_len() == 0
    }

    /// Stale entries dropped so far, at pop time or by compaction.
    #[must_use]
    pub const fn stale_discarded(&self) -> u64 {
        self.stale_discarded
    }

    /// Rebuild the heap without stale entries.
    pub fn compact(&mut self) {
        let before = self.queue.len();
        let live = &self.live;
        self.queue.retain(|Reverse(e)| Self::is_current(live, e));
        let removed = before - self.queue.len();
        self.stale_discarded += removed as u64;
        debug!(removed, remaining = self.queue.len(), "compacted event queue");
    }

    fn maybe_compact(&mut self) {
        let stale = self.queue.len() - self.live_len();
        if stale > COMPACT_MIN_STALE && stale > COMPACT_FACTOR * self.live_len() {
            self.compact();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::NodeState;

    fn outcome(rule: u32) -> Outcome {
        Outcome {
            tail: NodeState(1),
            head: NodeState(0),
            rate: 1.0,
            rule,
        }
    }

    fn time_of(popped: Option<ScheduledEvent>) -> f64 {
        popped.map_or(-1.0, |e| e.time.as_f64())
    }

    #[test]
    fn test_scheduler_time_ordering() {
        let mut scheduler = EventScheduler::new(3);

        scheduler.push_transition(SimTime::new(3.0), 0, outcome(0));
        scheduler.push_transition(SimTime::new(1.0), 1, outcome(1));
        scheduler.push_transition(SimTime::new(2.0), 2, outcome(2));

        assert!((time_of(scheduler.pop_earliest()) - 1.0).abs() < f64::EPSILON);
        assert!((time_of(scheduler.pop_earliest()) - 2.0).abs() < f64::EPSILON);
        assert!((time_of(scheduler.pop_earliest()) - 3.0).abs() < f64::EPSILON);
        assert!(scheduler.is_empty());
        assert!(scheduler.pop_earliest().is_none());
    }

    #[test]
    fn test_scheduler_sequence_ordering() {
        let mut scheduler = EventScheduler::new(3);
        let time = SimTime::new(1.0);
        scheduler.push_transition(time, 2, outcome(0));
        scheduler.push_transition(time, 0, outcome(1));
        scheduler.push_forcing(time, 0);

        let mut order = Vec::new();
        while let Some(e) = scheduler.pop_earliest() {
            order.push(e.kind);
        }
        assert_eq!(
            order,
            vec![
                EventKind::Transition { link: 2, outcome: outcome(0) },
                EventKind::Transition { link: 0, outcome: outcome(1) },
                EventKind::Forcing { index: 0 },
            ]
        );
    }

    #[test]
    fn test_invalidated_event_never_returned() {
        let mut scheduler = EventScheduler::new(2);
        scheduler.push_transition(SimTime::new(1.0), 0, outcome(0));
        scheduler.push_transition(SimTime::new(2.0), 1, outcome(1));

        assert!(scheduler.invalidate(0));
        assert!(!scheduler.invalidate(0));
        assert!(!scheduler.is_live(0));
        assert_eq!(scheduler.live_len(), 1);
        assert_eq!(scheduler.len(), 2);

        let e = scheduler.pop_earliest();
        assert!(matches!(e.map(|e| e.kind), Some(EventKind::Transition { link: 1, .. })));
        assert_eq!(scheduler.stale_discarded(), 1);
    }

    #[test]
    fn test_rescheduling_supersedes_previous_event() {
        let mut scheduler = EventScheduler::new(1);
        scheduler.push_transition(SimTime::new(1.0), 0, outcome(0));
        scheduler.push_transition(SimTime::new(5.0), 0, outcome(7));
        assert_eq!(scheduler.live_len(), 1);

        let e = scheduler.pop_earliest();
        assert!((time_of(e) - 5.0).abs() < f64::EPSILON);
        assert!(scheduler.is_empty());
        assert!(scheduler.pop_earliest().is_none());
    }

    #[test]
    fn test_pop_until_limit() {
        let mut scheduler = EventScheduler::new(2);
        scheduler.push_transition(SimTime::new(1.0), 0, outcome(0));
        scheduler.push_transition(SimTime::new(3.0), 1, outcome(1));

        let limit = Some(SimTime::new(2.0));
        assert!(matches!(scheduler.pop_earliest_until(limit), Popped::Event(_)));
        assert_eq!(scheduler.pop_earliest_until(limit), Popped::BeyondLimit);
        assert_eq!(scheduler.live_len(), 1);

        assert!(matches!(scheduler.pop_earliest_until(None), Popped::Event(_)));
        assert_eq!(scheduler.pop_earliest_until(None), Popped::Empty);
    }

    #[test]
    fn test_event_at_limit_is_included() {
        let mut scheduler = EventScheduler::new(1);
        scheduler.push_transition(SimTime::new(2.0), 0, outcome(0));
        let popped = scheduler.pop_earliest_until(Some(SimTime::new(2.0)));
        assert!(matches!(popped, Popped::Event(_)));
    }

    #[test]
    fn test_stale_only_queue_is_empty() {
        let mut scheduler = EventScheduler::new(1);
        scheduler.push_transition(SimTime::new(1.0), 0, outcome(0));
        scheduler.invalidate(0);
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.pop_earliest_until(Some(SimTime::new(0.5))), Popped::Empty);
        assert_eq!(scheduler.len(), 0);
    }

    #[test]
    fn test_next_event_time_skips_stale() {
        let mut scheduler = EventScheduler::new(2);
        scheduler.push_transition(SimTime::new(1.0), 0, outcome(0));
        scheduler.push_transition(SimTime::new(4.0), 1, outcome(1));
        scheduler.invalidate(0);
        assert_eq!(scheduler.next_event_time(), Some(SimTime::new(4.0)));
    }

    #[test]
    fn test_compact_removes_stale_entries() {
        let mut scheduler = EventScheduler::new(4);
        for link in 0..4 {
            scheduler.push_transition(SimTime::new(1.0), link, outcome(0));
        }
        scheduler.invalidate(1);
        scheduler.invalidate(3);
        scheduler.compact();
        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.stale_discarded(), 2);
        assert_eq!(scheduler.live_len(), 2);
    }

    #[test]
    fn test_automatic_compaction_bounds_heap() {
        let mut scheduler = EventScheduler::new(1);
        for i in 0..20_000 {
            scheduler.push_transition(SimTime::new(f64::from(i)), 0, outcome(0));
        }
        assert_eq!(scheduler.live_len(), 1);
        assert!(scheduler.len() <= COMPACT_MIN_STALE + 2);
    }

    #[test]
    fn test_scheduled_event_ord() {
        let kind = EventKind::Forcing { index: 0 };
        let earlier = ScheduledEvent::new(SimTime::new(1.0), 1, kind);
        let later = ScheduledEvent::new(SimTime::new(2.0), 1, kind);
        let same_time_seq2 = ScheduledEvent::new(SimTime::new(1.0), 2, kind);

        assert!(earlier < later);
        assert!(earlier < same_time_seq2);
        assert_eq!(earlier, ScheduledEvent::new(SimTime::new(1.0), 1, EventKind::Forcing { index: 9 }));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::lattice::NodeState;
    use proptest::prelude::*;

    fn outcome() -> Outcome {
        Outcome {
            tail: NodeState(0),
            head: NodeState(0),
            rate: 1.0,
            rule: 0,
        }
    }

    proptest! {
        /// Falsification: events always come out in time order.
        #[test]
        fn prop_time_ordering(times in prop::collection::vec(0.0f64..1000.0, 1..100)) {
            let mut scheduler = EventScheduler::new(times.len());

            for (link, &t) in times.iter().enumerate() {
                scheduler.push_transition(SimTime::new(t), link, outcome());
            }

            let mut last_time = 0.0;
            while let Some(event) = scheduler.pop_earliest() {
                let current_time = event.time.as_f64();
                prop_assert!(current_time >= last_time, "Events not in time order");
                last_time = current_time;
            }
        }

        /// Falsification: only the latest push per link survives, and
        /// invalidated links yield nothing.
        #[test]
        fn prop_one_live_event_per_link(
            pushes in prop::collection::vec((0usize..8, 0.0f64..100.0), 1..200),
            dead in prop::collection::vec(any::<bool>(), 8),
        ) {
            let mut scheduler = EventScheduler::new(8);
            let mut latest = [None; 8];
            for &(link, t) in &pushes {
                scheduler.push_transition(SimTime::new(t), link, outcome());
                latest[link] = Some(t);
            }
            for (link, &is_dead) in dead.iter().enumerate() {
                if is_dead {
                    scheduler.invalidate(link);
                    latest[link] = None;
                }
            }

            let expected = latest.iter().filter(|t| t.is_some()).count();
            prop_assert_eq!(scheduler.live_len(), expected);

            let mut seen = 0;
            while let Some(event) = scheduler.pop_earliest() {
                if let EventKind::Transition { link, .. } = event.kind {
                    prop_assert_eq!(latest[link], Some(event.time.as_f64()));
                    latest[link] = None;
                    seen += 1;
                }
            }
            prop_assert_eq!(seen, expected);
        }
    }
}
