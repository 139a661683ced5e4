//! Event journaling for replay and run comparison.
//!
//! Implements:
//! - An append-only journal of every applied event and the node changes it
//!   made
//! - A blake3 digest over the bincode encoding, so two runs can be compared
//!   without keeping both journals
//! - Time scrubbing: rebuilding the lattice at any recorded time from the
//!   initial snapshot

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::SimTime;
use crate::error::{SimError, SimResult};
use crate::lattice::{LatticeSnapshot, LinkId, NodeId, NodeState};

/// What produced a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEvent {
    /// A stochastic transition on a link.
    Transition {
        /// Link that fired.
        link: LinkId,
        /// Index of the source rule.
        rule: u32,
    },
    /// A forcing action.
    Forcing {
        /// Index into the engine's forcing list.
        index: usize,
    },
}

/// One applied event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Simulated time of the event.
    pub time: SimTime,
    /// Position in the journal.
    pub step: u64,
    /// Scheduler sequence number.
    pub sequence: u64,
    /// Event source.
    pub event: JournalEvent,
    /// New state of every node the event changed.
    pub changes: Vec<(NodeId, NodeState)>,
}

/// Append-only journal of applied events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventJournal {
    /// Journal entries in order.
    entries: Vec<JournalEntry>,
    /// First entry index at each time, for fast lookup.
    time_index: BTreeMap<SimTime, usize>,
}

impl EventJournal {
    /// Create an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn append(
        &mut self,
        time: SimTime,
        sequence: u64,
        event: JournalEvent,
        changes: Vec<(NodeId, NodeState)>,
    ) {
        let step = self.entries.len() as u64;
        self.time_index.entry(time).or_insert(self.entries.len());
        self.entries.push(JournalEntry {
            time,
            step,
            sequence,
            event,
            changes,
        });
    }

    /// Entries at or after `time`.
    pub fn entries_from(&self, time: SimTime) -> impl Iterator<Item = &JournalEntry> {
        let start = self
            .time_index
            .range(time..)
            .next()
            .map_or(self.entries.len(), |(_, &idx)| idx);
        self.entries[start..].iter()
    }

    /// All entries.
    #[must_use]
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the journal is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Blake3 digest of the bincode-encoded entries.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn digest(&self) -> SimResult<[u8; 32]> {
        let bytes =
            bincode::serialize(&self.entries).map_err(|e| SimError::serialization(e.to_string()))?;
        Ok(*blake3::hash(&bytes).as_bytes())
    }

    /// Rebuild the lattice at `target` by replaying entries onto `initial`.
    ///
    /// Entries at exactly `target` are included.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if an entry names a node outside the
    /// snapshot.
    pub fn seek(&self, initial: &LatticeSnapshot, target: SimTime) -> SimResult<LatticeSnapshot> {
        let mut snapshot = initial.clone();
        for entry in self.entries_from(initial.time) {
            if entry.time > target {
                break;
            }
            for &(node, state) in &entry.changes {
                let slot = snapshot.states.get_mut(node).ok_or_else(|| {
                    SimError::invariant(format!(
                        "journal entry {} changes node {node} outside the lattice",
                        entry.step
                    ))
                })?;
                *slot = state;
            }
        }
        if target > snapshot.time {
            snapshot.time = target;
        }
        Ok(snapshot)
    }
}
