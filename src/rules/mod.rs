//! Transition rule table.
//!
//! Rules are supplied as data, one [`TransitionRule`] per physical
//! micro-process and link orientation, and compiled once into a dense table
//! indexed by `(tail state, head state, orientation)`. The hot path only
//! performs an index computation and a slice borrow.
//!
//! Rates of rules sharing a key add: the link's total rate is the sum of
//! its outcomes' rates, and each outcome wins with probability proportional
//! to its own rate.

pub mod grain_hill;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::lattice::{NodeState, Orientation};

/// Largest state set the table can index (`NodeState` is a `u8`).
pub const MAX_STATES: usize = 256;

/// One transition rule in serializable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRule {
    /// Tail state before the transition.
    pub from_tail: NodeState,
    /// Head state before the transition.
    pub from_head: NodeState,
    /// Link orientation the rule applies to.
    pub orientation: Orientation,
    /// Tail state after the transition.
    pub to_tail: NodeState,
    /// Head state after the transition.
    pub to_head: NodeState,
    /// Rate (1 / time). Must be finite and non-negative.
    pub rate: f64,
    /// Name of the physical process (e.g. "weathering").
    #[serde(default)]
    pub process: String,
}

impl TransitionRule {
    /// Create a rule from `(tail, head, orientation) -> (tail, head)`.
    #[must_use]
    pub fn new(
        from: (NodeState, NodeState, Orientation),
        to: (NodeState, NodeState),
        rate: f64,
        process: impl Into<String>,
    ) -> Self {
        Self {
            from_tail: from.0,
            from_head: from.1,
            orientation: from.2,
            to_tail: to.0,
            to_head: to.1,
            rate,
            process: process.into(),
        }
    }
}

/// A compiled outcome for one link state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// New tail state.
    pub tail: NodeState,
    /// New head state.
    pub head: NodeState,
    /// Rate of this outcome.
    pub rate: f64,
    /// Index of the source rule in [`TransitionRuleTable::rules`].
    pub rule: u32,
}

/// Compiled, immutable rule table.
#[derive(Debug, Clone)]
pub struct TransitionRuleTable {
    num_states: usize,
    state_names: Vec<String>,
    rules: Vec<TransitionRule>,
    /// `(start, end)` into `outcomes` for each dense key.
    ranges: Vec<(u32, u32)>,
    outcomes: Vec<Outcome>,
}

impl TransitionRuleTable {
    /// Start building a table over `num_states` states.
    #[must_use]
    pub fn builder(num_states: usize) -> RuleTableBuilder {
        RuleTableBuilder {
            num_states,
            state_names: Vec::new(),
            rules: Vec::new(),
            required: Vec::new(),
        }
    }

    /// Number of declared states.
    #[must_use]
    pub const fn num_states(&self) -> usize {
        self.num_states
    }

    /// Whether `state` belongs to the declared set.
    #[must_use]
    pub const fn contains_state(&self, state: NodeState) -> bool {
        state.index() < self.num_states
    }

    /// Human-readable name of a state, if one was given.
    #[must_use]
    pub fn state_name(&self, state: NodeState) -> Option<&str> {
        self.state_names.get(state.index()).map(String::as_str)
    }

    /// Source rules, in the order supplied.
    #[must_use]
    pub fn rules(&self) -> &[TransitionRule] {
        &self.rules
    }

    /// Number of compiled (positive-rate) outcomes.
    #[must_use]
    pub fn num_outcomes(&self) -> usize {
        self.outcomes.len()
    }

    /// Outcomes for a link in state `(tail, head)` with `orientation`.
    ///
    /// Returns an empty slice for inert or undeclared state pairs.
    #[must_use]
    #[inline]
    pub fn rules_for(&self, tail: NodeState, head: NodeState, orientation: Orientation) -> &[Outcome] {
        if tail.index() >= self.num_states || head.index() >= self.num_states {
            return &[];
        }
        let (start, end) = self.ranges[self.key(tail, head, orientation)];
        &self.outcomes[start as usize..end as usize]
    }

    /// Sum of outcome rates for a link state.
    #[must_use]
    pub fn total_rate(&self, tail: NodeState, head: NodeState, orientation: Orientation) -> f64 {
        self.rules_for(tail, head, orientation)
            .iter()
            .map(|o| o.rate)
            .sum()
    }

    #[inline]
    const fn key(&self, tail: NodeState, head: NodeState, orientation: Orientation) -> usize {
        (tail.index() * self.num_states + head.index()) * Orientation::COUNT + orientation.index()
    }
}

/// Builder that validates and compiles a [`TransitionRuleTable`].
#[derive(Debug, Clone)]
pub struct RuleTableBuilder {
    num_states: usize,
    state_names: Vec<String>,
    rules: Vec<TransitionRule>,
    required: Vec<String>,
}

impl RuleTableBuilder {
    /// Name the states, in code order.
    #[must_use]
    pub fn state_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Add one rule.
    #[must_use]
    pub fn rule(mut self, rule: TransitionRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Add many rules, preserving order.
    #[must_use]
    pub fn rules(mut self, rules: impl IntoIterator<Item = TransitionRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Require at least one positive-rate rule for a named process.
    #[must_use]
    pub fn require_process(mut self, process: impl Into<String>) -> Self {
        self.required.push(process.into());
        self
    }

    /// Validate and compile.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if:
    /// - the state count is zero or exceeds [`MAX_STATES`]
    /// - more state names than states are given
    /// - any rate is negative or non-finite
    /// - any rule references an undeclared state
    /// - a required process has no positive-rate rule
    pub fn build(self) -> SimResult<TransitionRuleTable> {
        let n = self.num_states;
        if n == 0 || n > MAX_STATES {
            return Err(SimError::config(format!(
                "state count must be in 1..={MAX_STATES}, got {n}"
            )));
        }
        if self.state_names.len() > n {
            return Err(SimError::config(format!(
                "{} state names given for {n} states",
                self.state_names.len()
            )));
        }

        for (i, rule) in self.rules.iter().enumerate() {
            if !rule.rate.is_finite() || rule.rate < 0.0 {
                return Err(SimError::config(format!(
                    "rule {i} ({}) has invalid rate {}",
                    describe(rule),
                    rule.rate
                )));
            }
            for state in [rule.from_tail, rule.from_head, rule.to_tail, rule.to_head] {
                if state.index() >= n {
                    return Err(SimError::config(format!(
                        "rule {i} ({}) references undeclared state {state}",
                        describe(rule)
                    )));
                }
            }
        }

        for process in &self.required {
            let covered = self
                .rules
                .iter()
                .any(|r| &r.process == process && r.rate > 0.0);
            if !covered {
                return Err(SimError::config(format!(
                    "no positive-rate rule provided for required process '{process}'"
                )));
            }
        }

        let mut table = TransitionRuleTable {
            num_states: n,
            state_names: self.state_names,
            rules: Vec::new(),
            ranges: vec![(0, 0); n * n * Orientation::COUNT],
            outcomes: Vec::new(),
        };

        let mut keyed: Vec<(usize, u32)> = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, r)| r.rate > 0.0)
            .map(|(i, r)| (table.key(r.from_tail, r.from_head, r.orientation), i as u32))
            .collect();
        // Stable: rules sharing a key keep their supplied order.
        keyed.sort_by_key(|&(key, _)| key);

        table.outcomes.reserve(keyed.len());
        let mut i = 0;
        while i < keyed.len() {
            let key = keyed[i].0;
            let start = table.outcomes.len() as u32;
            while i < keyed.len() && keyed[i].0 == key {
                let rule = &self.rules[keyed[i].1 as usize];
                table.outcomes.push(Outcome {
                    tail: rule.to_tail,
                    head: rule.to_head,
                    rate: rule.rate,
                    rule: keyed[i].1,
                });
                i += 1;
            }
            table.ranges[key] = (start, table.outcomes.len() as u32);
        }

        table.rules = self.rules;
        Ok(table)
    }
}

fn describe(rule: &TransitionRule) -> String {
    format!(
        "({}, {}, {:?}) -> ({}, {}) '{}'",
        rule.from_tail, rule.from_head, rule.orientation, rule.to_tail, rule.to_head, rule.process
    )
}
