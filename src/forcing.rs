//! Deterministic periodic actions applied alongside the stochastic events.
//!
//! A forcing event fires at `interval`, `2·interval`, ... and stops after
//! `until` when one is given. Its action is planned read-only against the
//! current lattice; the engine commits the plan node by node after the
//! guard has cleared every change. Fixed nodes are never part of a plan.

use serde::{Deserialize, Serialize};

use crate::engine::SimTime;
use crate::error::{SimError, SimResult};
use crate::lattice::{BoundaryClass, BoundaryPolicy, Lattice, NodeId, NodeState};
use crate::rules::TransitionRuleTable;

/// Tangent of the 60° fault dip.
const FAULT_SLOPE: f64 = 1.732_050_807_568_877_2;

/// What a forcing event does to the lattice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ForcingAction {
    /// Shift the interior nodes of every column up one row.
    ///
    /// The lowest interior node of each column becomes `rock_state`, or the
    /// layer's state where `block_layer` cuts the fed-in rock; the state of
    /// the highest interior node leaves the domain.
    Uplift {
        /// State given to the newly exposed bottom node.
        rock_state: NodeState,
        /// Dipping layer carried up with the rock.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block_layer: Option<BlockLayer>,
    },
    /// Slip on a 60° normal fault: the footwall rises one row.
    ///
    /// The fault trace crosses `y = 0` at `fault_x` and dips to the left,
    /// so interior nodes with `y < (x - fault_x)·tan 60°` form the footwall.
    /// Each footwall column shifts up like [`ForcingAction::Uplift`] with
    /// `rock_state` fed in from below; the hanging wall stays put and keeps
    /// its states where the footwall meets it.
    NormalFault {
        /// Horizontal position where the fault meets the base.
        fault_x: f64,
        /// State given to the newly exposed footwall base.
        rock_state: NodeState,
    },
    /// Turn non-fixed nodes of one row from any `from` state into `to`.
    ReclassifyRow {
        /// Row index, 0 at the bottom.
        row: usize,
        /// States that are replaced.
        from: Vec<NodeState>,
        /// Replacement state.
        to: NodeState,
    },
}

/// A planar layer of distinct material inside the uplifted rock.
///
/// The layer is fixed to the rock: its top passes through
/// `(layer_left_x, y0_top)` in the frame of the unuplifted lattice and
/// descends to the right at `dip_angle` degrees. Nodes left of
/// `layer_left_x` are never in the layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockLayer {
    /// State of rock inside the layer.
    pub block_state: NodeState,
    /// Dip in degrees, positive down to the right.
    #[serde(default)]
    pub dip_angle: f64,
    /// Vertical thickness in cell heights.
    #[serde(default = "default_layer_thickness")]
    pub thickness: f64,
    /// Left end of the layer.
    #[serde(default)]
    pub layer_left_x: f64,
    /// Height of the layer top at `layer_left_x`.
    #[serde(default)]
    pub y0_top: f64,
}

const fn default_layer_thickness() -> f64 {
    1.0
}

impl BlockLayer {
    /// Whether rock at `(x, y)` after `uplifted` rows of uplift lies in the
    /// layer.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64, uplifted: u64) -> bool {
        if x < self.layer_left_x {
            return false;
        }
        #[allow(clippy::cast_precision_loss)]
        let y_rock = y - uplifted as f64;
        let top = self.y0_top - (x - self.layer_left_x) * self.dip_angle.to_radians().tan();
        let depth = top - y_rock;
        (0.0..self.thickness).contains(&depth)
    }

    pub(crate) fn validate(&self) -> SimResult<()> {
        if !(self.dip_angle.is_finite() && self.dip_angle.abs() < 90.0) {
            return Err(SimError::config(format!(
                "block layer dip must lie strictly between -90 and 90 degrees, got {}",
                self.dip_angle
            )));
        }
        if !(self.thickness.is_finite() && self.thickness > 0.0) {
            return Err(SimError::config(format!(
                "block layer thickness must be positive and finite, got {}",
                self.thickness
            )));
        }
        if !(self.layer_left_x.is_finite() && self.y0_top.is_finite()) {
            return Err(SimError::config("block layer position must be finite"));
        }
        Ok(())
    }
}

impl ForcingAction {
    /// Node changes this action would make on its `applied`-th application
    /// (0-based), in ascending node order.
    ///
    /// Only nodes whose state actually changes are listed.
    #[must_use]
    pub fn plan(
        &self,
        lattice: &Lattice,
        boundary: &BoundaryPolicy,
        applied: u64,
    ) -> Vec<(NodeId, NodeState)> {
        match self {
            Self::Uplift {
                rock_state,
                block_layer,
            } => {
                let shape = lattice.shape();
                plan_column_shift(
                    lattice,
                    boundary,
                    |_| true,
                    |node| {
                        let (x, y) = shape.position(node);
                        match block_layer {
                            Some(layer) if layer.contains(x, y, applied + 1) => layer.block_state,
                            _ => *rock_state,
                        }
                    },
                )
            }
            Self::NormalFault {
                fault_x,
                rock_state,
            } => {
                let shape = lattice.shape();
                plan_column_shift(
                    lattice,
                    boundary,
                    |node| {
                        let (x, y) = shape.position(node);
                        y < (x - fault_x) * FAULT_SLOPE
                    },
                    |_| *rock_state,
                )
            }
            Self::ReclassifyRow { row, from, to } => {
                let cols = lattice.shape().cols;
                (0..cols)
                    .filter_map(|col| lattice.node_at(*row, col))
                    .filter(|&node| !boundary.is_fixed(node))
                    .filter(|&node| {
                        let state = lattice.state_of(node);
                        state != *to && from.contains(&state)
                    })
                    .map(|node| (node, *to))
                    .collect()
            }
        }
    }

    fn states(&self) -> Vec<NodeState> {
        match self {
            Self::Uplift {
                rock_state,
                block_layer,
            } => {
                let mut states = vec![*rock_state];
                states.extend(block_layer.map(|layer| layer.block_state));
                states
            }
            Self::NormalFault { rock_state, .. } => vec![*rock_state],
            Self::ReclassifyRow { from, to, .. } => {
                let mut states = from.clone();
                states.push(*to);
                states
            }
        }
    }
}

/// Shift the moving interior nodes of each column up one row.
///
/// `moves` selects the nodes that shift; within a column they must form a
/// run starting at the lowest interior node. `feed` gives the state of the
/// lowest moving node.
fn plan_column_shift(
    lattice: &Lattice,
    boundary: &BoundaryPolicy,
    moves: impl Fn(NodeId) -> bool,
    feed: impl Fn(NodeId) -> NodeState,
) -> Vec<(NodeId, NodeState)> {
    let shape = lattice.shape();
    let mut changes = Vec::new();
    for col in 0..shape.cols {
        let column: Vec<NodeId> = (0..shape.rows)
            .filter_map(|row| lattice.node_at(row, col))
            .filter(|&node| boundary.classify(node) == BoundaryClass::Interior)
            .take_while(|&node| moves(node))
            .collect();
        let Some(&base) = column.first() else {
            continue;
        };
        let mut below = feed(base);
        for &node in &column {
            let current = lattice.state_of(node);
            if current != below {
                changes.push((node, below));
            }
            below = current;
        }
    }
    changes.sort_unstable_by_key(|&(node, _)| node);
    changes
}

/// A periodic forcing action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcingEvent {
    /// The action applied each period.
    #[serde(flatten)]
    pub action: ForcingAction,
    /// Simulated time between applications.
    pub interval: f64,
    /// Last time at which the action may fire.
    #[serde(default)]
    pub until: Option<f64>,
}

impl ForcingEvent {
    /// Uplift every `interval`.
    #[must_use]
    pub const fn uplift(rock_state: NodeState, interval: f64) -> Self {
        Self::every(
            ForcingAction::Uplift {
                rock_state,
                block_layer: None,
            },
            interval,
        )
    }

    /// Apply `action` every `interval`.
    #[must_use]
    pub const fn every(action: ForcingAction, interval: f64) -> Self {
        Self {
            action,
            interval,
            until: None,
        }
    }

    /// Stop applying after `until`.
    #[must_use]
    pub const fn with_until(mut self, until: f64) -> Self {
        self.until = Some(until);
        self
    }

    /// Time of the `k`-th application (0-based), or `None` once past
    /// `until`.
    #[must_use]
    pub fn time_of(&self, k: u64) -> Option<SimTime> {
        #[allow(clippy::cast_precision_loss)]
        let t = self.interval * (k + 1) as f64;
        if !t.is_finite() || self.until.is_some_and(|until| t > until) {
            return None;
        }
        SimTime::try_new(t)
    }

    /// Check the event against the lattice and state set it will act on.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a non-positive or non-finite
    /// interval, a negative or non-finite end time, an out-of-range row, a
    /// non-finite fault position, a malformed block layer or an undeclared
    /// state.
    pub fn validate(&self, lattice: &Lattice, rules: &TransitionRuleTable) -> SimResult<()> {
        if !(self.interval.is_finite() && self.interval > 0.0) {
            return Err(SimError::config(format!(
                "forcing interval must be positive and finite, got {}",
                self.interval
            )));
        }
        if let Some(until) = self.until {
            if !(until.is_finite() && until >= 0.0) {
                return Err(SimError::config(format!(
                    "forcing end time must be non-negative and finite, got {until}"
                )));
            }
        }
        match &self.action {
            ForcingAction::ReclassifyRow { row, .. } if *row >= lattice.shape().rows => {
                return Err(SimError::config(format!(
                    "forcing row {row} outside lattice with {} rows",
                    lattice.shape().rows
                )));
            }
            ForcingAction::NormalFault { fault_x, .. } if !fault_x.is_finite() => {
                return Err(SimError::config(format!(
                    "fault position must be finite, got {fault_x}"
                )));
            }
            ForcingAction::Uplift {
                block_layer: Some(layer),
                ..
            } => layer.validate()?,
            _ => {}
        }
        if let Some(state) = self.action.states().into_iter().find(|&s| !rules.contains_state(s)) {
            return Err(SimError::config(format!(
                "forcing uses undeclared state {state}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::lattice::{BoundaryLayout, EdgeKind, GridShape};

    const AIR: NodeState = NodeState(0);
    const SOIL: NodeState = NodeState(1);
    const ROCK: NodeState = NodeState(2);
    const BLOCK: NodeState = NodeState(3);

    fn table() -> TransitionRuleTable {
        TransitionRuleTable::builder(3).build().unwrap()
    }

    fn uplift(rock_state: NodeState) -> ForcingAction {
        ForcingAction::Uplift {
            rock_state,
            block_layer: None,
        }
    }

    fn layer(dip_angle: f64, layer_left_x: f64) -> BlockLayer {
        BlockLayer {
            block_state: BLOCK,
            dip_angle,
            thickness: 1.0,
            layer_left_x,
            y0_top: 0.0,
        }
    }

    fn closed_top_and_bottom(shape: GridShape) -> BoundaryPolicy {
        let layout = BoundaryLayout {
            left: EdgeKind::Interior,
            right: EdgeKind::Interior,
            bottom: EdgeKind::Fixed,
            top: EdgeKind::Fixed,
        };
        BoundaryPolicy::from_layout(shape, layout)
    }

    fn column_lattice() -> (Lattice, BoundaryPolicy) {
        // one column: fixed bottom, three interior nodes, fixed top
        let shape = GridShape::rectangular(5, 1);
        let lattice = Lattice::new(shape, vec![ROCK, SOIL, AIR, AIR, AIR]).unwrap();
        (lattice, closed_top_and_bottom(shape))
    }

    #[test]
    fn test_uplift_shifts_interior_column() {
        let (lattice, boundary) = column_lattice();
        let plan = uplift(ROCK).plan(&lattice, &boundary, 0);
        // rows 1..=3 are interior: [SOIL, AIR, AIR] -> [ROCK, SOIL, AIR]
        assert_eq!(plan, vec![(1, ROCK), (2, SOIL)]);
    }

    #[test]
    fn test_uplift_never_touches_fixed_nodes() {
        let (lattice, boundary) = column_lattice();
        let plan = uplift(SOIL).plan(&lattice, &boundary, 0);
        assert!(plan.iter().all(|&(node, _)| !boundary.is_fixed(node)));
    }

    #[test]
    fn test_reclassify_row() {
        let shape = GridShape::rectangular(2, 3);
        let lattice = Lattice::new(shape, vec![SOIL, AIR, SOIL, AIR, AIR, AIR]).unwrap();
        let boundary = BoundaryPolicy::from_classes(vec![
            BoundaryClass::Fixed,
            BoundaryClass::Interior,
            BoundaryClass::Open,
            BoundaryClass::Interior,
            BoundaryClass::Interior,
            BoundaryClass::Interior,
        ]);
        let action = ForcingAction::ReclassifyRow {
            row: 0,
            from: vec![SOIL],
            to: ROCK,
        };
        assert_eq!(action.plan(&lattice, &boundary, 0), vec![(2, ROCK)]);
    }

    #[test]
    fn test_uplift_feeds_flat_layer_once() {
        let (lattice, boundary) = column_lattice();
        let action = ForcingAction::Uplift {
            rock_state: ROCK,
            block_layer: Some(layer(0.0, 0.0)),
        };
        // the layer's single row of rock reaches the base on the first step
        assert_eq!(
            action.plan(&lattice, &boundary, 0),
            vec![(1, BLOCK), (2, SOIL)]
        );
        assert_eq!(
            action.plan(&lattice, &boundary, 1),
            vec![(1, ROCK), (2, SOIL)]
        );
    }

    #[test]
    fn test_uplift_dipping_layer_moves_right() {
        // one interior row between fixed rows: every column feeds one node
        let shape = GridShape::rectangular(3, 4);
        let lattice = Lattice::filled(shape, AIR).unwrap();
        let boundary = closed_top_and_bottom(shape);
        let action = ForcingAction::Uplift {
            rock_state: ROCK,
            block_layer: Some(layer(45.0, 1.0)),
        };

        assert_eq!(
            action.plan(&lattice, &boundary, 0),
            vec![(4, ROCK), (5, BLOCK), (6, ROCK), (7, ROCK)]
        );
        assert_eq!(
            action.plan(&lattice, &boundary, 1),
            vec![(4, ROCK), (5, ROCK), (6, BLOCK), (7, ROCK)]
        );
    }

    #[test]
    fn test_block_layer_ignores_rock_left_of_its_end() {
        let layer = layer(0.0, 2.0);
        assert!(!layer.contains(1.0, 1.0, 1));
        assert!(layer.contains(2.0, 1.0, 1));
        assert!(!layer.contains(2.0, 1.0, 2));
    }

    #[test]
    fn test_normal_fault_raises_footwall_only() {
        // x = col, y = row; the trace y = (x - 0.5)·tan 60° leaves rows 1..=2
        // of column 2 and rows 1..=3 of column 3 in the footwall
        let shape = GridShape::rectangular(5, 4);
        let mut states = vec![AIR; shape.num_nodes()];
        states[..4].fill(ROCK);
        states[4..8].fill(SOIL);
        states[14] = SOIL;
        let lattice = Lattice::new(shape, states).unwrap();
        let boundary = closed_top_and_bottom(shape);
        let action = ForcingAction::NormalFault {
            fault_x: 0.5,
            rock_state: ROCK,
        };

        let plan = action.plan(&lattice, &boundary, 0);
        assert_eq!(plan, vec![(6, ROCK), (7, ROCK), (10, SOIL), (11, SOIL)]);
        for &(node, _) in &plan {
            let (x, y) = shape.position(node);
            assert!(y < (x - 0.5) * FAULT_SLOPE, "node {node} is in the hanging wall");
        }
    }

    #[test]
    fn test_normal_fault_left_of_trace_is_static() {
        let shape = GridShape::rectangular(5, 4);
        let lattice = Lattice::filled(shape, SOIL).unwrap();
        let boundary = closed_top_and_bottom(shape);
        let action = ForcingAction::NormalFault {
            fault_x: 10.0,
            rock_state: ROCK,
        };
        assert!(action.plan(&lattice, &boundary, 0).is_empty());
    }

    #[test]
    fn test_time_of_respects_until() {
        let event = ForcingEvent::uplift(ROCK, 2.0).with_until(5.0);
        assert_eq!(event.time_of(0), Some(SimTime::new(2.0)));
        assert_eq!(event.time_of(1), Some(SimTime::new(4.0)));
        assert_eq!(event.time_of(2), None);
    }

    #[test]
    fn test_validate_rejects_bad_interval() {
        let (lattice, _) = column_lattice();
        let event = ForcingEvent::uplift(ROCK, 0.0);
        assert!(event.validate(&lattice, &table()).is_err());
        let event = ForcingEvent::uplift(ROCK, f64::NAN);
        assert!(event.validate(&lattice, &table()).is_err());
    }

    #[test]
    fn test_validate_rejects_undeclared_state_and_row() {
        let (lattice, _) = column_lattice();
        let event = ForcingEvent::uplift(NodeState(3), 1.0);
        assert!(event.validate(&lattice, &table()).is_err());

        let event = ForcingEvent {
            action: ForcingAction::ReclassifyRow {
                row: 5,
                from: vec![AIR],
                to: SOIL,
            },
            interval: 1.0,
            until: None,
        };
        assert!(event.validate(&lattice, &table()).is_err());
    }

    #[test]
    fn test_validate_fault_and_layer() {
        let (lattice, _) = column_lattice();
        let table = TransitionRuleTable::builder(4).build().unwrap();

        let fault = |fault_x| {
            ForcingEvent::every(
                ForcingAction::NormalFault {
                    fault_x,
                    rock_state: ROCK,
                },
                1.0,
            )
        };
        assert!(fault(3.0).validate(&lattice, &table).is_ok());
        assert!(fault(f64::NAN).validate(&lattice, &table).is_err());

        let layered = |block| {
            ForcingEvent::every(
                ForcingAction::Uplift {
                    rock_state: ROCK,
                    block_layer: Some(block),
                },
                1.0,
            )
        };
        assert!(layered(layer(30.0, 0.0)).validate(&lattice, &table).is_ok());
        assert!(layered(layer(90.0, 0.0)).validate(&lattice, &table).is_err());
        let thin = BlockLayer {
            thickness: 0.0,
            ..layer(0.0, 0.0)
        };
        assert!(layered(thin).validate(&lattice, &table).is_err());
        // BLOCK is not declared in a three-state table
        assert!(layered(layer(0.0, 0.0)).validate(&lattice, &self::table()).is_err());
    }

    #[test]
    fn test_yaml_fault_and_layer() {
        let yaml = "action: normal-fault\nfault_x: 5.0\nrock_state: 2\ninterval: 10.0\n";
        let event: ForcingEvent = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            event,
            ForcingEvent::every(
                ForcingAction::NormalFault {
                    fault_x: 5.0,
                    rock_state: ROCK,
                },
                10.0,
            )
        );

        let yaml = "action: uplift\nrock_state: 2\nblock_layer:\n  block_state: 3\n  \
                    dip_angle: 30.0\ninterval: 1.0\n";
        let event: ForcingEvent = serde_yaml::from_str(yaml).unwrap();
        let block_layer = match event.action {
            ForcingAction::Uplift { block_layer, .. } => block_layer,
            _ => None,
        };
        assert_eq!(
            block_layer,
            Some(BlockLayer {
                dip_angle: 30.0,
                ..layer(0.0, 0.0)
            })
        );
    }

    #[test]
    fn test_yaml_shape() {
        let yaml = "action: uplift\nrock_state: 2\ninterval: 1000.0\nuntil: 5000.0\n";
        let event: ForcingEvent = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(event, ForcingEvent::uplift(ROCK, 1000.0).with_until(5000.0));
    }
}
