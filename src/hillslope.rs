//! Grain-hill preset: a hex hillslope cross-section with uplift.
//!
//! Layout:
//! - bottom row: fixed rock
//! - left and right columns: open sinks that remove arriving grains
//! - top row: fixed air
//! - interior: rock below `initial_rock_height` cell heights, air above
//!
//! Uplift raises the interior of every column by one cell each
//! `uplift_interval`, feeding fresh rock in from below while grains escape
//! through the side sinks. Over time this builds a steady-state hill.
//!
//! Setting `fault_x` replaces uniform uplift with slip on a 60° normal
//! fault, so only the footwall rises and a faceted scarp grows above the
//! trace. A `block_layer` instead embeds a dipping layer of a second rock
//! type in the uplifted material.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::engine::{EngineOptions, EngineParts};
use crate::error::{SimError, SimResult};
use crate::forcing::{BlockLayer, ForcingAction, ForcingEvent};
use crate::lattice::{
    BoundaryClass, BoundaryLayout, BoundaryPolicy, EdgeKind, GridShape, Lattice, NodeState,
};
use crate::rules::grain_hill::{self, GrainHillRates, AIR, ROCK, SINK};

/// Parameters of the grain-hill preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GrainHillParams {
    /// Node rows.
    #[validate(range(min = 3))]
    pub rows: usize,
    /// Node columns.
    #[validate(range(min = 3))]
    pub cols: usize,
    /// Process rates.
    #[validate(nested)]
    pub rates: GrainHillRates,
    /// Cell width in metres; when set, overrides the settling rate.
    #[validate(range(exclusive_min = 0.0))]
    pub cell_width: Option<f64>,
    /// Gravitational acceleration (m/s²) used with `cell_width`.
    #[validate(range(exclusive_min = 0.0))]
    pub grav_accel: f64,
    /// Years between uplift steps; no uplift when unset.
    #[validate(range(exclusive_min = 0.0))]
    pub uplift_interval: Option<f64>,
    /// Years after which uplift stops.
    #[validate(range(min = 0.0))]
    pub uplift_duration: Option<f64>,
    /// State fed in at the base of each column by uplift.
    pub uplift_state: NodeState,
    /// Fault trace position; uplift becomes normal-fault slip when set.
    pub fault_x: Option<f64>,
    /// Dipping layer carried up with the uplifted rock.
    pub block_layer: Option<BlockLayer>,
    /// Interior nodes below this height start as rock.
    #[validate(range(min = 0.0))]
    pub initial_rock_height: f64,
}

impl Default for GrainHillParams {
    fn default() -> Self {
        Self {
            rows: 20,
            cols: 21,
            rates: GrainHillRates::default(),
            cell_width: None,
            grav_accel: 9.8,
            uplift_interval: None,
            uplift_duration: None,
            uplift_state: ROCK,
            fault_x: None,
            block_layer: None,
            initial_rock_height: 2.0,
        }
    }
}

impl GrainHillParams {
    /// Lattice shape.
    #[must_use]
    pub const fn shape(&self) -> GridShape {
        GridShape::hex(self.rows, self.cols)
    }

    /// Edge classification: open sides, fixed bottom and top.
    #[must_use]
    pub const fn boundary_layout() -> BoundaryLayout {
        BoundaryLayout {
            left: EdgeKind::Open,
            right: EdgeKind::Open,
            bottom: EdgeKind::Fixed,
            top: EdgeKind::Fixed,
        }
    }

    /// Rates with the settling rate derived from `cell_width` when set.
    #[must_use]
    pub fn effective_rates(&self) -> GrainHillRates {
        let mut rates = self.rates;
        if let Some(width) = self.cell_width {
            rates.settling_rate = grain_hill::settling_rate(width, self.grav_accel);
        }
        rates
    }

    /// Initial state of every node.
    #[must_use]
    pub fn initial_states(&self, boundary: &BoundaryPolicy) -> Vec<NodeState> {
        let shape = self.shape();
        (0..shape.num_nodes())
            .map(|node| {
                let (row, _) = shape.row_col(node);
                match boundary.classify(node) {
                    BoundaryClass::Fixed if row == 0 => ROCK,
                    BoundaryClass::Fixed => AIR,
                    BoundaryClass::Open => SINK,
                    BoundaryClass::Interior => {
                        let (_, y) = shape.position(node);
                        if y < self.initial_rock_height {
                            ROCK
                        } else {
                            AIR
                        }
                    }
                }
            })
            .collect()
    }

    /// Check that the uplift options fit together.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a duration, fault or block layer
    /// is given without `uplift_interval`, when a fault is combined with a
    /// block layer, or when either is malformed.
    pub fn check_forcing(&self) -> SimResult<()> {
        if self.uplift_interval.is_none() {
            let orphan = [
                ("uplift_duration", self.uplift_duration.is_some()),
                ("fault_x", self.fault_x.is_some()),
                ("block_layer", self.block_layer.is_some()),
            ]
            .into_iter()
            .find(|&(_, set)| set);
            if let Some((name, _)) = orphan {
                return Err(SimError::config(format!("{name} requires uplift_interval")));
            }
        }
        match (self.fault_x, &self.block_layer) {
            (Some(_), Some(_)) => Err(SimError::config(
                "block_layer applies to uniform uplift and cannot be combined with fault_x",
            )),
            (Some(x), None) if !x.is_finite() => Err(SimError::config(format!(
                "fault position must be finite, got {x}"
            ))),
            (None, Some(layer)) => layer.validate(),
            _ => Ok(()),
        }
    }

    /// Uplift or fault-slip forcing, if enabled.
    #[must_use]
    pub fn forcing(&self) -> Vec<ForcingEvent> {
        self.uplift_interval
            .map(|interval| {
                let action = match self.fault_x {
                    Some(fault_x) => ForcingAction::NormalFault {
                        fault_x,
                        rock_state: self.uplift_state,
                    },
                    None => ForcingAction::Uplift {
                        rock_state: self.uplift_state,
                        block_layer: self.block_layer,
                    },
                };
                let event = ForcingEvent::every(action, interval);
                match self.uplift_duration {
                    Some(until) => event.with_until(until),
                    None => event,
                }
            })
            .into_iter()
            .collect()
    }

    /// Build engine parts for this preset.
    ///
    /// # Errors
    ///
    /// Returns error if the parameters fail validation, the uplift options
    /// conflict, the lattice is too large or the rule catalog cannot be
    /// compiled.
    pub fn engine_parts(&self, options: EngineOptions) -> SimResult<EngineParts> {
        self.validate()?;
        self.check_forcing()?;
        let shape = self.shape();
        shape.validate()?;
        let boundary = BoundaryPolicy::from_layout(shape, Self::boundary_layout());
        let lattice = Lattice::new(shape, self.initial_states(&boundary))?;
        let rules = grain_hill::rule_table(&self.effective_rates())?;
        let mut parts = EngineParts::new(lattice, boundary, rules).with_options(options);
        parts.forcing = self.forcing();
        Ok(parts)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::engine::{RunStatus, SimEngine, SimTime, StopCondition};
    use crate::rules::grain_hill::REGOLITH;

    fn small() -> GrainHillParams {
        GrainHillParams {
            rows: 6,
            cols: 7,
            rates: GrainHillRates {
                settling_rate: 1.0e3,
                disturbance_rate: 1.0,
                weathering_rate: 1.0,
                ..GrainHillRates::default()
            },
            uplift_interval: Some(5.0),
            ..GrainHillParams::default()
        }
    }

    #[test]
    fn test_initial_layout() {
        let params = small();
        let parts = params.engine_parts(EngineOptions::default()).unwrap();
        let snap = parts.lattice.snapshot(SimTime::ZERO);

        // bottom row rock, top row air, side columns sinks
        assert_eq!(snap.state_at(0, 3), Some(ROCK));
        assert_eq!(snap.state_at(5, 3), Some(AIR));
        assert_eq!(snap.state_at(2, 0), Some(SINK));
        assert_eq!(snap.state_at(2, 6), Some(SINK));
        // interior rock below two cell heights
        assert_eq!(snap.state_at(1, 2), Some(ROCK));
        assert_eq!(snap.state_at(1, 3), Some(ROCK));
        assert_eq!(snap.state_at(2, 2), Some(AIR));
        assert_eq!(parts.forcing.len(), 1);
    }

    #[test]
    fn test_cell_width_sets_settling_rate() {
        let params = GrainHillParams {
            cell_width: Some(1.0),
            ..GrainHillParams::default()
        };
        let rate = params.effective_rates().settling_rate;
        assert!((rate - grain_hill::settling_rate(1.0, 9.8)).abs() < 1e-6);
    }

    #[test]
    fn test_uplift_duration_bounds_forcing() {
        let params = GrainHillParams {
            uplift_interval: Some(10.0),
            uplift_duration: Some(25.0),
            ..GrainHillParams::default()
        };
        let forcing = params.forcing();
        assert_eq!(forcing[0].until, Some(25.0));
        assert!(GrainHillParams::default().forcing().is_empty());
    }

    #[test]
    fn test_fault_slip_raises_footwall() {
        let params = GrainHillParams {
            fault_x: Some(1.0),
            ..small()
        };
        let parts = params.engine_parts(EngineOptions::default()).unwrap();
        let action = &parts.forcing[0].action;
        assert!(matches!(action, ForcingAction::NormalFault { .. }));

        let plan = action.plan(&parts.lattice, &parts.boundary, 0);
        assert!(!plan.is_empty());
        let shape = params.shape();
        for &(node, state) in &plan {
            let (x, y) = shape.position(node);
            assert!(y < (x - 1.0) * 3f64.sqrt(), "node {node} above the fault");
            assert!(state == ROCK || state == AIR);
        }
    }

    #[test]
    fn test_block_layer_options() {
        let layer = BlockLayer {
            block_state: grain_hill::BLOCK,
            dip_angle: 20.0,
            thickness: 2.0,
            layer_left_x: 0.0,
            y0_top: 0.0,
        };
        let params = GrainHillParams {
            block_layer: Some(layer),
            ..small()
        };
        assert!(params.engine_parts(EngineOptions::default()).is_ok());
        assert!(matches!(
            params.forcing()[0].action,
            ForcingAction::Uplift {
                block_layer: Some(_),
                ..
            }
        ));

        let faulted = GrainHillParams {
            fault_x: Some(2.0),
            ..params.clone()
        };
        assert!(faulted.check_forcing().unwrap_err().is_configuration());

        let no_uplift = GrainHillParams {
            uplift_interval: None,
            ..params
        };
        let err = no_uplift.check_forcing().unwrap_err();
        assert!(err.to_string().contains("block_layer requires uplift_interval"));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = GrainHillParams {
            rows: 2,
            ..GrainHillParams::default()
        };
        assert!(params.engine_parts(EngineOptions::default()).is_err());

        let params = GrainHillParams {
            uplift_interval: Some(0.0),
            ..GrainHillParams::default()
        };
        assert!(params.engine_parts(EngineOptions::default()).is_err());
    }

    #[test]
    fn test_hill_evolves_and_keeps_fixed_nodes() {
        let params = small();
        let parts = params
            .engine_parts(EngineOptions {
                seed: 11,
                ..EngineOptions::default()
            })
            .unwrap();
        let initial = parts.lattice.snapshot(SimTime::ZERO);
        let mut engine = SimEngine::new(parts).unwrap();

        let outcome = engine
            .advance_until(&StopCondition::until(SimTime::new(20.0)))
            .unwrap();
        assert_eq!(outcome.status, RunStatus::StoppedByCaller);
        assert_eq!(outcome.forcing_count, 4);
        assert!(outcome.event_count > 0);

        let snap = engine.snapshot();
        for node in 0..snap.states.len() {
            if engine.boundary().is_fixed(node) {
                assert_eq!(snap.states[node], initial.states[node], "fixed node {node}");
            }
        }
        let produced = snap.count(REGOLITH) + snap.count(ROCK);
        assert!(produced > 0);
    }
}
