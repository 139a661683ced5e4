//! Grain-hill rule catalog.
//!
//! State set and transition rules for a hillslope cross-section on a hex
//! lattice with vertical columns. Every physical process is expressed as
//! table entries; the engine has no process-specific code.
//!
//! Moving grains carry their direction of travel in the state code. For a
//! link of orientation `o`, one mover travels tail → head and one travels
//! head → tail:
//!
//! | orientation | toward head       | toward tail         |
//! |-------------|-------------------|---------------------|
//! | `Vertical`  | `MOVING_UP`       | `MOVING_DOWN`       |
//! | `UpRight`   | `MOVING_UP_RIGHT` | `MOVING_DOWN_LEFT`  |
//! | `DownRight` | `MOVING_DOWN_RIGHT` | `MOVING_UP_LEFT`  |

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{TransitionRule, TransitionRuleTable};
use crate::error::SimResult;
use crate::lattice::{NodeState, Orientation};

/// Empty space.
pub const AIR: NodeState = NodeState(0);
/// Grain moving up.
pub const MOVING_UP: NodeState = NodeState(1);
/// Grain moving up and right.
pub const MOVING_UP_RIGHT: NodeState = NodeState(2);
/// Grain moving down and right.
pub const MOVING_DOWN_RIGHT: NodeState = NodeState(3);
/// Grain moving down.
pub const MOVING_DOWN: NodeState = NodeState(4);
/// Grain moving down and left.
pub const MOVING_DOWN_LEFT: NodeState = NodeState(5);
/// Grain moving up and left.
pub const MOVING_UP_LEFT: NodeState = NodeState(6);
/// Resting regolith grain.
pub const REGOLITH: NodeState = NodeState(7);
/// Intact bedrock.
pub const ROCK: NodeState = NodeState(8);
/// Large weathered block that cannot be disturbed.
pub const BLOCK: NodeState = NodeState(9);
/// Open-boundary sink that absorbs grains.
pub const SINK: NodeState = NodeState(10);

/// Number of states in the catalog.
pub const NUM_STATES: usize = 11;

/// State names in code order.
pub const STATE_NAMES: [&str; NUM_STATES] = [
    "air",
    "moving up",
    "moving up-right",
    "moving down-right",
    "moving down",
    "moving down-left",
    "moving up-left",
    "regolith",
    "rock",
    "block",
    "sink",
];

/// Seconds in a year of 365.25 days.
pub const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;

const MOVERS: [NodeState; 6] = [
    MOVING_UP,
    MOVING_UP_RIGHT,
    MOVING_DOWN_RIGHT,
    MOVING_DOWN,
    MOVING_DOWN_LEFT,
    MOVING_UP_LEFT,
];

const HEX_ORIENTATIONS: [Orientation; 3] = [
    Orientation::Vertical,
    Orientation::UpRight,
    Orientation::DownRight,
];

/// Gravitational settling rate (1/yr) for a grain dropping one cell.
///
/// The time to fall one cell width `w` from rest is `sqrt(2 w / g)`.
#[must_use]
pub fn settling_rate(cell_width: f64, grav_accel: f64) -> f64 {
    SECONDS_PER_YEAR / (2.0 * cell_width / grav_accel).sqrt()
}

/// Whether a state is a moving grain.
#[must_use]
pub fn is_moving(state: NodeState) -> bool {
    MOVERS.contains(&state)
}

/// Mover travelling from tail to head along `orientation`.
#[must_use]
pub const fn toward_head(orientation: Orientation) -> NodeState {
    match orientation {
        Orientation::UpRight => MOVING_UP_RIGHT,
        Orientation::DownRight => MOVING_DOWN_RIGHT,
        Orientation::Vertical | Orientation::Horizontal => MOVING_UP,
    }
}

/// Mover travelling from head to tail along `orientation`.
#[must_use]
pub const fn toward_tail(orientation: Orientation) -> NodeState {
    match orientation {
        Orientation::UpRight => MOVING_DOWN_LEFT,
        Orientation::DownRight => MOVING_UP_LEFT,
        Orientation::Vertical | Orientation::Horizontal => MOVING_DOWN,
    }
}

/// Process rates for the grain-hill catalog (all in 1/yr).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GrainHillRates {
    /// Gravitational settling of a grain into empty space below it.
    #[validate(range(min = 0.0))]
    pub settling_rate: f64,
    /// Travel rate of moving grains; defaults to the settling rate.
    #[serde(default)]
    pub motion_rate: Option<f64>,
    /// Friction coefficient damping diagonal sliding, in [0, 1].
    #[validate(range(min = 0.0, max = 1.0))]
    pub friction_coef: f64,
    /// Activation of resting grains next to air.
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub disturbance_rate: f64,
    /// Conversion of exposed rock to regolith (or blocks).
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub weathering_rate: f64,
    /// Removal of exposed rock without producing grains.
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub dissolution_rate: f64,
    /// Collapse of rock overhanging air.
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub collapse_rate: f64,
    /// Weather rock to blocks instead of regolith and add block rules.
    #[serde(default)]
    pub include_blocks: bool,
}

impl Default for GrainHillRates {
    fn default() -> Self {
        Self {
            settling_rate: 2.2e8,
            motion_rate: None,
            friction_coef: 0.3,
            disturbance_rate: 1.0,
            weathering_rate: 1.0,
            dissolution_rate: 0.0,
            collapse_rate: 0.0,
            include_blocks: false,
        }
    }
}

impl GrainHillRates {
    fn motion(&self) -> f64 {
        self.motion_rate.unwrap_or(self.settling_rate)
    }
}

/// Full rule list for the given rates, in canonical order.
#[must_use]
pub fn transition_rules(rates: &GrainHillRates) -> Vec<TransitionRule> {
    let mut rules = Vec::new();
    let g = rates.settling_rate;
    let m = rates.motion();
    let slide = g * (1.0 - rates.friction_coef.clamp(0.0, 1.0));
    let solids = [REGOLITH, ROCK, BLOCK];
    let weathered = if rates.include_blocks { BLOCK } else { REGOLITH };

    for o in HEX_ORIENTATIONS {
        let up = toward_head(o);
        let down = toward_tail(o);

        // Travel into empty space.
        rules.push(TransitionRule::new((up, AIR, o), (AIR, up), m, "motion"));
        rules.push(TransitionRule::new((AIR, down, o), (down, AIR), m, "motion"));

        // A mover blocked by a solid or another mover comes to rest.
        for obstacle in solids.iter().chain(MOVERS.iter()).copied() {
            rules.push(TransitionRule::new(
                (up, obstacle, o),
                (REGOLITH, obstacle),
                m,
                "collision",
            ));
            rules.push(TransitionRule::new(
                (obstacle, down, o),
                (obstacle, REGOLITH),
                m,
                "collision",
            ));
        }

        // Grains leave the domain through sinks.
        rules.push(TransitionRule::new((up, SINK, o), (AIR, SINK), m, "sink"));
        rules.push(TransitionRule::new((SINK, down, o), (SINK, AIR), m, "sink"));
    }

    // Gravity: resting grains fall straight down, or slide diagonally
    // down against friction.
    rules.push(TransitionRule::new(
        (AIR, REGOLITH, Orientation::Vertical),
        (REGOLITH, AIR),
        g,
        "settling",
    ));
    rules.push(TransitionRule::new(
        (AIR, REGOLITH, Orientation::UpRight),
        (REGOLITH, AIR),
        slide,
        "settling",
    ));
    rules.push(TransitionRule::new(
        (REGOLITH, AIR, Orientation::DownRight),
        (AIR, REGOLITH),
        slide,
        "settling",
    ));
    rules.push(TransitionRule::new(
        (SINK, REGOLITH, Orientation::Vertical),
        (SINK, AIR),
        g,
        "sink",
    ));
    rules.push(TransitionRule::new(
        (SINK, REGOLITH, Orientation::UpRight),
        (SINK, AIR),
        slide,
        "sink",
    ));
    rules.push(TransitionRule::new(
        (REGOLITH, SINK, Orientation::DownRight),
        (AIR, SINK),
        slide,
        "sink",
    ));

    // Gravity decelerates rising grains over empty space; they stop and
    // then settle.
    for mover in [MOVING_UP, MOVING_UP_RIGHT, MOVING_UP_LEFT] {
        rules.push(TransitionRule::new(
            (AIR, mover, Orientation::Vertical),
            (AIR, REGOLITH),
            g,
            "deceleration",
        ));
    }
    // A mover resting on a solid loses its momentum.
    for solid in solids {
        for mover in [
            MOVING_UP,
            MOVING_UP_RIGHT,
            MOVING_DOWN_RIGHT,
            MOVING_DOWN_LEFT,
            MOVING_UP_LEFT,
        ] {
            rules.push(TransitionRule::new(
                (solid, mover, Orientation::Vertical),
                (solid, REGOLITH),
                g,
                "friction",
            ));
        }
    }

    for o in HEX_ORIENTATIONS {
        let up = toward_head(o);
        let down = toward_tail(o);
        let d = rates.disturbance_rate;
        rules.push(TransitionRule::new((REGOLITH, AIR, o), (AIR, up), d, "disturbance"));
        rules.push(TransitionRule::new((AIR, REGOLITH, o), (down, AIR), d, "disturbance"));

        let w = rates.weathering_rate;
        rules.push(TransitionRule::new((ROCK, AIR, o), (weathered, AIR), w, "weathering"));
        rules.push(TransitionRule::new((AIR, ROCK, o), (AIR, weathered), w, "weathering"));

        let diss = rates.dissolution_rate;
        rules.push(TransitionRule::new((ROCK, AIR, o), (AIR, AIR), diss, "dissolution"));
        rules.push(TransitionRule::new((AIR, ROCK, o), (AIR, AIR), diss, "dissolution"));
    }

    // Rock overhanging air collapses.
    let collapsed = if rates.include_blocks { BLOCK } else { MOVING_DOWN };
    rules.push(TransitionRule::new(
        (AIR, ROCK, Orientation::Vertical),
        (AIR, collapsed),
        rates.collapse_rate,
        "collapse",
    ));

    if rates.include_blocks {
        rules.extend(block_rules(rates));
    }

    rules
}

/// Undermining, weathering and collision rules for blocks.
fn block_rules(rates: &GrainHillRates) -> Vec<TransitionRule> {
    let g = rates.settling_rate;
    let d = rates.disturbance_rate;
    let w = rates.weathering_rate;
    let mut rules = vec![
        TransitionRule::new(
            (AIR, BLOCK, Orientation::Vertical),
            (BLOCK, AIR),
            g,
            "block settling",
        ),
        TransitionRule::new(
            (AIR, BLOCK, Orientation::UpRight),
            (BLOCK, AIR),
            d,
            "block settling",
        ),
        TransitionRule::new(
            (BLOCK, AIR, Orientation::DownRight),
            (AIR, BLOCK),
            d,
            "block settling",
        ),
    ];
    for o in HEX_ORIENTATIONS {
        rules.push(TransitionRule::new(
            (AIR, BLOCK, o),
            (AIR, REGOLITH),
            w,
            "block weathering",
        ));
        rules.push(TransitionRule::new(
            (BLOCK, AIR, o),
            (REGOLITH, AIR),
            w,
            "block weathering",
        ));
    }
    // Movers striking blocks come to rest through the collision rules.
    rules
}

/// Compile the catalog into a rule table.
///
/// # Errors
///
/// Returns a configuration error if any rate is negative or non-finite, or
/// if settling or motion has zero rate.
pub fn rule_table(rates: &GrainHillRates) -> SimResult<TransitionRuleTable> {
    TransitionRuleTable::builder(NUM_STATES)
        .state_names(STATE_NAMES)
        .rules(transition_rules(rates))
        .require_process("settling")
        .require_process("motion")
        .build()
}
