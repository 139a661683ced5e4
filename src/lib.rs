//! # grainhill
//!
//! Continuous-time stochastic cellular automaton (CTS-CA) engine for
//! grain-scale hillslope evolution.
//!
//! A lattice of nodes holds discrete material states. Each link between
//! adjacent nodes is a set of competing Poisson processes drawn from a
//! transition rule table; the engine runs them with a next-reaction
//! kinetic Monte Carlo scheduler, interleaving periodic forcing such as
//! tectonic uplift.
//!
//! - Jidoka: every change is checked against the boundary and state
//!   invariants before it is committed
//! - Reproducibility: a single master seed fixes the whole trajectory
//! - Replay: an optional journal rebuilds the lattice at any recorded time
//!
//! ## Example
//!
//! ```rust
//! use grainhill::prelude::*;
//! use grainhill::hillslope::GrainHillParams;
//!
//! let config = SimConfig::builder()
//!     .seed(42)
//!     .grain_hill(GrainHillParams {
//!         rows: 6,
//!         cols: 7,
//!         ..GrainHillParams::default()
//!     })
//!     .build();
//! let mut engine = SimEngine::from_config(&config).expect("valid preset");
//! let outcome = engine
//!     .advance_until(&StopCondition::events(100))
//!     .expect("run");
//! assert!(outcome.event_count <= 100);
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops,
    clippy::too_many_lines,
    clippy::missing_const_for_fn,  // Many functions can't be const in stable Rust
    clippy::needless_range_loop,   // Sometimes range loops are clearer
)]

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod forcing;
pub mod hillslope;
pub mod lattice;
pub mod replay;
pub mod rules;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{SimConfig, SimConfigBuilder};
    pub use crate::engine::jidoka::{JidokaConfig, JidokaGuard};
    pub use crate::engine::rng::SimRng;
    pub use crate::engine::{
        CancelToken, EngineParts, EngineStatus, RunOutcome, RunStatus, SimEngine, SimTime,
        StopCondition,
    };
    pub use crate::error::{SimError, SimResult};
    pub use crate::forcing::{BlockLayer, ForcingAction, ForcingEvent};
    pub use crate::lattice::{
        BoundaryClass, BoundaryLayout, BoundaryPolicy, GridShape, Lattice, LatticeSnapshot,
        NodeState, Orientation,
    };
    pub use crate::rules::{TransitionRule, TransitionRuleTable};
}

/// Re-export for public API
pub use error::{SimError, SimResult};
