//! Configuration system with YAML schema and validation.
//!
//! Implements Poka-Yoke (mistake-proofing) through:
//! - Type-safe configuration structs
//! - Schema validation via serde and `validator`
//! - Runtime semantic validation
//!
//! A configuration names one model: the built-in grain-hill preset or a
//! custom lattice with its own rule catalog.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::engine::jidoka::JidokaConfig;
use crate::engine::{EngineOptions, EngineParts};
use crate::error::{SimError, SimResult};
use crate::forcing::ForcingEvent;
use crate::hillslope::GrainHillParams;
use crate::lattice::{
    BoundaryClass, BoundaryLayout, BoundaryPolicy, GridShape, Lattice, NodeState,
};
use crate::rules::{TransitionRule, TransitionRuleTable};

/// Top-level simulation configuration.
///
/// Loaded from YAML files with full schema validation.
///
/// # Example
///
/// ```rust
/// use grainhill::config::SimConfig;
///
/// let config = SimConfig::from_yaml("model:\n  kind: grain-hill\n  rows: 8\n  cols: 9\n")
///     .expect("valid config");
/// assert_eq!(config.reproducibility.seed, 42);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    /// Schema version for forward compatibility.
    #[validate(length(min = 1))]
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Simulation metadata.
    #[validate(nested)]
    #[serde(default)]
    pub simulation: SimulationMeta,

    /// Reproducibility settings.
    #[validate(nested)]
    #[serde(default)]
    pub reproducibility: ReproducibilityConfig,

    /// Model to simulate.
    #[serde(default)]
    pub model: ModelConfig,

    /// Jidoka (stop-on-error) configuration.
    #[serde(default)]
    pub jidoka: JidokaConfig,

    /// Progress reporting.
    #[validate(nested)]
    #[serde(default)]
    pub reporting: ReportingConfig,
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            simulation: SimulationMeta::default(),
            reproducibility: ReproducibilityConfig::default(),
            model: ModelConfig::default(),
            jidoka: JidokaConfig::default(),
            reporting: ReportingConfig::default(),
        }
    }
}

impl SimConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - YAML parsing fails
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails.
    pub fn from_yaml(yaml: &str) -> SimResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;

        // Poka-Yoke: validate all constraints
        config.validate()?;

        // Additional semantic validation
        config.validate_semantic()?;

        Ok(config)
    }

    /// Create a builder for configuration.
    #[must_use]
    pub fn builder() -> SimConfigBuilder {
        SimConfigBuilder::default()
    }

    /// Engine run options derived from this configuration.
    #[must_use]
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            seed: self.reproducibility.seed,
            record_journal: self.reproducibility.record_journal,
            report_interval: self.reporting.report_interval(),
            jidoka: self.jidoka.clone(),
        }
    }

    /// Build everything an engine needs from this configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the model cannot be built (invalid
    /// rules, initial states or boundary layout).
    pub fn engine_parts(&self) -> SimResult<EngineParts> {
        let options = self.engine_options();
        match &self.model {
            ModelConfig::GrainHill(params) => params.engine_parts(options),
            ModelConfig::Custom(model) => model.engine_parts(options),
        }
    }

    /// Validate semantic constraints beyond schema.
    fn validate_semantic(&self) -> SimResult<()> {
        match &self.model {
            ModelConfig::GrainHill(params) => {
                params.validate()?;
                params.shape().validate()?;
                params.check_forcing()?;
            }
            ModelConfig::Custom(model) => {
                model.validate()?;
                model.grid.validate()?;
                if model.state_names.len() > model.num_states {
                    return Err(SimError::config(format!(
                        "{} state names given for {} states",
                        model.state_names.len(),
                        model.num_states
                    )));
                }
                if let Some(classes) = &model.boundary_classes {
                    if classes.len() != model.grid.num_nodes() {
                        return Err(SimError::config(format!(
                            "boundary_classes lists {} nodes, lattice has {}",
                            classes.len(),
                            model.grid.num_nodes()
                        )));
                    }
                }
                model.initial.build(model.grid)?;
            }
        }
        Ok(())
    }
}

/// Builder for [`SimConfig`].
#[derive(Debug, Default)]
pub struct SimConfigBuilder {
    seed: Option<u64>,
    record_journal: Option<bool>,
    model: Option<ModelConfig>,
    report_interval: Option<f64>,
    jidoka: Option<JidokaConfig>,
}

impl SimConfigBuilder {
    /// Set the random seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Keep a journal of applied events.
    #[must_use]
    pub const fn record_journal(mut self, record: bool) -> Self {
        self.record_journal = Some(record);
        self
    }

    /// Set the model.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // ModelConfig has a destructor
    pub fn model(mut self, model: ModelConfig) -> Self {
        self.model = Some(model);
        self
    }

    /// Use the grain-hill preset with the given parameters.
    #[must_use]
    pub fn grain_hill(self, params: GrainHillParams) -> Self {
        self.model(ModelConfig::GrainHill(params))
    }

    /// Log progress every `secs` wall-clock seconds.
    #[must_use]
    pub const fn report_interval(mut self, secs: f64) -> Self {
        self.report_interval = Some(secs);
        self
    }

    /// Set Jidoka configuration.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JidokaConfig doesn't impl Copy
    pub fn jidoka(mut self, config: JidokaConfig) -> Self {
        self.jidoka = Some(config);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> SimConfig {
        let mut config = SimConfig::default();

        if let Some(seed) = self.seed {
            config.reproducibility.seed = seed;
        }

        if let Some(record) = self.record_journal {
            config.reproducibility.record_journal = record;
        }

        if let Some(model) = self.model {
            config.model = model;
        }

        if self.report_interval.is_some() {
            config.reporting.report_interval_secs = self.report_interval;
        }

        if let Some(jidoka) = self.jidoka {
            config.jidoka = jidoka;
        }

        config
    }
}

/// Simulation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SimulationMeta {
    /// Simulation name.
    #[serde(default)]
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Version.
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

impl Default for SimulationMeta {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            version: default_version(),
        }
    }
}

/// Reproducibility settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ReproducibilityConfig {
    /// Master seed for all RNG.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Keep a journal of every applied event for replay and digests.
    #[serde(default)]
    pub record_journal: bool,
}

const fn default_seed() -> u64 {
    42
}

impl Default for ReproducibilityConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            record_journal: false,
        }
    }
}

/// Progress reporting settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ReportingConfig {
    /// Wall-clock seconds between progress log lines; silent when unset.
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default)]
    pub report_interval_secs: Option<f64>,
}

impl ReportingConfig {
    /// Reporting interval as a duration, if set and representable.
    #[must_use]
    pub fn report_interval(&self) -> Option<Duration> {
        self.report_interval_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// Model selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ModelConfig {
    /// Built-in hillslope preset.
    GrainHill(GrainHillParams),
    /// User-supplied lattice, states and rules.
    Custom(CustomModel),
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::GrainHill(GrainHillParams::default())
    }
}

/// A model described entirely in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CustomModel {
    /// Lattice geometry and size.
    pub grid: GridShape,
    /// Per-edge boundary classification.
    #[serde(default)]
    pub boundary: BoundaryLayout,
    /// Explicit per-node classification; overrides `boundary`.
    #[serde(default)]
    pub boundary_classes: Option<Vec<BoundaryClass>>,
    /// Number of declared states.
    #[validate(range(min = 1, max = 256))]
    pub num_states: usize,
    /// Optional state names, in code order.
    #[serde(default)]
    pub state_names: Vec<String>,
    /// Initial node states.
    #[serde(default)]
    pub initial: InitialStates,
    /// Transition rules.
    #[serde(default)]
    pub rules: Vec<TransitionRule>,
    /// Processes that must have at least one positive-rate rule.
    #[serde(default)]
    pub required_processes: Vec<String>,
    /// Periodic forcing actions.
    #[serde(default)]
    pub forcing: Vec<ForcingEvent>,
}

impl CustomModel {
    /// Build engine parts for this model.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the lattice, initial states or rule
    /// catalog are invalid.
    pub fn engine_parts(&self, options: EngineOptions) -> SimResult<EngineParts> {
        self.validate()?;
        let lattice = Lattice::new(self.grid, self.initial.build(self.grid)?)?;
        let boundary = match &self.boundary_classes {
            Some(classes) => BoundaryPolicy::from_classes(classes.clone()),
            None => BoundaryPolicy::from_layout(self.grid, self.boundary),
        };

        let mut builder = TransitionRuleTable::builder(self.num_states)
            .state_names(self.state_names.iter().cloned())
            .rules(self.rules.iter().cloned());
        for process in &self.required_processes {
            builder = builder.require_process(process.clone());
        }
        let rules = builder.build()?;

        let mut parts = EngineParts::new(lattice, boundary, rules).with_options(options);
        parts.forcing.clone_from(&self.forcing);
        Ok(parts)
    }
}

/// Initial node states: a background fill, then row and cell overrides.
///
/// When `grid` is given it replaces the fill and lists every node in
/// row-major order, row 0 first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialStates {
    /// Background state.
    #[serde(default)]
    pub fill: NodeState,
    /// Full row-major state list.
    #[serde(default)]
    pub grid: Option<Vec<NodeState>>,
    /// Whole-row overrides, applied in order.
    #[serde(default)]
    pub rows: Vec<RowFill>,
    /// Single-node overrides, applied after rows.
    #[serde(default)]
    pub cells: Vec<CellFill>,
}

/// Set every node of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFill {
    /// Row index, 0 at the bottom.
    pub row: usize,
    /// State.
    pub state: NodeState,
}

/// Set one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellFill {
    /// Row index, 0 at the bottom.
    pub row: usize,
    /// Column index.
    pub col: usize,
    /// State.
    pub state: NodeState,
}

impl InitialStates {
    /// Uniform fill.
    #[must_use]
    pub fn filled(state: NodeState) -> Self {
        Self {
            fill: state,
            ..Self::default()
        }
    }

    /// Expand into one state per node of `shape`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `shape` is empty or too large,
    /// `grid` has the wrong length or an override lies outside the lattice.
    pub fn build(&self, shape: GridShape) -> SimResult<Vec<NodeState>> {
        shape.validate()?;
        let n = shape.num_nodes();
        let mut states = match &self.grid {
            Some(grid) if grid.len() != n => {
                return Err(SimError::config(format!(
                    "initial grid lists {} states, lattice has {n} nodes",
                    grid.len()
                )));
            }
            Some(grid) => grid.clone(),
            None => vec![self.fill; n],
        };

        for fill in &self.rows {
            if fill.row >= shape.rows {
                return Err(SimError::config(format!(
                    "initial row {} outside lattice with {} rows",
                    fill.row, shape.rows
                )));
            }
            for node in (0..shape.cols).filter_map(|col| shape.node_at(fill.row, col)) {
                states[node] = fill.state;
            }
        }

        for cell in &self.cells {
            let node = shape.node_at(cell.row, cell.col).ok_or_else(|| {
                SimError::config(format!(
                    "initial cell ({}, {}) outside {}x{} lattice",
                    cell.row, cell.col, shape.rows, shape.cols
                ))
            })?;
            states[node] = cell.state;
        }

        Ok(states)
    }
}
