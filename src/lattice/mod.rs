//! Lattice of grain-scale nodes and their adjacency.
//!
//! Nodes are stored row-major (`id = row * cols + col`, row 0 at the
//! bottom). Adjacency is enumerated once at construction as a list of
//! oriented links plus a CSR incidence table, so neighbor lookup never
//! allocates.
//!
//! Two geometries are supported:
//! - [`GridKind::Hex`]: vertical columns, odd columns offset half a cell
//!   upward. Each node links to its neighbor above (`Vertical`), up-right
//!   (`UpRight`) and down-right (`DownRight`).
//! - [`GridKind::Rectangular`]: four-neighbor grid with `Horizontal` and
//!   `Vertical` links.
//!
//! Link direction is canonical: the head always lies above or to the right
//! of the tail.

pub mod boundary;
pub mod snapshot;

use serde::{Deserialize, Serialize};

use crate::engine::SimTime;
use crate::error::{SimError, SimResult};

pub use boundary::{BoundaryClass, BoundaryLayout, BoundaryPolicy, EdgeKind};
pub use snapshot::{ColumnProfile, LatticeSnapshot};

/// Node index (row-major).
pub type NodeId = usize;

/// Link index into the lattice's link list.
pub type LinkId = usize;

/// Horizontal spacing between hex columns for unit node spacing.
const HEX_COLUMN_SPACING: f64 = 0.866_025_403_784_438_6;

/// Largest lattice accepted from configuration.
pub const MAX_NODES: usize = 1 << 26;

/// Discrete material state of a node.
///
/// The state set is declared by the rule table (`num_states`); the lattice
/// only stores codes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct NodeState(pub u8);

impl NodeState {
    /// Create a state from its code.
    #[must_use]
    pub const fn new(code: u8) -> Self {
        Self(code)
    }

    /// State code as a table index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Link orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    /// Head directly above tail.
    Vertical,
    /// Head up and to the right of tail (hex only).
    UpRight,
    /// Head down and to the right of tail (hex only).
    DownRight,
    /// Head directly right of tail (rectangular only).
    Horizontal,
}

impl Orientation {
    /// Number of orientations.
    pub const COUNT: usize = 4;

    /// All orientations in index order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Vertical,
        Self::UpRight,
        Self::DownRight,
        Self::Horizontal,
    ];

    /// Dense index used by the rule table.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Vertical => 0,
            Self::UpRight => 1,
            Self::DownRight => 2,
            Self::Horizontal => 3,
        }
    }
}

/// Lattice geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GridKind {
    /// Hexagonal lattice with vertical columns.
    #[default]
    Hex,
    /// Rectangular four-neighbor lattice.
    Rectangular,
}

impl GridKind {
    /// Orientations a link can have in this geometry.
    #[must_use]
    pub const fn orientations(self) -> &'static [Orientation] {
        match self {
            Self::Hex => &[
                Orientation::Vertical,
                Orientation::UpRight,
                Orientation::DownRight,
            ],
            Self::Rectangular => &[Orientation::Horizontal, Orientation::Vertical],
        }
    }
}

/// Lattice dimensions and geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape {
    /// Geometry.
    pub kind: GridKind,
    /// Number of node rows.
    pub rows: usize,
    /// Number of node columns.
    pub cols: usize,
}

impl GridShape {
    /// Create a hex shape.
    #[must_use]
    pub const fn hex(rows: usize, cols: usize) -> Self {
        Self {
            kind: GridKind::Hex,
            rows,
            cols,
        }
    }

    /// Create a rectangular shape.
    #[must_use]
    pub const fn rectangular(rows: usize, cols: usize) -> Self {
        Self {
            kind: GridKind::Rectangular,
            rows,
            cols,
        }
    }

    /// Total number of nodes, saturating for shapes that fail
    /// [`GridShape::validate`].
    #[must_use]
    pub const fn num_nodes(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }

    /// Node id at (row, col), if inside the lattice.
    #[must_use]
    pub const fn node_at(&self, row: usize, col: usize) -> Option<NodeId> {
        if row < self.rows && col < self.cols {
            Some(row * self.cols + col)
        } else {
            None
        }
    }

    /// (row, col) of a node.
    #[must_use]
    pub const fn row_col(&self, node: NodeId) -> (usize, usize) {
        (node / self.cols, node % self.cols)
    }

    /// Cartesian position of a node with unit node spacing.
    #[must_use]
    pub fn position(&self, node: NodeId) -> (f64, f64) {
        let (row, col) = self.row_col(node);
        match self.kind {
            GridKind::Hex => (
                col as f64 * HEX_COLUMN_SPACING,
                row as f64 + 0.5 * (col % 2) as f64,
            ),
            GridKind::Rectangular => (col as f64, row as f64),
        }
    }

    /// Reject empty shapes and shapes too large to allocate.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a zero dimension or more than
    /// [`MAX_NODES`] nodes.
    pub fn validate(&self) -> SimResult<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(SimError::config(format!(
                "lattice must have at least one row and column, got {}x{}",
                self.rows, self.cols
            )));
        }
        match self.rows.checked_mul(self.cols) {
            None => return Err(SimError::config("lattice dimensions overflow")),
            Some(n) if n > MAX_NODES => {
                return Err(SimError::config(format!(
                    "lattice of {}x{} nodes exceeds the limit of {MAX_NODES}",
                    self.rows, self.cols
                )));
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Head node of the link leaving `node` in `orientation`, if any.
    fn head_of(&self, node: NodeId, orientation: Orientation) -> Option<NodeId> {
        let (row, col) = self.row_col(node);
        let odd = col % 2 == 1;
        match (self.kind, orientation) {
            (_, Orientation::Vertical) => self.node_at(row + 1, col),
            (GridKind::Rectangular, Orientation::Horizontal) => self.node_at(row, col + 1),
            (GridKind::Hex, Orientation::UpRight) => {
                self.node_at(if odd { row + 1 } else { row }, col + 1)
            }
            (GridKind::Hex, Orientation::DownRight) => {
                if odd {
                    self.node_at(row, col + 1)
                } else if row > 0 {
                    self.node_at(row - 1, col + 1)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

/// An oriented pair of adjacent nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    /// Lower / left endpoint.
    pub tail: NodeId,
    /// Upper / right endpoint.
    pub head: NodeId,
    /// Orientation of tail → head.
    pub orientation: Orientation,
}

impl Link {
    /// Whether `node` is one of the endpoints.
    #[must_use]
    pub const fn touches(&self, node: NodeId) -> bool {
        self.tail == node || self.head == node
    }
}

/// Node states plus precomputed adjacency.
#[derive(Debug, Clone)]
pub struct Lattice {
    shape: GridShape,
    states: Vec<NodeState>,
    links: Vec<Link>,
    /// CSR offsets into `incident`, one entry per node plus a sentinel.
    incident_offsets: Vec<usize>,
    incident: Vec<LinkId>,
}

impl Lattice {
    /// Build a lattice with the given initial states.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the shape is empty or the state
    /// vector length does not match the node count.
    pub fn new(shape: GridShape, states: Vec<NodeState>) -> SimResult<Self> {
        shape.validate()?;
        let n = shape.num_nodes();
        if states.len() != n {
            return Err(SimError::config(format!(
                "initial state grid has {} entries, lattice has {n} nodes",
                states.len()
            )));
        }

        let mut links = Vec::new();
        let mut per_node: Vec<Vec<LinkId>> = vec![Vec::new(); n];
        for tail in 0..n {
            for &orientation in shape.kind.orientations() {
                if let Some(head) = shape.head_of(tail, orientation) {
                    let id = links.len();
                    links.push(Link {
                        tail,
                        head,
                        orientation,
                    });
                    per_node[tail].push(id);
                    per_node[head].push(id);
                }
            }
        }

        let mut incident_offsets = Vec::with_capacity(n + 1);
        let mut incident = Vec::with_capacity(links.len() * 2);
        incident_offsets.push(0);
        for mut ids in per_node {
            ids.sort_unstable();
            incident.extend(ids);
            incident_offsets.push(incident.len());
        }

        Ok(Self {
            shape,
            states,
            links,
            incident_offsets,
            incident,
        })
    }

    /// Build a lattice with every node in the same state.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the shape is empty.
    pub fn filled(shape: GridShape, state: NodeState) -> SimResult<Self> {
        shape.validate()?;
        Self::new(shape, vec![state; shape.num_nodes()])
    }

    /// Lattice shape.
    #[must_use]
    pub const fn shape(&self) -> GridShape {
        self.shape
    }

    /// Number of nodes.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.states.len()
    }

    /// Number of links.
    #[must_use]
    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    /// Current state of a node.
    #[must_use]
    pub fn state_of(&self, node: NodeId) -> NodeState {
        self.states[node]
    }

    /// All node states, row-major.
    #[must_use]
    pub fn states(&self) -> &[NodeState] {
        &self.states
    }

    /// Overwrite one node's state.
    ///
    /// Only the engine calls this, one node at a time, while applying a
    /// single resolved event.
    pub(crate) fn set_state(&mut self, node: NodeId, state: NodeState) {
        self.states[node] = state;
    }

    /// Link by id.
    #[must_use]
    pub fn link(&self, id: LinkId) -> Link {
        self.links[id]
    }

    /// All links in id order.
    #[must_use]
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Ids of links incident to a node, ascending.
    #[must_use]
    pub fn links_of(&self, node: NodeId) -> &[LinkId] {
        &self.incident[self.incident_offsets[node]..self.incident_offsets[node + 1]]
    }

    /// Neighbors of a node with the orientation of the connecting link.
    pub fn neighbors_of(&self, node: NodeId) -> impl Iterator<Item = (NodeId, Orientation)> + '_ {
        self.links_of(node).iter().map(move |&id| {
            let link = self.links[id];
            let other = if link.tail == node { link.head } else { link.tail };
            (other, link.orientation)
        })
    }

    /// Node id at (row, col).
    #[must_use]
    pub const fn node_at(&self, row: usize, col: usize) -> Option<NodeId> {
        self.shape.node_at(row, col)
    }

    /// (row, col) of a node.
    #[must_use]
    pub const fn row_col(&self, node: NodeId) -> (usize, usize) {
        self.shape.row_col(node)
    }

    /// Cartesian position of a node.
    #[must_use]
    pub fn position(&self, node: NodeId) -> (f64, f64) {
        self.shape.position(node)
    }

    /// Copy of the current state grid stamped with `time`.
    #[must_use]
    pub fn snapshot(&self, time: SimTime) -> LatticeSnapshot {
        LatticeSnapshot {
            time,
            shape: self.shape,
            states: self.states.clone(),
        }
    }
}
