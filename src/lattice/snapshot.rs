//! Immutable lattice snapshots and summary statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{GridKind, GridShape, NodeState};
use crate::engine::SimTime;
use crate::error::{SimError, SimResult};

/// Copy of the state grid at one simulated time.
///
/// This is the shape the output layer serializes; it never aliases the live
/// lattice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeSnapshot {
    /// Simulated time the snapshot was taken.
    pub time: SimTime,
    /// Lattice shape.
    pub shape: GridShape,
    /// Node states, row-major with row 0 at the bottom.
    pub states: Vec<NodeState>,
}

/// Surface height and regolith cover of one lattice column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    /// Column index.
    pub col: usize,
    /// Height of the top of the contiguous non-air stack, in cell heights.
    pub elevation: f64,
    /// Number of regolith cells in that stack.
    pub regolith_thickness: usize,
}

impl LatticeSnapshot {
    /// State at (row, col), if the snapshot holds that node.
    #[must_use]
    pub fn state_at(&self, row: usize, col: usize) -> Option<NodeState> {
        self.shape
            .node_at(row, col)
            .and_then(|node| self.states.get(node).copied())
    }

    /// Number of nodes in `state`.
    #[must_use]
    pub fn count(&self, state: NodeState) -> usize {
        self.states.iter().filter(|&&s| s == state).count()
    }

    /// Node count per state present in the grid.
    #[must_use]
    pub fn state_counts(&self) -> BTreeMap<NodeState, usize> {
        let mut counts = BTreeMap::new();
        for &state in &self.states {
            *counts.entry(state).or_insert(0) += 1;
        }
        counts
    }

    /// Column-by-column surface profile.
    ///
    /// Walks each column upward from row 0 until the first `air` node or
    /// the last stored state. Hex odd columns start half a cell higher.
    #[must_use]
    pub fn column_profiles(&self, air: NodeState, regolith: NodeState) -> Vec<ColumnProfile> {
        (0..self.shape.cols)
            .map(|col| {
                let base = match self.shape.kind {
                    GridKind::Hex => 0.5 * (col % 2) as f64,
                    GridKind::Rectangular => 0.0,
                };
                let mut elevation = base;
                let mut regolith_thickness = 0;
                for row in 0..self.shape.rows {
                    let Some(state) = self.state_at(row, col) else {
                        break;
                    };
                    if state == air {
                        break;
                    }
                    elevation += 1.0;
                    if state == regolith {
                        regolith_thickness += 1;
                    }
                }
                ColumnProfile {
                    col,
                    elevation,
                    regolith_thickness,
                }
            })
            .collect()
    }

    /// Blake3 hash of the binary encoding, for cheap equality checks
    /// across runs.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn fingerprint(&self) -> SimResult<[u8; 32]> {
        let bytes =
            bincode::serialize(self).map_err(|e| SimError::serialization(e.to_string()))?;
        Ok(*blake3::hash(&bytes).as_bytes())
    }
}
