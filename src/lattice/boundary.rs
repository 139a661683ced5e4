//! Boundary classification of lattice nodes.
//!
//! Each node is `Interior`, `Fixed` or `Open`, assigned once at
//! construction. The policy decides which links are schedulable and which
//! outcomes a link may take:
//!
//! - a link is schedulable only if at least one endpoint is interior;
//! - an outcome is admitted only if it leaves every fixed endpoint unchanged.
//!
//! Open nodes may change state. Sources and sinks on open edges are
//! expressed purely as transition rules.

use serde::{Deserialize, Serialize};

use super::{GridShape, Lattice, Link, NodeId, NodeState};
use crate::error::{SimError, SimResult};

/// Boundary classification of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryClass {
    /// Ordinary node.
    #[default]
    Interior,
    /// Node whose state never changes.
    Fixed,
    /// Mutable boundary node (sink/source).
    Open,
}

/// Classification applied to all nodes along one lattice edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    /// Edge nodes are treated as interior.
    Interior,
    /// Edge nodes are fixed.
    #[default]
    Fixed,
    /// Edge nodes are open.
    Open,
}

impl EdgeKind {
    const fn class(self) -> BoundaryClass {
        match self {
            Self::Interior => BoundaryClass::Interior,
            Self::Fixed => BoundaryClass::Fixed,
            Self::Open => BoundaryClass::Open,
        }
    }
}

/// Per-edge boundary layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct BoundaryLayout {
    /// Column 0.
    #[serde(default)]
    pub left: EdgeKind,
    /// Last column.
    #[serde(default)]
    pub right: EdgeKind,
    /// Row 0.
    #[serde(default)]
    pub bottom: EdgeKind,
    /// Last row.
    #[serde(default)]
    pub top: EdgeKind,
}

impl BoundaryLayout {
    /// Every perimeter node fixed.
    #[must_use]
    pub const fn all_fixed() -> Self {
        Self {
            left: EdgeKind::Fixed,
            right: EdgeKind::Fixed,
            bottom: EdgeKind::Fixed,
            top: EdgeKind::Fixed,
        }
    }

    /// No boundary nodes at all.
    #[must_use]
    pub const fn all_interior() -> Self {
        Self {
            left: EdgeKind::Interior,
            right: EdgeKind::Interior,
            bottom: EdgeKind::Interior,
            top: EdgeKind::Interior,
        }
    }
}

/// Immutable per-node boundary classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryPolicy {
    classes: Vec<BoundaryClass>,
}

impl BoundaryPolicy {
    /// Classify nodes from their position on the lattice perimeter.
    ///
    /// Where edges meet, `Fixed` wins over `Open`, which wins over
    /// `Interior`.
    #[must_use]
    pub fn from_layout(shape: GridShape, layout: BoundaryLayout) -> Self {
        let classes = (0..shape.num_nodes())
            .map(|node| {
                let (row, col) = shape.row_col(node);
                let mut edges = Vec::with_capacity(4);
                if col == 0 {
                    edges.push(layout.left);
                }
                if col + 1 == shape.cols {
                    edges.push(layout.right);
                }
                if row == 0 {
                    edges.push(layout.bottom);
                }
                if row + 1 == shape.rows {
                    edges.push(layout.top);
                }
                strongest(edges.into_iter().map(EdgeKind::class))
            })
            .collect();
        Self { classes }
    }

    /// Use an explicit per-node classification.
    #[must_use]
    pub fn from_classes(classes: Vec<BoundaryClass>) -> Self {
        Self { classes }
    }

    /// Check the policy covers exactly the lattice's nodes.
    ///
    /// # Errors
    ///
    /// Returns a configuration error on a length mismatch.
    pub fn validate_for(&self, lattice: &Lattice) -> SimResult<()> {
        if self.classes.len() == lattice.num_nodes() {
            Ok(())
        } else {
            Err(SimError::config(format!(
                "boundary classification covers {} nodes, lattice has {}",
                self.classes.len(),
                lattice.num_nodes()
            )))
        }
    }

    /// Classification of a node.
    #[must_use]
    pub fn classify(&self, node: NodeId) -> BoundaryClass {
        self.classes[node]
    }

    /// Whether a node is fixed.
    #[must_use]
    pub fn is_fixed(&self, node: NodeId) -> bool {
        self.classes[node] == BoundaryClass::Fixed
    }

    /// Whether a node is interior.
    #[must_use]
    pub fn is_interior(&self, node: NodeId) -> bool {
        self.classes[node] == BoundaryClass::Interior
    }

    /// Whether events may ever be scheduled on this link.
    #[must_use]
    pub fn is_schedulable(&self, link: &Link) -> bool {
        self.is_interior(link.tail) || self.is_interior(link.head)
    }

    /// Whether an outcome leaves every fixed endpoint of `link` unchanged.
    #[must_use]
    pub fn admits(
        &self,
        link: &Link,
        current: (NodeState, NodeState),
        next: (NodeState, NodeState),
    ) -> bool {
        (!self.is_fixed(link.tail) || current.0 == next.0)
            && (!self.is_fixed(link.head) || current.1 == next.1)
    }

    /// Number of nodes in each class: (interior, fixed, open).
    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        self.classes
            .iter()
            .fold((0, 0, 0), |(i, f, o), class| match class {
                BoundaryClass::Interior => (i + 1, f, o),
                BoundaryClass::Fixed => (i, f + 1, o),
                BoundaryClass::Open => (i, f, o + 1),
            })
    }
}

fn strongest(classes: impl Iterator<Item = BoundaryClass>) -> BoundaryClass {
    classes.fold(BoundaryClass::Interior, |acc, class| match (acc, class) {
        (BoundaryClass::Fixed, _) | (_, BoundaryClass::Fixed) => BoundaryClass::Fixed,
        (BoundaryClass::Open, _) | (_, BoundaryClass::Open) => BoundaryClass::Open,
        _ => BoundaryClass::Interior,
    })
}
