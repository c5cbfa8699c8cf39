//! A single loop level of the iteration tree.

use crate::tree::bound::Bound;
use serde::{Deserialize, Serialize};

/// One loop of the program.
///
/// Links to the parent and children are by name; the owning
/// [`IterationTree`](crate::tree::IterationTree) is the arena that resolves them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IteratorNode {
    /// Unique name within the tree
    pub name: String,
    /// Enclosing loop, `None` for roots
    pub parent: Option<String>,
    /// Depth from the root (roots are level 0)
    #[serde(default)]
    pub level: usize,
    /// Inclusive lower bound
    pub lower_bound: Bound,
    /// Exclusive upper bound
    pub upper_bound: Bound,
    /// Nested loops in nesting order
    #[serde(default)]
    pub child_iterators: Vec<String>,
    /// Statements attached directly at this level
    #[serde(default)]
    pub computations_list: Vec<String>,
}

impl IteratorNode {
    /// Create a node with no children and no statements.
    pub fn new(
        name: impl Into<String>,
        parent: Option<String>,
        level: usize,
        lower_bound: Bound,
        upper_bound: Bound,
    ) -> Self {
        Self {
            name: name.into(),
            parent,
            level,
            lower_bound,
            upper_bound,
            child_iterators: Vec::new(),
            computations_list: Vec::new(),
        }
    }

    /// `upper - lower` when both bounds are concrete and the difference fits.
    pub fn extent(&self) -> Option<i64> {
        match (&self.lower_bound, &self.upper_bound) {
            (Bound::Int(lower), Bound::Int(upper)) => upper.checked_sub(*lower),
            _ => None,
        }
    }

    /// Whether both bounds are concrete integers.
    pub fn has_integer_bounds(&self) -> bool {
        matches!((&self.lower_bound, &self.upper_bound), (Bound::Int(_), Bound::Int(_)))
    }

    /// No enclosing loop.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// No nested loop.
    pub fn is_leaf(&self) -> bool {
        self.child_iterators.is_empty()
    }

    /// Number of directly held statements plus child loops.
    pub fn content_count(&self) -> usize {
        self.computations_list.len() + self.child_iterators.len()
    }

    /// Whether either bound mentions iterator `name`.
    pub fn bounds_reference(&self, name: &str) -> bool {
        self.lower_bound.references(name) || self.upper_bound.references(name)
    }

    pub(crate) fn replace_child(&mut self, old: &str, new: &str) {
        for child in self.child_iterators.iter_mut() {
            if child == old {
                *child = new.to_string();
            }
        }
    }
}
