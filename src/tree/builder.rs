//! Tree construction.
//!
//! Two ways in: [`TreeBuilder`] for programmatic construction in program
//! order, and [`IterationTree::from_nodes`] for loader payloads (node list
//! plus a statement-rank map). Both validate before handing out a tree, and
//! deserialization goes through [`TreeSnapshot`] so it validates too.

use crate::tree::{Bound, IterationTree, IteratorNode};
use crate::utils::errors::TreeError;
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

/// Serialized form of an [`IterationTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    /// Every loop, roots in program order
    pub iterators: Vec<IteratorNode>,
    /// Statement name to rank
    pub computations_absolute_order: IndexMap<String, usize>,
}

impl TryFrom<TreeSnapshot> for IterationTree {
    type Error = TreeError;

    fn try_from(snapshot: TreeSnapshot) -> Result<Self, Self::Error> {
        IterationTree::from_nodes(snapshot.iterators, snapshot.computations_absolute_order)
    }
}

impl From<IterationTree> for TreeSnapshot {
    fn from(tree: IterationTree) -> Self {
        Self {
            iterators: tree.iterators.into_values().collect(),
            computations_absolute_order: tree.computations_absolute_order,
        }
    }
}

impl IterationTree {
    /// Build a tree from a loader payload.
    ///
    /// Roots are the parentless nodes in the given order. Levels are
    /// recomputed from the parent links; the payload's own levels are ignored.
    pub fn from_nodes(
        nodes: Vec<IteratorNode>,
        computations_absolute_order: IndexMap<String, usize>,
    ) -> Result<Self, TreeError> {
        let mut iterators = IndexMap::with_capacity(nodes.len());
        let mut roots = Vec::new();
        for node in nodes {
            if node.parent.is_none() {
                roots.push(node.name.clone());
            }
            if let Some(previous) = iterators.insert(node.name.clone(), node) {
                return Err(TreeError::DuplicateName(previous.name));
            }
        }
        let mut computations: Vec<String> = computations_absolute_order.keys().cloned().collect();
        computations.sort_by_key(|comp| computations_absolute_order.get(comp).copied());

        let mut tree = IterationTree { roots, iterators, computations, computations_absolute_order };
        tree.check_links()?;
        for root in tree.roots.clone() {
            tree.update_subtree_levels(&root, 0)?;
        }
        tree.validate()?;
        debug!(
            "loaded tree with {} iterators and {} statements",
            tree.len(),
            tree.computations.len()
        );
        Ok(tree)
    }
}

/// Programmatic tree construction.
///
/// Loops are declared parent first; statements are declared in program
/// order, which defines their ranks. The first error is kept and returned by
/// [`build`](TreeBuilder::build).
///
/// ```
/// use looptree::tree::TreeBuilder;
///
/// let tree = TreeBuilder::new()
///     .root("i", 0, 64)
///     .iterator("j", "i", 0, "N")
///     .computation("s0", "j")
///     .build()
///     .unwrap();
/// assert_eq!(tree.iterator("j").unwrap().level, 1);
/// ```
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: IndexMap<String, IteratorNode>,
    order: IndexMap<String, usize>,
    error: Option<TreeError>,
}

impl TreeBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a root loop.
    pub fn root(mut self, name: &str, lower: impl Into<Bound>, upper: impl Into<Bound>) -> Self {
        if self.nodes.contains_key(name) {
            self.fail(TreeError::DuplicateName(name.to_string()));
            return self;
        }
        let node = IteratorNode::new(name, None, 0, lower.into(), upper.into());
        self.nodes.insert(name.to_string(), node);
        self
    }

    /// Declare a loop nested as the last child of `parent`.
    pub fn iterator(
        mut self,
        name: &str,
        parent: &str,
        lower: impl Into<Bound>,
        upper: impl Into<Bound>,
    ) -> Self {
        if self.nodes.contains_key(name) {
            self.fail(TreeError::DuplicateName(name.to_string()));
            return self;
        }
        let Some(parent_node) = self.nodes.get_mut(parent) else {
            self.fail(TreeError::UnknownIterator(parent.to_string()));
            return self;
        };
        parent_node.child_iterators.push(name.to_string());
        let level = parent_node.level + 1;
        let node = IteratorNode::new(name, Some(parent.to_string()), level, lower.into(), upper.into());
        self.nodes.insert(name.to_string(), node);
        self
    }

    /// Attach the next statement in program order to `iterator`.
    pub fn computation(mut self, name: &str, iterator: &str) -> Self {
        if self.order.contains_key(name) {
            self.fail(TreeError::DuplicateName(name.to_string()));
            return self;
        }
        let Some(node) = self.nodes.get_mut(iterator) else {
            self.fail(TreeError::UnknownIterator(iterator.to_string()));
            return self;
        };
        node.computations_list.push(name.to_string());
        let rank = self.order.len() + 1;
        self.order.insert(name.to_string(), rank);
        self
    }

    /// Validate and produce the tree.
    pub fn build(self) -> Result<IterationTree, TreeError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        IterationTree::from_nodes(self.nodes.into_values().collect(), self.order)
    }

    fn fail(&mut self, err: TreeError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_levels_and_ranks() {
        let tree = TreeBuilder::new()
            .root("i", 0, 10)
            .iterator("j", "i", 0, 20)
            .computation("s0", "i")
            .computation("s1", "j")
            .build()
            .unwrap();
        assert_eq!(tree.roots(), &["i"]);
        assert_eq!(tree.iterator("j").unwrap().level, 1);
        assert_eq!(tree.computations(), &["s0", "s1"]);
        assert_eq!(tree.absolute_order("s1"), Some(2));
    }

    #[test]
    fn test_builder_reports_first_error() {
        let err = TreeBuilder::new()
            .root("i", 0, 10)
            .iterator("j", "missing", 0, 4)
            .root("i", 0, 10)
            .build()
            .unwrap_err();
        assert_eq!(err, TreeError::UnknownIterator("missing".to_string()));
    }

    #[test]
    fn test_builder_rejects_out_of_order_statements() {
        // s1 is declared before s0 but lives in a later sibling loop.
        let result = TreeBuilder::new()
            .root("i", 0, 10)
            .iterator("a", "i", 0, 4)
            .iterator("b", "i", 0, 4)
            .computation("s1", "b")
            .computation("s0", "a")
            .build();
        assert!(matches!(result, Err(TreeError::InvariantViolation(_))));
    }

    #[test]
    fn test_from_nodes_recomputes_levels() {
        let mut root = IteratorNode::new("i", None, 7, Bound::Int(0), Bound::Int(4));
        root.child_iterators.push("j".to_string());
        let mut child = IteratorNode::new("j", Some("i".to_string()), 0, Bound::Int(0), Bound::Int(4));
        child.computations_list.push("s".to_string());
        let order = IndexMap::from([("s".to_string(), 1)]);
        let tree = IterationTree::from_nodes(vec![root, child], order).unwrap();
        assert_eq!(tree.get_iterator_levels(&["i", "j"]).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_from_nodes_rejects_duplicates() {
        let a = IteratorNode::new("i", None, 0, Bound::Int(0), Bound::Int(4));
        let b = a.clone();
        let err = IterationTree::from_nodes(vec![a, b], IndexMap::new()).unwrap_err();
        assert_eq!(err, TreeError::DuplicateName("i".to_string()));
    }
}
