//! Loop unrolling transformation.
//!
//! Unrolling replicates the loop body to reduce loop overhead and enable
//! instruction-level parallelism. In the tree it shows up as a split of the
//! loop into a trip-count loop and a fixed-size body loop of `factor`
//! iterations, which the backend fully unrolls.
//!
//! Example (extent 10, factor 4):
//! ```text
//! for i = 0 to 10:              for i = 0 to 2:
//!   S                             for i_child_unroll = 0 to 4:
//!                        =>         S
//!                               for i_unroll = 8 to 10:
//!                                 S_unroll
//! ```
//! When the factor divides the extent there is no remainder and the body
//! loop is simply named `i_unroll`. The remainder, when present, is a copy of
//! the whole subtree (statements included, suffixed `_unroll`) placed right
//! after the loop.

use crate::tree::{Bound, IterationTree, IteratorNode};
use crate::transform::{
    cannot_apply, format_names, internal, per_statement, require_statements, resolve,
    statement_refs, IteratorId, Rendering, Transform, TransformKind,
};
use crate::utils::errors::TransformError;
use log::trace;

/// Suffix of the body loop (divisible case) and of the peeled remainder.
pub const UNROLL_SUFFIX: &str = "_unroll";

/// Suffix of the body loop when a remainder is peeled off.
pub const CHILD_UNROLL_SUFFIX: &str = "_child_unroll";

/// Loop unrolling transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unrolling {
    /// Unrolled loop
    pub iterator: String,
    /// Unrolling factor
    pub factor: i64,
    comps: Vec<String>,
}

impl Unrolling {
    /// Create a new unrolling transformation.
    pub fn new(iterator: impl Into<IteratorId>, factor: i64, tree: &IterationTree) -> Result<Self, TransformError> {
        if factor <= 0 {
            return Err(TransformError::malformed(
                Self::KIND.name(),
                format!("unrolling factor must be positive, got {factor}"),
            ));
        }
        let iterator = resolve(Self::KIND, tree, iterator.into())?;
        let comps = tree
            .get_candidate_computations(&iterator)
            .map_err(cannot_apply(Self::KIND))?;
        Ok(Self { iterator, factor, comps })
    }

    fn extent(&self, node: &IteratorNode) -> Result<i64, TransformError> {
        node.extent().ok_or_else(|| {
            TransformError::cannot_apply(
                Self::KIND.name(),
                format!("`{}` does not have integer bounds", node.name),
            )
        })
    }
}

impl Transform for Unrolling {
    /// Innermost loops holding at least one statement.
    type Candidates = Vec<String>;
    const KIND: TransformKind = TransformKind::Unrolling;

    fn candidates(tree: &IterationTree) -> Vec<String> {
        tree.iterators()
            .filter(|node| node.is_leaf() && !node.computations_list.is_empty())
            .map(|node| node.name.clone())
            .collect()
    }

    fn comps(&self) -> &[String] {
        &self.comps
    }

    fn verify_conditions(&self, tree: &IterationTree) -> Result<(), TransformError> {
        let err = |msg: String| TransformError::cannot_apply(Self::KIND.name(), msg);
        let node = tree.iterator(&self.iterator).map_err(cannot_apply(Self::KIND))?;
        require_statements(Self::KIND, &self.comps, &self.iterator)?;
        let extent = self.extent(node)?;
        if self.factor > extent {
            return Err(err(format!(
                "unrolling factor {} exceeds the extent {} of `{}`",
                self.factor, extent, node.name
            )));
        }
        if self.factor == extent {
            return Ok(());
        }

        let mut created = Vec::new();
        if extent % self.factor == 0 {
            created.push(format!("{}{UNROLL_SUFFIX}", node.name));
        } else {
            if extent / self.factor > 1 {
                created.push(format!("{}{CHILD_UNROLL_SUFFIX}", node.name));
            }
            let subtree = tree.subtree_iterators(&node.name).map_err(cannot_apply(Self::KIND))?;
            created.extend(subtree.iter().map(|n| format!("{n}{UNROLL_SUFFIX}")));
            if let Some(comp) = self
                .comps
                .iter()
                .map(|c| format!("{c}{UNROLL_SUFFIX}"))
                .find(|c| tree.contains_computation(c))
            {
                return Err(err(format!("statement `{comp}` already exists")));
            }
        }
        match created.iter().find(|name| tree.contains_iterator(name)) {
            Some(name) => Err(err(format!("`{name}` already exists"))),
            None => Ok(()),
        }
    }

    fn render(&self, tree: &IterationTree) -> Result<Rendering, TransformError> {
        let level = tree.iterator(&self.iterator).map_err(internal(Self::KIND))?.level;
        let factor = self.factor;
        let backend = per_statement(&self.comps, |c| format!("{c}.unroll({level},{factor});\n"));
        let legality = format!(
            "is_legal &= loop_unrolling_is_legal({level}, {});\n    {backend}",
            statement_refs(&self.comps)
        );
        let canonical = format!("U(L{level},{factor},comps={})", format_names(&self.comps));
        Ok(Rendering { backend, legality, canonical })
    }

    fn transform_tree(&self, tree: &mut IterationTree) -> Result<(), TransformError> {
        let node = tree.iterator(&self.iterator).map_err(internal(Self::KIND))?.clone();
        let extent = self.extent(&node)?;
        let lower = node.lower_bound.as_int().unwrap_or(0);
        let factor = self.factor;
        if factor == extent {
            trace!("unrolling `{}` by its full extent leaves the tree unchanged", node.name);
            return Ok(());
        }

        let quotient = extent / factor;
        if extent % factor == 0 {
            self.split_body(tree, &node, &format!("{}{UNROLL_SUFFIX}", node.name), quotient)?;
            trace!("unrolled `{}` by {} without remainder", node.name, factor);
            return Ok(());
        }

        // Peel the tail iterations off into a copy of the whole subtree.
        let mut tail = tree
            .clone_subtree(&node.name, UNROLL_SUFFIX)
            .map_err(internal(Self::KIND))?;
        let tail_root = tail
            .iterator_mut(&format!("{}{UNROLL_SUFFIX}", node.name))
            .map_err(internal(Self::KIND))?;
        tail_root.lower_bound = Bound::Int(lower + factor * quotient);
        tail_root.upper_bound = node.upper_bound.clone();

        if quotient == 1 {
            let head = tree.iterator_mut(&node.name).map_err(internal(Self::KIND))?;
            head.lower_bound = Bound::Int(0);
            head.upper_bound = Bound::Int(factor);
        } else {
            self.split_body(tree, &node, &format!("{}{CHILD_UNROLL_SUFFIX}", node.name), quotient)?;
        }
        tree.insert_subtree_after(tail, &node.name)
            .map_err(internal(Self::KIND))?;
        trace!(
            "unrolled `{}` by {} with a remainder of {} iterations",
            node.name,
            factor,
            extent - factor * quotient
        );
        Ok(())
    }
}

impl Unrolling {
    /// Make `node` a `[0, trips)` loop around a new `[0, factor)` body loop
    /// that takes over its statements and children.
    fn split_body(
        &self,
        tree: &mut IterationTree,
        node: &IteratorNode,
        body_name: &str,
        trips: i64,
    ) -> Result<(), TransformError> {
        let mut body = IteratorNode::new(
            body_name,
            Some(node.name.clone()),
            node.level + 1,
            Bound::Int(0),
            Bound::Int(self.factor),
        );
        body.child_iterators = node.child_iterators.clone();
        body.computations_list = node.computations_list.clone();
        for child in &node.child_iterators {
            tree.iterator_mut(child).map_err(internal(Self::KIND))?.parent = Some(body_name.to_string());
        }
        let head = tree.iterator_mut(&node.name).map_err(internal(Self::KIND))?;
        head.lower_bound = Bound::Int(0);
        head.upper_bound = Bound::Int(trips);
        head.child_iterators = vec![body_name.to_string()];
        head.computations_list.clear();
        tree.iterators.insert(body_name.to_string(), body);
        tree.update_subtree_levels(body_name, node.level + 1)
            .map_err(internal(Self::KIND))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::samples;

    #[test]
    fn test_unroll_divisible() {
        let mut tree = samples::unroll_nest().unwrap();
        let t = Unrolling::new("i0", 4, &tree).unwrap();
        t.verify_conditions(&tree).unwrap();
        t.transform_tree(&mut tree).unwrap();

        let i0 = tree.iterator("i0").unwrap();
        assert_eq!((i0.lower_bound.clone(), i0.upper_bound.clone()), (Bound::Int(0), Bound::Int(192)));
        assert_eq!(i0.child_iterators, vec!["i0_unroll"]);
        let body = tree.iterator("i0_unroll").unwrap();
        assert_eq!((body.level, body.extent()), (1, Some(4)));
        assert_eq!(body.child_iterators, vec!["i1"]);
        let i1 = tree.iterator("i1").unwrap();
        assert_eq!((i1.level, i1.parent.as_deref()), (2, Some("i0_unroll")));
        assert_eq!(tree.computations(), &["comp00"]);
        tree.validate().unwrap();
    }

    #[test]
    fn test_unroll_single_trip_with_remainder() {
        let mut tree = samples::unroll_nest().unwrap();
        let t = Unrolling::new("i0", 400, &tree).unwrap();
        t.verify_conditions(&tree).unwrap();
        t.transform_tree(&mut tree).unwrap();

        assert_eq!(tree.roots(), &["i0", "i0_unroll"]);
        let i0 = tree.iterator("i0").unwrap();
        assert_eq!((i0.lower_bound.clone(), i0.upper_bound.clone()), (Bound::Int(0), Bound::Int(400)));
        assert_eq!(i0.child_iterators, vec!["i1"]);
        let tail = tree.iterator("i0_unroll").unwrap();
        assert_eq!((tail.lower_bound.clone(), tail.upper_bound.clone()), (Bound::Int(400), Bound::Int(768)));
        assert_eq!(tail.child_iterators, vec!["i1_unroll"]);
        let tail_body = tree.iterator("i1_unroll").unwrap();
        assert_eq!(tail_body.level, 1);
        assert_eq!(tail_body.computations_list, vec!["comp00_unroll"]);
        assert_eq!(tree.computations(), &["comp00", "comp00_unroll"]);
        tree.validate().unwrap();
    }

    #[test]
    fn test_unroll_general_remainder() {
        let mut tree = samples::unroll_nest().unwrap();
        let t = Unrolling::new("i0", 155, &tree).unwrap();
        t.verify_conditions(&tree).unwrap();
        t.transform_tree(&mut tree).unwrap();

        let i0 = tree.iterator("i0").unwrap();
        assert_eq!(i0.upper_bound, Bound::Int(4));
        assert_eq!(i0.child_iterators, vec!["i0_child_unroll"]);
        let body = tree.iterator("i0_child_unroll").unwrap();
        assert_eq!((body.level, body.extent()), (1, Some(155)));
        assert_eq!(tree.iterator("i1").unwrap().level, 2);
        let tail = tree.iterator("i0_unroll").unwrap();
        assert_eq!((tail.lower_bound.clone(), tail.upper_bound.clone()), (Bound::Int(620), Bound::Int(768)));
        assert_eq!(tree.computations(), &["comp00", "comp00_unroll"]);
        tree.validate().unwrap();
    }

    #[test]
    fn test_unroll_nested_remainder_is_sibling() {
        let mut tree = samples::unroll_nest().unwrap();
        Unrolling::new("i1", 5, &tree).unwrap().transform_tree(&mut tree).unwrap();
        assert_eq!(tree.roots(), &["i0"]);
        assert_eq!(tree.iterator("i0").unwrap().child_iterators, vec!["i1", "i1_unroll"]);
        assert_eq!(tree.iterator("i1_unroll").unwrap().extent(), Some(1));
        assert_eq!(tree.iterator("i1_child_unroll").unwrap().extent(), Some(5));
        tree.validate().unwrap();
    }

    #[test]
    fn test_unroll_full_extent_is_noop() {
        let original = samples::unroll_nest().unwrap();
        let mut tree = original.clone();
        let t = Unrolling::new("i1", 16, &tree).unwrap();
        t.verify_conditions(&tree).unwrap();
        t.transform_tree(&mut tree).unwrap();
        assert_eq!(tree, original);
    }

    #[test]
    fn test_unroll_rejects_large_factor() {
        let tree = samples::unroll_nest().unwrap();
        let t = Unrolling::new("i1", 17, &tree).unwrap();
        assert!(t.verify_conditions(&tree).unwrap_err().is_recoverable());
        assert!(!Unrolling::new("i1", 0, &tree).unwrap_err().is_recoverable());
    }

    #[test]
    fn test_unroll_rejects_name_collision() {
        let mut tree = samples::unroll_nest().unwrap();
        Unrolling::new("i0", 400, &tree).unwrap().transform_tree(&mut tree).unwrap();
        let t = Unrolling::new("i0", 399, &tree).unwrap();
        assert!(t.verify_conditions(&tree).unwrap_err().message.contains("already exists"));
    }

    #[test]
    fn test_unroll_render() {
        let tree = samples::unroll_nest().unwrap();
        let rendering = Unrolling::new("i1", 4, &tree).unwrap().render(&tree).unwrap();
        assert_eq!(rendering.backend, "comp00.unroll(1,4);\n");
        assert_eq!(
            rendering.legality,
            "is_legal &= loop_unrolling_is_legal(1, {&comp00});\n    comp00.unroll(1,4);\n"
        );
        assert_eq!(rendering.canonical, "U(L1,4,comps=['comp00'])");
    }

    #[test]
    fn test_candidates() {
        let tree = samples::nested_sections().unwrap();
        assert_eq!(Unrolling::candidates(&tree), vec!["i", "l", "m"]);
    }
}
