//! Loop interchange transformation.
//!
//! Interchange swaps the positions of two loops on one ancestor chain. The
//! loops keep their names and bounds; what moves is the slot each one
//! occupies (parent, level, children and directly held statements), so the
//! chain between them may branch or hold statements.
//!
//! Example:
//! ```text
//! for i = 0 to N:
//!   for j = 0 to M:
//!     A[i][j] = B[j][i]
//! ```
//! becomes (after interchange(i, j)):
//! ```text
//! for j = 0 to M:
//!   for i = 0 to N:
//!     A[i][j] = B[j][i]
//! ```

use crate::tree::{IterationTree, IteratorNode};
use crate::transform::{
    cannot_apply, format_names, internal, per_statement, require_statements, resolve,
    section_combinations, IteratorId, PairCandidates, Rendering, Transform, TransformKind,
};
use crate::utils::errors::TransformError;
use log::trace;

/// Loop interchange transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interchange {
    /// Outer loop
    pub first: String,
    /// Inner loop
    pub second: String,
    comps: Vec<String>,
}

impl Interchange {
    /// Create a new interchange of two loops, given in either order.
    pub fn new(
        first: impl Into<IteratorId>,
        second: impl Into<IteratorId>,
        tree: &IterationTree,
    ) -> Result<Self, TransformError> {
        let first = resolve(Self::KIND, tree, first.into())?;
        let second = resolve(Self::KIND, tree, second.into())?;
        if first == second {
            return Err(TransformError::malformed(
                Self::KIND.name(),
                format!("cannot interchange `{first}` with itself"),
            ));
        }
        let (first, second) = if tree.is_ancestor(&second, &first) {
            (second, first)
        } else {
            (first, second)
        };
        let comps = tree
            .get_candidate_computations(&first)
            .map_err(cannot_apply(Self::KIND))?;
        Ok(Self { first, second, comps })
    }
}

impl Transform for Interchange {
    type Candidates = PairCandidates;
    const KIND: TransformKind = TransformKind::Interchange;

    fn candidates(tree: &IterationTree) -> PairCandidates {
        section_combinations(&tree.get_candidate_sections())
    }

    fn comps(&self) -> &[String] {
        &self.comps
    }

    fn verify_conditions(&self, tree: &IterationTree) -> Result<(), TransformError> {
        let err = |msg: String| TransformError::cannot_apply(Self::KIND.name(), msg);
        let inner = tree.iterator(&self.second).map_err(cannot_apply(Self::KIND))?;
        tree.iterator(&self.first).map_err(cannot_apply(Self::KIND))?;
        require_statements(Self::KIND, &self.comps, &self.first)?;
        if !tree.is_ancestor(&self.first, &self.second) {
            return Err(err(format!("`{}` does not enclose `{}`", self.first, self.second)));
        }

        // A loop bound below the outer loop that uses it pins the order.
        let mut node = inner;
        while node.name != self.first {
            if node.bounds_reference(&self.first) {
                return Err(err(format!(
                    "bounds of `{}` depend on `{}`",
                    node.name, self.first
                )));
            }
            let Some(parent) = node.parent.as_deref() else {
                break;
            };
            node = tree.iterator(parent).map_err(cannot_apply(Self::KIND))?;
        }
        Ok(())
    }

    fn render(&self, tree: &IterationTree) -> Result<Rendering, TransformError> {
        let levels = tree
            .get_iterator_levels(&[&self.first, &self.second])
            .map_err(internal(Self::KIND))?;
        let (l0, l1) = (levels[0], levels[1]);
        let backend = per_statement(&self.comps, |c| format!("{c}.interchange({l0},{l1});\n"));
        let canonical = format!("I(L{l0},L{l1},comps={})", format_names(&self.comps));
        Ok(Rendering::plain(backend, canonical))
    }

    fn transform_tree(&self, tree: &mut IterationTree) -> Result<(), TransformError> {
        let a = tree.iterator(&self.first).map_err(internal(Self::KIND))?.clone();
        let b = tree.iterator(&self.second).map_err(internal(Self::KIND))?.clone();
        let swap = |name: &String| -> String {
            if *name == a.name {
                b.name.clone()
            } else if *name == b.name {
                a.name.clone()
            } else {
                name.clone()
            }
        };

        // `a` moves into `b`'s slot and `b` into `a`'s; bounds travel with the loop.
        let moved_a = IteratorNode {
            name: a.name.clone(),
            parent: b.parent.as_ref().map(swap),
            level: b.level,
            lower_bound: a.lower_bound.clone(),
            upper_bound: a.upper_bound.clone(),
            child_iterators: b.child_iterators.iter().map(swap).collect(),
            computations_list: b.computations_list.clone(),
        };
        let moved_b = IteratorNode {
            name: b.name.clone(),
            parent: a.parent.clone(),
            level: a.level,
            lower_bound: b.lower_bound.clone(),
            upper_bound: b.upper_bound.clone(),
            child_iterators: a.child_iterators.iter().map(swap).collect(),
            computations_list: a.computations_list.clone(),
        };

        for sibling in tree.siblings_mut(a.parent.as_deref()).map_err(internal(Self::KIND))?.iter_mut() {
            if *sibling == a.name {
                *sibling = b.name.clone();
            }
        }
        if let Some(parent) = b.parent.as_deref().filter(|p| *p != a.name) {
            tree.iterator_mut(parent)
                .map_err(internal(Self::KIND))?
                .replace_child(&b.name, &a.name);
        }
        for (holder, children) in [(&a.name, &moved_a.child_iterators), (&b.name, &moved_b.child_iterators)] {
            for child in children.iter().filter(|c| **c != a.name && **c != b.name) {
                tree.iterator_mut(child).map_err(internal(Self::KIND))?.parent = Some(holder.clone());
            }
        }
        tree.iterators.insert(a.name.clone(), moved_a);
        tree.iterators.insert(b.name.clone(), moved_b);
        trace!("interchanged `{}` and `{}`", a.name, b.name);
        Ok(())
    }
}
