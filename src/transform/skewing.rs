//! Loop skewing transformation.
//!
//! Skewing remaps a perfectly nested pair `(i, j)` with factors `(f0, f1)`
//! so that the new inner loop runs along `f0*i + f1*j`. This turns some
//! diagonal dependences into ones that allow wavefront parallelism.
//!
//! The skewed bounds cannot be derived without the backend, so both loops
//! get the `UNK` sentinel. Picking the factors is left to the caller.

use crate::tree::{Bound, IterationTree};
use crate::transform::{
    cannot_apply, format_names, internal, per_statement, require_statements, resolve,
    successive_pairs, IteratorId, PairCandidates, Rendering, Transform, TransformKind,
};
use crate::utils::errors::TransformError;

/// Loop skewing transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skewing {
    /// Outer loop
    pub first: String,
    /// Inner loop, directly nested in `first`
    pub second: String,
    /// Skewing factors
    pub factors: (i64, i64),
    comps: Vec<String>,
}

impl Skewing {
    /// Create a new skewing.
    pub fn new(
        first: impl Into<IteratorId>,
        second: impl Into<IteratorId>,
        factors: (i64, i64),
        tree: &IterationTree,
    ) -> Result<Self, TransformError> {
        let first = resolve(Self::KIND, tree, first.into())?;
        let second = resolve(Self::KIND, tree, second.into())?;
        if first == second {
            return Err(TransformError::malformed(Self::KIND.name(), "skewing needs two distinct loops"));
        }
        if factors == (0, 0) {
            return Err(TransformError::malformed(Self::KIND.name(), "skewing factors cannot both be zero"));
        }
        let comps = tree
            .get_candidate_computations(&first)
            .map_err(cannot_apply(Self::KIND))?;
        Ok(Self { first, second, factors, comps })
    }
}

impl Transform for Skewing {
    type Candidates = PairCandidates;
    const KIND: TransformKind = TransformKind::Skewing;

    fn candidates(tree: &IterationTree) -> PairCandidates {
        successive_pairs(&tree.get_candidate_sections())
    }

    fn comps(&self) -> &[String] {
        &self.comps
    }

    fn verify_conditions(&self, tree: &IterationTree) -> Result<(), TransformError> {
        let outer = tree.iterator(&self.first).map_err(cannot_apply(Self::KIND))?;
        tree.iterator(&self.second).map_err(cannot_apply(Self::KIND))?;
        require_statements(Self::KIND, &self.comps, &self.first)?;
        if outer.child_iterators != [self.second.as_str()] || !outer.computations_list.is_empty() {
            return Err(TransformError::cannot_apply(
                Self::KIND.name(),
                format!("`{}` is not perfectly nested in `{}`", self.second, self.first),
            ));
        }
        Ok(())
    }

    fn render(&self, tree: &IterationTree) -> Result<Rendering, TransformError> {
        let levels = tree
            .get_iterator_levels(&[&self.first, &self.second])
            .map_err(internal(Self::KIND))?;
        let (l0, l1) = (levels[0], levels[1]);
        let (f0, f1) = self.factors;
        let backend = per_statement(&self.comps, |c| format!("{c}.skew({l0}, {l1}, {f0}, {f1});\n"));
        let canonical = format!("S(L{l0},L{l1},{f0},{f1},comps={})", format_names(&self.comps));
        Ok(Rendering::plain(backend, canonical))
    }

    fn transform_tree(&self, tree: &mut IterationTree) -> Result<(), TransformError> {
        for name in [&self.first, &self.second] {
            let node = tree.iterator_mut(name).map_err(internal(Self::KIND))?;
            node.lower_bound = Bound::Unknown;
            node.upper_bound = Bound::Unknown;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::samples;

    #[test]
    fn test_skewing_marks_bounds_unknown() {
        let mut tree = samples::perfect_nest(&[64, 64]).unwrap();
        let t = Skewing::new("i0", "i1", (1, 2), &tree).unwrap();
        t.verify_conditions(&tree).unwrap();
        let rendering = t.render(&tree).unwrap();
        assert_eq!(rendering.backend, "comp00.skew(0, 1, 1, 2);\n");
        assert_eq!(rendering.canonical, "S(L0,L1,1,2,comps=['comp00'])");
        t.transform_tree(&mut tree).unwrap();
        assert!(tree.iterator("i0").unwrap().lower_bound.is_unknown());
        assert!(tree.iterator("i1").unwrap().upper_bound.is_unknown());
        assert_eq!(tree.iterator("i1").unwrap().extent(), None);
    }

    #[test]
    fn test_skewing_requires_direct_nesting() {
        let tree = samples::perfect_nest(&[8, 8, 8]).unwrap();
        let t = Skewing::new("i0", "i2", (1, 1), &tree).unwrap();
        assert!(t.verify_conditions(&tree).unwrap_err().is_recoverable());
    }

    #[test]
    fn test_skewing_rejects_zero_factors() {
        let tree = samples::perfect_nest(&[8, 8]).unwrap();
        assert!(!Skewing::new("i0", "i1", (0, 0), &tree).unwrap_err().is_recoverable());
    }

    #[test]
    fn test_candidates() {
        let tree = samples::nested_sections().unwrap();
        assert_eq!(Skewing::candidates(&tree)["root"], vec![("j".to_string(), "k".to_string())]);
    }
}
