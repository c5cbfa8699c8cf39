//! Loop tiling transformation.
//!
//! Tiling (also called blocking) splits each loop of a perfectly nested
//! chain into a tile loop and an intra-tile loop, so that data is processed
//! in smaller blocks that fit in cache.
//!
//! Example:
//! ```text
//! for i = 0 to 10:
//!   for j = 0 to 8:
//!     A[i][j] = ...
//! ```
//! becomes (after tiling by 4x4):
//! ```text
//! for i = 0 to 3:
//!   for j = 0 to 2:
//!     for i_tiled = 0 to (10 - max(i*4, 10-4)):
//!       for j_tiled = 0 to 4:
//!         A[...] = ...
//! ```
//! The original loops keep their names and now count tiles. A tile size
//! equal to the extent is allowed (one tile); a larger one is rejected.

use crate::tree::{Bound, IterationTree, IteratorNode};
use crate::transform::{
    cannot_apply, format_names, internal, per_statement, require_statements, resolve,
    successive_pairs, successive_triples, IteratorId, PairCandidates, Rendering, Transform, TransformKind,
    TripleCandidates,
};
use crate::utils::errors::TransformError;
use log::trace;
use num_integer::Integer;

/// Suffix of the intra-tile loops.
pub const TILED_SUFFIX: &str = "_tiled";

/// Two-level tiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tiling2D {
    /// Outer and inner loop of the tiled pair
    pub iterators: [String; 2],
    /// Tile sizes, outermost first
    pub factors: [i64; 2],
    comps: Vec<String>,
}

/// Three-level tiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tiling3D {
    /// The tiled chain, outermost first
    pub iterators: [String; 3],
    /// Tile sizes, outermost first
    pub factors: [i64; 3],
    comps: Vec<String>,
}

impl Tiling2D {
    /// Create a new 2D tiling.
    pub fn new(
        first: impl Into<IteratorId>,
        second: impl Into<IteratorId>,
        factors: [i64; 2],
        tree: &IterationTree,
    ) -> Result<Self, TransformError> {
        let iterators = [
            resolve(Self::KIND, tree, first.into())?,
            resolve(Self::KIND, tree, second.into())?,
        ];
        let comps = chain_comps(Self::KIND, tree, &iterators, &factors)?;
        Ok(Self { iterators, factors, comps })
    }
}

impl Tiling3D {
    /// Create a new 3D tiling.
    pub fn new(
        first: impl Into<IteratorId>,
        second: impl Into<IteratorId>,
        third: impl Into<IteratorId>,
        factors: [i64; 3],
        tree: &IterationTree,
    ) -> Result<Self, TransformError> {
        let iterators = [
            resolve(Self::KIND, tree, first.into())?,
            resolve(Self::KIND, tree, second.into())?,
            resolve(Self::KIND, tree, third.into())?,
        ];
        let comps = chain_comps(Self::KIND, tree, &iterators, &factors)?;
        Ok(Self { iterators, factors, comps })
    }
}

impl Transform for Tiling2D {
    type Candidates = PairCandidates;
    const KIND: TransformKind = TransformKind::Tiling2D;

    fn candidates(tree: &IterationTree) -> PairCandidates {
        successive_pairs(&tree.get_candidate_sections())
    }

    fn comps(&self) -> &[String] {
        &self.comps
    }

    fn verify_conditions(&self, tree: &IterationTree) -> Result<(), TransformError> {
        verify_chain(Self::KIND, tree, &self.iterators, &self.factors, &self.comps)
    }

    fn render(&self, tree: &IterationTree) -> Result<Rendering, TransformError> {
        render_chain(Self::KIND, tree, &self.iterators, &self.factors, &self.comps)
    }

    fn transform_tree(&self, tree: &mut IterationTree) -> Result<(), TransformError> {
        tile_chain(Self::KIND, tree, &self.iterators, &self.factors)
    }
}

impl Transform for Tiling3D {
    type Candidates = TripleCandidates;
    const KIND: TransformKind = TransformKind::Tiling3D;

    fn candidates(tree: &IterationTree) -> TripleCandidates {
        successive_triples(&tree.get_candidate_sections())
    }

    fn comps(&self) -> &[String] {
        &self.comps
    }

    fn verify_conditions(&self, tree: &IterationTree) -> Result<(), TransformError> {
        verify_chain(Self::KIND, tree, &self.iterators, &self.factors, &self.comps)
    }

    fn render(&self, tree: &IterationTree) -> Result<Rendering, TransformError> {
        render_chain(Self::KIND, tree, &self.iterators, &self.factors, &self.comps)
    }

    fn transform_tree(&self, tree: &mut IterationTree) -> Result<(), TransformError> {
        tile_chain(Self::KIND, tree, &self.iterators, &self.factors)
    }
}

fn chain_comps(
    kind: TransformKind,
    tree: &IterationTree,
    names: &[String],
    factors: &[i64],
) -> Result<Vec<String>, TransformError> {
    if let Some(factor) = factors.iter().find(|f| **f <= 0) {
        return Err(TransformError::malformed(
            kind.name(),
            format!("tile size must be positive, got {factor}"),
        ));
    }
    for (idx, name) in names.iter().enumerate() {
        if names[idx + 1..].contains(name) {
            return Err(TransformError::malformed(kind.name(), format!("`{name}` tiled twice")));
        }
    }
    tree.get_candidate_computations(&names[0]).map_err(cannot_apply(kind))
}

fn verify_chain(
    kind: TransformKind,
    tree: &IterationTree,
    names: &[String],
    factors: &[i64],
    comps: &[String],
) -> Result<(), TransformError> {
    let err = |msg: String| TransformError::cannot_apply(kind.name(), msg);
    require_statements(kind, comps, &names[0])?;
    for (idx, name) in names.iter().enumerate() {
        let node = tree.iterator(name).map_err(cannot_apply(kind))?;
        if let Some(next) = names.get(idx + 1) {
            if node.child_iterators != [next.as_str()] || !node.computations_list.is_empty() {
                return Err(err(format!(
                    "`{name}` and `{next}` are not successive perfectly nested loops"
                )));
            }
        }
        let extent = node
            .extent()
            .ok_or_else(|| err(format!("`{name}` does not have integer bounds")))?;
        if factors[idx] > extent {
            return Err(err(format!(
                "tile size {} exceeds the extent {} of `{}`",
                factors[idx], extent, name
            )));
        }
        let tiled = format!("{name}{TILED_SUFFIX}");
        if tree.contains_iterator(&tiled) {
            return Err(err(format!("`{tiled}` already exists")));
        }
    }
    Ok(())
}

fn render_chain(
    kind: TransformKind,
    tree: &IterationTree,
    names: &[String],
    factors: &[i64],
    comps: &[String],
) -> Result<Rendering, TransformError> {
    let levels = tree.get_iterator_levels(names).map_err(internal(kind))?;
    let args: Vec<String> = levels
        .iter()
        .map(|l| l.to_string())
        .chain(factors.iter().map(|f| f.to_string()))
        .collect();
    let backend = per_statement(comps, |c| format!("{c}.tile({});\n", args.join(", ")));
    let levels: Vec<String> = levels.iter().map(|l| format!("L{l}")).collect();
    let factors: Vec<String> = factors.iter().map(|f| f.to_string()).collect();
    let canonical = format!(
        "{}({},{},comps={})",
        kind.tag(),
        levels.join(","),
        factors.join(","),
        format_names(comps)
    );
    Ok(Rendering::plain(backend, canonical))
}

fn tile_chain(
    kind: TransformKind,
    tree: &mut IterationTree,
    names: &[String],
    factors: &[i64],
) -> Result<(), TransformError> {
    let depth = names.len();
    let innermost = tree.iterator(&names[depth - 1]).map_err(internal(kind))?.clone();
    let base_level = tree.iterator(&names[0]).map_err(internal(kind))?.level;
    let tiled: Vec<String> = names.iter().map(|n| format!("{n}{TILED_SUFFIX}")).collect();

    let mut created = Vec::with_capacity(depth);
    for (idx, name) in names.iter().enumerate() {
        let factor = factors[idx];
        let node = tree.iterator_mut(name).map_err(internal(kind))?;
        let extent = node.extent().ok_or_else(|| {
            TransformError::internal(kind.name(), format!("`{name}` lost its integer bounds"))
        })?;
        let intra_upper = if extent % factor == 0 {
            Bound::Int(factor)
        } else {
            Bound::tile_remainder(extent, name, factor)
        };
        node.lower_bound = Bound::Int(0);
        node.upper_bound = Bound::Int(Integer::div_ceil(&extent, &factor));

        let parent = if idx == 0 { names[depth - 1].clone() } else { tiled[idx - 1].clone() };
        let mut intra = IteratorNode::new(
            tiled[idx].clone(),
            Some(parent),
            base_level + depth + idx,
            Bound::Int(0),
            intra_upper,
        );
        if idx + 1 < depth {
            intra.child_iterators.push(tiled[idx + 1].clone());
        } else {
            intra.child_iterators = innermost.child_iterators.clone();
            intra.computations_list = innermost.computations_list.clone();
        }
        created.push(intra);
    }

    let holder = tiled[depth - 1].clone();
    for child in &innermost.child_iterators {
        tree.iterator_mut(child).map_err(internal(kind))?.parent = Some(holder.clone());
    }
    let last = tree.iterator_mut(&innermost.name).map_err(internal(kind))?;
    last.child_iterators = vec![tiled[0].clone()];
    last.computations_list.clear();
    for intra in created {
        tree.iterators.insert(intra.name.clone(), intra);
    }
    tree.update_subtree_levels(&tiled[0], base_level + depth)
        .map_err(internal(kind))?;
    trace!("tiled {:?} by {:?}", names, factors);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{samples, TreeBuilder};

    #[test]
    fn test_tiling_2d_divisible() {
        let mut tree = samples::perfect_nest(&[64, 32]).unwrap();
        let t = Tiling2D::new("i0", "i1", [16, 8], &tree).unwrap();
        t.verify_conditions(&tree).unwrap();
        let rendering = t.render(&tree).unwrap();
        assert_eq!(rendering.backend, "comp00.tile(0, 1, 16, 8);\n");
        assert_eq!(rendering.canonical, "T2(L0,L1,16,8,comps=['comp00'])");
        t.transform_tree(&mut tree).unwrap();

        assert_eq!(tree.iterator("i0").unwrap().extent(), Some(4));
        assert_eq!(tree.iterator("i1").unwrap().extent(), Some(4));
        assert_eq!(tree.iterator("i1").unwrap().child_iterators, vec!["i0_tiled"]);
        let i0t = tree.iterator("i0_tiled").unwrap();
        assert_eq!((i0t.level, i0t.extent()), (2, Some(16)));
        let i1t = tree.iterator("i1_tiled").unwrap();
        assert_eq!((i1t.level, i1t.extent()), (3, Some(8)));
        assert_eq!(i1t.computations_list, vec!["comp00"]);
        tree.validate().unwrap();
    }

    #[test]
    fn test_tiling_factor_equal_to_extent() {
        let mut tree = samples::perfect_nest(&[10, 12]).unwrap();
        let t = Tiling2D::new("i0", "i1", [10, 12], &tree).unwrap();
        t.verify_conditions(&tree).unwrap();
        t.transform_tree(&mut tree).unwrap();
        assert_eq!(tree.iterator("i0").unwrap().extent(), Some(1));
        assert_eq!(tree.iterator("i0_tiled").unwrap().extent(), Some(10));
        assert_eq!(tree.iterator("i1_tiled").unwrap().extent(), Some(12));
    }

    #[test]
    fn test_tiling_non_dividing_factor() {
        let mut tree = samples::perfect_nest(&[10, 8]).unwrap();
        let t = Tiling2D::new("i0", "i1", [4, 4], &tree).unwrap();
        t.transform_tree(&mut tree).unwrap();
        assert_eq!(tree.iterator("i0").unwrap().upper_bound, Bound::Int(3));
        let inner = tree.iterator("i0_tiled").unwrap();
        assert_eq!(inner.upper_bound.to_string(), "(10 - max(i0*4, 10-4))");
        assert!(inner.upper_bound.references("i0"));
        assert_eq!(tree.iterator("i1_tiled").unwrap().upper_bound, Bound::Int(4));
    }

    #[test]
    fn test_tiling_rejects_large_factor() {
        let tree = samples::perfect_nest(&[10, 8]).unwrap();
        let t = Tiling2D::new("i0", "i1", [4, 9], &tree).unwrap();
        let err = t.verify_conditions(&tree).unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.message.contains("exceeds"));
    }

    #[test]
    fn test_tiling_rejects_non_successive() {
        let tree = samples::perfect_nest(&[8, 8, 8]).unwrap();
        let t = Tiling2D::new("i0", "i2", [2, 2], &tree).unwrap();
        assert!(t.verify_conditions(&tree).is_err());

        let tree = samples::nested_sections().unwrap();
        let t = Tiling2D::new("k", "l", [2, 2], &tree).unwrap();
        assert!(t.verify_conditions(&tree).is_err());
    }

    #[test]
    fn test_tiling_rejects_symbolic_bounds() {
        let tree = samples::triangular().unwrap();
        let t = Tiling2D::new("i", "j", [4, 4], &tree).unwrap();
        assert!(t.verify_conditions(&tree).unwrap_err().message.contains("integer"));
    }

    #[test]
    fn test_tiling_rejects_bad_factor() {
        let tree = samples::perfect_nest(&[8, 8]).unwrap();
        assert!(!Tiling2D::new("i0", "i1", [0, 2], &tree).unwrap_err().is_recoverable());
    }

    #[test]
    fn test_tiling_3d_shifts_descendants() {
        let mut tree = TreeBuilder::new()
            .root("i", 0, 32)
            .iterator("j", "i", 0, 32)
            .iterator("k", "j", 0, 32)
            .iterator("l", "k", 0, 4)
            .computation("s0", "k")
            .computation("s1", "l")
            .build()
            .unwrap();
        let t = Tiling3D::new("i", "j", "k", [8, 8, 8], &tree).unwrap();
        t.verify_conditions(&tree).unwrap();
        assert_eq!(t.render(&tree).unwrap().canonical, "T3(L0,L1,L2,8,8,8,comps=['s0', 's1'])");
        assert_eq!(t.render(&tree).unwrap().backend, "s0.tile(0, 1, 2, 8, 8, 8);\ns1.tile(0, 1, 2, 8, 8, 8);\n");
        t.transform_tree(&mut tree).unwrap();

        assert_eq!(
            tree.get_iterator_levels(&["i", "j", "k", "i_tiled", "j_tiled", "k_tiled", "l"]).unwrap(),
            vec![0, 1, 2, 3, 4, 5, 6]
        );
        let kt = tree.iterator("k_tiled").unwrap();
        assert_eq!(kt.computations_list, vec!["s0"]);
        assert_eq!(kt.child_iterators, vec!["l"]);
        assert_eq!(tree.iterator("l").unwrap().parent.as_deref(), Some("k_tiled"));
        tree.validate().unwrap();
    }

    #[test]
    fn test_candidates() {
        let tree = samples::perfect_nest(&[8, 8, 8]).unwrap();
        assert_eq!(Tiling2D::candidates(&tree)["i0"].len(), 2);
        assert_eq!(
            Tiling3D::candidates(&tree)["i0"],
            vec![("i0".to_string(), "i1".to_string(), "i2".to_string())]
        );
    }
}
