//! Loop parallelization.

use crate::tree::IterationTree;
use crate::transform::{
    cannot_apply, format_names, internal, require_statements, resolve, statement_refs, IteratorId,
    Rendering, Transform, TransformKind,
};
use crate::utils::errors::TransformError;
use indexmap::IndexMap;

/// Tag a loop as parallel.
///
/// The tree is not modified; the tag is consumed by the backend when it
/// generates code and by the legality oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parallelization {
    /// Parallel loop
    pub iterator: String,
    comps: Vec<String>,
}

impl Parallelization {
    /// Create a new parallelization.
    pub fn new(iterator: impl Into<IteratorId>, tree: &IterationTree) -> Result<Self, TransformError> {
        let iterator = resolve(Self::KIND, tree, iterator.into())?;
        let comps = tree
            .get_candidate_computations(&iterator)
            .map_err(cannot_apply(Self::KIND))?;
        Ok(Self { iterator, comps })
    }
}

impl Transform for Parallelization {
    /// Per root: the root alone, then the children of every loop of that
    /// tree, depth first. Loops of one group run at the same depth.
    type Candidates = IndexMap<String, Vec<Vec<String>>>;
    const KIND: TransformKind = TransformKind::Parallelization;

    fn candidates(tree: &IterationTree) -> Self::Candidates {
        tree.roots()
            .iter()
            .map(|root| {
                let mut groups = vec![vec![root.clone()]];
                let mut stack = vec![root.as_str()];
                while let Some(name) = stack.pop() {
                    let Ok(node) = tree.iterator(name) else {
                        continue;
                    };
                    if !node.child_iterators.is_empty() {
                        groups.push(node.child_iterators.clone());
                    }
                    stack.extend(node.child_iterators.iter().rev().map(String::as_str));
                }
                (root.clone(), groups)
            })
            .collect()
    }

    fn comps(&self) -> &[String] {
        &self.comps
    }

    fn verify_conditions(&self, tree: &IterationTree) -> Result<(), TransformError> {
        tree.iterator(&self.iterator).map_err(cannot_apply(Self::KIND))?;
        require_statements(Self::KIND, &self.comps, &self.iterator)
    }

    fn render(&self, tree: &IterationTree) -> Result<Rendering, TransformError> {
        let level = tree.iterator(&self.iterator).map_err(internal(Self::KIND))?.level;
        let first = self.comps.first().ok_or_else(|| {
            TransformError::internal(Self::KIND.name(), format!("`{}` holds no statement", self.iterator))
        })?;
        let backend = format!("{first}.tag_parallel_level({level});\n");
        let legality = format!(
            "is_legal &= loop_parallelization_is_legal({level}, {});\n    {backend}",
            statement_refs(&self.comps)
        );
        let canonical = format!("P(L{level},comps={})", format_names(&self.comps));
        Ok(Rendering { backend, legality, canonical })
    }

    fn transform_tree(&self, _tree: &mut IterationTree) -> Result<(), TransformError> {
        Ok(())
    }
}
