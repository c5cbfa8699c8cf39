//! Loop reversal.

use crate::tree::{Bound, IterationTree};
use crate::transform::{
    cannot_apply, format_names, internal, per_statement, require_statements, resolve, IteratorId,
    Rendering, Transform, TransformKind,
};
use crate::utils::errors::TransformError;
use indexmap::IndexMap;
use std::collections::VecDeque;

/// Run a loop backwards.
///
/// Integer bounds `[l, u)` become `[-u, -l)` so the loop still counts up
/// with unit stride; symbolic bounds are swapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reversal {
    /// Reversed loop
    pub iterator: String,
    comps: Vec<String>,
}

impl Reversal {
    /// Create a new reversal.
    pub fn new(iterator: impl Into<IteratorId>, tree: &IterationTree) -> Result<Self, TransformError> {
        let iterator = resolve(Self::KIND, tree, iterator.into())?;
        let comps = tree
            .get_candidate_computations(&iterator)
            .map_err(cannot_apply(Self::KIND))?;
        Ok(Self { iterator, comps })
    }
}

impl Transform for Reversal {
    /// Every loop of each root, breadth first.
    type Candidates = IndexMap<String, Vec<String>>;
    const KIND: TransformKind = TransformKind::Reversal;

    fn candidates(tree: &IterationTree) -> Self::Candidates {
        tree.roots()
            .iter()
            .map(|root| {
                let mut loops = Vec::new();
                let mut queue = VecDeque::from([root.as_str()]);
                while let Some(name) = queue.pop_front() {
                    if let Ok(node) = tree.iterator(name) {
                        loops.push(node.name.clone());
                        queue.extend(node.child_iterators.iter().map(String::as_str));
                    }
                }
                (root.clone(), loops)
            })
            .collect()
    }

    fn comps(&self) -> &[String] {
        &self.comps
    }

    fn verify_conditions(&self, tree: &IterationTree) -> Result<(), TransformError> {
        let node = tree.iterator(&self.iterator).map_err(cannot_apply(Self::KIND))?;
        require_statements(Self::KIND, &self.comps, &self.iterator)?;
        if let (Bound::Int(lower), Bound::Int(upper)) = (&node.lower_bound, &node.upper_bound) {
            if lower.checked_neg().is_none() || upper.checked_neg().is_none() {
                return Err(TransformError::cannot_apply(
                    Self::KIND.name(),
                    format!("bounds of `{}` cannot be negated", node.name),
                ));
            }
        }
        Ok(())
    }

    fn render(&self, tree: &IterationTree) -> Result<Rendering, TransformError> {
        let level = tree.iterator(&self.iterator).map_err(internal(Self::KIND))?.level;
        let backend = per_statement(&self.comps, |c| format!("{c}.loop_reversal({level});\n"));
        let canonical = format!("R(L{level},comps={})", format_names(&self.comps));
        Ok(Rendering::plain(backend, canonical))
    }

    fn transform_tree(&self, tree: &mut IterationTree) -> Result<(), TransformError> {
        let node = tree.iterator_mut(&self.iterator).map_err(internal(Self::KIND))?;
        let (lower, upper) = match (&node.lower_bound, &node.upper_bound) {
            (Bound::Int(lower), Bound::Int(upper)) => {
                let negate = |value: i64| {
                    value.checked_neg().map(Bound::Int).ok_or_else(|| {
                        TransformError::internal(Self::KIND.name(), format!("cannot negate {value}"))
                    })
                };
                (negate(*upper)?, negate(*lower)?)
            }
            (lower, upper) => (upper.clone(), lower.clone()),
        };
        node.lower_bound = lower;
        node.upper_bound = upper;
        Ok(())
    }
}
