//! Loop fusion and its inverse, loop distribution.
//!
//! Fusion merges two sibling loops into the first one; distribution splits
//! the body of one loop over several sibling copies of it. Both reorder
//! statements across loops, so their backend code is the whole-program
//! `then` chain rendered from the mutated tree.

use crate::tree::{IterationTree, IteratorNode, OrderKey};
use crate::transform::{
    cannot_apply, format_names, internal, require_statements, resolve, then_chain, IteratorId,
    Rendering, Transform, TransformKind,
};
use crate::utils::errors::TransformError;
use log::trace;
use std::collections::{HashMap, HashSet};

/// Suffix of the loops created by distribution, followed by the group index.
pub const DISTRIBUTED_SUFFIX: &str = "_dist_";

/// Fuse `second` into `first`.
///
/// ```text
/// for i in [0, N):          for i in [0, N):
///   S1                 =>     S1
/// for j in [0, N):            S2
///   S2
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fusion {
    /// Loop that survives
    pub first: String,
    /// Loop merged into `first` and removed
    pub second: String,
    comps: Vec<String>,
}

impl Fusion {
    /// Create a new fusion of two sibling loops.
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
                format!("cannot fuse `{first}` with itself"),
            ));
        }
        // First family then second, so the token lists the survivor's statements first.
        let mut comps = tree
            .get_candidate_computations(&first)
            .map_err(cannot_apply(Self::KIND))?;
        comps.extend(
            tree.get_candidate_computations(&second)
                .map_err(cannot_apply(Self::KIND))?,
        );
        Ok(Self { first, second, comps })
    }
}

impl Transform for Fusion {
    /// Every pair of loops sharing a parent, roots first.
    type Candidates = Vec<(String, String)>;
    const KIND: TransformKind = TransformKind::Fusion;

    fn candidates(tree: &IterationTree) -> Self::Candidates {
        let lists = std::iter::once(tree.roots()).chain(tree.iterators().map(|n| n.child_iterators.as_slice()));
        let mut pairs = Vec::new();
        for siblings in lists {
            for (idx, a) in siblings.iter().enumerate() {
                for b in &siblings[idx + 1..] {
                    pairs.push((a.clone(), b.clone()));
                }
            }
        }
        pairs
    }

    fn comps(&self) -> &[String] {
        &self.comps
    }

    fn verify_conditions(&self, tree: &IterationTree) -> Result<(), TransformError> {
        let err = |msg: String| TransformError::cannot_apply(Self::KIND.name(), msg);
        let a = tree.iterator(&self.first).map_err(cannot_apply(Self::KIND))?;
        let b = tree.iterator(&self.second).map_err(cannot_apply(Self::KIND))?;
        if a.level != b.level {
            return Err(err(format!(
                "`{}` is at level {} but `{}` is at level {}",
                a.name, a.level, b.name, b.level
            )));
        }
        if a.parent != b.parent {
            return Err(err(format!("`{}` and `{}` do not share a parent", a.name, b.name)));
        }
        for node in [a, b] {
            if tree
                .get_iterator_subtree_computations(&node.name)
                .map_err(cannot_apply(Self::KIND))?
                .is_empty()
            {
                return Err(err(format!("`{}` holds no statement", node.name)));
            }
        }
        Ok(())
    }

    fn render(&self, tree: &IterationTree) -> Result<Rendering, TransformError> {
        let level = tree.iterator(&self.first).map_err(internal(Self::KIND))?.level;
        let backend = then_chain(tree).map_err(internal(Self::KIND))?;
        let canonical = format!("F(L{level},comps={})", format_names(&self.comps));
        Ok(Rendering::plain(backend, canonical))
    }

    fn transform_tree(&self, tree: &mut IterationTree) -> Result<(), TransformError> {
        let second = tree.iterator(&self.second).map_err(internal(Self::KIND))?.clone();
        let family = tree
            .get_candidate_computations(&second.name)
            .map_err(internal(Self::KIND))?;

        // The second family runs right after the whole first subtree.
        let anchor = tree.statements_through(&self.first);
        let overrides: HashMap<String, OrderKey> = family
            .iter()
            .enumerate()
            .map(|(idx, comp)| (comp.clone(), (anchor, idx + 1)))
            .collect();

        for child in &second.child_iterators {
            tree.iterator_mut(child).map_err(internal(Self::KIND))?.parent = Some(self.first.clone());
        }
        let first = tree.iterator_mut(&self.first).map_err(internal(Self::KIND))?;
        first.computations_list.extend(second.computations_list.iter().cloned());
        first.child_iterators.extend(second.child_iterators.iter().cloned());
        let level = first.level;

        tree.siblings_mut(second.parent.as_deref())
            .map_err(internal(Self::KIND))?
            .retain(|name| *name != second.name);
        tree.iterators.shift_remove(&second.name);
        tree.update_subtree_levels(&self.first, level)
            .map_err(internal(Self::KIND))?;
        tree.rerank(&overrides);
        trace!("fused `{}` into `{}` ({} statements moved)", second.name, self.first, family.len());
        Ok(())
    }
}

/// Split the body of a loop over several sibling copies of it.
///
/// Each group lists statements and child loops directly held by the loop;
/// together the groups must partition its body. The first copy keeps the
/// loop's name, the others are named `{loop}_dist_{idx}`.
///
/// ```text
/// for i in [0, N):          for i in [0, N):
///   S1                 =>     S1
///   S2                      for i_dist_1 in [0, N):
///                             S2
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    /// Distributed loop
    pub iterator: String,
    /// Partition of the loop body
    pub groups: Vec<Vec<String>>,
    comps: Vec<String>,
}

impl Distribution {
    /// Distribute every statement and child loop into its own copy.
    pub fn new(iterator: impl Into<IteratorId>, tree: &IterationTree) -> Result<Self, TransformError> {
        let iterator = resolve(Self::KIND, tree, iterator.into())?;
        let node = tree.iterator(&iterator).map_err(cannot_apply(Self::KIND))?;
        let groups = node
            .computations_list
            .iter()
            .chain(&node.child_iterators)
            .map(|member| vec![member.clone()])
            .collect();
        Self::with_groups(iterator, groups, tree)
    }

    /// Distribute with an explicit partition.
    pub fn with_groups(
        iterator: impl Into<IteratorId>,
        groups: Vec<Vec<String>>,
        tree: &IterationTree,
    ) -> Result<Self, TransformError> {
        let iterator = resolve(Self::KIND, tree, iterator.into())?;
        if groups.iter().any(Vec::is_empty) {
            return Err(TransformError::malformed(Self::KIND.name(), "distribution groups cannot be empty"));
        }
        let comps = tree
            .get_candidate_computations(&iterator)
            .map_err(cannot_apply(Self::KIND))?;
        Ok(Self { iterator, groups, comps })
    }

    fn group_name(&self, idx: usize) -> String {
        if idx == 0 {
            self.iterator.clone()
        } else {
            format!("{}{DISTRIBUTED_SUFFIX}{idx}", self.iterator)
        }
    }
}

impl Transform for Distribution {
    /// Loops holding more than one statement or child loop.
    type Candidates = Vec<String>;
    const KIND: TransformKind = TransformKind::Distribution;

    fn candidates(tree: &IterationTree) -> Vec<String> {
        tree.iterators()
            .filter(|node| node.content_count() > 1)
            .map(|node| node.name.clone())
            .collect()
    }

    fn comps(&self) -> &[String] {
        &self.comps
    }

    fn verify_conditions(&self, tree: &IterationTree) -> Result<(), TransformError> {
        let err = |msg: String| TransformError::cannot_apply(Self::KIND.name(), msg);
        let node = tree.iterator(&self.iterator).map_err(cannot_apply(Self::KIND))?;
        if node.content_count() < 2 {
            return Err(err(format!("`{}` holds fewer than two statements or loops", node.name)));
        }
        if self.groups.len() < 2 {
            return Err(err("distribution needs at least two groups".to_string()));
        }

        let body: HashSet<&str> = node
            .computations_list
            .iter()
            .chain(&node.child_iterators)
            .map(String::as_str)
            .collect();
        let mut seen = HashSet::new();
        for member in self.groups.iter().flatten() {
            if !body.contains(member.as_str()) {
                return Err(err(format!("`{member}` is not directly held by `{}`", node.name)));
            }
            if !seen.insert(member.as_str()) {
                return Err(err(format!("`{member}` appears in more than one group")));
            }
        }
        if let Some(missing) = body.iter().find(|member| !seen.contains(*member)) {
            return Err(err(format!("`{missing}` is not assigned to any group")));
        }
        require_statements(Self::KIND, &self.comps, &self.iterator)?;
        for group in &self.groups {
            let holds_statement = group.iter().any(|member| {
                node.computations_list.contains(member)
                    || tree
                        .get_iterator_subtree_computations(member)
                        .map_or(false, |comps| !comps.is_empty())
            });
            if !holds_statement {
                return Err(err(format!("group {} holds no statement", format_names(group))));
            }
        }
        match (1..self.groups.len()).map(|idx| self.group_name(idx)).find(|n| tree.contains_iterator(n)) {
            Some(name) => Err(err(format!("`{name}` already exists"))),
            None => Ok(()),
        }
    }

    fn render(&self, tree: &IterationTree) -> Result<Rendering, TransformError> {
        let level = tree.iterator(&self.iterator).map_err(internal(Self::KIND))?.level;
        let backend = then_chain(tree).map_err(internal(Self::KIND))?;
        let groups: Vec<String> = self.groups.iter().map(|group| format_names(group)).collect();
        let canonical = format!(
            "D(L{level},comps={},distribution=[{}])",
            format_names(&self.comps),
            groups.join(", ")
        );
        Ok(Rendering::plain(backend, canonical))
    }

    fn transform_tree(&self, tree: &mut IterationTree) -> Result<(), TransformError> {
        let node = tree.iterator(&self.iterator).map_err(internal(Self::KIND))?.clone();

        let mut parts = Vec::with_capacity(self.groups.len());
        for (idx, group) in self.groups.iter().enumerate() {
            let mut part = IteratorNode::new(
                self.group_name(idx),
                node.parent.clone(),
                node.level,
                node.lower_bound.clone(),
                node.upper_bound.clone(),
            );
            // Keep the body's relative order inside each copy.
            part.computations_list = node
                .computations_list
                .iter()
                .filter(|c| group.contains(c))
                .cloned()
                .collect();
            part.child_iterators = node
                .child_iterators
                .iter()
                .filter(|c| group.contains(c))
                .cloned()
                .collect();
            let mut first_rank = None;
            for member in group {
                let ranks = if node.computations_list.contains(member) {
                    vec![member.clone()]
                } else {
                    tree.get_iterator_subtree_computations(member)
                        .map_err(internal(Self::KIND))?
                };
                first_rank = ranks
                    .iter()
                    .filter_map(|comp| tree.absolute_order(comp))
                    .chain(first_rank)
                    .min();
            }
            parts.push((first_rank.unwrap_or(usize::MAX), part));
        }
        parts.sort_by_key(|(rank, _)| *rank);

        for (_, part) in &parts {
            for child in &part.child_iterators {
                tree.iterator_mut(child).map_err(internal(Self::KIND))?.parent = Some(part.name.clone());
            }
        }
        let names: Vec<String> = parts.iter().map(|(_, part)| part.name.clone()).collect();
        let siblings = tree.siblings_mut(node.parent.as_deref()).map_err(internal(Self::KIND))?;
        let pos = siblings
            .iter()
            .position(|s| *s == node.name)
            .ok_or_else(|| TransformError::internal(Self::KIND.name(), format!("`{}` is not listed under its parent", node.name)))?;
        siblings.remove(pos);
        for (offset, name) in names.into_iter().enumerate() {
            siblings.insert(pos + offset, name);
        }
        for (_, part) in parts {
            tree.iterators.insert(part.name.clone(), part);
        }
        tree.rerank(&HashMap::new());
        trace!("distributed `{}` into {} loops", node.name, self.groups.len());
        Ok(())
    }
}
