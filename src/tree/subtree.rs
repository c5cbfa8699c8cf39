//! Subtree cloning, grafting and re-levelling.

use crate::tree::{IterationTree, IteratorNode, OrderKey};
use crate::utils::errors::TreeError;
use indexmap::IndexMap;
use log::trace;
use std::collections::HashMap;

impl IterationTree {
    /// Set `name`'s level and re-propagate `parent + 1` to all descendants.
    pub fn update_subtree_levels(&mut self, name: &str, level: usize) -> Result<(), TreeError> {
        let mut stack = vec![(name.to_string(), level)];
        while let Some((current, level)) = stack.pop() {
            let node = self.iterator_mut(&current)?;
            node.level = level;
            stack.extend(node.child_iterators.iter().map(|child| (child.clone(), level + 1)));
        }
        Ok(())
    }

    /// Deep-copy the subtree rooted at `name` into a detached tree.
    ///
    /// Every loop and statement is renamed by appending `suffix`, symbolic
    /// bounds are rewritten to refer to the cloned loops, levels restart at 0
    /// and the clone's statements are ranked `1..=k` in their host order.
    pub fn clone_subtree(&self, name: &str, suffix: &str) -> Result<IterationTree, TreeError> {
        let base = self.iterator(name)?.level;
        let members = self.subtree_iterators(name)?;
        let renames: HashMap<String, String> = members
            .iter()
            .map(|member| (member.clone(), format!("{member}{suffix}")))
            .collect();

        let mut iterators = IndexMap::with_capacity(members.len());
        for member in &members {
            let node = self.iterator(member)?;
            let parent = if member == name {
                None
            } else {
                node.parent.as_ref().and_then(|p| renames.get(p)).cloned()
            };
            let mut clone = IteratorNode::new(
                format!("{member}{suffix}"),
                parent,
                node.level - base,
                node.lower_bound.renamed(&renames),
                node.upper_bound.renamed(&renames),
            );
            clone.child_iterators = node.child_iterators.iter().map(|c| format!("{c}{suffix}")).collect();
            clone.computations_list = node.computations_list.iter().map(|c| format!("{c}{suffix}")).collect();
            iterators.insert(clone.name.clone(), clone);
        }

        let computations: Vec<String> = self
            .get_candidate_computations(name)?
            .into_iter()
            .map(|comp| format!("{comp}{suffix}"))
            .collect();
        let computations_absolute_order = computations
            .iter()
            .enumerate()
            .map(|(idx, comp)| (comp.clone(), idx + 1))
            .collect();

        Ok(IterationTree {
            roots: vec![format!("{name}{suffix}")],
            iterators,
            computations,
            computations_absolute_order,
        })
    }

    /// Graft a detached single-root tree.
    ///
    /// With `as_root` the subtree becomes a new root right after the root
    /// containing `parent`; otherwise it becomes the last child of `parent`.
    /// Its statements are ranked right after the last statement under the
    /// anchor node and later statements shift up.
    pub fn insert_subtree(
        &mut self,
        subtree: IterationTree,
        parent: &str,
        as_root: bool,
    ) -> Result<(), TreeError> {
        if as_root {
            let root = self.get_root_of_node(parent)?.name.clone();
            self.graft(subtree, None, Some(&root), &root)
        } else {
            self.iterator(parent)?;
            self.graft(subtree, Some(parent), None, parent)
        }
    }

    /// Graft a detached single-root tree as the next sibling of `sibling`.
    pub fn insert_subtree_after(&mut self, subtree: IterationTree, sibling: &str) -> Result<(), TreeError> {
        let parent = self.iterator(sibling)?.parent.clone();
        self.graft(subtree, parent.as_deref(), Some(sibling), sibling)
    }

    fn graft(
        &mut self,
        mut subtree: IterationTree,
        parent: Option<&str>,
        after: Option<&str>,
        anchor: &str,
    ) -> Result<(), TreeError> {
        let [sub_root] = subtree.roots.as_slice() else {
            return Err(TreeError::InvariantViolation(format!(
                "grafted subtree must have exactly one root, found {}",
                subtree.roots.len()
            )));
        };
        let sub_root = sub_root.clone();
        if let Some(name) = subtree.iterators.keys().find(|name| self.iterators.contains_key(*name)) {
            return Err(TreeError::DuplicateName(name.clone()));
        }
        if let Some(comp) = subtree.computations.iter().find(|comp| self.contains_computation(comp)) {
            return Err(TreeError::DuplicateName(comp.clone()));
        }

        let anchor_rank = self.statements_through(anchor);
        let overrides: HashMap<String, OrderKey> = subtree
            .computations_absolute_order
            .iter()
            .map(|(comp, rank)| (comp.clone(), (anchor_rank, *rank)))
            .collect();
        let level = match parent {
            Some(parent) => self.iterator(parent)?.level + 1,
            None => 0,
        };

        let siblings = self.siblings_mut(parent)?;
        match after {
            Some(after) => {
                let idx = siblings
                    .iter()
                    .position(|s| s == after)
                    .ok_or_else(|| TreeError::UnknownIterator(after.to_string()))?;
                siblings.insert(idx + 1, sub_root.clone());
            }
            None => siblings.push(sub_root.clone()),
        }
        for (name, mut node) in subtree.iterators.drain(..) {
            if name == sub_root {
                node.parent = parent.map(str::to_string);
            }
            self.iterators.insert(name, node);
        }
        self.update_subtree_levels(&sub_root, level)?;
        self.rerank(&overrides);
        trace!("grafted `{}` at level {} after statement {}", sub_root, level, anchor_rank);
        Ok(())
    }
}
