//! The iteration tree: the forest of loops of one program.
//!
//! Nodes live in an arena keyed by name, so reparenting and swapping loops
//! is a matter of rewriting names in `parent`/`child_iterators` rather than
//! moving owned subtrees around. Statement order across the whole program is
//! held in `computations_absolute_order`, a dense ranking `1..=N` that every
//! mutation keeps consistent with the shape of the tree.
//!
//! Example (the `nested_sections` sample):
//! ```text
//! for root in [0, 10):
//!   for i in [0, 10):
//!     comp01
//!   for j in [0, 10):
//!     for k in [0, 10):
//!       for l in [0, 10):
//!         comp03
//!       for m in [0, 10):
//!         comp04
//! ```

pub mod bound;
pub mod builder;
pub mod node;
#[cfg(test)]
pub(crate) mod samples;
mod order;
mod subtree;
mod validate;

pub use bound::{Bound, SymbolicBound, UNKNOWN_BOUND};
pub use builder::{TreeBuilder, TreeSnapshot};
pub use node::IteratorNode;
pub(crate) use order::{Content, OrderKey};

use crate::utils::errors::TreeError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Per-root list of candidate sections.
pub type CandidateSections = IndexMap<String, Vec<Vec<String>>>;

/// Forest of [`IteratorNode`]s plus the global statement order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TreeSnapshot", into = "TreeSnapshot")]
pub struct IterationTree {
    pub(crate) roots: Vec<String>,
    pub(crate) iterators: IndexMap<String, IteratorNode>,
    pub(crate) computations: Vec<String>,
    pub(crate) computations_absolute_order: IndexMap<String, usize>,
}

impl IterationTree {
    /// Root loops in program order.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// All statements sorted by rank.
    pub fn computations(&self) -> &[String] {
        &self.computations
    }

    /// Statement name to rank, `1..=N`.
    pub fn computations_absolute_order(&self) -> &IndexMap<String, usize> {
        &self.computations_absolute_order
    }

    /// Rank of a statement.
    pub fn absolute_order(&self, comp: &str) -> Option<usize> {
        self.computations_absolute_order.get(comp).copied()
    }

    /// All nodes in arena order.
    pub fn iterators(&self) -> impl Iterator<Item = &IteratorNode> {
        self.iterators.values()
    }

    /// Number of loops.
    pub fn len(&self) -> usize {
        self.iterators.len()
    }

    /// Whether the tree has no loops.
    pub fn is_empty(&self) -> bool {
        self.iterators.is_empty()
    }

    /// Whether a loop with this name exists.
    pub fn contains_iterator(&self, name: &str) -> bool {
        self.iterators.contains_key(name)
    }

    /// Whether a statement with this name is ranked.
    pub fn contains_computation(&self, comp: &str) -> bool {
        self.computations_absolute_order.contains_key(comp)
    }

    /// Look up a node by name.
    pub fn iterator(&self, name: &str) -> Result<&IteratorNode, TreeError> {
        self.iterators
            .get(name)
            .ok_or_else(|| TreeError::UnknownIterator(name.to_string()))
    }

    pub(crate) fn iterator_mut(&mut self, name: &str) -> Result<&mut IteratorNode, TreeError> {
        self.iterators
            .get_mut(name)
            .ok_or_else(|| TreeError::UnknownIterator(name.to_string()))
    }

    /// Children of `parent`, or the roots when `parent` is `None`.
    pub fn siblings(&self, parent: Option<&str>) -> Result<&[String], TreeError> {
        match parent {
            Some(name) => Ok(&self.iterator(name)?.child_iterators),
            None => Ok(&self.roots),
        }
    }

    pub(crate) fn siblings_mut(&mut self, parent: Option<&str>) -> Result<&mut Vec<String>, TreeError> {
        match parent {
            Some(name) => Ok(&mut self.iterator_mut(name)?.child_iterators),
            None => Ok(&mut self.roots),
        }
    }

    /// Every statement under `name`, depth first: a node's own statements,
    /// then each child's subtree in nesting order.
    pub fn get_iterator_subtree_computations(&self, name: &str) -> Result<Vec<String>, TreeError> {
        let mut comps = Vec::new();
        let mut stack = vec![name];
        while let Some(current) = stack.pop() {
            let node = self.iterator(current)?;
            comps.extend(node.computations_list.iter().cloned());
            stack.extend(node.child_iterators.iter().rev().map(String::as_str));
        }
        Ok(comps)
    }

    /// Statements under `name` sorted by rank.
    pub fn get_candidate_computations(&self, name: &str) -> Result<Vec<String>, TreeError> {
        let mut comps = self.get_iterator_subtree_computations(name)?;
        self.sort_by_rank(&mut comps);
        Ok(comps)
    }

    /// Sort statement names by rank; unknown names go last.
    pub fn sort_by_rank(&self, comps: &mut [String]) {
        comps.sort_by_key(|c| self.absolute_order(c).unwrap_or(usize::MAX));
    }

    /// Names of the loops under `name`, preorder, `name` first.
    pub fn subtree_iterators(&self, name: &str) -> Result<Vec<String>, TreeError> {
        let mut names = Vec::new();
        let mut stack = vec![name];
        while let Some(current) = stack.pop() {
            let node = self.iterator(current)?;
            names.push(node.name.clone());
            stack.extend(node.child_iterators.iter().rev().map(String::as_str));
        }
        Ok(names)
    }

    /// The node directly holding `comp`, or its ancestor at `level`.
    pub fn get_iterator_of_computation(
        &self,
        comp: &str,
        level: Option<usize>,
    ) -> Result<&IteratorNode, TreeError> {
        let holder = self
            .iterators
            .values()
            .find(|node| node.computations_list.iter().any(|c| c == comp))
            .ok_or_else(|| TreeError::UnknownComputation(comp.to_string()))?;
        let Some(level) = level else {
            return Ok(holder);
        };
        if level > holder.level {
            return Err(TreeError::LevelOutOfRange { comp: comp.to_string(), level });
        }
        let mut node = holder;
        while node.level > level {
            let parent = node.parent.as_deref().ok_or_else(|| {
                TreeError::InvariantViolation(format!("`{}` has level {} but no parent", node.name, node.level))
            })?;
            node = self.iterator(parent)?;
        }
        Ok(node)
    }

    /// Root of the tree containing `name`.
    pub fn get_root_of_node(&self, name: &str) -> Result<&IteratorNode, TreeError> {
        let mut node = self.iterator(name)?;
        while let Some(parent) = node.parent.as_deref() {
            node = self.iterator(parent)?;
        }
        Ok(node)
    }

    /// Levels of the given nodes.
    pub fn get_iterator_levels<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>, TreeError> {
        names
            .iter()
            .map(|name| self.iterator(name.as_ref()).map(|node| node.level))
            .collect()
    }

    /// Ancestors of `name` from its parent up to the root.
    pub fn ancestors(&self, name: &str) -> Result<Vec<String>, TreeError> {
        let mut out = Vec::new();
        let mut node = self.iterator(name)?;
        while let Some(parent) = node.parent.as_deref() {
            out.push(parent.to_string());
            node = self.iterator(parent)?;
        }
        Ok(out)
    }

    /// Whether `ancestor` strictly encloses `node`.
    pub fn is_ancestor(&self, ancestor: &str, node: &str) -> bool {
        self.ancestors(node)
            .map(|chain| chain.iter().any(|n| n == ancestor))
            .unwrap_or(false)
    }

    /// Split every root into perfect-nest sections.
    ///
    /// Starting from a root, a section follows nodes while they hold no
    /// statement and exactly one child. The children of the node ending a
    /// section each start a new section. Pairs and triples proposed by
    /// interchange, skewing and tiling are always drawn from one section.
    pub fn get_candidate_sections(&self) -> CandidateSections {
        let mut out = CandidateSections::new();
        for root in &self.roots {
            let mut sections = Vec::new();
            let mut queue = VecDeque::from([root.as_str()]);
            while let Some(start) = queue.pop_front() {
                let Some(mut current) = self.iterators.get(start) else {
                    continue;
                };
                let mut section = vec![current.name.clone()];
                while current.computations_list.is_empty() && current.child_iterators.len() == 1 {
                    match self.iterators.get(&current.child_iterators[0]) {
                        Some(child) => {
                            current = child;
                            section.push(current.name.clone());
                        }
                        None => break,
                    }
                }
                sections.push(section);
                queue.extend(current.child_iterators.iter().map(String::as_str));
            }
            out.insert(root.clone(), sections);
        }
        out
    }

    /// For each pair of successive statements in rank order, the level of
    /// their innermost shared loop, or `-1` when they share none.
    pub fn shared_loop_levels(&self) -> Result<Vec<i64>, TreeError> {
        let holders: HashMap<&str, &IteratorNode> = self
            .iterators
            .values()
            .flat_map(|node| node.computations_list.iter().map(move |c| (c.as_str(), node)))
            .collect();
        let holder = |comp: &str| {
            holders
                .get(comp)
                .copied()
                .ok_or_else(|| TreeError::UnknownComputation(comp.to_string()))
        };
        self.computations
            .windows(2)
            .map(|pair| {
                let (mut a, mut b) = (holder(&pair[0])?, holder(&pair[1])?);
                loop {
                    if a.name == b.name {
                        return Ok(a.level as i64);
                    }
                    // Climb the deeper chain first; climb both when level-aligned.
                    let (climb_a, climb_b) = match a.level.cmp(&b.level) {
                        std::cmp::Ordering::Greater => (true, false),
                        std::cmp::Ordering::Less => (false, true),
                        std::cmp::Ordering::Equal => (true, true),
                    };
                    if climb_a {
                        match a.parent.as_deref() {
                            Some(parent) => a = self.iterator(parent)?,
                            None => return Ok(-1),
                        }
                    }
                    if climb_b {
                        match b.parent.as_deref() {
                            Some(parent) => b = self.iterator(parent)?,
                            None => return Ok(-1),
                        }
                    }
                }
            })
            .collect()
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, name: &str, depth: usize) -> fmt::Result {
        let Some(node) = self.iterators.get(name) else {
            return writeln!(f, "{:indent$}<missing {}>", "", name, indent = depth * 2);
        };
        writeln!(
            f,
            "{:indent$}for {} in [{}, {}):",
            "",
            node.name,
            node.lower_bound,
            node.upper_bound,
            indent = depth * 2
        )?;
        for content in self.contents_in_order(node) {
            match content {
                Content::Computation(comp) => writeln!(f, "{:indent$}{}", "", comp, indent = (depth + 1) * 2)?,
                Content::Iterator(child) => self.fmt_node(f, child, depth + 1)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for IterationTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for root in &self.roots {
            self.fmt_node(f, root, 0)?;
        }
        Ok(())
    }
}
