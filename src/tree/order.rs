//! Statement ordering.
//!
//! The tree and the rank map describe the same program order twice. The
//! walk below reads the order off the tree: inside a node, statements and
//! child loops are merged by the smallest rank each one carries, and roots
//! and children keep their list order. Mutations that move statements
//! around assign provisional keys to the moved family and then re-derive
//! dense ranks from the walk, which keeps both views in agreement.

use crate::tree::{IterationTree, IteratorNode};
use log::trace;
use std::collections::HashMap;

/// Sort key of a statement: `(rank, 0)` for statements in place,
/// `(anchor, i)` for the `i`-th statement of a family spliced after `anchor`.
pub(crate) type OrderKey = (usize, usize);

/// An entry of a node's body in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Content<'a> {
    Computation(&'a str),
    Iterator(&'a str),
}

/// Result of walking the tree.
#[derive(Debug, Default)]
pub(crate) struct Walk {
    /// Statements in execution order
    pub order: Vec<String>,
    /// Number of statements emitted once each node's subtree is done
    pub ends: HashMap<String, usize>,
}

type MinKeys<'a> = HashMap<&'a str, Option<OrderKey>>;

impl IterationTree {
    fn key_of(&self, comp: &str, overrides: &HashMap<String, OrderKey>) -> OrderKey {
        overrides
            .get(comp)
            .copied()
            .or_else(|| self.computations_absolute_order.get(comp).map(|rank| (*rank, 0)))
            .unwrap_or((usize::MAX, 0))
    }

    fn min_key<'a>(
        &'a self,
        name: &'a str,
        overrides: &HashMap<String, OrderKey>,
        memo: &mut MinKeys<'a>,
    ) -> Option<OrderKey> {
        if let Some(key) = memo.get(name) {
            return *key;
        }
        let node = self.iterators.get(name)?;
        let mut best = node
            .computations_list
            .iter()
            .map(|comp| self.key_of(comp, overrides))
            .min();
        for child in &node.child_iterators {
            best = match (best, self.min_key(child, overrides, memo)) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
        memo.insert(name, best);
        best
    }

    fn ordered_contents<'a>(
        &'a self,
        node: &'a IteratorNode,
        overrides: &HashMap<String, OrderKey>,
        memo: &mut MinKeys<'a>,
    ) -> Vec<Content<'a>> {
        let comps = &node.computations_list;
        let kids = &node.child_iterators;
        let mut out = Vec::with_capacity(comps.len() + kids.len());
        let (mut ci, mut ki) = (0, 0);
        while ci < comps.len() || ki < kids.len() {
            let take_comp = match (comps.get(ci), kids.get(ki)) {
                (Some(comp), Some(kid)) => match self.min_key(kid, overrides, memo) {
                    // A loop without statements does not constrain the order.
                    None => false,
                    Some(kid_key) => self.key_of(comp, overrides) <= kid_key,
                },
                (Some(_), None) => true,
                _ => false,
            };
            if take_comp {
                out.push(Content::Computation(&comps[ci]));
                ci += 1;
            } else {
                out.push(Content::Iterator(&kids[ki]));
                ki += 1;
            }
        }
        out
    }

    /// Body of `node` in execution order under the current ranks.
    pub(crate) fn contents_in_order<'a>(&'a self, node: &'a IteratorNode) -> Vec<Content<'a>> {
        let overrides = HashMap::new();
        let mut memo = MinKeys::new();
        self.ordered_contents(node, &overrides, &mut memo)
    }

    fn walk_node<'a>(
        &'a self,
        name: &'a str,
        overrides: &HashMap<String, OrderKey>,
        memo: &mut MinKeys<'a>,
        walk: &mut Walk,
    ) {
        let Some(node) = self.iterators.get(name) else {
            return;
        };
        for content in self.ordered_contents(node, overrides, memo) {
            match content {
                Content::Computation(comp) => walk.order.push(comp.to_string()),
                Content::Iterator(child) => self.walk_node(child, overrides, memo, walk),
            }
        }
        walk.ends.insert(name.to_string(), walk.order.len());
    }

    pub(crate) fn walk(&self, overrides: &HashMap<String, OrderKey>) -> Walk {
        let mut walk = Walk::default();
        let mut memo = MinKeys::new();
        for root in &self.roots {
            self.walk_node(root, overrides, &mut memo, &mut walk);
        }
        walk
    }

    /// Number of statements executed up to the end of `name`'s subtree.
    pub(crate) fn statements_through(&self, name: &str) -> usize {
        self.walk(&HashMap::new()).ends.get(name).copied().unwrap_or(0)
    }

    /// Re-derive dense ranks from the tree, using `overrides` for statements
    /// that were moved or newly attached.
    pub(crate) fn rerank(&mut self, overrides: &HashMap<String, OrderKey>) {
        let walk = self.walk(overrides);
        trace!("reranked {} statements", walk.order.len());
        self.computations_absolute_order = walk
            .order
            .iter()
            .enumerate()
            .map(|(idx, comp)| (comp.clone(), idx + 1))
            .collect();
        self.computations = walk.order;
    }

    /// Statement order obtained by walking the tree.
    pub fn get_computations_order_from_tree(&self) -> Vec<String> {
        self.walk(&HashMap::new()).order
    }
}
