//! Structural invariant checks.

use crate::tree::IterationTree;
use crate::utils::errors::TreeError;
use std::collections::HashSet;

fn violation(message: String) -> TreeError {
    TreeError::InvariantViolation(message)
}

impl IterationTree {
    /// Check every structural invariant of the tree.
    ///
    /// - parent and child links agree and every node is reachable from a root
    /// - each level is exactly one more than the parent's, roots are level 0
    /// - each statement is held by exactly one node and ranked exactly once,
    ///   ranks are dense `1..=N`
    /// - the order read off the tree equals the rank order
    pub fn validate(&self) -> Result<(), TreeError> {
        self.check_links()?;
        self.check_levels()?;
        self.check_statements()?;
        self.check_order()
    }

    pub(crate) fn check_links(&self) -> Result<(), TreeError> {
        let mut seen_roots = HashSet::new();
        for root in &self.roots {
            let node = self.iterator(root)?;
            if node.parent.is_some() {
                return Err(violation(format!("root `{root}` has a parent")));
            }
            if !seen_roots.insert(root.as_str()) {
                return Err(violation(format!("root `{root}` listed twice")));
            }
        }
        for node in self.iterators.values() {
            match node.parent.as_deref() {
                None if !seen_roots.contains(node.name.as_str()) => {
                    return Err(violation(format!("`{}` has no parent but is not a root", node.name)));
                }
                None => {}
                Some(parent) => {
                    let count = self
                        .iterator(parent)?
                        .child_iterators
                        .iter()
                        .filter(|c| **c == node.name)
                        .count();
                    if count != 1 {
                        return Err(violation(format!(
                            "`{parent}` lists child `{}` {count} times",
                            node.name
                        )));
                    }
                }
            }
            for child in &node.child_iterators {
                if self.iterator(child)?.parent.as_deref() != Some(node.name.as_str()) {
                    return Err(violation(format!(
                        "`{child}` is a child of `{}` but points elsewhere",
                        node.name
                    )));
                }
            }
        }

        let mut reached = HashSet::new();
        let mut stack: Vec<&str> = self.roots.iter().map(String::as_str).collect();
        while let Some(name) = stack.pop() {
            if !reached.insert(name) {
                return Err(violation(format!("`{name}` reached twice")));
            }
            stack.extend(self.iterator(name)?.child_iterators.iter().map(String::as_str));
        }
        if reached.len() != self.iterators.len() {
            return Err(violation(format!(
                "{} of {} iterators unreachable from the roots",
                self.iterators.len() - reached.len(),
                self.iterators.len()
            )));
        }
        Ok(())
    }

    fn check_levels(&self) -> Result<(), TreeError> {
        for node in self.iterators.values() {
            let expected = match node.parent.as_deref() {
                Some(parent) => self.iterator(parent)?.level + 1,
                None => 0,
            };
            if node.level != expected {
                return Err(violation(format!(
                    "`{}` has level {} instead of {}",
                    node.name, node.level, expected
                )));
            }
        }
        Ok(())
    }

    fn check_statements(&self) -> Result<(), TreeError> {
        let mut held = HashSet::new();
        for node in self.iterators.values() {
            for comp in &node.computations_list {
                if !held.insert(comp.as_str()) {
                    return Err(violation(format!("statement `{comp}` is held twice")));
                }
                if !self.computations_absolute_order.contains_key(comp) {
                    return Err(violation(format!("statement `{comp}` has no rank")));
                }
            }
        }
        if held.len() != self.computations_absolute_order.len() {
            return Err(violation(format!(
                "{} ranked statements but {} held",
                self.computations_absolute_order.len(),
                held.len()
            )));
        }
        let mut ranks: Vec<usize> = self.computations_absolute_order.values().copied().collect();
        ranks.sort_unstable();
        if ranks.iter().enumerate().any(|(idx, rank)| *rank != idx + 1) {
            return Err(violation(format!("ranks are not a dense 1..N permutation: {ranks:?}")));
        }
        let sorted = self.computations.windows(2).all(|pair| {
            self.absolute_order(&pair[0]) < self.absolute_order(&pair[1])
        });
        if self.computations.len() != held.len() || !sorted {
            return Err(violation("statement list disagrees with the rank map".to_string()));
        }
        Ok(())
    }

    fn check_order(&self) -> Result<(), TreeError> {
        let walked = self.get_computations_order_from_tree();
        if walked != self.computations {
            return Err(violation(format!(
                "tree order {:?} disagrees with rank order {:?}",
                walked, self.computations
            )));
        }
        Ok(())
    }
}
