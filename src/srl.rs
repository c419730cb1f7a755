//! Semantic role labeling state: one role decision per
//! (predicate, candidate argument) pair.

use std::sync::Arc;

use crate::errors::{GondolaError, Result};
use crate::state::TransitionState;
use crate::template::Source;
use crate::tree::DependencyTree;

/// Label assigned to a pair that carries no role.
pub const NO_ROLE: &str = "O";

#[derive(Debug, Clone)]
pub struct RoleState {
    tree: DependencyTree,
    pairs: Vec<(usize, usize)>,
    cursor: usize,
    gold: Option<Arc<DependencyTree>>,
}

fn candidate_pairs(tree: &DependencyTree) -> Vec<(usize, usize)> {
    let mut pairs = vec![];
    for &pred in tree.predicates() {
        for arg in 1..tree.len() {
            if arg != pred {
                pairs.push((pred, arg));
            }
        }
    }
    pairs
}

impl RoleState {
    /// Creates a decode state over a parsed tree with predicate marks; any
    /// existing role arcs are discarded.
    pub fn new(mut tree: DependencyTree) -> Self {
        tree.roles.clear();
        let pairs = candidate_pairs(&tree);
        Self {
            tree,
            pairs,
            cursor: 0,
            gold: None,
        }
    }

    /// Creates a training state; the gold role arcs drive the oracle.
    pub fn with_gold(gold: DependencyTree) -> Self {
        let mut tree = gold.clone();
        tree.roles.clear();
        let pairs = candidate_pairs(&tree);
        Self {
            tree,
            pairs,
            cursor: 0,
            gold: Some(Arc::new(gold)),
        }
    }

    fn current(&self) -> Option<(usize, usize)> {
        self.pairs.get(self.cursor).copied()
    }
}

impl TransitionState for RoleState {
    fn tree(&self) -> &DependencyTree {
        &self.tree
    }

    fn focus(&self) -> Option<usize> {
        self.current().map(|(_, arg)| arg)
    }

    fn resolve(&self, source: Source, offset: i32) -> Option<usize> {
        let (pred, arg) = self.current()?;
        let base = match source {
            Source::Predicate => pred,
            Source::Argument | Source::Input => arg,
            _ => return None,
        };
        let id = base as i64 + i64::from(offset);
        (id >= 1 && (id as usize) < self.tree.len()).then_some(id as usize)
    }

    fn is_terminal(&self) -> bool {
        self.cursor >= self.pairs.len()
    }

    fn is_legal(&self, _label: &str) -> bool {
        !self.is_terminal()
    }

    fn apply(&mut self, label: &str) -> Result<()> {
        let Some((pred, arg)) = self.current() else {
            return Err(GondolaError::invalid_transition(
                "role state is already terminal",
            ));
        };
        if label != NO_ROLE {
            self.tree.add_role(pred, arg, label.to_string())?;
        }
        self.cursor += 1;
        Ok(())
    }

    fn oracle(&self) -> Option<String> {
        let gold = self.gold.as_ref()?;
        let (pred, arg) = self.current()?;
        let label = gold
            .roles()
            .iter()
            .find(|r| r.predicate == pred && r.argument == arg)
            .map_or(NO_ROLE, |r| r.label.as_str());
        Some(label.to_string())
    }

    fn finalize(self) -> DependencyTree {
        self.tree
    }

    fn signature(&self) -> String {
        let mut sig = String::new();
        for role in self.tree.roles() {
            sig.push_str(&role.predicate.to_string());
            sig.push(':');
            sig.push_str(&role.argument.to_string());
            sig.push(':');
            sig.push_str(&role.label);
            sig.push(' ');
        }
        sig
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gold_tree() -> DependencyTree {
        let mut t = DependencyTree::from_forms(["cats", "chase", "mice"]);
        t.attach(1, 2, "nsubj").unwrap();
        t.attach(3, 2, "obj").unwrap();
        t.attach(2, 0, "root").unwrap();
        t.add_predicate(2).unwrap();
        t.add_role(2, 1, "A0".into()).unwrap();
        t.add_role(2, 3, "A1".into()).unwrap();
        t
    }

    #[test]
    fn test_pair_enumeration() {
        let state = RoleState::new(gold_tree());
        assert_eq!(2, state.pairs.len());
        assert_eq!(Some((2, 1)), state.current());
    }

    #[test]
    fn test_oracle_walk_rebuilds_roles() {
        let gold = gold_tree();
        let mut state = RoleState::with_gold(gold.clone());
        while !state.is_terminal() {
            let label = state.oracle().unwrap();
            state.apply(&label).unwrap();
        }
        let tree = state.finalize();
        assert_eq!(gold.roles(), tree.roles());
    }

    #[test]
    fn test_no_role_adds_nothing() {
        let mut state = RoleState::new(gold_tree());
        state.apply(NO_ROLE).unwrap();
        state.apply("A1").unwrap();
        let tree = state.finalize();
        assert_eq!(1, tree.roles().len());
        assert_eq!(3, tree.roles()[0].argument);
    }

    #[test]
    fn test_resolve_pred_and_arg() {
        let state = RoleState::new(gold_tree());
        assert_eq!(Some(2), state.resolve(Source::Predicate, 0));
        assert_eq!(Some(1), state.resolve(Source::Argument, 0));
        assert_eq!(Some(2), state.resolve(Source::Argument, 1));
        assert_eq!(None, state.resolve(Source::Stack, 0));
    }
}
