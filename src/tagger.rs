//! Part-of-speech tag state: one tag decision per token, left to right.

use std::sync::Arc;

use crate::errors::{GondolaError, Result};
use crate::state::TransitionState;
use crate::template::Source;
use crate::tree::DependencyTree;

/// Cursor state over the token sequence. Transition labels are the tags
/// themselves.
#[derive(Debug, Clone)]
pub struct TagState {
    tree: DependencyTree,
    cursor: usize,

    /// Gold annotations for oracle lookups; shared immutably across beam
    /// branches.
    gold: Option<Arc<DependencyTree>>,
}

impl TagState {
    /// Creates a decode state; the tree's tags are overwritten as the
    /// cursor advances.
    pub fn new(tree: DependencyTree) -> Self {
        Self {
            tree,
            cursor: 1,
            gold: None,
        }
    }

    /// Creates a training state from a gold-annotated tree.
    pub fn with_gold(gold: DependencyTree) -> Self {
        let tree = gold.stripped();
        Self {
            tree,
            cursor: 1,
            gold: Some(Arc::new(gold)),
        }
    }
}

impl TransitionState for TagState {
    fn tree(&self) -> &DependencyTree {
        &self.tree
    }

    fn focus(&self) -> Option<usize> {
        (self.cursor < self.tree.len()).then_some(self.cursor)
    }

    fn resolve(&self, source: Source, offset: i32) -> Option<usize> {
        match source {
            Source::Input => {
                let id = self.cursor as i64 + i64::from(offset);
                // the artificial root is not addressable
                (id >= 1 && (id as usize) < self.tree.len()).then_some(id as usize)
            }
            _ => None,
        }
    }

    fn is_terminal(&self) -> bool {
        self.cursor >= self.tree.len()
    }

    fn is_legal(&self, _label: &str) -> bool {
        !self.is_terminal()
    }

    fn apply(&mut self, label: &str) -> Result<()> {
        if self.is_terminal() {
            return Err(GondolaError::invalid_transition(
                "tag state is already terminal",
            ));
        }
        let node = self.tree.node_mut(self.cursor).unwrap();
        node.pos = Some(label.to_string());
        self.cursor += 1;
        Ok(())
    }

    fn oracle(&self) -> Option<String> {
        let gold = self.gold.as_ref()?;
        gold.node(self.cursor)?.pos.clone()
    }

    fn finalize(self) -> DependencyTree {
        self.tree
    }

    fn signature(&self) -> String {
        let mut sig = String::new();
        for node in self.tree.nodes().iter().skip(1) {
            sig.push_str(node.pos.as_deref().unwrap_or("_"));
            sig.push(' ');
        }
        sig
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gold_tree() -> DependencyTree {
        let mut t = DependencyTree::from_forms(["the", "cat", "sat"]);
        t.node_mut(1).unwrap().pos = Some("DT".into());
        t.node_mut(2).unwrap().pos = Some("NN".into());
        t.node_mut(3).unwrap().pos = Some("VB".into());
        t
    }

    #[test]
    fn test_oracle_walk() {
        let mut state = TagState::with_gold(gold_tree());
        let mut applied = vec![];
        while !state.is_terminal() {
            let gold = state.oracle().unwrap();
            applied.push(gold.clone());
            state.apply(&gold).unwrap();
        }
        assert_eq!(vec!["DT", "NN", "VB"], applied);
        assert_eq!(None, state.oracle());
        let tree = state.finalize();
        assert_eq!(Some("NN"), tree.node(2).unwrap().pos.as_deref());
    }

    #[test]
    fn test_resolve_window() {
        let state = TagState::new(gold_tree().stripped());
        assert_eq!(Some(1), state.resolve(Source::Input, 0));
        assert_eq!(Some(2), state.resolve(Source::Input, 1));
        // offset -1 would land on the root
        assert_eq!(None, state.resolve(Source::Input, -1));
        assert_eq!(None, state.resolve(Source::Input, 5));
        assert_eq!(None, state.resolve(Source::Stack, 0));
    }

    #[test]
    fn test_apply_past_end_fails() {
        let mut state = TagState::new(DependencyTree::from_forms(["a"]));
        state.apply("X").unwrap();
        assert!(state.is_terminal());
        assert!(state.apply("X").is_err());
    }

    #[test]
    fn test_signature_reflects_tags() {
        let mut a = TagState::new(gold_tree().stripped());
        let mut b = a.clone();
        a.apply("DT").unwrap();
        b.apply("NN").unwrap();
        assert_ne!(a.signature(), b.signature());
    }
}
