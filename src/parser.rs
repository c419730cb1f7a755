//! Arc-eager transition-based dependency parse state.
//!
//! Transition labels: `sh` (shift), `re` (reduce), `la:<deprel>` (attach
//! stack top to buffer front, pop), `ra:<deprel>` (attach buffer front to
//! stack top, push).

use std::sync::Arc;

use crate::errors::{GondolaError, Result};
use crate::state::TransitionState;
use crate::template::Source;
use crate::tree::DependencyTree;

pub const SHIFT: &str = "sh";
pub const REDUCE: &str = "re";
pub const LEFT_ARC: &str = "la";
pub const RIGHT_ARC: &str = "ra";

/// Fallback label for nodes left headless when the buffer runs out.
const ROOT_LABEL: &str = "root";

#[derive(Debug, Clone)]
pub struct ParseState {
    tree: DependencyTree,
    stack: Vec<usize>,
    buffer: usize,
    gold: Option<Arc<DependencyTree>>,
}

impl ParseState {
    /// Creates a decode state over a (possibly tagged) unattached tree.
    pub fn new(tree: DependencyTree) -> Self {
        let buffer = if tree.len() > 1 { 1 } else { tree.len() };
        Self {
            tree,
            stack: vec![0],
            buffer,
            gold: None,
        }
    }

    /// Creates a training state from a gold tree; the working tree starts
    /// with the gold attachments removed but the tags kept.
    pub fn with_gold(gold: DependencyTree) -> Self {
        let mut tree = gold.stripped();
        for (node, gold_node) in tree.nodes.iter_mut().zip(gold.nodes()) {
            node.pos = gold_node.pos.clone();
            node.cpos = gold_node.cpos.clone();
        }
        let buffer = if tree.len() > 1 { 1 } else { tree.len() };
        Self {
            tree,
            stack: vec![0],
            buffer,
            gold: Some(Arc::new(gold)),
        }
    }

    fn stack_top(&self) -> Option<usize> {
        self.stack.last().copied()
    }

    /// Splits a transition label into its kind and optional arc label.
    fn split(label: &str) -> (&str, Option<&str>) {
        match label.split_once(':') {
            Some((kind, arc)) => (kind, Some(arc)),
            None => (label, None),
        }
    }

    /// Whether any gold arc connects `id` with a node still in the buffer.
    fn gold_links_into_buffer(&self, gold: &DependencyTree, id: usize) -> bool {
        for j in self.buffer..self.tree.len() {
            if gold.head_of(j) == Some(id) || gold.head_of(id) == Some(j) {
                return true;
            }
        }
        false
    }
}

impl TransitionState for ParseState {
    fn tree(&self) -> &DependencyTree {
        &self.tree
    }

    fn focus(&self) -> Option<usize> {
        (self.buffer < self.tree.len()).then_some(self.buffer)
    }

    fn resolve(&self, source: Source, offset: i32) -> Option<usize> {
        match source {
            Source::Stack => {
                if offset < 0 {
                    return None;
                }
                let depth = offset as usize;
                (depth < self.stack.len()).then(|| self.stack[self.stack.len() - 1 - depth])
            }
            Source::Buffer => {
                if offset < 0 {
                    return None;
                }
                let id = self.buffer + offset as usize;
                (id < self.tree.len()).then_some(id)
            }
            Source::Input => {
                let id = self.buffer as i64 + i64::from(offset);
                (id >= 1 && (id as usize) < self.tree.len()).then_some(id as usize)
            }
            _ => None,
        }
    }

    fn is_terminal(&self) -> bool {
        self.buffer >= self.tree.len()
    }

    fn is_legal(&self, label: &str) -> bool {
        let (kind, arc) = Self::split(label);
        match kind {
            SHIFT => arc.is_none() && self.buffer < self.tree.len(),
            REDUCE => {
                arc.is_none()
                    && self
                        .stack_top()
                        .map_or(false, |s| self.tree.head_of(s).is_some())
            }
            LEFT_ARC => {
                arc.is_some()
                    && self.buffer < self.tree.len()
                    && self
                        .stack_top()
                        .map_or(false, |s| s != 0 && self.tree.head_of(s).is_none())
            }
            RIGHT_ARC => {
                arc.is_some() && self.buffer < self.tree.len() && self.stack_top().is_some()
            }
            _ => false,
        }
    }

    fn apply(&mut self, label: &str) -> Result<()> {
        if !self.is_legal(label) {
            return Err(GondolaError::invalid_transition(format!(
                "transition {label:?} is not legal here"
            )));
        }
        let (kind, arc) = Self::split(label);
        match kind {
            SHIFT => {
                self.stack.push(self.buffer);
                self.buffer += 1;
            }
            REDUCE => {
                self.stack.pop();
            }
            LEFT_ARC => {
                let s = self.stack.pop().unwrap();
                self.tree.attach(s, self.buffer, arc.unwrap())?;
            }
            RIGHT_ARC => {
                let s = *self.stack.last().unwrap();
                self.tree.attach(self.buffer, s, arc.unwrap())?;
                self.stack.push(self.buffer);
                self.buffer += 1;
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    fn oracle(&self) -> Option<String> {
        let gold = self.gold.as_ref()?;
        if self.is_terminal() {
            return None;
        }
        let b = self.buffer;
        if let Some(s) = self.stack_top() {
            if s != 0 && self.tree.head_of(s).is_none() && gold.head_of(s) == Some(b) {
                let arc = gold.node(s)?.deprel.as_deref().unwrap_or("dep");
                return Some(format!("{LEFT_ARC}:{arc}"));
            }
            if gold.head_of(b) == Some(s) {
                let arc = gold.node(b)?.deprel.as_deref().unwrap_or("dep");
                return Some(format!("{RIGHT_ARC}:{arc}"));
            }
            if self.tree.head_of(s).is_some() && !self.gold_links_into_buffer(gold, s) {
                return Some(REDUCE.to_string());
            }
        }
        Some(SHIFT.to_string())
    }

    fn finalize(mut self) -> DependencyTree {
        // graceful completion: leftover headless nodes hang off the root
        for id in 1..self.tree.len() {
            if self.tree.head_of(id).is_none() {
                let _ = self.tree.attach(id, 0, ROOT_LABEL);
            }
        }
        self.tree
    }

    fn signature(&self) -> String {
        let mut sig = String::new();
        for node in self.tree.nodes().iter().skip(1) {
            match (node.head, node.deprel.as_deref()) {
                (Some(h), Some(l)) => {
                    sig.push_str(&h.to_string());
                    sig.push(':');
                    sig.push_str(l);
                }
                _ => sig.push('_'),
            }
            sig.push(' ');
        }
        sig
    }
}
