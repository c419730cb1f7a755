//! Arena-based dependency trees.
//!
//! Nodes are stored in a flat vector and refer to each other by index, so a
//! tree clone is a plain array copy and head/dependent links can never form a
//! reference cycle. Node 0 is the artificial root.

use bincode::{Decode, Encode};

use crate::errors::{GondolaError, Result};

/// A single token of an annotated sentence.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct DependencyNode {
    /// Position of the node in the sentence. 0 is the artificial root.
    pub id: usize,

    /// Surface form.
    pub form: String,

    /// Lemma, if the morphological analyzer filled it in.
    pub lemma: Option<String>,

    /// Coarse part-of-speech tag.
    pub cpos: Option<String>,

    /// Fine part-of-speech tag.
    pub pos: Option<String>,

    /// Head node index.
    pub head: Option<usize>,

    /// Dependency label of the arc to the head.
    pub deprel: Option<String>,

    /// Dependent node indices, kept sorted.
    pub deps: Vec<usize>,
}

impl DependencyNode {
    fn new(id: usize, form: String) -> Self {
        Self {
            id,
            form,
            lemma: None,
            cpos: None,
            pos: None,
            head: None,
            deprel: None,
            deps: vec![],
        }
    }
}

/// A semantic role arc between a predicate node and an argument node.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct RoleArc {
    pub predicate: usize,
    pub argument: usize,
    pub label: String,
}

/// An annotated sentence: a token arena plus semantic role arcs.
#[derive(Debug, Clone, PartialEq, Default, Encode, Decode)]
pub struct DependencyTree {
    pub(crate) nodes: Vec<DependencyNode>,
    pub(crate) roles: Vec<RoleArc>,
    pub(crate) predicates: Vec<usize>,
}

impl DependencyTree {
    /// Creates a tree from surface forms. Node 0 (the root) is inserted
    /// automatically.
    pub fn from_forms<I, S>(forms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut nodes = vec![DependencyNode::new(0, "#ROOT#".to_string())];
        for form in forms {
            let id = nodes.len();
            nodes.push(DependencyNode::new(id, form.into()));
        }
        Self {
            nodes,
            roles: vec![],
            predicates: vec![],
        }
    }

    /// Number of nodes, including the artificial root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: usize) -> Option<&DependencyNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: usize) -> Option<&mut DependencyNode> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> &[DependencyNode] {
        &self.nodes
    }

    pub fn roles(&self) -> &[RoleArc] {
        &self.roles
    }

    pub fn predicates(&self) -> &[usize] {
        &self.predicates
    }

    /// Marks a node as a predicate for role labeling.
    pub fn add_predicate(&mut self, id: usize) -> Result<()> {
        if id == 0 || id >= self.nodes.len() {
            return Err(GondolaError::invalid_argument(
                "id",
                format!("predicate {id} out of range"),
            ));
        }
        if !self.predicates.contains(&id) {
            self.predicates.push(id);
            self.predicates.sort_unstable();
        }
        Ok(())
    }

    /// Adds a semantic role arc.
    pub fn add_role(&mut self, predicate: usize, argument: usize, label: String) -> Result<()> {
        if predicate >= self.nodes.len() || argument >= self.nodes.len() {
            return Err(GondolaError::invalid_argument(
                "argument",
                format!("role arc {predicate}->{argument} out of range"),
            ));
        }
        self.roles.push(RoleArc {
            predicate,
            argument,
            label,
        });
        Ok(())
    }

    /// Returns whether `ancestor` dominates `id` through head links.
    pub fn is_ancestor(&self, ancestor: usize, id: usize) -> bool {
        let mut cur = self.nodes[id].head;
        while let Some(h) = cur {
            if h == ancestor {
                return true;
            }
            cur = self.nodes[h].head;
        }
        false
    }

    /// Attaches `dep` to `head` with the given label.
    ///
    /// # Errors
    ///
    /// Fails on out-of-range indices, self-attachment, attachment of the
    /// root, double-heading, and any arc that would close a cycle.
    pub fn attach(&mut self, dep: usize, head: usize, label: &str) -> Result<()> {
        if dep >= self.nodes.len() || head >= self.nodes.len() {
            return Err(GondolaError::invalid_transition(format!(
                "arc {head}->{dep} out of range"
            )));
        }
        if dep == head {
            return Err(GondolaError::invalid_transition(format!(
                "node {dep} cannot head itself"
            )));
        }
        if dep == 0 {
            return Err(GondolaError::invalid_transition(
                "the root cannot take a head",
            ));
        }
        if self.nodes[dep].head.is_some() {
            return Err(GondolaError::invalid_transition(format!(
                "node {dep} already has a head"
            )));
        }
        if self.is_ancestor(dep, head) {
            return Err(GondolaError::invalid_transition(format!(
                "arc {head}->{dep} would create a cycle"
            )));
        }
        self.nodes[dep].head = Some(head);
        self.nodes[dep].deprel = Some(label.to_string());
        let deps = &mut self.nodes[head].deps;
        match deps.binary_search(&dep) {
            Ok(_) => {}
            Err(pos) => deps.insert(pos, dep),
        }
        Ok(())
    }

    pub fn head_of(&self, id: usize) -> Option<usize> {
        self.nodes.get(id).and_then(|n| n.head)
    }

    pub fn grand_head_of(&self, id: usize) -> Option<usize> {
        self.head_of(id).and_then(|h| self.head_of(h))
    }

    pub fn leftmost_dependent(&self, id: usize) -> Option<usize> {
        self.nodes
            .get(id)
            .and_then(|n| n.deps.iter().copied().find(|&d| d < id))
    }

    pub fn rightmost_dependent(&self, id: usize) -> Option<usize> {
        self.nodes
            .get(id)
            .and_then(|n| n.deps.iter().rev().copied().find(|&d| d > id))
    }

    /// Closest dependent of `id` on its left side.
    pub fn left_nearest_dependent(&self, id: usize) -> Option<usize> {
        self.nodes
            .get(id)
            .and_then(|n| n.deps.iter().rev().copied().find(|&d| d < id))
    }

    /// Closest dependent of `id` on its right side.
    pub fn right_nearest_dependent(&self, id: usize) -> Option<usize> {
        self.nodes
            .get(id)
            .and_then(|n| n.deps.iter().copied().find(|&d| d > id))
    }

    /// Nearest sibling to the left of `id` under the same head.
    pub fn left_nearest_sibling(&self, id: usize) -> Option<usize> {
        let head = self.head_of(id)?;
        self.nodes[head]
            .deps
            .iter()
            .rev()
            .copied()
            .find(|&d| d < id)
    }

    /// Nearest sibling to the right of `id` under the same head.
    pub fn right_nearest_sibling(&self, id: usize) -> Option<usize> {
        let head = self.head_of(id)?;
        self.nodes[head].deps.iter().copied().find(|&d| d > id)
    }

    /// Number of dependents of `id` on its left side.
    pub fn left_valency(&self, id: usize) -> usize {
        self.nodes
            .get(id)
            .map_or(0, |n| n.deps.iter().filter(|&&d| d < id).count())
    }

    /// Number of dependents of `id` on its right side.
    pub fn right_valency(&self, id: usize) -> usize {
        self.nodes
            .get(id)
            .map_or(0, |n| n.deps.iter().filter(|&&d| d > id).count())
    }

    /// Returns whether every non-root node has a head.
    pub fn is_fully_attached(&self) -> bool {
        self.nodes.iter().skip(1).all(|n| n.head.is_some())
    }

    /// Returns whether the tree is projective: no two arcs cross.
    pub fn is_projective(&self) -> bool {
        for n in self.nodes.iter().skip(1) {
            let Some(h) = n.head else { continue };
            let (lo, hi) = if h < n.id { (h, n.id) } else { (n.id, h) };
            for m in self.nodes.iter().skip(1) {
                let Some(g) = m.head else { continue };
                let inside = m.id > lo && m.id < hi;
                let head_inside = g > lo && g < hi;
                if inside != head_inside && m.id != lo && m.id != hi && g != lo && g != hi {
                    return false;
                }
            }
        }
        true
    }

    /// Copy of this tree with heads, labels, tags and roles removed, keeping
    /// forms, lemmas and predicate marks. Used to seed decoding states.
    pub fn stripped(&self) -> Self {
        let mut out = self.clone();
        for n in out.nodes.iter_mut() {
            n.head = None;
            n.deprel = None;
            n.pos = None;
            n.cpos = None;
            n.deps.clear();
        }
        out.roles.clear();
        out
    }
}
