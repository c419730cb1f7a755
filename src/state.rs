//! The annotation state interface driven by the beam-search decoder.

use crate::errors::Result;
use crate::template::Source;
use crate::tree::DependencyTree;

/// A mutable annotation state over one sentence.
///
/// States are owned exclusively by the component driving them. Cloning must
/// yield a structurally independent copy: a transition applied to one clone
/// can never corrupt another. The arena tree representation makes this a
/// plain array copy.
pub trait TransitionState: Clone {
    /// The partial output structure being built.
    fn tree(&self) -> &DependencyTree;

    /// The node index the state is currently focused on, if any.
    fn focus(&self) -> Option<usize>;

    /// Resolves a template token anchor to a node index.
    ///
    /// Out-of-range offsets resolve to `None`; the template engine turns
    /// that into the absent sentinel.
    fn resolve(&self, source: Source, offset: i32) -> Option<usize>;

    /// Whether the cursor reached the end of input and no transition is
    /// legal.
    fn is_terminal(&self) -> bool;

    /// Whether the transition named by `label` is legal in this
    /// configuration.
    fn is_legal(&self, label: &str) -> bool;

    /// Applies the transition named by `label`.
    ///
    /// # Errors
    ///
    /// [`crate::errors::GondolaError::InvalidTransition`] when `label` is
    /// not legal here.
    fn apply(&mut self, label: &str) -> Result<()>;

    /// The gold transition for the current configuration, when the state
    /// was built with gold annotations. `None` once terminal or for
    /// decode-only states.
    fn oracle(&self) -> Option<String>;

    /// Consumes the state and returns the best output built so far,
    /// completing any partial structure gracefully.
    fn finalize(self) -> DependencyTree;

    /// A structural signature of the output; states producing identical
    /// outputs share a signature. Used for unique-only beam merging.
    fn signature(&self) -> String;
}
