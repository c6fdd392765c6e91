use loam_core::Result;
use loam_tree::Tree;

// Operation / Model - the interface every layer implements.
//
// Layers communicate exclusively in Trees: a plain layer takes and returns
// a leaf, recurrent layers take a sequence of [inputs, state]. Gradients
// are hand-written per layer; each forward call in training mode records
// whatever its backward pass will need on a LIFO tape owned by the layer,
// and each backward call pops exactly one record. Forward/backward calls
// therefore pair up in stack order, which is what lets the same layer
// instance be unrolled over time steps.

/// A differentiable computation with hand-written forward and backward
/// passes.
pub trait Operation {
    /// Compute outputs from inputs.
    ///
    /// In training mode the operation pushes whatever its backward pass
    /// needs onto its tape; in eval mode nothing is recorded.
    fn forward(&mut self, input: &Tree, training: bool) -> Result<Tree>;

    /// Propagate the output cotangent to an input cotangent, consuming the
    /// most recent tape record. Parameterized layers also accumulate into
    /// their gradient buffers here.
    ///
    /// Fails with `EmptyTape` when called without a matching training-mode
    /// forward.
    fn backward(&mut self, gradient: &Tree) -> Result<Tree>;

    /// Current depth of every tape owned by this operation, including its
    /// children's. All zeros means no forward is awaiting its backward.
    fn tape_depths(&self) -> Vec<usize>;
}

/// An [`Operation`] with trainable parameters.
///
/// `params()` and `grads()` return trees whose leaves are handles sharing
/// the layer's own storage, so writing through them (an optimizer step, a
/// checkpoint restore) updates the layer in place.
pub trait Model: Operation {
    /// The parameter tree (storage-sharing handles).
    fn params(&self) -> Tree;

    /// The gradient tree (storage-sharing handles). Gradients accumulate
    /// across backward calls; zero them between steps.
    fn grads(&self) -> Tree;
}

/// Whether every tape of `op` is empty.
pub fn tapes_are_empty<O: Operation + ?Sized>(op: &O) -> bool {
    op.tape_depths().iter().all(|&d| d == 0)
}
