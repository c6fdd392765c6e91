use rand::Rng;

use loam_core::{Error, Result};
use loam_tree::{self as tree, Tree};

use crate::module::Operation;

// Dropout - regularization by random zeroing.
//
// Training: draw a fresh 0/1 mask per call, record it, and multiply the
// input by it. Eval: scale by the keep probability 1 - p instead, so the
// expected magnitude matches training.

/// Randomly zeroes elements with probability `p` during training.
pub struct Dropout {
    p: f64,
    masks: Vec<Tree>,
}

impl Dropout {
    /// Create a Dropout layer dropping with probability `p` in `[0, 1)`.
    ///
    /// # Panics
    /// Panics when `p` is outside `[0, 1)`.
    pub fn new(p: f64) -> Dropout {
        assert!(
            (0.0..1.0).contains(&p),
            "dropout probability must be in [0, 1)"
        );
        Dropout {
            p,
            masks: Vec::new(),
        }
    }
}

impl Operation for Dropout {
    fn forward(&mut self, input: &Tree, training: bool) -> Result<Tree> {
        let scale = (1.0 - self.p) as f32;
        if !training {
            return tree::map(|xs| Ok(xs[0].apply(|x| x * scale)), &[input]);
        }

        let mut rng = rand::thread_rng();
        let p = self.p;
        let mask = tree::map(
            |xs| {
                Ok(xs[0].apply(|_| if rng.gen::<f64>() < p { 0.0 } else { 1.0 }))
            },
            &[input],
        )?;
        self.masks.push(mask.clone());
        tree::map(|xs| xs[0].mul(xs[1]), &[input, &mask])
    }

    fn backward(&mut self, gradient: &Tree) -> Result<Tree> {
        let mask = self
            .masks
            .pop()
            .ok_or(Error::EmptyTape { layer: "Dropout" })?;
        tree::map(|xs| xs[0].mul(xs[1]), &[gradient, &mask])
    }

    fn tape_depths(&self) -> Vec<usize> {
        vec![self.masks.len()]
    }
}
