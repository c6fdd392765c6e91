use log::debug;

use loam_core::{bail, NdArray, Result};
use loam_tree::{self as tree, Tree};

// Optimizers walk the parameter and gradient trees in lockstep and write
// updated values through the parameter handles in place. Gradients are
// accumulated by the layers; zero the gradient tree between steps.

/// A parameter update rule.
pub trait Optimizer {
    /// Apply one update given matching parameter and gradient trees.
    fn step(&mut self, params: &Tree, grads: &Tree) -> Result<()>;

    /// Notify the optimizer that an epoch finished (for schedules).
    fn epoch(&mut self);
}

/// Plain gradient descent: `p <- p - lr * g`.
pub struct GradientDescent {
    lr: f32,
}

impl GradientDescent {
    pub fn new(learning_rate: f32) -> GradientDescent {
        GradientDescent { lr: learning_rate }
    }
}

impl Optimizer for GradientDescent {
    fn step(&mut self, params: &Tree, grads: &Tree) -> Result<()> {
        let lr = self.lr;
        tree::for_each(
            |xs| {
                let (p, g) = (xs[0], xs[1]);
                p.set(&[], &p.add(&g.apply(|gv| -gv * lr))?)
            },
            &[params, grads],
        )
    }

    fn epoch(&mut self) {}
}

/// Momentum with a geometric learning-rate decay from `lr` to `final_lr`
/// over `max_epochs` epochs.
///
/// The update buffer is an exponential moving average of the gradients:
/// `u <- m * u + (1 - m) * g`, then `p <- p - lr * u`.
pub struct Momentum {
    lr: f32,
    decay_per_epoch: f32,
    momentum: f32,
    updates: Option<Tree>,
}

impl Momentum {
    pub fn new(lr: f32, final_lr: f32, max_epochs: usize, momentum: f32) -> Result<Momentum> {
        if max_epochs < 2 {
            bail!("momentum schedule needs at least 2 epochs, got {}", max_epochs);
        }
        let decay_per_epoch = (final_lr / lr).powf(1.0 / (max_epochs - 1) as f32);
        Ok(Momentum {
            lr,
            decay_per_epoch,
            momentum,
            updates: None,
        })
    }

    pub fn learning_rate(&self) -> f32 {
        self.lr
    }
}

impl Optimizer for Momentum {
    fn step(&mut self, params: &Tree, grads: &Tree) -> Result<()> {
        if self.updates.is_none() {
            self.updates = Some(tree::map(
                |xs| Ok(NdArray::zeros(xs[0].dims())),
                &[grads],
            )?);
        }
        let updates = self.updates.as_ref().expect("initialized above");

        let (lr, mo) = (self.lr, self.momentum);
        tree::for_each(
            |xs| {
                let (u, p, g) = (xs[0], xs[1], xs[2]);
                u.set(&[], &u.combine(g, |uv, gv| mo * uv + (1.0 - mo) * gv)?)?;
                p.set(&[], &p.combine(u, |pv, uv| pv - lr * uv)?)?;
                Ok(())
            },
            &[updates, params, grads],
        )
    }

    fn epoch(&mut self) {
        self.lr *= self.decay_per_epoch;
        debug!("momentum learning rate decayed to {}", self.lr);
    }
}
