use loam_core::{Error, Result};
use loam_tree::{self as tree, Tree};

use crate::module::Operation;

// Activations, as scalar functions plus Operation wrappers that record
// what their backward pass needs: Sigmoid and Tanh keep their outputs
// (their derivatives are cheapest in terms of the output), Relu keeps its
// inputs.

/// Logistic sigmoid: 1 / (1 + e^-x).
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Hyperbolic tangent via e^-2x, clamped to +-1 beyond |x| = 20 where the
/// exponential would overflow f32.
pub fn tanh(x: f32) -> f32 {
    if x < -20.0 {
        return -1.0;
    }
    if x > 20.0 {
        return 1.0;
    }
    let em2x = (-2.0 * x).exp();
    (1.0 - em2x) / (1.0 + em2x)
}

pub fn relu(x: f32) -> f32 {
    x.max(0.0)
}

/// Elementwise sigmoid.
#[derive(Default)]
pub struct Sigmoid {
    outputs: Vec<Tree>,
}

impl Sigmoid {
    pub fn new() -> Self {
        Sigmoid::default()
    }
}

impl Operation for Sigmoid {
    fn forward(&mut self, input: &Tree, training: bool) -> Result<Tree> {
        let output = tree::map(|xs| Ok(xs[0].apply(sigmoid)), &[input])?;
        if training {
            self.outputs.push(output.clone());
        }
        Ok(output)
    }

    fn backward(&mut self, gradient: &Tree) -> Result<Tree> {
        let output = self
            .outputs
            .pop()
            .ok_or(Error::EmptyTape { layer: "Sigmoid" })?;
        // d sigmoid = s * (1 - s)
        tree::map(
            |xs| xs[0].combine(xs[1], |grad, sig| sig * (1.0 - sig) * grad),
            &[gradient, &output],
        )
    }

    fn tape_depths(&self) -> Vec<usize> {
        vec![self.outputs.len()]
    }
}

/// Elementwise tanh.
#[derive(Default)]
pub struct Tanh {
    outputs: Vec<Tree>,
}

impl Tanh {
    pub fn new() -> Self {
        Tanh::default()
    }
}

impl Operation for Tanh {
    fn forward(&mut self, input: &Tree, training: bool) -> Result<Tree> {
        let output = tree::map(|xs| Ok(xs[0].apply(tanh)), &[input])?;
        if training {
            self.outputs.push(output.clone());
        }
        Ok(output)
    }

    fn backward(&mut self, gradient: &Tree) -> Result<Tree> {
        let output = self
            .outputs
            .pop()
            .ok_or(Error::EmptyTape { layer: "Tanh" })?;
        // d tanh = 1 - t^2
        tree::map(
            |xs| xs[0].combine(xs[1], |t, grad| (1.0 - t * t) * grad),
            &[&output, gradient],
        )
    }

    fn tape_depths(&self) -> Vec<usize> {
        vec![self.outputs.len()]
    }
}

/// Elementwise rectifier.
#[derive(Default)]
pub struct Relu {
    inputs: Vec<Tree>,
}

impl Relu {
    pub fn new() -> Self {
        Relu::default()
    }
}

impl Operation for Relu {
    fn forward(&mut self, input: &Tree, training: bool) -> Result<Tree> {
        if training {
            self.inputs.push(input.clone());
        }
        tree::map(|xs| Ok(xs[0].apply(relu)), &[input])
    }

    fn backward(&mut self, gradient: &Tree) -> Result<Tree> {
        let input = self
            .inputs
            .pop()
            .ok_or(Error::EmptyTape { layer: "Relu" })?;
        tree::map(
            |xs| {
                xs[0].combine(xs[1], |x, grad| if x > 0.0 { grad } else { 0.0 })
            },
            &[&input, gradient],
        )
    }

    fn tape_depths(&self) -> Vec<usize> {
        vec![self.inputs.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::tapes_are_empty;
    use loam_core::{assert_array_close, nda};

    #[test]
    fn scalar_functions() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!((tanh(0.0)).abs() < 1e-6);
        assert_eq!(tanh(100.0), 1.0);
        assert_eq!(tanh(-100.0), -1.0);
        assert!((tanh(1.0) - 0.7615942).abs() < 1e-5);
        assert_eq!(relu(-2.0), 0.0);
        assert_eq!(relu(3.0), 3.0);
    }

    #[test]
    fn relu_masks_gradient_by_input_sign() {
        let mut op = Relu::new();
        let x = Tree::leaf(nda!([-1.0, 2.0, -3.0, 4.0]));
        let y = op.forward(&x, true).unwrap();
        assert_array_close(y.as_leaf().unwrap(), &nda!([0.0, 2.0, 0.0, 4.0]));

        let g = Tree::leaf(nda!([1.0, 1.0, 1.0, 1.0]));
        let gx = op.backward(&g).unwrap();
        assert_array_close(gx.as_leaf().unwrap(), &nda!([0.0, 1.0, 0.0, 1.0]));
        assert!(tapes_are_empty(&op));
    }

    #[test]
    fn sigmoid_tape_pairing() {
        let mut op = Sigmoid::new();
        assert!(tapes_are_empty(&op));
        let x = Tree::leaf(nda!([0.0, 1.0]));
        op.forward(&x, true).unwrap();
        op.forward(&x, true).unwrap();
        assert_eq!(op.tape_depths(), vec![2]);

        let g = Tree::leaf(nda!([1.0, 1.0]));
        op.backward(&g).unwrap();
        op.backward(&g).unwrap();
        assert!(tapes_are_empty(&op));
        assert!(matches!(
            op.backward(&g),
            Err(loam_core::Error::EmptyTape { .. })
        ));
    }

    #[test]
    fn eval_mode_records_nothing() {
        let mut op = Tanh::new();
        let x = Tree::leaf(nda!([0.5]));
        op.forward(&x, false).unwrap();
        assert!(tapes_are_empty(&op));
    }
}
