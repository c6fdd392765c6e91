use loam_core::{Error, NdArray, Result, Shape};
use loam_tree::Tree;

use crate::module::{Model, Operation};

// Dense - fully connected layer: y = x W + b, with an optional inner
// activation applied to the result.
//
// Parameter shapes:
//   w: [input_dim, output_dim]
//   b: [output_dim]           (broadcast over the batch via expand_dims)
//
// Gradients accumulate across backward calls (required when the layer is
// reused inside an unrolled recurrence); zero them between optimizer
// steps.

/// A fully connected layer.
pub struct Dense {
    w: NdArray,
    b: NdArray,

    w_grad: NdArray,
    b_grad: NdArray,

    input_dim: usize,
    output_dim: usize,
    activation: Option<Box<dyn Operation>>,

    inputs: Vec<NdArray>,
}

impl Dense {
    /// Create a layer with `init`-drawn weights and zero bias.
    pub fn new(
        input_dim: usize,
        output_dim: usize,
        init: impl Fn(&[usize]) -> NdArray,
        activation: Option<Box<dyn Operation>>,
    ) -> Dense {
        Dense {
            w: init(&[input_dim, output_dim]),
            b: NdArray::zeros(output_dim),
            w_grad: NdArray::zeros(vec![input_dim, output_dim]),
            b_grad: NdArray::zeros(output_dim),
            input_dim,
            output_dim,
            activation,
            inputs: Vec::new(),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Direct access to the weight matrix.
    pub fn weight(&self) -> &NdArray {
        &self.w
    }

    /// Direct access to the bias vector.
    pub fn bias(&self) -> &NdArray {
        &self.b
    }
}

impl Operation for Dense {
    /// `[batch, input_dim] -> [batch, output_dim]`
    fn forward(&mut self, input: &Tree, training: bool) -> Result<Tree> {
        let input = input.as_leaf()?;
        if input.rank() != 2 {
            return Err(Error::RankMismatch {
                expected: 2,
                got: input.rank(),
            });
        }
        let batch_size = input.dims()[0];
        if input.dims()[1] != self.input_dim {
            return Err(Error::ShapeMismatch {
                expected: Shape::from((batch_size, self.input_dim)),
                got: input.shape().clone(),
            });
        }

        if training {
            self.inputs.push(input.clone());
        }

        let y = input.matmul(&self.w)?.add(&self.b.expand_dims(0)?)?;
        debug_assert_eq!(y.dims(), &[batch_size, self.output_dim]);

        match &mut self.activation {
            Some(act) => act.forward(&Tree::leaf(y), training),
            None => Ok(Tree::leaf(y)),
        }
    }

    fn backward(&mut self, gradient: &Tree) -> Result<Tree> {
        {
            let g = gradient.as_leaf()?;
            if g.rank() != 2 {
                return Err(Error::RankMismatch {
                    expected: 2,
                    got: g.rank(),
                });
            }
            if g.dims()[1] != self.output_dim {
                return Err(Error::ShapeMismatch {
                    expected: Shape::from((g.dims()[0], self.output_dim)),
                    got: g.shape().clone(),
                });
            }
        }

        let input = self
            .inputs
            .pop()
            .ok_or(Error::EmptyTape { layer: "Dense" })?;

        let grad = match &mut self.activation {
            Some(act) => {
                let t = act.backward(gradient)?;
                t.as_leaf()?.clone()
            }
            None => gradient.as_leaf()?.clone(),
        };

        self.b_grad.set(&[], &self.b_grad.add(&grad.sum(0)?)?)?;
        let w_update = input.transpose(&[1, 0])?.matmul(&grad)?;
        self.w_grad.set(&[], &self.w_grad.add(&w_update)?)?;

        let x_grad = grad.matmul(&self.w.transpose(&[1, 0])?)?;
        Ok(Tree::leaf(x_grad))
    }

    fn tape_depths(&self) -> Vec<usize> {
        let mut depths = vec![self.inputs.len()];
        if let Some(act) = &self.activation {
            depths.extend(act.tape_depths());
        }
        depths
    }
}

impl Model for Dense {
    fn params(&self) -> Tree {
        Tree::seq([Tree::leaf(self.w.clone()), Tree::leaf(self.b.clone())])
    }

    fn grads(&self) -> Tree {
        Tree::seq([
            Tree::leaf(self.w_grad.clone()),
            Tree::leaf(self.b_grad.clone()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loam_core::{assert_array_close, nda};
    use loam_tree as tree;

    fn identity_dense() -> Dense {
        let mut d = Dense::new(2, 2, |shape| NdArray::zeros(shape), None);
        let params = Tree::seq([
            Tree::leaf(nda!([[1.0, 0.0], [0.0, 1.0]])),
            Tree::leaf(nda!([0.5, -0.5])),
        ]);
        tree::set(&d.params(), &params).unwrap();
        d
    }

    #[test]
    fn forward_applies_weights_and_bias() {
        let mut d = identity_dense();
        let x = Tree::leaf(nda!([[3.0, 7.0]]));
        let y = d.forward(&x, false).unwrap();
        assert_array_close(y.as_leaf().unwrap(), &nda!([[3.5, 6.5]]));
    }

    #[test]
    fn forward_rejects_wrong_width() {
        let mut d = identity_dense();
        let x = Tree::leaf(nda!([[1.0, 2.0, 3.0]]));
        assert!(d.forward(&x, false).is_err());
    }

    #[test]
    fn backward_accumulates_gradients() {
        let mut d = identity_dense();
        let x = Tree::leaf(nda!([[1.0, 2.0], [3.0, 4.0]]));
        d.forward(&x, true).unwrap();
        let g = Tree::leaf(nda!([[1.0, 0.0], [0.0, 1.0]]));
        let gx = d.backward(&g).unwrap();

        // x_grad = g @ w^T = g (identity weights)
        assert_array_close(gx.as_leaf().unwrap(), &nda!([[1.0, 0.0], [0.0, 1.0]]));

        // b_grad = column sums of g
        let grads = d.grads();
        let (leaves, _) = tree::flatten(&grads);
        assert_array_close(&leaves[1], &nda!([1.0, 1.0]));
        // w_grad = x^T @ g
        assert_array_close(&leaves[0], &nda!([[1.0, 3.0], [2.0, 4.0]]));

        // A second identical pass doubles the accumulators.
        d.forward(&x, true).unwrap();
        d.backward(&g).unwrap();
        let (leaves, _) = tree::flatten(&d.grads());
        assert_array_close(&leaves[1], &nda!([2.0, 2.0]));
    }

    #[test]
    fn params_share_storage_with_the_layer() {
        let mut d = identity_dense();
        tree::zero(&d.params()).unwrap();
        let x = Tree::leaf(nda!([[3.0, 7.0]]));
        let y = d.forward(&x, false).unwrap();
        assert_array_close(y.as_leaf().unwrap(), &nda!([[0.0, 0.0]]));
    }

    #[test]
    fn backward_on_empty_tape_fails() {
        let mut d = identity_dense();
        let g = Tree::leaf(nda!([[1.0, 1.0]]));
        assert!(matches!(
            d.backward(&g),
            Err(Error::EmptyTape { layer: "Dense" })
        ));
    }
}
