use loam_core::{bail, convolve_valid, Error, NdArray, Result};
use loam_tree::Tree;

use crate::module::{Model, Operation};

// Conv1D - same-size 1D convolution with a single odd-length kernel.
//
// The input is symmetrically zero-padded by kernel_size / 2, so the valid
// convolution of the padded signal has the input's length. Backward is two
// more valid convolutions: the padded cotangent against the flipped input
// (kernel gradient) and against the flipped kernel (input cotangent).

/// A single-channel 1D convolution layer.
pub struct Conv1D {
    kernel: NdArray,
    kernel_grad: NdArray,
    kernel_size: usize,

    inputs: Vec<NdArray>,
}

impl Conv1D {
    /// Create a layer with an `init`-drawn kernel. The kernel length must
    /// be odd so the output can align with the input.
    pub fn new(kernel_size: usize, init: impl Fn(&[usize]) -> NdArray) -> Result<Conv1D> {
        if kernel_size % 2 != 1 {
            bail!("Conv1D kernel size must be odd, got {}", kernel_size);
        }
        Ok(Conv1D {
            kernel: init(&[kernel_size]),
            kernel_grad: NdArray::zeros(kernel_size),
            kernel_size,
            inputs: Vec::new(),
        })
    }

    pub fn kernel(&self) -> &NdArray {
        &self.kernel
    }
}

impl Operation for Conv1D {
    /// `[n] -> [n]`
    fn forward(&mut self, input: &Tree, training: bool) -> Result<Tree> {
        let input = input.as_leaf()?;
        if input.rank() != 1 {
            return Err(Error::RankMismatch {
                expected: 1,
                got: input.rank(),
            });
        }

        if training {
            self.inputs.push(input.clone());
        }

        let padded = input.pad1d(self.kernel_size / 2)?;
        let output = convolve_valid(&padded, &self.kernel)?;
        debug_assert_eq!(output.dims()[0], input.dims()[0]);
        Ok(Tree::leaf(output))
    }

    fn backward(&mut self, gradient: &Tree) -> Result<Tree> {
        let gradient = gradient.as_leaf()?;
        let input = self
            .inputs
            .pop()
            .ok_or(Error::EmptyTape { layer: "Conv1D" })?;

        let padded = gradient.pad1d(self.kernel_size / 2)?;

        let kernel_update = convolve_valid(&padded, &input.flip1d()?)?;
        self.kernel_grad
            .set(&[], &self.kernel_grad.add(&kernel_update)?)?;

        let x_grad = convolve_valid(&padded, &self.kernel.flip1d()?)?;
        Ok(Tree::leaf(x_grad))
    }

    fn tape_depths(&self) -> Vec<usize> {
        vec![self.inputs.len()]
    }
}

impl Model for Conv1D {
    fn params(&self) -> Tree {
        Tree::seq([Tree::leaf(self.kernel.clone())])
    }

    fn grads(&self) -> Tree {
        Tree::seq([Tree::leaf(self.kernel_grad.clone())])
    }
}
