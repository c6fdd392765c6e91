use loam_core::{concatenate, Error, NdArray, Result, Shape};
use loam_tree::Tree;

use crate::activation::{Sigmoid, Tanh};
use crate::dense::Dense;
use crate::init::xavier;
use crate::module::{Model, Operation};

// Recurrent layers.
//
// SimpleRnn unrolls a cell over the leading (time) axis; the cell itself
// is any Model mapping [x, h] -> [out, h']. Because the cell's tapes are
// LIFO, the unrolled backward simply walks the steps in reverse, popping
// one record per step.
//
// Tree conventions:
//   SimpleRnn input:  [inputs [steps, batch, in], state [batch, hidden]]
//   SimpleRnn output: [outputs [steps, batch, hidden], state]
//   cell input/output: [x [batch, in], h [batch, hidden]]

/// Destructure a `[left, right]` pair of leaves.
fn pair(input: &Tree) -> Result<(&NdArray, &NdArray)> {
    match input {
        Tree::Seq(items) if items.len() == 2 => Ok((items[0].as_leaf()?, items[1].as_leaf()?)),
        Tree::Seq(items) => Err(Error::StructureMismatch {
            expected: "sequence of 2".to_string(),
            got: format!("sequence of {}", items.len()),
        }),
        Tree::Leaf(_) => Err(Error::StructureMismatch {
            expected: "sequence of 2".to_string(),
            got: "leaf".to_string(),
        }),
        Tree::Keyed(_) => Err(Error::StructureMismatch {
            expected: "sequence of 2".to_string(),
            got: "keyed".to_string(),
        }),
    }
}

fn expect_dims(a: &NdArray, dims: &[usize]) -> Result<()> {
    if a.dims() != dims {
        return Err(Error::ShapeMismatch {
            expected: Shape::from(dims),
            got: a.shape().clone(),
        });
    }
    Ok(())
}

/// Unrolls a recurrent cell over the time axis.
pub struct SimpleRnn {
    input_size: usize,
    hidden_size: usize,

    cell: Box<dyn Model>,
}

impl SimpleRnn {
    pub fn new(input_size: usize, hidden_size: usize, cell: Box<dyn Model>) -> SimpleRnn {
        SimpleRnn {
            input_size,
            hidden_size,
            cell,
        }
    }
}

impl Operation for SimpleRnn {
    fn forward(&mut self, input: &Tree, training: bool) -> Result<Tree> {
        let (inputs, state) = pair(input)?;
        if inputs.rank() != 3 {
            return Err(Error::RankMismatch {
                expected: 3,
                got: inputs.rank(),
            });
        }
        let (num_steps, batch_size) = (inputs.dims()[0], inputs.dims()[1]);
        if inputs.dims()[2] != self.input_size {
            return Err(Error::ShapeMismatch {
                expected: Shape::from(vec![num_steps, batch_size, self.input_size]),
                got: inputs.shape().clone(),
            });
        }
        expect_dims(state, &[batch_size, self.hidden_size])?;

        let mut h = state.clone();
        let mut outs = Vec::with_capacity(num_steps);
        for step in 0..num_steps {
            let x = inputs.get(&[step])?;
            let step_out = self.cell.forward(
                &Tree::seq([Tree::leaf(x), Tree::leaf(h.clone())]),
                training,
            )?;
            let (out, h_next) = pair(&step_out)?;
            expect_dims(out, &[batch_size, self.hidden_size])?;
            expect_dims(h_next, &[batch_size, self.hidden_size])?;
            h = h_next.clone();
            outs.push(out.expand_dims(0)?);
        }

        let outs_arr = concatenate(&outs, 0)?;
        debug_assert_eq!(outs_arr.dims(), &[num_steps, batch_size, self.hidden_size]);
        Ok(Tree::seq([Tree::leaf(outs_arr), Tree::leaf(h)]))
    }

    fn backward(&mut self, gradient: &Tree) -> Result<Tree> {
        let (grad_outputs, grad_h_out) = pair(gradient)?;
        if grad_outputs.rank() != 3 {
            return Err(Error::RankMismatch {
                expected: 3,
                got: grad_outputs.rank(),
            });
        }
        let (num_steps, batch_size) = (grad_outputs.dims()[0], grad_outputs.dims()[1]);
        expect_dims(grad_h_out, &[batch_size, self.hidden_size])?;

        let mut h = grad_h_out.clone();
        let mut grad_xs = Vec::with_capacity(num_steps);
        for i in 0..num_steps {
            let step = num_steps - i - 1;
            let step_grad = self.cell.backward(&Tree::seq([
                Tree::leaf(grad_outputs.get(&[step])?),
                Tree::leaf(h.clone()),
            ]))?;
            let (grad_x, grad_h) = pair(&step_grad)?;
            h = grad_h.clone();
            grad_xs.push(grad_x.expand_dims(0)?);
        }

        grad_xs.reverse();
        let grad_x_arr = concatenate(&grad_xs, 0)?;
        debug_assert_eq!(grad_x_arr.dims(), &[num_steps, batch_size, self.input_size]);
        Ok(Tree::seq([Tree::leaf(grad_x_arr), Tree::leaf(h)]))
    }

    fn tape_depths(&self) -> Vec<usize> {
        self.cell.tape_depths()
    }
}

impl Model for SimpleRnn {
    fn params(&self) -> Tree {
        Tree::seq([self.cell.params()])
    }

    fn grads(&self) -> Tree {
        Tree::seq([self.cell.grads()])
    }
}

/// Elman cell: `h' = tanh(x Wxh + h Whh + b)`; the output is the new
/// state.
pub struct RnnCell {
    input_size: usize,
    hidden_size: usize,

    w_xh: NdArray,
    w_hh: NdArray,
    b_h: NdArray,

    activation: Tanh,

    grad_w_xh: NdArray,
    grad_w_hh: NdArray,
    grad_b_h: NdArray,

    inputs: Vec<NdArray>,
    states: Vec<NdArray>,
}

impl RnnCell {
    pub fn new(
        input_size: usize,
        hidden_size: usize,
        init: impl Fn(&[usize]) -> NdArray,
    ) -> RnnCell {
        RnnCell {
            input_size,
            hidden_size,
            w_xh: init(&[input_size, hidden_size]),
            w_hh: init(&[hidden_size, hidden_size]),
            b_h: NdArray::zeros(hidden_size),
            activation: Tanh::new(),
            grad_w_xh: NdArray::zeros(vec![input_size, hidden_size]),
            grad_w_hh: NdArray::zeros(vec![hidden_size, hidden_size]),
            grad_b_h: NdArray::zeros(hidden_size),
            inputs: Vec::new(),
            states: Vec::new(),
        }
    }
}

impl Operation for RnnCell {
    fn forward(&mut self, input: &Tree, training: bool) -> Result<Tree> {
        let (x, h) = pair(input)?;
        if x.rank() != 2 {
            return Err(Error::RankMismatch {
                expected: 2,
                got: x.rank(),
            });
        }
        let batch_size = x.dims()[0];
        if x.dims()[1] != self.input_size {
            return Err(Error::ShapeMismatch {
                expected: Shape::from((batch_size, self.input_size)),
                got: x.shape().clone(),
            });
        }
        expect_dims(h, &[batch_size, self.hidden_size])?;

        if training {
            self.inputs.push(x.clone());
            self.states.push(h.clone());
        }

        let term = x
            .matmul(&self.w_xh)?
            .add(&h.matmul(&self.w_hh)?)?
            .add(&self.b_h.expand_dims(0)?)?;
        let out_tree = self.activation.forward(&Tree::leaf(term), training)?;
        let out = out_tree.as_leaf()?;
        debug_assert_eq!(out.dims(), &[batch_size, self.hidden_size]);

        Ok(Tree::seq([Tree::leaf(out.clone()), Tree::leaf(out.clone())]))
    }

    fn backward(&mut self, gradient: &Tree) -> Result<Tree> {
        let (grad_out, grad_state) = pair(gradient)?;
        expect_dims(grad_state, grad_out.dims())?;

        // The output and the forwarded state are the same tensor, so their
        // cotangents just add.
        let grad = grad_out.add(grad_state)?;
        let g_tree = self.activation.backward(&Tree::leaf(grad))?;
        let g = g_tree.as_leaf()?;

        let grad_x = g.matmul(&self.w_xh.transpose(&[1, 0])?)?;
        let grad_h = g.matmul(&self.w_hh.transpose(&[1, 0])?)?;

        let x = self
            .inputs
            .pop()
            .ok_or(Error::EmptyTape { layer: "RnnCell" })?;
        let h = self
            .states
            .pop()
            .ok_or(Error::EmptyTape { layer: "RnnCell" })?;

        self.grad_w_xh
            .set(&[], &self.grad_w_xh.add(&x.transpose(&[1, 0])?.matmul(g)?)?)?;
        self.grad_w_hh
            .set(&[], &self.grad_w_hh.add(&h.transpose(&[1, 0])?.matmul(g)?)?)?;
        self.grad_b_h.set(&[], &self.grad_b_h.add(&g.sum(0)?)?)?;

        Ok(Tree::seq([Tree::leaf(grad_x), Tree::leaf(grad_h)]))
    }

    fn tape_depths(&self) -> Vec<usize> {
        let mut depths = self.activation.tape_depths();
        depths.push(self.inputs.len());
        depths.push(self.states.len());
        depths
    }
}

impl Model for RnnCell {
    fn params(&self) -> Tree {
        Tree::seq([
            Tree::leaf(self.w_xh.clone()),
            Tree::leaf(self.w_hh.clone()),
            Tree::leaf(self.b_h.clone()),
        ])
    }

    fn grads(&self) -> Tree {
        Tree::seq([
            Tree::leaf(self.grad_w_xh.clone()),
            Tree::leaf(self.grad_w_hh.clone()),
            Tree::leaf(self.grad_b_h.clone()),
        ])
    }
}

/// Gated recurrent unit built from four Dense sublayers: update and reset
/// gates (sigmoid), candidate state (tanh), and an output projection.
pub struct GruCell {
    input_size: usize,
    hidden_size: usize,

    // Per-step record: [x_in, h_in, u, r, h_bar].
    stack: Vec<[NdArray; 5]>,

    layer_u: Dense,
    layer_r: Dense,
    layer_h: Dense,
    layer_v: Dense,
}

impl GruCell {
    pub fn new(input_size: usize, hidden_size: usize) -> GruCell {
        let concat_size = input_size + hidden_size;
        GruCell {
            input_size,
            hidden_size,
            stack: Vec::new(),
            layer_u: Dense::new(
                concat_size,
                hidden_size,
                xavier,
                Some(Box::new(Sigmoid::new())),
            ),
            layer_r: Dense::new(
                concat_size,
                hidden_size,
                xavier,
                Some(Box::new(Sigmoid::new())),
            ),
            layer_h: Dense::new(concat_size, hidden_size, xavier, Some(Box::new(Tanh::new()))),
            layer_v: Dense::new(hidden_size, hidden_size, xavier, None),
        }
    }

    /// Split a `[batch, input+hidden]` cotangent into its x and h parts.
    fn split_concat(&self, grad: &NdArray, batch_size: usize) -> Result<(NdArray, NdArray)> {
        let transposed = grad.swapaxes(0, 1)?;
        expect_dims(&transposed, &[self.input_size + self.hidden_size, batch_size])?;
        let x_part = transposed.slice(0, self.input_size)?.swapaxes(0, 1)?;
        let h_part = transposed
            .slice(self.input_size, self.input_size + self.hidden_size)?
            .swapaxes(0, 1)?;
        Ok((x_part, h_part))
    }
}

impl Operation for GruCell {
    fn forward(&mut self, input: &Tree, training: bool) -> Result<Tree> {
        let (x_in, h_in) = pair(input)?;
        if x_in.rank() != 2 {
            return Err(Error::RankMismatch {
                expected: 2,
                got: x_in.rank(),
            });
        }
        let batch_size = x_in.dims()[0];
        if x_in.dims()[1] != self.input_size {
            return Err(Error::ShapeMismatch {
                expected: Shape::from((batch_size, self.input_size)),
                got: x_in.shape().clone(),
            });
        }
        expect_dims(h_in, &[batch_size, self.hidden_size])?;

        let concat_in = concatenate(&[x_in.clone(), h_in.clone()], 1)?;

        // Reset and update gates.
        let r = self
            .layer_r
            .forward(&Tree::leaf(concat_in.clone()), training)?
            .as_leaf()?
            .clone();
        let u = self
            .layer_u
            .forward(&Tree::leaf(concat_in), training)?
            .as_leaf()?
            .clone();

        // Candidate state from the reset-scaled history.
        let h_reset = r.mul(h_in)?;
        let reset_concat = concatenate(&[x_in.clone(), h_reset], 1)?;
        let h_bar = self
            .layer_h
            .forward(&Tree::leaf(reset_concat), training)?
            .as_leaf()?
            .clone();

        // Blend old state and candidate by the update gate.
        let h_out = u
            .mul(h_in)?
            .add(&NdArray::ones(u.dims()).sub(&u)?.mul(&h_bar)?)?;

        let x_out = self
            .layer_v
            .forward(&Tree::leaf(h_out.clone()), training)?
            .as_leaf()?
            .clone();

        if training {
            self.stack
                .push([x_in.clone(), h_in.clone(), u, r, h_bar]);
        }

        Ok(Tree::seq([Tree::leaf(x_out), Tree::leaf(h_out)]))
    }

    fn backward(&mut self, gradient: &Tree) -> Result<Tree> {
        let (grad_x_out, grad_h_out2) = pair(gradient)?;
        let batch_size = grad_x_out.dims()[0];

        let [_x_in, h_in, u, r, h_bar] = self
            .stack
            .pop()
            .ok_or(Error::EmptyTape { layer: "GruCell" })?;

        let grad_h_out1 = self
            .layer_v
            .backward(&Tree::leaf(grad_x_out.clone()))?
            .as_leaf()?
            .clone();
        let grad_h_out = grad_h_out1.add(grad_h_out2)?;

        let grad_u1 = h_in.mul(&grad_h_out)?;
        let grad_h_in3 = u.mul(&grad_h_out)?;
        let grad_h_bar = NdArray::ones(u.dims()).sub(&u)?.mul(&grad_h_out)?;
        let grad_u2 = h_bar.mul(&grad_h_out)?.scale(-1.0);
        let grad_u = grad_u1.add(&grad_u2)?;

        let grad_reset_concat = self
            .layer_h
            .backward(&Tree::leaf(grad_h_bar))?
            .as_leaf()?
            .clone();
        let (grad_x_in2, grad_h_reset) = self.split_concat(&grad_reset_concat, batch_size)?;

        let grad_r = grad_h_reset.mul(&h_in)?;
        let grad_h_in2 = r.mul(&grad_h_reset)?;

        let grad_concat2 = self
            .layer_u
            .backward(&Tree::leaf(grad_u))?
            .as_leaf()?
            .clone();
        let grad_concat1 = self
            .layer_r
            .backward(&Tree::leaf(grad_r))?
            .as_leaf()?
            .clone();
        let grad_concat = grad_concat1.add(&grad_concat2)?;
        let (grad_x_in1, grad_h_in1) = self.split_concat(&grad_concat, batch_size)?;

        let grad_h_in = grad_h_in1.add(&grad_h_in2)?.add(&grad_h_in3)?;
        let grad_x_in = grad_x_in1.add(&grad_x_in2)?;

        Ok(Tree::seq([Tree::leaf(grad_x_in), Tree::leaf(grad_h_in)]))
    }

    fn tape_depths(&self) -> Vec<usize> {
        let mut depths = Vec::new();
        depths.extend(self.layer_v.tape_depths());
        depths.extend(self.layer_u.tape_depths());
        depths.extend(self.layer_r.tape_depths());
        depths.extend(self.layer_h.tape_depths());
        depths.push(self.stack.len());
        depths
    }
}

impl Model for GruCell {
    fn params(&self) -> Tree {
        Tree::seq([
            self.layer_v.params(),
            self.layer_u.params(),
            self.layer_r.params(),
            self.layer_h.params(),
        ])
    }

    fn grads(&self) -> Tree {
        Tree::seq([
            self.layer_v.grads(),
            self.layer_u.grads(),
            self.layer_r.grads(),
            self.layer_h.grads(),
        ])
    }
}
