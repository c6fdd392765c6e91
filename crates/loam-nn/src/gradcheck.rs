use log::debug;

use loam_core::{nd_index, NdArray, Result};
use loam_tree::{self as tree, Tree};

use crate::init::random_normal;
use crate::metrics::mse;
use crate::module::{tapes_are_empty, Model, Operation};

// Numerical gradient checking.
//
// A layer's hand-written backward is validated against forward differences
// of a scalar objective: contract the outputs with a fixed random
// cotangent g, so the objective's gradient in the inputs is exactly what
// backward(g) claims. The comparison runs under the tree closeness
// assertion (rtol = atol = 1e-2).
//
// The checks also exercise the tape discipline: tapes must be empty before
// forward, non-empty after a training-mode forward, and empty again after
// backward.

/// Forward-difference gradient of a scalar function at `x`.
pub fn numerical_grad<F>(mut f: F, x: &NdArray, h: f32) -> Result<NdArray>
where
    F: FnMut(&NdArray) -> Result<f32>,
{
    let g = NdArray::zeros(x.dims());
    let y = f(x)?;

    for idx in nd_index(x.dims()) {
        let xh = x.copy();
        let v = xh.get(&idx)?.item()?;
        xh.set(&idx, &NdArray::scalar(v + h))?;

        let d = (f(&xh)? - y) / h;
        g.set(&idx, &NdArray::scalar(d))?;
    }

    Ok(g)
}

/// [`numerical_grad`] over every leaf of a tree, one perturbed copy per
/// leaf.
pub fn numerical_grad_tree<F>(mut f: F, inputs: &Tree, h: f32) -> Result<Tree>
where
    F: FnMut(&Tree) -> Result<f32>,
{
    let g = tree::map(|xs| Ok(NdArray::zeros(xs[0].dims())), &[inputs])?;

    for path in tree::iterate_paths(inputs) {
        let x = tree::get_leaf_by_path(inputs, &path)?;
        let inputs_copy = tree::copy(inputs)?;
        let target = tree::get_leaf_by_path(&inputs_copy, &path)?;

        let leaf_fn = |xh: &NdArray| -> Result<f32> {
            target.set(&[], xh)?;
            f(&inputs_copy)
        };
        let g_leaf = numerical_grad(leaf_fn, &x, h)?;

        tree::get_leaf_by_path(&g, &path)?.set(&[], &g_leaf)?;
    }
    Ok(g)
}

const H: f32 = 1e-3;

/// Check an operation's input gradients against finite differences.
///
/// # Panics
/// Panics when the tape discipline is violated or the analytic and
/// numeric gradients disagree beyond tolerance.
pub fn check_operation_grad<O>(op: &mut O, inputs: &Tree) -> Result<()>
where
    O: Operation + ?Sized,
{
    assert!(tapes_are_empty(op), "tapes must be empty before forward");
    let outputs = op.forward(inputs, true)?;
    assert!(
        !tapes_are_empty(op),
        "training-mode forward must record on the tape"
    );

    let g = tree::map(|xs| Ok(random_normal(xs[0].dims(), 0.0, 1.0)), &[&outputs])?;
    let grad_inputs = op.backward(&g)?;
    assert!(tapes_are_empty(op), "backward must consume the tape");

    let mut objective = |x: &Tree| -> Result<f32> {
        let outputs = op.forward(x, false)?;
        tree::reduce(
            |acc, xs| Ok(acc + xs[0].mul(xs[1])?.sum_all()),
            &[&outputs, &g],
            0.0,
        )
    };
    let expected = numerical_grad_tree(&mut objective, inputs, H)?;

    let diff = tree::reduce(
        |acc, xs| Ok(acc + mse(xs[0], xs[1])?),
        &[&grad_inputs, &expected],
        0.0,
    )?;
    debug!("grad inputs diff mse: {}", diff);

    tree::assert_close_all(&grad_inputs, &expected);
    Ok(())
}

/// Check a model's parameter gradients against finite differences.
///
/// # Panics
/// Panics when the analytic and numeric gradients disagree beyond
/// tolerance.
pub fn check_model_param_grads<M>(model: &mut M, inputs: &Tree) -> Result<()>
where
    M: Model + ?Sized,
{
    let params = tree::copy(&model.params())?;

    let outputs = model.forward(inputs, true)?;
    let g = tree::map(|xs| Ok(random_normal(xs[0].dims(), 0.0, 1.0)), &[&outputs])?;

    tree::zero(&model.grads())?;
    model.backward(&g)?;
    let grad_params = model.grads();

    let mut objective = |p: &Tree| -> Result<f32> {
        tree::set(&model.params(), p)?;
        let outputs = model.forward(inputs, false)?;
        tree::reduce(
            |acc, xs| Ok(acc + xs[0].mul(xs[1])?.sum_all()),
            &[&outputs, &g],
            0.0,
        )
    };
    let expected = numerical_grad_tree(&mut objective, &params, H)?;

    let diff = tree::reduce(
        |acc, xs| Ok(acc + mse(xs[0], xs[1])?),
        &[&grad_params, &expected],
        0.0,
    )?;
    debug!("grad params diff mse: {}", diff);

    tree::assert_close_all(&grad_params, &expected);
    Ok(())
}

/// Run both the input-gradient and parameter-gradient checks.
pub fn check_model_grads<M>(model: &mut M, inputs: &Tree) -> Result<()>
where
    M: Model + ?Sized,
{
    check_operation_grad(model, inputs)?;
    check_model_param_grads(model, inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loam_core::{assert_array_close, nda};

    #[test]
    fn numerical_grad_of_a_quadratic() {
        // f(x) = sum(x^2), df/dx = 2x.
        let f = |x: &NdArray| -> Result<f32> { Ok(x.apply(|v| v * v).sum_all()) };
        let x = nda!([1.0, -2.0, 0.5]);
        let g = numerical_grad(f, &x, 1e-3).unwrap();
        assert_array_close(&g, &nda!([2.0, -4.0, 1.0]));
    }

    #[test]
    fn numerical_grad_tree_matches_per_leaf() {
        let t = Tree::seq([Tree::leaf(nda!([1.0, 2.0])), Tree::leaf(nda!(3.0))]);
        // f = sum of all leaves; gradient is 1 everywhere.
        let f = |t: &Tree| -> Result<f32> {
            tree::reduce(|acc, xs| Ok(acc + xs[0].sum_all()), &[t], 0.0)
        };
        let g = numerical_grad_tree(f, &t, 1e-3).unwrap();
        let expected = Tree::seq([Tree::leaf(nda!([1.0, 1.0])), Tree::leaf(nda!(1.0))]);
        tree::assert_close_all(&g, &expected);
    }
}
