// End-to-end smoke tests: a few optimization steps must actually reduce
// the loss, and the whole pipeline (layers, losses, optimizers, loaders,
// serialization) must compose.

use loam_core::{NdArray, Result};
use loam_data::{batched, iter_dataset, Dataset, TreeDataset};
use loam_nn::{
    tapes_are_empty, xavier, Dense, GradientDescent, Loss, Model, Momentum, Operation, Optimizer,
    Sigmoid, SseLoss,
};
use loam_tree::{self as tree, Tree};

/// One optimizer step on a single batch; returns the pre-step loss.
fn train_step(
    model: &mut Dense,
    opt: &mut dyn Optimizer,
    x: &Tree,
    y: &NdArray,
) -> Result<f32> {
    let predicted = model.forward(x, true)?;
    let predicted = predicted.as_leaf()?;
    let loss = SseLoss.loss(predicted, y)?;

    tree::zero(&model.grads())?;
    let g = SseLoss.gradient(predicted, y)?;
    model.backward(&Tree::leaf(g))?;
    opt.step(&model.params(), &model.grads())?;
    Ok(loss)
}

#[test]
fn gradient_descent_reduces_regression_loss() {
    // Fit y = x0 - x1 from a handful of points.
    let x = Tree::leaf(NdArray::from_fn((4, 2), |idx| {
        ((idx[0] + 1) * (idx[1] + 1)) as f32 * 0.25
    }));
    let y = {
        let leaf = x.as_leaf().unwrap();
        NdArray::from_fn((4, 1), |idx| {
            let a = leaf.get(&[idx[0], 0]).unwrap().item().unwrap();
            let b = leaf.get(&[idx[0], 1]).unwrap().item().unwrap();
            a - b
        })
    };

    let mut model = Dense::new(2, 1, xavier, None);
    let mut opt = GradientDescent::new(0.05);

    let first = train_step(&mut model, &mut opt, &x, &y).unwrap();
    let mut last = first;
    for _ in 0..50 {
        last = train_step(&mut model, &mut opt, &x, &y).unwrap();
    }
    assert!(tapes_are_empty(&model));
    assert!(
        last < first * 0.5,
        "loss did not drop: first {} last {}",
        first,
        last
    );
}

#[test]
fn momentum_also_converges() {
    let x = Tree::leaf(NdArray::from_fn((4, 2), |idx| {
        (idx[0] as f32 - 1.5) * 0.5 + idx[1] as f32 * 0.25
    }));
    let y = NdArray::from_fn((4, 1), |idx| (idx[0] as f32) * 0.5 - 0.75);

    let mut model = Dense::new(2, 1, xavier, None);
    let mut opt = Momentum::new(0.05, 0.01, 5, 0.5).unwrap();

    let first = train_step(&mut model, &mut opt, &x, &y).unwrap();
    let mut last = first;
    for _ in 0..60 {
        last = train_step(&mut model, &mut opt, &x, &y).unwrap();
    }
    opt.epoch();
    assert!(
        last < first,
        "loss did not drop: first {} last {}",
        first,
        last
    );
}

#[test]
fn batched_training_over_a_tree_dataset() {
    // Dataset of ([x0, x1], [x0 + x1]) rows, loaded in mini-batches.
    let n = 8;
    let xs = NdArray::from_fn((n, 2), |idx| (idx[0] as f32 * 0.1) + idx[1] as f32 * 0.3);
    let ys = NdArray::from_fn((n, 1), |idx| {
        (idx[0] as f32 * 0.1) + (idx[0] as f32 * 0.1 + 0.3)
    });
    let ds = TreeDataset::new(Tree::seq([Tree::leaf(xs), Tree::leaf(ys)])).unwrap();

    let mut model = Dense::new(2, 1, xavier, None);
    let mut opt = GradientDescent::new(0.05);

    let mut losses = Vec::new();
    for _epoch in 0..20 {
        let mut epoch_loss = 0.0;
        for batch in batched(iter_dataset(&ds), 4, false) {
            let batch = batch.unwrap();
            let (x, y) = match &batch {
                Tree::Seq(parts) => (parts[0].clone(), parts[1].as_leaf().unwrap().clone()),
                _ => panic!("expected [x, y] batches"),
            };
            epoch_loss += train_step(&mut model, &mut opt, &x, &y).unwrap();
        }
        losses.push(epoch_loss);
    }
    assert!(
        losses.last().unwrap() < &(losses[0] * 0.9),
        "losses: {:?}",
        losses
    );
    assert_eq!(ds.len(), n);
}

#[test]
fn sigmoid_head_learns_a_separable_rule() {
    // Two clusters: label 1 when x0 > 0.
    let x = Tree::leaf(NdArray::from_fn((6, 1), |idx| idx[0] as f32 - 2.5));
    let y = NdArray::from_fn((6, 1), |idx| if idx[0] as f32 - 2.5 > 0.0 { 1.0 } else { 0.0 });

    let mut model = Dense::new(1, 1, xavier, Some(Box::new(Sigmoid::new())));
    let mut opt = GradientDescent::new(0.5);

    let first = train_step(&mut model, &mut opt, &x, &y).unwrap();
    let mut last = first;
    for _ in 0..100 {
        last = train_step(&mut model, &mut opt, &x, &y).unwrap();
    }
    assert!(
        last < first,
        "loss did not drop: first {} last {}",
        first,
        last
    );
}
