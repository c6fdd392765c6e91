use loam_core::{Error, NdArray, Result};

// Losses pair a scalar objective with its hand-written gradient in the
// prediction. The gradient is what the output layer's backward receives.

/// A scalar training objective.
pub trait Loss {
    /// The loss value for a batch of predictions against targets.
    fn loss(&self, predicted: &NdArray, target: &NdArray) -> Result<f32>;

    /// The gradient of the loss in the predictions.
    fn gradient(&self, predicted: &NdArray, target: &NdArray) -> Result<NdArray>;
}

/// Row-wise softmax over the last axis, stabilized by subtracting the
/// row maximum before exponentiation.
pub fn softmax(a: &NdArray) -> Result<NdArray> {
    let largest = a.max(-1)?;
    let largest = largest.expand_dims(largest.rank())?;
    let exps = a.sub(&largest)?.exp();
    let sums = exps.sum(-1)?;
    let sums = sums.expand_dims(sums.rank())?;
    exps.div(&sums)
}

/// Expand integer labels into one-hot rows along a new trailing axis.
///
/// Fails with an invalid-id error on non-integer or out-of-range labels.
pub fn one_hot_encode(x: &NdArray, num_labels: usize) -> Result<NdArray> {
    x.apply_with_expansion(num_labels, |v| {
        if v.fract() != 0.0 || v < 0.0 || (v as usize) >= num_labels {
            return Err(Error::InvalidTokenId {
                value: v as f64,
                vocab: num_labels,
            });
        }
        let mut row = vec![0.0; num_labels];
        row[v as usize] = 1.0;
        Ok(row)
    })
}

/// Half sum of squared errors: `sum((p - t)^2) / 2`. The halving makes
/// the gradient exactly `p - t`.
pub struct SseLoss;

impl Loss for SseLoss {
    fn loss(&self, predicted: &NdArray, target: &NdArray) -> Result<f32> {
        if predicted.shape() != target.shape() {
            return Err(Error::ShapeMismatch {
                expected: predicted.shape().clone(),
                got: target.shape().clone(),
            });
        }
        let squared = predicted.sub(target)?.apply(|x| x * x / 2.0);
        Ok(squared.sum_all())
    }

    fn gradient(&self, predicted: &NdArray, target: &NdArray) -> Result<NdArray> {
        if predicted.rank() != target.rank() {
            return Err(Error::RankMismatch {
                expected: predicted.rank(),
                got: target.rank(),
            });
        }
        predicted.sub(target)
    }
}

/// Softmax cross-entropy against integer class labels.
///
/// `predicted` is logits with one more axis than `target`; the last axis
/// indexes classes. Probabilities are floored at 1e-30 before the log.
pub struct SoftmaxCrossEntropy;

impl Loss for SoftmaxCrossEntropy {
    fn loss(&self, predicted: &NdArray, target: &NdArray) -> Result<f32> {
        if predicted.rank() != target.rank() + 1 {
            return Err(Error::RankMismatch {
                expected: target.rank() + 1,
                got: predicted.rank(),
            });
        }
        let probas = softmax(predicted)?;
        let num_labels = probas.dims()[probas.rank() - 1];
        let target_one_hot = one_hot_encode(target, num_labels)?;

        let likelihoods = probas
            .add(&NdArray::scalar(1e-30))?
            .log()
            .mul(&target_one_hot)?;
        debug_assert_eq!(likelihoods.shape(), probas.shape());

        Ok(-likelihoods.sum_all())
    }

    fn gradient(&self, predicted: &NdArray, target: &NdArray) -> Result<NdArray> {
        let probas = softmax(predicted)?;
        let num_labels = probas.dims()[probas.rank() - 1];
        let target_one_hot = one_hot_encode(target, num_labels)?;
        probas.sub(&target_one_hot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loam_core::{array_equal, assert_array_close, nda};

    #[test]
    fn softmax_rows_sum_to_one() {
        let a = nda!([[1.0, 2.0, 3.0], [1.0, 1.0, 1.0]]);
        let s = softmax(&a).unwrap();
        assert_array_close(&s.sum(-1).unwrap(), &nda!([1.0, 1.0]));
        // Uniform logits give uniform probabilities.
        assert_array_close(&s.get(&[1]).unwrap(), &nda!([1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0]));
    }

    #[test]
    fn softmax_is_shift_invariant() {
        let a = nda!([[1.0, 2.0, 3.0]]);
        let shifted = a.add(&nda!(1000.0)).unwrap();
        let s1 = softmax(&a).unwrap();
        let s2 = softmax(&shifted).unwrap();
        assert_array_close(&s1, &s2);
        assert!(s2.to_vec().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn one_hot_rows() {
        let labels = nda!([0.0, 2.0]);
        let oh = one_hot_encode(&labels, 3).unwrap();
        assert!(array_equal(&oh, &nda!([[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]])));

        assert!(one_hot_encode(&nda!([3.0]), 3).is_err());
        assert!(one_hot_encode(&nda!([0.5]), 3).is_err());
    }

    #[test]
    fn sse_loss_and_gradient() {
        let p = nda!([1.0, 2.0, 3.0]);
        let t = nda!([1.0, 0.0, 3.0]);
        let loss = SseLoss.loss(&p, &t).unwrap();
        assert!((loss - 2.0).abs() < 1e-6);

        let g = SseLoss.gradient(&p, &t).unwrap();
        assert!(array_equal(&g, &nda!([0.0, 2.0, 0.0])));

        let bad = nda!([[1.0, 0.0, 3.0]]);
        assert!(SseLoss.loss(&p, &bad).is_err());
    }

    #[test]
    fn cross_entropy_prefers_the_right_class() {
        let confident = nda!([[10.0, 0.0, 0.0]]);
        let wrong = nda!([[0.0, 10.0, 0.0]]);
        let label = nda!([0.0]);
        let good = SoftmaxCrossEntropy.loss(&confident, &label).unwrap();
        let bad = SoftmaxCrossEntropy.loss(&wrong, &label).unwrap();
        assert!(good < bad);
        assert!(good >= 0.0);
    }

    #[test]
    fn cross_entropy_gradient_is_probas_minus_one_hot() {
        let logits = nda!([[0.0, 0.0]]);
        let label = nda!([1.0]);
        let g = SoftmaxCrossEntropy.gradient(&logits, &label).unwrap();
        assert_array_close(&g, &nda!([[0.5, -0.5]]));
    }
}
