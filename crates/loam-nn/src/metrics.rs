use loam_core::{Error, NdArray, Result};

// Evaluation metrics. Unlike the losses these carry no gradients.

/// Fraction of positions where prediction and target match exactly.
pub fn accuracy(y_pred: &NdArray, y_target: &NdArray) -> Result<f32> {
    Ok(y_pred.equal(y_target)?.sum_all() / y_pred.elem_count() as f32)
}

/// Accuracy of argmax-decoded logits against integer labels.
pub fn multiclass_accuracy(logits: &NdArray, labels: &NdArray) -> Result<f32> {
    if logits.rank() != labels.rank() + 1 {
        return Err(Error::RankMismatch {
            expected: labels.rank() + 1,
            got: logits.rank(),
        });
    }
    let preds = logits.argmax(-1)?;
    accuracy(&preds, labels)
}

/// Sum of squared errors (no halving, unlike the SSE loss).
pub fn sse(predicted: &NdArray, target: &NdArray) -> Result<f32> {
    if predicted.shape() != target.shape() {
        return Err(Error::ShapeMismatch {
            expected: predicted.shape().clone(),
            got: target.shape().clone(),
        });
    }
    Ok(predicted.sub(target)?.apply(|e| e * e).sum_all())
}

/// Mean squared error.
pub fn mse(predicted: &NdArray, target: &NdArray) -> Result<f32> {
    Ok(sse(predicted, target)? / predicted.elem_count() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loam_core::nda;

    #[test]
    fn accuracy_counts_matches() {
        let p = nda!([1.0, 0.0, 2.0, 2.0]);
        let t = nda!([1.0, 1.0, 2.0, 0.0]);
        assert_eq!(accuracy(&p, &t).unwrap(), 0.5);
    }

    #[test]
    fn multiclass_accuracy_decodes_logits() {
        let logits = nda!([[0.1, 0.9], [0.8, 0.2], [0.3, 0.7]]);
        let labels = nda!([1.0, 0.0, 0.0]);
        let acc = multiclass_accuracy(&logits, &labels).unwrap();
        assert!((acc - 2.0 / 3.0).abs() < 1e-6);

        assert!(multiclass_accuracy(&labels, &labels).is_err());
    }

    #[test]
    fn sse_and_mse() {
        let p = nda!([1.0, 2.0]);
        let t = nda!([0.0, 0.0]);
        assert_eq!(sse(&p, &t).unwrap(), 5.0);
        assert_eq!(mse(&p, &t).unwrap(), 2.5);
    }
}
