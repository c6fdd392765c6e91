use crate::array::NdArray;
use crate::error::{Error, Result};
use crate::numerical;

// Named elementwise operations, axis reductions, and equality helpers.
//
// The binary operations broadcast; the axis reductions accept negative
// axes. Initial values follow the usual identities: 0 for sum, 1 for prod,
// -inf/+inf for max/min.

impl NdArray {
    /// Multiply every element by a constant.
    pub fn scale(&self, b: f32) -> NdArray {
        self.apply(|x| x * b)
    }

    /// Negate every element.
    pub fn neg(&self) -> NdArray {
        self.apply(|x| -x)
    }

    pub fn sin(&self) -> NdArray {
        self.apply(f32::sin)
    }

    pub fn cos(&self) -> NdArray {
        self.apply(f32::cos)
    }

    pub fn exp(&self) -> NdArray {
        self.apply(f32::exp)
    }

    /// Natural logarithm.
    pub fn log(&self) -> NdArray {
        self.apply(f32::ln)
    }

    /// 1 where the element is NaN, 0 elsewhere.
    pub fn isnan(&self) -> NdArray {
        self.apply(|x| if x.is_nan() { 1.0 } else { 0.0 })
    }

    pub fn add(&self, other: &NdArray) -> Result<NdArray> {
        self.elementwise(other, |x, y| x + y)
    }

    pub fn sub(&self, other: &NdArray) -> Result<NdArray> {
        self.elementwise(other, |x, y| x - y)
    }

    pub fn mul(&self, other: &NdArray) -> Result<NdArray> {
        self.elementwise(other, |x, y| x * y)
    }

    pub fn div(&self, other: &NdArray) -> Result<NdArray> {
        self.elementwise(other, |x, y| x / y)
    }

    pub fn power(&self, other: &NdArray) -> Result<NdArray> {
        self.elementwise(other, f32::powf)
    }

    /// 1 where elements are exactly equal, 0 elsewhere (broadcasting).
    pub fn equal(&self, other: &NdArray) -> Result<NdArray> {
        self.elementwise(other, |x, y| if x == y { 1.0 } else { 0.0 })
    }

    /// 1 where elements are approximately equal (see
    /// [`numerical::isclose`]), 0 elsewhere.
    pub fn isclose(&self, other: &NdArray) -> Result<NdArray> {
        self.elementwise(other, |x, y| {
            if numerical::isclose(x as f64, y as f64) {
                1.0
            } else {
                0.0
            }
        })
    }

    /// Sum of all elements, folded in buffer order.
    pub fn sum_all(&self) -> f32 {
        self.with_data(|d| d.iter().fold(0.0, |acc, &x| acc + x))
    }

    /// Mean of all elements.
    pub fn mean_all(&self) -> f32 {
        self.sum_all() / self.elem_count() as f32
    }

    /// Whether every element is nonzero.
    pub fn all(&self) -> bool {
        self.with_data(|d| d.iter().all(|&x| x != 0.0))
    }

    /// Whether any element is nonzero.
    pub fn any(&self) -> bool {
        self.with_data(|d| d.iter().any(|&x| x != 0.0))
    }

    pub fn max(&self, axis: isize) -> Result<NdArray> {
        self.reduce_axis(axis, f32::max, f32::NEG_INFINITY)
    }

    pub fn min(&self, axis: isize) -> Result<NdArray> {
        self.reduce_axis(axis, f32::min, f32::INFINITY)
    }

    pub fn sum(&self, axis: isize) -> Result<NdArray> {
        self.reduce_axis(axis, |acc, x| acc + x, 0.0)
    }

    /// Mean along an axis, accumulated as a running sum of `x / n`.
    pub fn mean(&self, axis: isize) -> Result<NdArray> {
        let ax = self.shape().normalize_axis(axis)?;
        let n = self.dims()[ax] as f32;
        self.reduce_axis(ax as isize, move |acc, x| acc + x / n, 0.0)
    }

    pub fn prod(&self, axis: isize) -> Result<NdArray> {
        self.reduce_axis(axis, |acc, x| acc * x, 1.0)
    }

    /// Index of the largest value along an axis. Ties keep the earliest
    /// index: only a strictly greater value displaces the current winner.
    pub fn argmax(&self, axis: isize) -> Result<NdArray> {
        self.reduce_axis2(
            axis,
            |acc: (f32, f32), idx, x| {
                if x > acc.1 {
                    ((idx as f32, x), idx as f32)
                } else {
                    (acc, acc.0)
                }
            },
            (-1.0, f32::NEG_INFINITY),
        )
    }

    /// Index of the smallest value along an axis; ties keep the earliest
    /// index.
    pub fn argmin(&self, axis: isize) -> Result<NdArray> {
        self.reduce_axis2(
            axis,
            |acc: (f32, f32), idx, x| {
                if x < acc.1 {
                    ((idx as f32, x), idx as f32)
                } else {
                    (acc, acc.0)
                }
            },
            (-1.0, f32::INFINITY),
        )
    }
}

/// "Valid"-mode 1D convolution (true convolution: the kernel is reversed).
///
/// Output length is `max(len) - min(len) + 1`. Convolution commutes, so
/// when the first argument is shorter the operands are swapped; the values
/// are identical either way.
pub fn convolve_valid(a: &NdArray, v: &NdArray) -> Result<NdArray> {
    if a.rank() != 1 {
        return Err(Error::RankMismatch {
            expected: 1,
            got: a.rank(),
        });
    }
    if v.rank() != 1 {
        return Err(Error::RankMismatch {
            expected: 1,
            got: v.rank(),
        });
    }

    let m = a.dims()[0];
    let n = v.dims()[0];
    if m < n {
        return convolve_valid(v, a);
    }

    let out_size = m - n + 1;
    let mut out = Vec::with_capacity(out_size);
    NdArray::with_data2(a, v, |ab, vb| {
        for i in 0..out_size {
            let mut s = 0.0;
            for j in 0..n {
                s += ab[i + j] * vb[n - j - 1];
            }
            out.push(s);
        }
    });
    NdArray::make(out_size, out)
}

/// Exact equality: same shape and bitwise-equal values.
pub fn array_equal(a: &NdArray, b: &NdArray) -> bool {
    a.shape() == b.shape() && a.to_vec() == b.to_vec()
}

/// Panic unless the two arrays are exactly equal.
///
/// # Panics
/// On shape or value mismatch, with both operands in the message.
pub fn assert_array_equal(actual: &NdArray, expected: &NdArray) {
    assert_eq!(
        actual.shape(),
        expected.shape(),
        "shapes are not equal: {} vs {}",
        actual.shape(),
        expected.shape()
    );
    assert_eq!(
        actual.to_vec(),
        expected.to_vec(),
        "array values are not equal"
    );
}

/// Panic unless the two arrays are elementwise close (rtol=1e-2,
/// atol=1e-2).
///
/// # Panics
/// On shape mismatch or any element pair outside tolerance.
pub fn assert_array_close(actual: &NdArray, expected: &NdArray) {
    assert_eq!(
        actual.shape(),
        expected.shape(),
        "shapes are not equal: {} vs {}",
        actual.shape(),
        expected.shape()
    );
    let close = actual
        .isclose(expected)
        .expect("same-shape arrays always broadcast");
    assert!(
        close.all(),
        "array values are not close: {:?} vs {:?}",
        actual.to_vec(),
        expected.to_vec()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nda;

    #[test]
    fn broadcast_add_against_full() {
        // add(a, [b]) == add(a, full(b)) reshaped.
        let a = nda!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let b = NdArray::from_slice(&[10.0]);
        let lhs = a.add(&b).unwrap();
        let rhs = a.add(&NdArray::full((2, 3), 10.0)).unwrap();
        assert!(array_equal(&lhs, &rhs));
    }

    #[test]
    fn reductions_over_axes() {
        let a = nda!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert!(array_equal(&a.sum(0).unwrap(), &nda!([5.0, 7.0, 9.0])));
        assert!(array_equal(&a.sum(-1).unwrap(), &nda!([6.0, 15.0])));
        assert!(array_equal(&a.max(1).unwrap(), &nda!([3.0, 6.0])));
        assert!(array_equal(&a.min(0).unwrap(), &nda!([1.0, 2.0, 3.0])));
        assert!(array_equal(&a.prod(1).unwrap(), &nda!([6.0, 120.0])));
        assert_array_close(&a.mean(1).unwrap(), &nda!([2.0, 5.0]));
        assert_eq!(a.sum_all(), 21.0);
        assert_eq!(a.mean_all(), 3.5);
    }

    #[test]
    fn argmax_tie_break_keeps_first() {
        let a = nda!([3.0, 5.0, 5.0, 2.0]);
        assert!(array_equal(&a.argmax(0).unwrap(), &nda!(1.0)));

        let b = nda!([3.0, 1.0, 1.0, 4.0]);
        assert!(array_equal(&b.argmin(0).unwrap(), &nda!(1.0)));
    }

    #[test]
    fn argmax_along_last_axis() {
        let a = nda!([[1.0, 9.0, 2.0], [6.0, 0.0, 3.0]]);
        assert!(array_equal(&a.argmax(-1).unwrap(), &nda!([1.0, 0.0])));
    }

    #[test]
    fn convolve_examples() {
        let a = nda!([1.0, 2.0, 3.0, 4.0, 5.0]);
        let k = nda!([1.0, 1.0, 1.0]);
        assert!(array_equal(
            &convolve_valid(&a, &k).unwrap(),
            &nda!([6.0, 9.0, 12.0])
        ));

        let a = nda!([1.0, 2.0, 3.0]);
        let k = nda!([0.0, 1.0, 0.5]);
        assert!(array_equal(&convolve_valid(&a, &k).unwrap(), &nda!([2.5])));
    }

    #[test]
    fn convolve_swaps_shorter_first_operand() {
        let a = nda!([1.0, 1.0, 1.0]);
        let v = nda!([1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(array_equal(
            &convolve_valid(&a, &v).unwrap(),
            &nda!([6.0, 9.0, 12.0])
        ));
    }

    #[test]
    fn equal_and_isclose() {
        let a = nda!([1.0, 2.0, 3.0]);
        let b = nda!([1.0, 0.0, 3.0]);
        assert!(array_equal(&a.equal(&b).unwrap(), &nda!([1.0, 0.0, 1.0])));
        let c = nda!([1.001, 2.001, 3.5]);
        assert!(array_equal(&a.isclose(&c).unwrap(), &nda!([1.0, 1.0, 0.0])));
    }

    #[test]
    fn any_all() {
        assert!(nda!([1.0, 2.0]).all());
        assert!(!nda!([1.0, 0.0]).all());
        assert!(nda!([0.0, 2.0]).any());
        assert!(!nda!([0.0, 0.0]).any());
    }
}
