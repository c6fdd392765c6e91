use crate::array::NdArray;
use crate::bail;
use crate::error::{Error, Result};
use crate::manip::concatenate;
use crate::shape::Shape;

// Generic elementwise and reduction combinators.
//
// Everything here walks flat buffers iteratively. Broadcasting and
// permutation are expressed through per-dimension strides (stride 0 repeats
// an element along an expanded axis) instead of the recursive descent a
// dynamically-typed implementation would use; ranks stay small, but the
// iterative walk keeps stack depth constant regardless.

/// Yields flat storage offsets for each element of a logical shape, walking
/// the shape in row-major order with explicit per-dimension strides.
///
/// For contiguous strides this counts 0, 1, 2, ...; with a 0 stride on some
/// axis it revisits the same offsets (broadcast); with permuted strides it
/// jumps around (transpose).
pub(crate) struct StridedIter {
    current: Vec<usize>,
    dims: Vec<usize>,
    strides: Vec<usize>,
    remaining: usize,
    started: bool,
}

impl StridedIter {
    pub(crate) fn new(dims: &[usize], strides: &[usize]) -> Self {
        StridedIter {
            current: vec![0; dims.len()],
            dims: dims.to_vec(),
            strides: strides.to_vec(),
            remaining: dims.iter().product(),
            started: false,
        }
    }

    fn flat_index(&self) -> usize {
        let mut idx = 0;
        for i in 0..self.current.len() {
            idx += self.current[i] * self.strides[i];
        }
        idx
    }

    /// Advance the multi-dimensional index by one (rightmost dim first).
    fn advance(&mut self) {
        for i in (0..self.dims.len()).rev() {
            self.current[i] += 1;
            if self.current[i] < self.dims[i] {
                return;
            }
            self.current[i] = 0;
        }
    }
}

impl Iterator for StridedIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        if self.started {
            self.advance();
        }
        self.started = true;
        self.remaining -= 1;
        Some(self.flat_index())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for StridedIter {}

impl NdArray {
    /// Apply `f` to every element, producing a fresh array of the same
    /// shape.
    pub fn apply(&self, mut f: impl FnMut(f32) -> f32) -> NdArray {
        let data = self.with_data(|d| d.iter().map(|&x| f(x)).collect());
        NdArray::from_vec_unchecked(self.shape().clone(), data)
    }

    /// Zip two same-shape arrays elementwise. No broadcasting; use
    /// [`NdArray::elementwise`] for that.
    pub fn combine(&self, other: &NdArray, f: impl Fn(f32, f32) -> f32) -> Result<NdArray> {
        if self.shape() != other.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.shape().clone(),
                got: other.shape().clone(),
            });
        }
        let data = NdArray::with_data2(self, other, |a, b| {
            a.iter().zip(b.iter()).map(|(&x, &y)| f(x, y)).collect()
        });
        Ok(NdArray::from_vec_unchecked(self.shape().clone(), data))
    }

    /// Combine two arrays elementwise under the broadcast rule, producing a
    /// freshly allocated array of the broadcast shape.
    pub fn elementwise(&self, other: &NdArray, f: impl Fn(f32, f32) -> f32) -> Result<NdArray> {
        let out_shape = Shape::broadcast_shape(self.shape(), other.shape())?;
        let a_strides = self.shape().broadcast_strides(&out_shape);
        let b_strides = other.shape().broadcast_strides(&out_shape);

        let mut out = Vec::with_capacity(out_shape.elem_count());
        NdArray::with_data2(self, other, |a, b| {
            let ai = StridedIter::new(out_shape.dims(), &a_strides);
            let bi = StridedIter::new(out_shape.dims(), &b_strides);
            for (ia, ib) in ai.zip(bi) {
                out.push(f(a[ia], b[ib]));
            }
        });
        Ok(NdArray::from_vec_unchecked(out_shape, out))
    }

    /// Collapse one axis with a fold.
    ///
    /// For every position outside `axis` the accumulator starts at
    /// `initial` and folds the values along `axis` in ascending order; this
    /// order is part of the contract (it pins floating-point accumulation
    /// for reproducibility). Negative axes wrap.
    pub fn reduce_axis(
        &self,
        axis: isize,
        f: impl Fn(f32, f32) -> f32,
        initial: f32,
    ) -> Result<NdArray> {
        let ax = self.shape().normalize_axis(axis)?;
        let dims = self.dims();
        let axis_len = dims[ax];
        let outer: usize = dims[..ax].iter().product();
        let inner: usize = dims[ax + 1..].iter().product();

        let mut out = vec![0f32; outer * inner];
        self.with_data(|data| {
            for o in 0..outer {
                let base = o * axis_len * inner;
                for i in 0..inner {
                    let mut acc = initial;
                    for j in 0..axis_len {
                        acc = f(acc, data[base + j * inner + i]);
                    }
                    out[o * inner + i] = acc;
                }
            }
        });

        let mut new_dims = dims[..ax].to_vec();
        new_dims.extend_from_slice(&dims[ax + 1..]);
        Ok(NdArray::from_vec_unchecked(Shape::new(new_dims), out))
    }

    /// Like [`NdArray::reduce_axis`], but the fold also sees the position
    /// along the axis and carries an auxiliary accumulator; the second
    /// element of the returned pair is the value written out.
    ///
    /// This is the primitive behind argmax/argmin, where the auxiliary
    /// tracks the winning (value, index) pair.
    pub fn reduce_axis2<A: Clone>(
        &self,
        axis: isize,
        f: impl Fn(A, usize, f32) -> (A, f32),
        initial: A,
    ) -> Result<NdArray> {
        let ax = self.shape().normalize_axis(axis)?;
        let dims = self.dims();
        let axis_len = dims[ax];
        let outer: usize = dims[..ax].iter().product();
        let inner: usize = dims[ax + 1..].iter().product();

        let mut out = vec![0f32; outer * inner];
        self.with_data(|data| {
            for o in 0..outer {
                let base = o * axis_len * inner;
                for i in 0..inner {
                    let mut acc = initial.clone();
                    let mut value = 0f32;
                    for j in 0..axis_len {
                        let (next, v) = f(acc, j, data[base + j * inner + i]);
                        acc = next;
                        value = v;
                    }
                    out[o * inner + i] = value;
                }
            }
        });

        let mut new_dims = dims[..ax].to_vec();
        new_dims.extend_from_slice(&dims[ax + 1..]);
        Ok(NdArray::from_vec_unchecked(Shape::new(new_dims), out))
    }

    /// Map every scalar to a `dim`-element vector, appending a trailing
    /// axis of size `dim` to the shape (one-hot encoding is the main user).
    pub fn apply_with_expansion(
        &self,
        dim: usize,
        f: impl Fn(f32) -> Result<Vec<f32>>,
    ) -> Result<NdArray> {
        let data = self.to_vec();
        let mut out = Vec::with_capacity(data.len() * dim);
        for x in data {
            let expanded = f(x)?;
            if expanded.len() != dim {
                bail!(
                    "apply_with_expansion: expected {} values per element, got {}",
                    dim,
                    expanded.len()
                );
            }
            out.extend_from_slice(&expanded);
        }
        let mut new_dims = self.dims().to_vec();
        new_dims.push(dim);
        Ok(NdArray::from_vec_unchecked(Shape::new(new_dims), out))
    }
}

/// Apply an array-to-array function to each element along axis 0 and stack
/// the results back along a fresh leading axis.
pub fn map_axis0(mut f: impl FnMut(&NdArray) -> Result<NdArray>, xs: &NdArray) -> Result<NdArray> {
    let n = xs.shape().dim(0)?;
    let mut parts = Vec::with_capacity(n);
    for i in 0..n {
        let y = f(&xs.get(&[i])?)?;
        parts.push(y.expand_dims(0)?);
    }
    concatenate(&parts, 0)
}
