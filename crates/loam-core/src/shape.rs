use std::fmt;

use crate::error::{Error, Result};
use crate::numerical::modulo;

// Shape - the size of each dimension of an array.
//
//   Scalar: Shape([])        - 0 dimensions, 1 element
//   Vector: Shape([5])       - 1 dimension, 5 elements
//   Matrix: Shape([3, 4])    - 2 dimensions, 12 elements
//
// The shape determines the element count (product of dims, 1 for rank 0),
// the row-major strides, and broadcast compatibility.

/// N-dimensional shape of an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// A rank-0 (scalar) shape.
    pub fn scalar() -> Self {
        Shape(Vec::new())
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions (0 for scalar, 1 for vector, ...).
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements. The empty product makes a scalar shape
    /// hold exactly 1 element.
    pub fn elem_count(&self) -> usize {
        self.0.iter().product()
    }

    /// Size of a specific dimension.
    pub fn dim(&self, d: usize) -> Result<usize> {
        self.0.get(d).copied().ok_or(Error::AxisOutOfRange {
            axis: d as isize,
            rank: self.rank(),
        })
    }

    /// Row-major (C-order) strides for this shape.
    ///
    /// For shape [2, 3, 4] the strides are [12, 4, 1]: one step along dim 0
    /// jumps 12 elements, along dim 2 a single element.
    pub fn stride_contiguous(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.rank()];
        if self.rank() > 0 {
            strides[self.rank() - 1] = 1;
            for i in (0..self.rank() - 1).rev() {
                strides[i] = strides[i + 1] * self.0[i + 1];
            }
        }
        strides
    }

    /// Resolve a possibly-negative axis index to `[0, rank)`.
    ///
    /// Accepts `[-rank, rank)` and wraps negative values modulo the rank, so
    /// `-1` is the last axis.
    pub fn normalize_axis(&self, axis: isize) -> Result<usize> {
        let rank = self.rank();
        if rank == 0 || axis < -(rank as isize) || axis >= rank as isize {
            return Err(Error::AxisOutOfRange { axis, rank });
        }
        Ok(modulo(axis, rank))
    }

    /// Compute the broadcast output shape from two input shapes.
    ///
    /// NumPy-style rules: align from the trailing axis, treat missing
    /// leading dimensions as 1, and require each pair of dimensions to be
    /// equal or contain a 1.
    ///
    ///   [3, 4] and [4]       -> [3, 4]
    ///   [2, 1] and [1, 3]    -> [2, 3]
    ///   [3] and [4]          -> error
    pub fn broadcast_shape(lhs: &Shape, rhs: &Shape) -> Result<Shape> {
        let l = lhs.dims();
        let r = rhs.dims();
        let max_rank = l.len().max(r.len());
        let mut result = Vec::with_capacity(max_rank);

        for i in 0..max_rank {
            // Index from the right; past the shorter shape's rank, treat as 1.
            let ld = if i < l.len() { l[l.len() - 1 - i] } else { 1 };
            let rd = if i < r.len() { r[r.len() - 1 - i] } else { 1 };

            if ld == rd {
                result.push(ld);
            } else if ld == 1 {
                result.push(rd);
            } else if rd == 1 {
                result.push(ld);
            } else {
                return Err(Error::BroadcastIncompatible {
                    lhs: lhs.clone(),
                    rhs: rhs.clone(),
                    axis: i,
                });
            }
        }

        result.reverse();
        Ok(Shape::new(result))
    }

    /// Strides for reading this shape's data as if it had `target` shape.
    ///
    /// Axes where this shape has size 1 but the target is larger get stride
    /// 0 (the single element repeats), as do missing leading axes. The
    /// caller must have checked broadcast compatibility already.
    pub fn broadcast_strides(&self, target: &Shape) -> Vec<usize> {
        let self_dims = self.dims();
        let target_dims = target.dims();
        let self_strides = self.stride_contiguous();

        let mut result = vec![0usize; target_dims.len()];
        let offset = target_dims.len() - self_dims.len();

        for i in 0..self_dims.len() {
            if self_dims[i] == target_dims[i + offset] {
                result[i + offset] = self_strides[i];
            } else {
                // self_dims[i] is 1 here: stride 0 repeats the element.
                result[i + offset] = 0;
            }
        }
        result
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl From<()> for Shape {
    fn from(_: ()) -> Self {
        Shape(vec![])
    }
}

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}
