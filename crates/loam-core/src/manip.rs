use crate::array::NdArray;
use crate::bail;
use crate::error::{Error, Result};
use crate::op::StridedIter;
use crate::shape::Shape;

// Shape manipulation.
//
// View-producing operations (`slice`, plus `reshape`/`expand_dims`/
// `squeeze`, which are pure metadata changes) alias the source storage.
// `transpose`, `concatenate`, `repeat`, `flip1d`, and `pad1d` allocate
// fresh buffers.

impl NdArray {
    /// Insert a size-1 axis at `axis` (which may equal the rank, appending
    /// at the end). A pure reshape: the result aliases this array.
    pub fn expand_dims(&self, axis: usize) -> Result<NdArray> {
        if axis > self.rank() {
            return Err(Error::AxisOutOfRange {
                axis: axis as isize,
                rank: self.rank(),
            });
        }
        let mut dims = self.dims().to_vec();
        dims.insert(axis, 1);
        self.reshape(dims)
    }

    /// Remove a size-1 axis. Fails when the axis does not have size 1.
    pub fn squeeze(&self, axis: usize) -> Result<NdArray> {
        let size = self.shape().dim(axis)?;
        if size != 1 {
            bail!("cannot squeeze axis {} of size {}", axis, size);
        }
        let mut dims = self.dims().to_vec();
        dims.remove(axis);
        self.reshape(dims)
    }

    /// The view of this array with the leading axis restricted to
    /// `[start, end)`. Shares storage with this array.
    pub fn slice(&self, start: usize, end: usize) -> Result<NdArray> {
        if self.rank() < 1 {
            return Err(Error::RankMismatch {
                expected: 1,
                got: 0,
            });
        }
        let first_dim = self.dims()[0];
        if start > end || end > first_dim {
            return Err(Error::SliceOutOfBounds {
                start,
                end,
                dim_size: first_dim,
            });
        }

        let rest = &self.dims()[1..];
        let stride: usize = rest.iter().product();
        let mut dims = vec![end - start];
        dims.extend_from_slice(rest);
        Ok(self.subview(start * stride, Shape::new(dims)))
    }

    /// Permute all axes, producing a copy.
    ///
    /// `axes` must be a permutation of `0..rank`; the result's dimension
    /// `i` is the source's dimension `axes[i]`.
    pub fn transpose(&self, axes: &[usize]) -> Result<NdArray> {
        let rank = self.rank();
        if axes.len() != rank {
            return Err(Error::RankMismatch {
                expected: rank,
                got: axes.len(),
            });
        }
        let mut seen = vec![false; rank];
        for &ax in axes {
            if ax >= rank || seen[ax] {
                bail!("transpose axes {:?} are not a permutation of 0..{}", axes, rank);
            }
            seen[ax] = true;
        }

        let in_strides = self.shape().stride_contiguous();
        let mut new_dims = Vec::with_capacity(rank);
        let mut out_strides = Vec::with_capacity(rank);
        for &ax in axes {
            new_dims.push(self.dims()[ax]);
            out_strides.push(in_strides[ax]);
        }

        // Walk the output row-major, reading the source through the
        // permuted strides.
        let mut out = Vec::with_capacity(self.elem_count());
        self.with_data(|data| {
            for off in StridedIter::new(&new_dims, &out_strides) {
                out.push(data[off]);
            }
        });
        Ok(NdArray::from_vec_unchecked(Shape::new(new_dims), out))
    }

    /// Transpose two axes, leaving the rest in place.
    pub fn swapaxes(&self, axis1: usize, axis2: usize) -> Result<NdArray> {
        let rank = self.rank();
        if axis1 >= rank || axis2 >= rank {
            return Err(Error::AxisOutOfRange {
                axis: axis1.max(axis2) as isize,
                rank,
            });
        }
        let mut axes: Vec<usize> = (0..rank).collect();
        axes.swap(axis1, axis2);
        self.transpose(&axes)
    }

    /// Reverse a rank-1 array into a new buffer.
    pub fn flip1d(&self) -> Result<NdArray> {
        if self.rank() != 1 {
            return Err(Error::RankMismatch {
                expected: 1,
                got: self.rank(),
            });
        }
        let mut data = self.to_vec();
        data.reverse();
        Ok(NdArray::from_vec_unchecked(self.shape().clone(), data))
    }

    /// Zero-pad a rank-1 array with `num` zeros on each side.
    pub fn pad1d(&self, num: usize) -> Result<NdArray> {
        if self.rank() != 1 {
            return Err(Error::RankMismatch {
                expected: 1,
                got: self.rank(),
            });
        }
        let padding = NdArray::zeros(num);
        concatenate(&[padding.clone(), self.clone(), padding], 0)
    }

    /// Tile the whole array `repeats` times along axis 0 into a new buffer.
    pub fn repeat(&self, repeats: usize) -> Result<NdArray> {
        if self.rank() < 1 {
            return Err(Error::RankMismatch {
                expected: 1,
                got: 0,
            });
        }
        let sz = self.elem_count();
        let mut out = Vec::with_capacity(sz * repeats);
        self.with_data(|data| {
            for _ in 0..repeats {
                out.extend_from_slice(data);
            }
        });
        let mut dims = self.dims().to_vec();
        dims[0] *= repeats;
        Ok(NdArray::from_vec_unchecked(Shape::new(dims), out))
    }
}

/// Join arrays along an existing axis, preserving input order.
///
/// Every input must share every dimension except `axis`. The result is a
/// fresh buffer assembled by segment-wise copy.
pub fn concatenate(list: &[NdArray], axis: usize) -> Result<NdArray> {
    if list.is_empty() {
        bail!("concatenate requires at least one array");
    }

    let mut dims_at_axis = Vec::with_capacity(list.len());
    let mut rest_first: Option<Vec<usize>> = None;
    for a in list {
        if axis >= a.rank() {
            return Err(Error::AxisOutOfRange {
                axis: axis as isize,
                rank: a.rank(),
            });
        }
        let shp = a.dims();
        let mut rest = shp[..axis].to_vec();
        rest.extend_from_slice(&shp[axis + 1..]);
        match &rest_first {
            None => rest_first = Some(rest),
            Some(expected) => {
                if *expected != rest {
                    return Err(Error::ShapeMismatch {
                        expected: Shape::new(expected.clone()),
                        got: Shape::new(rest),
                    });
                }
            }
        }
        dims_at_axis.push(shp[axis]);
    }

    let first = &list[0];
    let dims_before = &first.dims()[..axis];
    let dims_after = &first.dims()[axis + 1..];
    let size_before: usize = dims_before.iter().product();
    let stride_after: usize = dims_after.iter().product();
    let result_dim: usize = dims_at_axis.iter().sum();
    let stride_before = result_dim * stride_after;

    let mut out = vec![0f32; size_before * stride_before];
    for i in 0..size_before {
        let mut cur = i * stride_before;
        for (j, a) in list.iter().enumerate() {
            let block = dims_at_axis[j] * stride_after;
            a.with_data(|data| {
                out[cur..cur + block].copy_from_slice(&data[i * block..(i + 1) * block]);
            });
            cur += block;
        }
    }

    let mut new_dims = dims_before.to_vec();
    new_dims.push(result_dim);
    new_dims.extend_from_slice(dims_after);
    Ok(NdArray::from_vec_unchecked(Shape::new(new_dims), out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arr2() -> NdArray {
        NdArray::make((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap()
    }

    #[test]
    fn expand_and_squeeze() {
        let a = arr2();
        let b = a.expand_dims(a.rank()).unwrap();
        assert_eq!(b.dims(), &[2, 3, 1]);
        let c = b.squeeze(b.rank() - 1).unwrap();
        assert_eq!(c.dims(), &[2, 3]);
        assert!(a.squeeze(0).is_err());
    }

    #[test]
    fn slice_is_a_view() {
        let a = NdArray::make((3, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]).unwrap();
        let s = a.slice(1, 3).unwrap();
        assert_eq!(s.dims(), &[2, 3]);
        assert_eq!(s.to_vec(), vec![4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);

        // Writing through the slice is visible in the parent.
        s.set(&[0, 0], &NdArray::scalar(0.0)).unwrap();
        assert_eq!(a.get(&[1, 0]).unwrap().item().unwrap(), 0.0);

        assert!(a.slice(2, 4).is_err());
        assert!(a.slice(2, 1).is_err());
    }

    #[test]
    fn transpose_permutes() {
        let a = arr2();
        let t = a.transpose(&[1, 0]).unwrap();
        assert_eq!(t.dims(), &[3, 2]);
        assert_eq!(t.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        let id = a.transpose(&[0, 1]).unwrap();
        assert_eq!(id.to_vec(), a.to_vec());

        assert!(a.transpose(&[0, 0]).is_err());
        assert!(a.transpose(&[0]).is_err());
    }

    #[test]
    fn transpose_inverse_roundtrip() {
        let a = NdArray::from_fn((2, 3, 4), |idx| (idx[0] * 100 + idx[1] * 10 + idx[2]) as f32);
        let axes = [2, 0, 1];
        // Inverse permutation: inverse[axes[i]] = i.
        let mut inverse = [0usize; 3];
        for (i, &ax) in axes.iter().enumerate() {
            inverse[ax] = i;
        }
        let back = a.transpose(&axes).unwrap().transpose(&inverse).unwrap();
        assert_eq!(back.dims(), a.dims());
        assert_eq!(back.to_vec(), a.to_vec());
    }

    #[test]
    fn swapaxes_3d() {
        let a = NdArray::make(
            (2, 2, 3),
            vec![1.0, 2.0, 7.0, 4.0, 9.0, 6.0, 0.0, 1.0, 2.0, 1.0, 2.0, 3.0],
        )
        .unwrap();
        let s = a.swapaxes(0, 1).unwrap();
        assert_eq!(s.dims(), &[2, 2, 3]);
        assert_eq!(
            s.to_vec(),
            vec![1.0, 2.0, 7.0, 0.0, 1.0, 2.0, 4.0, 9.0, 6.0, 1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn concatenate_axis0_and_slice_back() {
        let a = NdArray::make((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = NdArray::make((1, 2), vec![5.0, 6.0]).unwrap();
        let c = concatenate(&[a.clone(), b.clone()], 0).unwrap();
        assert_eq!(c.dims(), &[3, 2]);
        assert_eq!(c.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        assert_eq!(c.slice(0, 2).unwrap().to_vec(), a.to_vec());
        assert_eq!(c.slice(2, 3).unwrap().to_vec(), b.to_vec());
    }

    #[test]
    fn concatenate_axis1() {
        let a = NdArray::make((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = NdArray::make((2, 1), vec![5.0, 6.0]).unwrap();
        let c = concatenate(&[a, b], 1).unwrap();
        assert_eq!(c.dims(), &[2, 3]);
        assert_eq!(c.to_vec(), vec![1.0, 2.0, 5.0, 3.0, 4.0, 6.0]);
    }

    #[test]
    fn concatenate_rejects_mismatched_rest() {
        let a = NdArray::make((2, 2), vec![0.0; 4]).unwrap();
        let b = NdArray::make((2, 3), vec![0.0; 6]).unwrap();
        assert!(concatenate(&[a, b], 0).is_err());
    }

    #[test]
    fn pad_and_flip() {
        let a = NdArray::from_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(
            a.pad1d(2).unwrap().to_vec(),
            vec![0.0, 0.0, 1.0, 2.0, 3.0, 0.0, 0.0]
        );
        assert_eq!(a.flip1d().unwrap().to_vec(), vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn repeat_tiles_axis0() {
        let a = NdArray::make((1, 2), vec![1.0, 2.0]).unwrap();
        let r = a.repeat(3).unwrap();
        assert_eq!(r.dims(), &[3, 2]);
        assert_eq!(r.to_vec(), vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
    }
}
