use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::op::StridedIter;
use crate::shape::Shape;

// NdArray - a dense, row-major, n-dimensional array of f32.
//
// MEMORY MODEL:
//
//   The flat buffer lives behind Arc<RwLock<Vec<f32>>>, so cloning an
//   NdArray is a cheap handle copy and several handles may share one
//   buffer. A handle addresses the contiguous region
//   [offset, offset + elem_count) of that buffer.
//
//   Views come from `get` (prefix indexing), `slice` (leading axis), and
//   `reshape` (metadata-only): they alias the parent's storage, and writes
//   through them are visible to every other handle. Operations that cannot
//   be expressed as a contiguous region (transpose, broadcast results)
//   allocate fresh buffers instead.
//
// LOCK DISCIPLINE:
//
//   The engine is single-threaded; the locks only guard aliasing, never
//   contention. No operation acquires two guards on one storage: binary
//   reads go through `with_data2`, which collapses aliased operands to a
//   single guard, and `set` stages its source into a scratch buffer before
//   taking the write guard.

/// A dense n-dimensional f32 array.
///
/// Handles are cheap to clone and may share storage; see the module notes
/// on views. All shape-changing operations return new handles.
pub struct NdArray {
    shape: Shape,
    storage: Arc<RwLock<Vec<f32>>>,
    offset: usize,
}

// Manual Clone: this copies the handle, not the buffer. Use `copy` for a
// fresh buffer.
impl Clone for NdArray {
    fn clone(&self) -> Self {
        NdArray {
            shape: self.shape.clone(),
            storage: Arc::clone(&self.storage),
            offset: self.offset,
        }
    }
}

impl std::fmt::Debug for NdArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NdArray(shape={}, data={:?})", self.shape, self.to_vec())
    }
}

impl NdArray {
    /// Create an array from a shape and a flat row-major buffer.
    ///
    /// Fails when the buffer length does not equal the shape's element
    /// count (a rank-0 shape requires exactly 1 element).
    pub fn make(shape: impl Into<Shape>, data: Vec<f32>) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: data.len(),
                shape,
            });
        }
        Ok(NdArray {
            shape,
            storage: Arc::new(RwLock::new(data)),
            offset: 0,
        })
    }

    /// Wrap a buffer whose length is already known to match the shape.
    pub(crate) fn from_vec_unchecked(shape: Shape, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), shape.elem_count());
        NdArray {
            shape,
            storage: Arc::new(RwLock::new(data)),
            offset: 0,
        }
    }

    /// A view at `extra` elements past this handle's offset.
    pub(crate) fn subview(&self, extra: usize, shape: Shape) -> Self {
        NdArray {
            shape,
            storage: Arc::clone(&self.storage),
            offset: self.offset + extra,
        }
    }

    /// The shape of this array.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The dimensions as a slice.
    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    /// Number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Total number of elements (1 for a scalar).
    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    /// Run `f` over this array's data region (read access).
    pub(crate) fn with_data<R>(&self, f: impl FnOnce(&[f32]) -> R) -> R {
        let guard = self.storage.read().expect("storage lock poisoned");
        f(&guard[self.offset..self.offset + self.shape.elem_count()])
    }

    /// Run `f` over this array's data region (write access).
    pub(crate) fn with_data_mut<R>(&self, f: impl FnOnce(&mut [f32]) -> R) -> R {
        let n = self.shape.elem_count();
        let mut guard = self.storage.write().expect("storage lock poisoned");
        f(&mut guard[self.offset..self.offset + n])
    }

    /// Run `f` over the data regions of two arrays, taking a single guard
    /// when both handles share one storage.
    pub(crate) fn with_data2<R>(a: &NdArray, b: &NdArray, f: impl FnOnce(&[f32], &[f32]) -> R) -> R {
        if Arc::ptr_eq(&a.storage, &b.storage) {
            let guard = a.storage.read().expect("storage lock poisoned");
            f(
                &guard[a.offset..a.offset + a.elem_count()],
                &guard[b.offset..b.offset + b.elem_count()],
            )
        } else {
            let ga = a.storage.read().expect("storage lock poisoned");
            let gb = b.storage.read().expect("storage lock poisoned");
            f(
                &ga[a.offset..a.offset + a.elem_count()],
                &gb[b.offset..b.offset + b.elem_count()],
            )
        }
    }

    /// Copy this array's data out as a flat row-major vector.
    pub fn to_vec(&self) -> Vec<f32> {
        self.with_data(|d| d.to_vec())
    }

    /// The single value of a rank-0 array.
    pub fn item(&self) -> Result<f32> {
        if self.rank() != 0 {
            return Err(Error::NotAScalar {
                shape: self.shape.clone(),
            });
        }
        Ok(self.with_data(|d| d[0]))
    }

    /// Index by a prefix of the shape, returning a view that shares this
    /// array's storage.
    ///
    /// `idx` may have any length from 0 (the whole array) up to the rank (a
    /// rank-0 view of one element); the result's rank is
    /// `rank - idx.len()`.
    pub fn get(&self, idx: &[usize]) -> Result<NdArray> {
        let dims = self.dims();
        if idx.len() > dims.len() {
            return Err(Error::RankMismatch {
                expected: idx.len(),
                got: dims.len(),
            });
        }

        let mut offset = self.offset;
        for (k, &i) in idx.iter().enumerate() {
            if i >= dims[k] {
                return Err(Error::IndexOutOfRange {
                    index: i,
                    dim_size: dims[k],
                });
            }
            let stride: usize = dims[k + 1..].iter().product();
            offset += i * stride;
        }

        Ok(NdArray {
            shape: Shape::from(&dims[idx.len()..]),
            storage: Arc::clone(&self.storage),
            offset,
        })
    }

    /// Write `value` into the sub-view addressed by `idx`.
    ///
    /// When the shapes differ, the value is broadcast-copied into the view
    /// (trailing-axis alignment, size-1 axes expanding); an incompatible
    /// shape fails with a broadcast error. Writes go through shared
    /// storage, so every aliasing handle observes them.
    pub fn set(&self, idx: &[usize], value: &NdArray) -> Result<()> {
        let dst = self.get(idx)?;
        let staged = if dst.shape == *value.shape() {
            value.to_vec()
        } else {
            stage_broadcast(value, &dst.shape)?
        };
        dst.with_data_mut(|d| d.copy_from_slice(&staged));
        Ok(())
    }

    /// A handle with new shape metadata over the same storage.
    ///
    /// Fails when the element counts differ. The result aliases this
    /// array; copy first if independence is needed.
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<NdArray> {
        let shape = shape.into();
        if shape.elem_count() != self.elem_count() {
            return Err(Error::ReshapeElementMismatch {
                src: self.elem_count(),
                dst: shape.elem_count(),
                dst_shape: shape,
            });
        }
        Ok(NdArray {
            shape,
            storage: Arc::clone(&self.storage),
            offset: self.offset,
        })
    }

    /// A deep copy with a fresh buffer (never aliases self).
    pub fn copy(&self) -> NdArray {
        NdArray {
            shape: self.shape.clone(),
            storage: Arc::new(RwLock::new(self.to_vec())),
            offset: 0,
        }
    }
}

/// Read `src` in the row-major order of `dst_shape`, expanding broadcast
/// axes, into a scratch vector.
fn stage_broadcast(src: &NdArray, dst_shape: &Shape) -> Result<Vec<f32>> {
    let dst_dims = dst_shape.dims();
    if src.rank() > dst_shape.rank() {
        return Err(Error::BroadcastIncompatible {
            lhs: dst_shape.clone(),
            rhs: src.shape().clone(),
            axis: 0,
        });
    }

    // Left-pad the source shape with 1s, then require each axis to match
    // the destination or be 1 (the destination never expands).
    let pad = dst_shape.rank() - src.rank();
    let mut padded = vec![1usize; pad];
    padded.extend_from_slice(src.dims());
    for i in 0..dst_dims.len() {
        if padded[i] != dst_dims[i] && padded[i] != 1 {
            return Err(Error::BroadcastIncompatible {
                lhs: dst_shape.clone(),
                rhs: src.shape().clone(),
                axis: dst_dims.len() - 1 - i,
            });
        }
    }

    let padded_shape = Shape::new(padded);
    let strides = padded_shape.broadcast_strides(dst_shape);
    let mut out = Vec::with_capacity(dst_shape.elem_count());
    src.with_data(|data| {
        for off in StridedIter::new(dst_dims, &strides) {
            out.push(data[off]);
        }
    });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_checks_element_count() {
        assert!(NdArray::make((2, 3), vec![0.0; 6]).is_ok());
        assert!(NdArray::make((2, 3), vec![0.0; 5]).is_err());
        assert!(NdArray::make((), vec![1.0]).is_ok());
    }

    #[test]
    fn get_returns_prefix_views() {
        let a = NdArray::make((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let row = a.get(&[1]).unwrap();
        assert_eq!(row.dims(), &[3]);
        assert_eq!(row.to_vec(), vec![4.0, 5.0, 6.0]);

        let elem = a.get(&[0, 2]).unwrap();
        assert_eq!(elem.rank(), 0);
        assert_eq!(elem.item().unwrap(), 3.0);

        let whole = a.get(&[]).unwrap();
        assert_eq!(whole.dims(), &[2, 3]);
    }

    #[test]
    fn views_share_storage() {
        let a = NdArray::make((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let row = a.get(&[0]).unwrap();
        row.set(&[], &NdArray::make(2usize, vec![9.0, 8.0]).unwrap())
            .unwrap();
        assert_eq!(a.to_vec(), vec![9.0, 8.0, 3.0, 4.0]);
    }

    #[test]
    fn set_broadcasts_scalar() {
        let a = NdArray::make((2, 2), vec![0.0; 4]).unwrap();
        a.set(&[], &NdArray::make((), vec![7.0]).unwrap()).unwrap();
        assert_eq!(a.to_vec(), vec![7.0; 4]);
    }

    #[test]
    fn set_broadcasts_row() {
        let a = NdArray::make((2, 3), vec![0.0; 6]).unwrap();
        let row = NdArray::make((1, 3), vec![1.0, 2.0, 3.0]).unwrap();
        a.set(&[], &row).unwrap();
        assert_eq!(a.to_vec(), vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn set_rejects_incompatible_shapes() {
        let a = NdArray::make((2, 3), vec![0.0; 6]).unwrap();
        let bad = NdArray::make(2usize, vec![1.0, 2.0]).unwrap();
        assert!(matches!(
            a.set(&[], &bad),
            Err(Error::BroadcastIncompatible { .. })
        ));
    }

    #[test]
    fn set_with_aliasing_operands() {
        // src is a view into the same storage as dst.
        let a = NdArray::make((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let first = a.get(&[0]).unwrap();
        a.set(&[1], &first).unwrap();
        assert_eq!(a.to_vec(), vec![1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn reshape_aliases_and_checks_count() {
        let a = NdArray::make((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = a.reshape((3, 2)).unwrap();
        assert_eq!(b.dims(), &[3, 2]);
        // Writing through the reshaped handle is visible in the source.
        b.set(&[0, 0], &NdArray::make((), vec![9.0]).unwrap())
            .unwrap();
        assert_eq!(a.get(&[0, 0]).unwrap().item().unwrap(), 9.0);

        assert!(a.reshape((4, 2)).is_err());
    }

    #[test]
    fn reshape_roundtrip_preserves_data() {
        let a = NdArray::make((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = a.reshape(6usize).unwrap().reshape((2, 3)).unwrap();
        assert_eq!(b.dims(), a.dims());
        assert_eq!(b.to_vec(), a.to_vec());
    }

    #[test]
    fn copy_is_independent() {
        let a = NdArray::make(2usize, vec![1.0, 2.0]).unwrap();
        let b = a.copy();
        b.set(&[0], &NdArray::make((), vec![9.0]).unwrap()).unwrap();
        assert_eq!(a.to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn item_requires_rank_zero() {
        let a = NdArray::make(1usize, vec![5.0]).unwrap();
        assert!(matches!(a.item(), Err(Error::NotAScalar { .. })));
        assert_eq!(a.get(&[0]).unwrap().item().unwrap(), 5.0);
    }
}
