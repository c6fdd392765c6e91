use crate::array::NdArray;
use crate::iter::nd_index;
use crate::shape::Shape;

impl NdArray {
    /// An array of zeros.
    pub fn zeros(shape: impl Into<Shape>) -> NdArray {
        let shape = shape.into();
        let n = shape.elem_count();
        NdArray::from_vec_unchecked(shape, vec![0.0; n])
    }

    /// An array of ones.
    pub fn ones(shape: impl Into<Shape>) -> NdArray {
        NdArray::full(shape, 1.0)
    }

    /// An array filled with `value`.
    pub fn full(shape: impl Into<Shape>, value: f32) -> NdArray {
        let shape = shape.into();
        let n = shape.elem_count();
        NdArray::from_vec_unchecked(shape, vec![value; n])
    }

    /// A rank-0 array holding a single value.
    pub fn scalar(value: f32) -> NdArray {
        NdArray::from_vec_unchecked(Shape::scalar(), vec![value])
    }

    /// A rank-1 array from a slice.
    pub fn from_slice(data: &[f32]) -> NdArray {
        NdArray::from_vec_unchecked(Shape::from(data.len()), data.to_vec())
    }

    /// Build an array by calling `f` for every index in row-major order.
    pub fn from_fn(shape: impl Into<Shape>, mut f: impl FnMut(&[usize]) -> f32) -> NdArray {
        let shape = shape.into();
        let mut data = Vec::with_capacity(shape.elem_count());
        for idx in nd_index(shape.dims()) {
            data.push(f(&idx));
        }
        NdArray::from_vec_unchecked(shape, data)
    }

    /// A rank-1 array of values from `start` (inclusive) to `end`
    /// (exclusive) in increments of `step`.
    pub fn arange(start: f32, end: f32, step: f32) -> NdArray {
        let mut data = Vec::new();
        let mut v = start;
        while v < end {
            data.push(v);
            v += step;
        }
        NdArray::from_slice(&data)
    }

    /// Stack arrays of identical shape along a fresh leading axis.
    ///
    /// This is the engine behind the [`nda!`](crate::nda) macro.
    ///
    /// # Panics
    /// Panics when `rows` is empty or the rows are not all the same shape
    /// (jagged nesting).
    pub fn stack_rows(rows: &[NdArray]) -> NdArray {
        assert!(!rows.is_empty(), "stack_rows requires at least one row");
        let parts: Vec<NdArray> = rows
            .iter()
            .map(|r| r.expand_dims(0).expect("expand_dims at axis 0"))
            .collect();
        crate::manip::concatenate(&parts, 0).expect("stack_rows requires rectangular rows")
    }
}

/// Construct an [`NdArray`] from a nested literal, inferring the shape from
/// the nesting.
///
/// ```
/// use loam_core::nda;
///
/// let scalar = nda!(3.0);
/// let vector = nda!([1.0, 2.0, 3.0]);
/// let matrix = nda!([[1.0, 2.0], [3.0, 4.0]]);
/// assert_eq!(matrix.dims(), &[2, 2]);
/// ```
///
/// # Panics
/// Panics on jagged nesting (rows of unequal length).
#[macro_export]
macro_rules! nda {
    ([$([$($inner:tt)*]),+ $(,)?]) => {{
        let rows = vec![$( $crate::nda!([$($inner)*]) ),+];
        $crate::NdArray::stack_rows(&rows)
    }};
    ([$($v:expr),* $(,)?]) => {
        $crate::NdArray::from_slice(&[$(($v) as f32),*])
    };
    ($v:expr) => {
        $crate::NdArray::scalar(($v) as f32)
    };
}

#[cfg(test)]
mod tests {
    use crate::array::NdArray;

    #[test]
    fn zeros_and_ones() {
        for dims in [vec![], vec![3], vec![2, 3], vec![2, 0, 4]] {
            let z = NdArray::zeros(dims.clone());
            assert_eq!(z.dims(), &dims[..]);
            assert!(z.to_vec().iter().all(|&x| x == 0.0));
            let o = NdArray::ones(dims.clone());
            assert_eq!(o.elem_count(), z.elem_count());
            assert!(o.to_vec().iter().all(|&x| x == 1.0));
        }
    }

    #[test]
    fn from_fn_row_major_order() {
        let a = NdArray::from_fn((2, 3), |idx| (idx[0] * 10 + idx[1]) as f32);
        assert_eq!(a.to_vec(), vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
    }

    #[test]
    fn from_fn_scalar() {
        let a = NdArray::from_fn((), |idx| {
            assert!(idx.is_empty());
            7.0
        });
        assert_eq!(a.item().unwrap(), 7.0);
    }

    #[test]
    fn arange_half_open() {
        assert_eq!(NdArray::arange(0.0, 5.0, 1.0).to_vec(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(NdArray::arange(1.0, 2.0, 0.5).to_vec(), vec![1.0, 1.5]);
        assert!(NdArray::arange(3.0, 3.0, 1.0).to_vec().is_empty());
    }

    #[test]
    fn nda_macro_infers_shape() {
        let s = nda!(4.0);
        assert_eq!(s.rank(), 0);
        assert_eq!(s.item().unwrap(), 4.0);

        let v = nda!([1.0, 2.0, 3.0]);
        assert_eq!(v.dims(), &[3]);

        let m = nda!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(m.dims(), &[2, 3]);
        assert_eq!(m.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let c = nda!([[[1.0], [2.0]], [[3.0], [4.0]]]);
        assert_eq!(c.dims(), &[2, 2, 1]);
    }

    #[test]
    #[should_panic(expected = "rectangular")]
    fn nda_macro_rejects_jagged() {
        let rows = vec![NdArray::from_slice(&[1.0, 2.0]), NdArray::from_slice(&[3.0])];
        NdArray::stack_rows(&rows);
    }
}
