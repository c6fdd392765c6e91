//! # loam-core
//!
//! The dense n-dimensional array engine and shared numeric utilities for
//! loam.
//!
//! This crate provides:
//! - [`NdArray`] - a row-major f32 array with shared-buffer views
//! - [`Shape`] - dimensions, strides, and broadcast rules
//! - construction ([`NdArray::zeros`], [`NdArray::from_fn`], the [`nda!`]
//!   macro), shape manipulation (reshape/transpose/slice/concatenate/...),
//!   broadcast elementwise operations, axis reductions, and [`matmul`]
//! - [`Error`]/[`Result`] - the single error type shared by every loam
//!   crate
//! - [`numerical`] - scalar helpers (isclose, erf, normal sampling)
//!
//! Everything is synchronous and single-threaded; every operation runs to
//! completion and reductions fold in a fixed order, so results are
//! bit-reproducible across runs.
//!
//! [`matmul`]: NdArray::matmul

pub mod array;
pub mod creation;
pub mod error;
pub mod iter;
pub mod linalg;
pub mod manip;
pub mod math;
pub mod numerical;
pub mod op;
pub mod shape;

pub use array::NdArray;
pub use error::{Error, Result};
pub use iter::nd_index;
pub use manip::concatenate;
pub use math::{array_equal, assert_array_close, assert_array_equal, convolve_valid};
pub use op::map_axis0;
pub use shape::Shape;
