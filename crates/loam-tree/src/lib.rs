//! # loam-tree
//!
//! The structural ("pytree") engine: nested sequence/keyed-map containers
//! of [`NdArray`](loam_core::NdArray) leaves, with lockstep traversal over
//! several trees at once.
//!
//! Parameters, gradients, and batches are all [`Tree`]s. The operations
//! here are what layers and optimizers are built from:
//!
//! - [`map`] / [`for_each`] / [`reduce`] - walk N same-structure trees
//!   leaf by leaf
//! - [`set`] / [`copy`] / [`zero`] - in-place writes and deep copies
//! - [`flatten`] / [`unflatten`] - leaves + [`TreeDef`] round trip
//! - [`iterate_paths`] / [`get_leaf_by_path`] - leaf addressing
//! - [`plurality`] - the shared leading ("batch") dimension
//! - [`json_encode`] / [`json_decode`] - the on-disk model format
//!
//! Keyed nodes iterate in sorted key order everywhere, so flatten order,
//! path order, and JSON field order always agree.

pub mod flatten;
pub mod json;
pub mod tree;

pub use flatten::{
    flatten, get_leaf_by_path, iterate_paths, plurality, unflatten, Path, PathElem, PathIter,
    TreeDef,
};
pub use json::{json_decode, json_encode};
pub use tree::{
    all, assert_close_all, assert_equal_all, copy, equal_all, for_each, leaves, map, reduce, set,
    zero, Tree,
};
