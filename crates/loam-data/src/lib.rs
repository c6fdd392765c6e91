//! # loam-data
//!
//! Dataset abstractions and batching/shuffling iterators over sample
//! [`Tree`](loam_tree::Tree)s.
//!
//! The loaders rely only on the public contract of the array and tree
//! engines (plurality, leading-axis indexing, concatenation, lockstep
//! map), so they work with any sample structure.

pub mod dataset;
pub mod loader;

pub use dataset::{Dataset, TreeDataset, VecDataset};
pub use loader::{batched, iter_dataset, shuffled, unbatched, Batched, ShuffledBuffers, Unbatched};
