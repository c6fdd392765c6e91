use loam_core::Result;
use loam_tree::{self as tree, Tree};

// Dataset - an indexed collection of sample trees.
//
// A sample is any Tree; the common case is a sequence of [input, label]
// leaves. TreeDataset is the batched-columns view: one tree holding all
// samples stacked along the leading axis, indexed by slicing every leaf.

/// An indexed collection of samples.
pub trait Dataset {
    /// Number of samples.
    fn len(&self) -> usize;

    /// Whether the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sample at `index`.
    fn get(&self, index: usize) -> Result<Tree>;
}

/// A dataset over an explicit list of sample trees.
pub struct VecDataset {
    items: Vec<Tree>,
}

impl VecDataset {
    pub fn new(items: Vec<Tree>) -> VecDataset {
        VecDataset { items }
    }
}

impl Dataset for VecDataset {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, index: usize) -> Result<Tree> {
        match self.items.get(index) {
            Some(t) => Ok(t.clone()),
            None => Err(loam_core::Error::IndexOutOfRange {
                index,
                dim_size: self.items.len(),
            }),
        }
    }
}

/// A dataset stored as one tree whose every leaf has the sample count as
/// its leading dimension.
pub struct TreeDataset {
    data: Tree,
    size: usize,
}

impl TreeDataset {
    /// Wrap a batched tree; the length comes from its plurality.
    pub fn new(data: Tree) -> Result<TreeDataset> {
        let size = tree::plurality(&data)?;
        Ok(TreeDataset { data, size })
    }
}

impl Dataset for TreeDataset {
    fn len(&self) -> usize {
        self.size
    }

    /// Index every leaf's leading axis; the returned leaves are views into
    /// the dataset's storage.
    fn get(&self, index: usize) -> Result<Tree> {
        tree::map(|xs| xs[0].get(&[index]), &[&self.data])
    }
}
