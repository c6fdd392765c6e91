use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use loam_core::{concatenate, NdArray, Result};
use loam_tree::{self as tree, Tree};

use crate::dataset::Dataset;

// Loader combinators.
//
// Loaders are plain iterators over Result<Tree>. `batched` stacks
// consecutive samples along a fresh leading axis, `unbatched` splits a
// batch back into samples (by plurality), and `shuffled` composes the two
// around an in-buffer permutation. Only the plurality/get/concatenate/map
// contract of the tree and array engines is used, so loaders are agnostic
// to what a sample actually contains.

/// Iterate a dataset's samples in index order.
pub fn iter_dataset(ds: &dyn Dataset) -> impl Iterator<Item = Result<Tree>> + '_ {
    (0..ds.len()).map(move |i| ds.get(i))
}

/// Stack every leaf of the given sample trees along a fresh leading axis.
fn stack(batch: &[Tree]) -> Result<Tree> {
    let refs: Vec<&Tree> = batch.iter().collect();
    tree::map(
        |xs| {
            let parts: Result<Vec<NdArray>> = xs.iter().map(|x| x.expand_dims(0)).collect();
            concatenate(&parts?, 0)
        },
        &refs,
    )
}

/// Group samples into batches of `batch_size`.
///
/// Every full batch is yielded as soon as it is complete. A final partial
/// batch is yielded unless `drop_remaining` is set.
pub fn batched<I>(inner: I, batch_size: usize, drop_remaining: bool) -> Batched<I>
where
    I: Iterator<Item = Result<Tree>>,
{
    assert!(batch_size > 0, "batch size must be positive");
    Batched {
        inner,
        batch_size,
        drop_remaining,
        done: false,
    }
}

pub struct Batched<I> {
    inner: I,
    batch_size: usize,
    drop_remaining: bool,
    done: bool,
}

impl<I> Iterator for Batched<I>
where
    I: Iterator<Item = Result<Tree>>,
{
    type Item = Result<Tree>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = Vec::with_capacity(self.batch_size);
        loop {
            match self.inner.next() {
                Some(Ok(item)) => {
                    buf.push(item);
                    if buf.len() == self.batch_size {
                        return Some(stack(&buf));
                    }
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    if buf.is_empty() || self.drop_remaining {
                        return None;
                    }
                    return Some(stack(&buf));
                }
            }
        }
    }
}

/// Split batches back into individual samples.
pub fn unbatched<I>(inner: I) -> Unbatched<I>
where
    I: Iterator<Item = Result<Tree>>,
{
    Unbatched {
        inner,
        pending: Vec::new(),
        done: false,
    }
}

pub struct Unbatched<I> {
    inner: I,
    // Samples of the current batch, in reverse order so pop() yields them
    // front to back.
    pending: Vec<Tree>,
    done: bool,
}

impl<I> Iterator for Unbatched<I>
where
    I: Iterator<Item = Result<Tree>>,
{
    type Item = Result<Tree>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop() {
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }
            match self.inner.next() {
                Some(Ok(batch)) => match split_batch(&batch) {
                    Ok(mut items) => {
                        items.reverse();
                        self.pending = items;
                    }
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                },
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                }
            }
        }
    }
}

fn split_batch(batch: &Tree) -> Result<Vec<Tree>> {
    let n = tree::plurality(batch)?;
    let mut items = Vec::with_capacity(n);
    for i in 0..n {
        items.push(tree::map(|xs| xs[0].get(&[i]), &[batch])?);
    }
    Ok(items)
}

/// Shuffle samples within consecutive buffers of `buffer_size`.
///
/// Samples are batched to the buffer size, permuted inside each buffer,
/// and unbatched again; a trailing partial buffer is permuted within its
/// own length. Pass a seed for reproducible order, or `None` to seed from
/// entropy.
pub fn shuffled<I>(
    inner: I,
    buffer_size: usize,
    seed: Option<u64>,
) -> Unbatched<ShuffledBuffers<Batched<I>>>
where
    I: Iterator<Item = Result<Tree>>,
{
    let rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    unbatched(ShuffledBuffers {
        inner: batched(inner, buffer_size, false),
        rng,
    })
}

pub struct ShuffledBuffers<I> {
    inner: I,
    rng: StdRng,
}

impl<I> Iterator for ShuffledBuffers<I>
where
    I: Iterator<Item = Result<Tree>>,
{
    type Item = Result<Tree>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = match self.inner.next()? {
            Ok(b) => b,
            Err(e) => return Some(Err(e)),
        };
        Some(permute_batch(&batch, &mut self.rng))
    }
}

fn permute_batch(batch: &Tree, rng: &mut StdRng) -> Result<Tree> {
    let n = tree::plurality(batch)?;
    let mut permutation: Vec<usize> = (0..n).collect();
    permutation.shuffle(rng);

    tree::map(
        |xs| {
            let x = xs[0];
            let out = NdArray::zeros(x.dims());
            for (i, &p) in permutation.iter().enumerate() {
                out.set(&[p], &x.get(&[i])?)?;
            }
            Ok(out)
        },
        &[batch],
    )
}
