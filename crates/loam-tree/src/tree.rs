use std::collections::BTreeMap;

use loam_core::{Error, NdArray, Result};

// Tree - nested containers of arrays.
//
// Model parameters, gradients, and batches are all "trees": arbitrarily
// nested sequences and string-keyed maps whose leaves are NdArrays. The
// operations here walk N trees in lockstep, which requires the trees to
// agree exactly in structure at every level: same variant, same sequence
// length, same key set. Keyed nodes sit on a BTreeMap, so every traversal
// (map, reduce, flatten, paths, JSON) sees keys in sorted order and the
// leaf order is the same everywhere.

/// A nested container of [`NdArray`] leaves.
///
/// Cloning a tree clones array handles, not buffers: the clone's leaves
/// alias the original's storage. Use [`copy`] for fully independent
/// buffers.
#[derive(Debug, Clone)]
pub enum Tree {
    /// A single array.
    Leaf(NdArray),
    /// An ordered list of subtrees.
    Seq(Vec<Tree>),
    /// A string-keyed map of subtrees, iterated in sorted key order.
    Keyed(BTreeMap<String, Tree>),
}

impl Tree {
    /// Wrap an array as a leaf.
    pub fn leaf(a: NdArray) -> Tree {
        Tree::Leaf(a)
    }

    /// Build a sequence node.
    pub fn seq(items: impl IntoIterator<Item = Tree>) -> Tree {
        Tree::Seq(items.into_iter().collect())
    }

    /// Build a keyed node from (key, subtree) pairs.
    pub fn keyed<K: Into<String>>(entries: impl IntoIterator<Item = (K, Tree)>) -> Tree {
        Tree::Keyed(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Tree::Leaf(_))
    }

    /// The leaf array, or a structure error for container nodes.
    pub fn as_leaf(&self) -> Result<&NdArray> {
        match self {
            Tree::Leaf(a) => Ok(a),
            other => Err(Error::StructureMismatch {
                expected: "leaf".to_string(),
                got: describe(other),
            }),
        }
    }
}

impl From<NdArray> for Tree {
    fn from(a: NdArray) -> Tree {
        Tree::Leaf(a)
    }
}

/// One-line structural description, used in mismatch errors.
pub(crate) fn describe(t: &Tree) -> String {
    match t {
        Tree::Leaf(_) => "leaf".to_string(),
        Tree::Seq(items) => format!("sequence of {}", items.len()),
        Tree::Keyed(m) => {
            let keys: Vec<&str> = m.keys().map(|k| k.as_str()).collect();
            format!("keyed over {{{}}}", keys.join(", "))
        }
    }
}

fn mismatch(expected: &Tree, got: &Tree) -> Error {
    Error::StructureMismatch {
        expected: describe(expected),
        got: describe(got),
    }
}

/// Walk N trees in lockstep, calling `f` with one leaf per tree and
/// rebuilding the shared structure around the results.
///
/// Fails with a structure mismatch if the trees disagree in variant,
/// sequence length, or key set at any level.
pub fn map<F>(mut f: F, trees: &[&Tree]) -> Result<Tree>
where
    F: FnMut(&[&NdArray]) -> Result<NdArray>,
{
    map_inner(&mut f, trees)
}

fn map_inner<F>(f: &mut F, trees: &[&Tree]) -> Result<Tree>
where
    F: FnMut(&[&NdArray]) -> Result<NdArray>,
{
    let first = match trees.first() {
        Some(t) => *t,
        None => return Err(Error::msg("map requires at least one tree")),
    };

    match first {
        Tree::Leaf(_) => {
            let mut leaves = Vec::with_capacity(trees.len());
            for t in trees {
                match t {
                    Tree::Leaf(a) => leaves.push(a),
                    other => return Err(mismatch(first, other)),
                }
            }
            Ok(Tree::Leaf(f(&leaves)?))
        }
        Tree::Seq(children) => {
            let n = children.len();
            for t in trees {
                match t {
                    Tree::Seq(c) if c.len() == n => {}
                    other => return Err(mismatch(first, other)),
                }
            }
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                let slot: Vec<&Tree> = trees
                    .iter()
                    .map(|t| match t {
                        Tree::Seq(c) => &c[i],
                        _ => unreachable!("validated above"),
                    })
                    .collect();
                out.push(map_inner(f, &slot)?);
            }
            Ok(Tree::Seq(out))
        }
        Tree::Keyed(keyed) => {
            for t in trees {
                match t {
                    Tree::Keyed(m) if m.len() == keyed.len() && m.keys().eq(keyed.keys()) => {}
                    other => return Err(mismatch(first, other)),
                }
            }
            let mut out = BTreeMap::new();
            for key in keyed.keys() {
                let slot: Vec<&Tree> = trees
                    .iter()
                    .map(|t| match t {
                        Tree::Keyed(m) => &m[key],
                        _ => unreachable!("validated above"),
                    })
                    .collect();
                out.insert(key.clone(), map_inner(f, &slot)?);
            }
            Ok(Tree::Keyed(out))
        }
    }
}

/// [`map`] without results: visit every leaf tuple in traversal order.
pub fn for_each<F>(mut f: F, trees: &[&Tree]) -> Result<()>
where
    F: FnMut(&[&NdArray]) -> Result<()>,
{
    map(
        |xs| {
            f(xs)?;
            Ok(NdArray::scalar(0.0))
        },
        trees,
    )
    .map(|_| ())
}

/// Left-to-right fold over leaves in traversal order (sequence index
/// order, sorted key order). The order is part of the contract: loss
/// accumulation must be reproducible.
pub fn reduce<A, F>(mut f: F, trees: &[&Tree], initial: A) -> Result<A>
where
    F: FnMut(A, &[&NdArray]) -> Result<A>,
{
    let mut acc = Some(initial);
    for_each(
        |xs| {
            let cur = acc.take().expect("accumulator always present");
            acc = Some(f(cur, xs)?);
            Ok(())
        },
        trees,
    )?;
    Ok(acc.take().expect("accumulator always present"))
}

/// Write `src`'s leaf values into `dst`'s leaves in place (broadcast
/// writes through shared storage), preserving `dst`'s allocation.
pub fn set(dst: &Tree, src: &Tree) -> Result<()> {
    for_each(|xs| xs[0].set(&[], xs[1]), &[dst, src])
}

/// Deep copy: same structure, every leaf in a fresh buffer.
pub fn copy(t: &Tree) -> Result<Tree> {
    map(|xs| Ok(xs[0].copy()), &[t])
}

/// Write scalar zero into every leaf in place.
pub fn zero(t: &Tree) -> Result<()> {
    let z = NdArray::scalar(0.0);
    for_each(|xs| xs[0].set(&[], &z), &[t])
}

/// Whether two trees have identical structure and exactly equal leaves.
pub fn equal_all(a: &Tree, b: &Tree) -> Result<bool> {
    let eq = map(|xs| xs[0].equal(xs[1]), &[a, b])?;
    Ok(all(&eq))
}

/// Whether every element of every leaf is nonzero.
pub fn all(t: &Tree) -> bool {
    leaves(t).iter().all(|l| l.all())
}

/// Every leaf in traversal order (handles sharing the tree's storage).
pub fn leaves(t: &Tree) -> Vec<NdArray> {
    let mut out = Vec::new();
    fn walk(t: &Tree, out: &mut Vec<NdArray>) {
        match t {
            Tree::Leaf(a) => out.push(a.clone()),
            Tree::Seq(items) => {
                for child in items {
                    walk(child, out);
                }
            }
            Tree::Keyed(m) => {
                for child in m.values() {
                    walk(child, out);
                }
            }
        }
    }
    walk(t, &mut out);
    out
}

/// Panic unless both trees have the same structure and exactly equal
/// leaves.
///
/// # Panics
/// With the offending path in the message.
pub fn assert_equal_all(actual: &Tree, expected: &Tree) {
    let actual_paths: Vec<_> = crate::flatten::iterate_paths(actual).collect();
    let expected_paths: Vec<_> = crate::flatten::iterate_paths(expected).collect();
    assert_eq!(actual_paths, expected_paths, "tree shapes are not equal");

    for p in &actual_paths {
        let a = crate::flatten::get_leaf_by_path(actual, p).expect("path came from this tree");
        let e = crate::flatten::get_leaf_by_path(expected, p).expect("path came from this tree");
        assert!(
            loam_core::array_equal(&a, &e),
            "leaves at path {} are not equal: {:?} vs {:?}",
            crate::flatten::path_to_string(p),
            a,
            e
        );
    }
}

/// Panic unless both trees have the same structure and elementwise-close
/// leaves (rtol=atol=1e-2).
///
/// # Panics
/// With the offending path in the message.
pub fn assert_close_all(actual: &Tree, expected: &Tree) {
    let actual_paths: Vec<_> = crate::flatten::iterate_paths(actual).collect();
    let expected_paths: Vec<_> = crate::flatten::iterate_paths(expected).collect();
    assert_eq!(actual_paths, expected_paths, "tree shapes are not equal");

    for p in &actual_paths {
        let a = crate::flatten::get_leaf_by_path(actual, p).expect("path came from this tree");
        let e = crate::flatten::get_leaf_by_path(expected, p).expect("path came from this tree");
        let close = a.isclose(&e).unwrap_or_else(|_| NdArray::scalar(0.0));
        assert!(
            a.shape() == e.shape() && close.all(),
            "leaves at path {} are not close: {:?} vs {:?}",
            crate::flatten::path_to_string(p),
            a,
            e
        );
    }
}
