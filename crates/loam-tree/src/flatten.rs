use std::collections::BTreeMap;
use std::fmt;

use loam_core::{bail, Error, NdArray, Result};

use crate::tree::Tree;

// Structure descriptors, flatten/unflatten, and path addressing.
//
// flatten splits a tree into its leaves (in traversal order) plus a
// TreeDef that records only the structure; unflatten is the exact left
// inverse. iterate_paths enumerates leaf addresses in the same order.

/// A structure-only description of a [`Tree`]: variant, keys, and child
/// descriptors, with no leaf values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeDef {
    Leaf,
    Seq(Vec<TreeDef>),
    Keyed(Vec<(String, TreeDef)>),
}

/// Split a tree into `(leaves in traversal order, structure descriptor)`.
///
/// The returned leaf handles alias the tree's storage.
pub fn flatten(t: &Tree) -> (Vec<NdArray>, TreeDef) {
    match t {
        Tree::Leaf(a) => (vec![a.clone()], TreeDef::Leaf),
        Tree::Seq(items) => {
            let mut leaves = Vec::new();
            let mut defs = Vec::with_capacity(items.len());
            for child in items {
                let (ls, d) = flatten(child);
                leaves.extend(ls);
                defs.push(d);
            }
            (leaves, TreeDef::Seq(defs))
        }
        Tree::Keyed(m) => {
            let mut leaves = Vec::new();
            let mut defs = Vec::with_capacity(m.len());
            for (key, child) in m {
                let (ls, d) = flatten(child);
                leaves.extend(ls);
                defs.push((key.clone(), d));
            }
            (leaves, TreeDef::Keyed(defs))
        }
    }
}

/// Rebuild a tree from a descriptor and leaves in flatten order.
///
/// Fails when the leaf count does not match the structure exactly (too few
/// or too many).
pub fn unflatten(def: &TreeDef, leaves: Vec<NdArray>) -> Result<Tree> {
    let mut iter = leaves.into_iter();
    let tree = unflatten_inner(def, &mut iter)?;
    if iter.next().is_some() {
        bail!("unflatten: more leaves than the structure consumes");
    }
    Ok(tree)
}

fn unflatten_inner(def: &TreeDef, leaves: &mut impl Iterator<Item = NdArray>) -> Result<Tree> {
    match def {
        TreeDef::Leaf => match leaves.next() {
            Some(a) => Ok(Tree::Leaf(a)),
            None => Err(Error::msg("unflatten: ran out of leaves")),
        },
        TreeDef::Seq(defs) => {
            let mut items = Vec::with_capacity(defs.len());
            for d in defs {
                items.push(unflatten_inner(d, leaves)?);
            }
            Ok(Tree::Seq(items))
        }
        TreeDef::Keyed(entries) => {
            let mut m = BTreeMap::new();
            for (key, d) in entries {
                m.insert(key.clone(), unflatten_inner(d, leaves)?);
            }
            Ok(Tree::Keyed(m))
        }
    }
}

/// One step of a leaf address: a map key or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathElem {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathElem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElem::Key(k) => write!(f, "{}", k),
            PathElem::Index(i) => write!(f, "{}", i),
        }
    }
}

/// The address of a leaf within a tree.
pub type Path = Vec<PathElem>;

pub(crate) fn path_to_string(path: &[PathElem]) -> String {
    let parts: Vec<String> = path.iter().map(|p| p.to_string()).collect();
    format!("[{}]", parts.join("/"))
}

fn invalid_path(path: &[PathElem]) -> Error {
    Error::InvalidPath {
        path: path_to_string(path),
    }
}

/// Lazily enumerate the path to every leaf, in the same order `flatten`
/// emits leaves (sequence index order, sorted key order). The iterator is
/// finite; call again to restart.
pub fn iterate_paths(t: &Tree) -> PathIter<'_> {
    PathIter {
        stack: vec![(Vec::new(), t)],
    }
}

pub struct PathIter<'a> {
    // Depth-first stack; children pushed in reverse so they pop in order.
    stack: Vec<(Path, &'a Tree)>,
}

impl<'a> Iterator for PathIter<'a> {
    type Item = Path;

    fn next(&mut self) -> Option<Path> {
        while let Some((path, node)) = self.stack.pop() {
            match node {
                Tree::Leaf(_) => return Some(path),
                Tree::Seq(items) => {
                    for (i, child) in items.iter().enumerate().rev() {
                        let mut p = path.clone();
                        p.push(PathElem::Index(i));
                        self.stack.push((p, child));
                    }
                }
                Tree::Keyed(m) => {
                    for (key, child) in m.iter().rev() {
                        let mut p = path.clone();
                        p.push(PathElem::Key(key.clone()));
                        self.stack.push((p, child));
                    }
                }
            }
        }
        None
    }
}

/// Resolve a path to its leaf (a handle sharing the tree's storage).
///
/// Fails with `InvalidPath` when the path stops at a container, descends
/// into a leaf, uses the wrong element kind, or points outside the tree.
pub fn get_leaf_by_path(t: &Tree, path: &[PathElem]) -> Result<NdArray> {
    match (t, path.first()) {
        (Tree::Leaf(a), None) => Ok(a.clone()),
        (Tree::Keyed(m), Some(PathElem::Key(key))) => match m.get(key) {
            Some(child) => get_leaf_by_path(child, &path[1..]),
            None => Err(invalid_path(path)),
        },
        (Tree::Seq(items), Some(PathElem::Index(i))) => match items.get(*i) {
            Some(child) => get_leaf_by_path(child, &path[1..]),
            None => Err(invalid_path(path)),
        },
        _ => Err(invalid_path(path)),
    }
}

/// The shared leading dimension ("batch size") of a tree's leaves, read
/// from the first leaf found by descending first children.
///
/// Fails when that leaf has rank 0 or a container on the way is empty.
pub fn plurality(t: &Tree) -> Result<usize> {
    match t {
        Tree::Leaf(a) => {
            if a.rank() < 1 {
                return Err(Error::RankMismatch {
                    expected: 1,
                    got: 0,
                });
            }
            Ok(a.dims()[0])
        }
        Tree::Seq(items) => match items.first() {
            Some(child) => plurality(child),
            None => Err(Error::msg("plurality of an empty sequence")),
        },
        Tree::Keyed(m) => match m.values().next() {
            Some(child) => plurality(child),
            None => Err(Error::msg("plurality of an empty keyed tree")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{equal_all, Tree};
    use loam_core::nda;

    fn sample_tree() -> Tree {
        Tree::keyed([
            ("W", Tree::leaf(nda!([2.0, 3.0]))),
            ("b", Tree::leaf(nda!(4.0))),
            (
                "params",
                Tree::seq([Tree::leaf(nda!(5.0)), Tree::leaf(nda!(6.0))]),
            ),
        ])
    }

    #[test]
    fn flatten_unflatten_roundtrip() {
        let t = sample_tree();
        let (leaves, def) = flatten(&t);
        assert_eq!(leaves.len(), 4);
        let rebuilt = unflatten(&def, leaves).unwrap();
        assert!(equal_all(&t, &rebuilt).unwrap());
    }

    #[test]
    fn unflatten_rejects_wrong_count() {
        let t = sample_tree();
        let (mut leaves, def) = flatten(&t);
        leaves.pop();
        assert!(unflatten(&def, leaves.clone()).is_err());

        leaves.push(nda!(0.0));
        leaves.push(nda!(0.0));
        assert!(unflatten(&def, leaves).is_err());
    }

    #[test]
    fn paths_in_sorted_order() {
        let t = sample_tree();
        let paths: Vec<Path> = iterate_paths(&t).collect();
        assert_eq!(
            paths,
            vec![
                vec![PathElem::Key("W".into())],
                vec![PathElem::Key("b".into())],
                vec![PathElem::Key("params".into()), PathElem::Index(0)],
                vec![PathElem::Key("params".into()), PathElem::Index(1)],
            ]
        );

        // Restartable: a fresh iterator yields the same paths.
        let again: Vec<Path> = iterate_paths(&t).collect();
        assert_eq!(paths, again);
    }

    #[test]
    fn get_leaf_by_path_resolves() {
        let t = sample_tree();
        let leaf = get_leaf_by_path(
            &t,
            &[PathElem::Key("params".into()), PathElem::Index(1)],
        )
        .unwrap();
        assert_eq!(leaf.item().unwrap(), 6.0);
    }

    #[test]
    fn get_leaf_by_path_rejects_non_leaf_endpoints() {
        let t = sample_tree();
        // Too short: stops at a sequence.
        assert!(matches!(
            get_leaf_by_path(&t, &[PathElem::Key("params".into())]),
            Err(loam_core::Error::InvalidPath { .. })
        ));
        // Too long: descends into a leaf.
        assert!(get_leaf_by_path(
            &t,
            &[PathElem::Key("b".into()), PathElem::Index(0)]
        )
        .is_err());
        // Wrong element kind.
        assert!(get_leaf_by_path(&t, &[PathElem::Index(0)]).is_err());
        // Missing key.
        assert!(get_leaf_by_path(&t, &[PathElem::Key("nope".into())]).is_err());
    }

    #[test]
    fn plurality_reads_leading_dimension() {
        let t = Tree::keyed([
            ("input1", Tree::leaf(nda!([2.0, 3.0]))),
            ("input2", Tree::leaf(nda!([1.0, 4.0]))),
            (
                "target",
                Tree::seq([Tree::leaf(nda!([0.0, 1.0])), Tree::leaf(nda!([2.0, 3.0]))]),
            ),
        ]);
        assert_eq!(plurality(&t).unwrap(), 2);
        assert_eq!(
            plurality(&Tree::seq([Tree::leaf(nda!([0.0, 1.0, 2.0]))])).unwrap(),
            3
        );
    }

    #[test]
    fn plurality_rejects_scalar_leaf() {
        assert!(plurality(&Tree::leaf(nda!(1.0))).is_err());
        assert!(plurality(&Tree::Seq(vec![])).is_err());
    }
}
