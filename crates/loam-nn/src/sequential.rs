use std::collections::BTreeMap;

use loam_core::Result;
use loam_tree::Tree;

use crate::module::{Model, Operation};

// Sequential - a named chain of layers.
//
// Forward runs the layers in order, backward in reverse. Parameters and
// gradients are exposed as a keyed tree over the parameterized members
// only; stateless operations (activations, dropout) contribute nothing to
// the trees but still participate in both passes.

/// A chain member: either a stateless operation or a parameterized model.
pub enum Layer {
    Op(Box<dyn Operation>),
    Model(Box<dyn Model>),
}

impl Layer {
    fn forward(&mut self, input: &Tree, training: bool) -> Result<Tree> {
        match self {
            Layer::Op(op) => op.forward(input, training),
            Layer::Model(m) => m.forward(input, training),
        }
    }

    fn backward(&mut self, gradient: &Tree) -> Result<Tree> {
        match self {
            Layer::Op(op) => op.backward(gradient),
            Layer::Model(m) => m.backward(gradient),
        }
    }

    fn tape_depths(&self) -> Vec<usize> {
        match self {
            Layer::Op(op) => op.tape_depths(),
            Layer::Model(m) => m.tape_depths(),
        }
    }

    /// The parameterized model inside, if this member has parameters.
    pub fn as_model(&self) -> Option<&dyn Model> {
        match self {
            Layer::Model(m) => Some(m.as_ref()),
            Layer::Op(_) => None,
        }
    }
}

/// Layers run in order by name.
pub struct Sequential {
    layers: Vec<(String, Layer)>,
}

impl Sequential {
    pub fn new(layers: Vec<(String, Layer)>) -> Sequential {
        Sequential { layers }
    }

    /// Look up a member by name.
    pub fn get(&mut self, name: &str) -> Option<&mut Layer> {
        self.layers
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, l)| l)
    }
}

impl Operation for Sequential {
    fn forward(&mut self, input: &Tree, training: bool) -> Result<Tree> {
        let mut x = input.clone();
        for (_, layer) in self.layers.iter_mut() {
            x = layer.forward(&x, training)?;
        }
        Ok(x)
    }

    fn backward(&mut self, gradient: &Tree) -> Result<Tree> {
        let mut g = gradient.clone();
        for (_, layer) in self.layers.iter_mut().rev() {
            g = layer.backward(&g)?;
        }
        Ok(g)
    }

    fn tape_depths(&self) -> Vec<usize> {
        self.layers
            .iter()
            .flat_map(|(_, l)| l.tape_depths())
            .collect()
    }
}

impl Model for Sequential {
    fn params(&self) -> Tree {
        let entries: BTreeMap<String, Tree> = self
            .layers
            .iter()
            .filter_map(|(name, l)| l.as_model().map(|m| (name.clone(), m.params())))
            .collect();
        Tree::Keyed(entries)
    }

    fn grads(&self) -> Tree {
        let entries: BTreeMap<String, Tree> = self
            .layers
            .iter()
            .filter_map(|(name, l)| l.as_model().map(|m| (name.clone(), m.grads())))
            .collect();
        Tree::Keyed(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Relu;
    use crate::dense::Dense;
    use crate::module::tapes_are_empty;
    use loam_core::{assert_array_close, nda, NdArray};
    use loam_tree as tree;

    fn chain() -> Sequential {
        let d1 = Dense::new(2, 2, |s| NdArray::zeros(s), None);
        tree::set(
            &d1.params(),
            &Tree::seq([
                Tree::leaf(nda!([[1.0, 0.0], [0.0, -1.0]])),
                Tree::leaf(nda!([0.0, 0.0])),
            ]),
        )
        .unwrap();

        let d2 = Dense::new(2, 1, |s| NdArray::zeros(s), None);
        tree::set(
            &d2.params(),
            &Tree::seq([Tree::leaf(nda!([[1.0], [1.0]])), Tree::leaf(nda!([0.5]))]),
        )
        .unwrap();

        Sequential::new(vec![
            ("fc1".to_string(), Layer::Model(Box::new(d1))),
            ("act".to_string(), Layer::Op(Box::new(Relu::new()))),
            ("fc2".to_string(), Layer::Model(Box::new(d2))),
        ])
    }

    #[test]
    fn forward_chains_in_order() {
        let mut s = chain();
        // [1, 2] -> fc1 -> [1, -2] -> relu -> [1, 0] -> fc2 -> [1.5]
        let y = s.forward(&Tree::leaf(nda!([[1.0, 2.0]])), false).unwrap();
        assert_array_close(y.as_leaf().unwrap(), &nda!([[1.5]]));
    }

    #[test]
    fn params_are_keyed_over_models_only() {
        let s = chain();
        let params = s.params();
        match &params {
            Tree::Keyed(m) => {
                let keys: Vec<&str> = m.keys().map(|k| k.as_str()).collect();
                assert_eq!(keys, vec!["fc1", "fc2"]);
            }
            _ => panic!("params must be a keyed tree"),
        }
    }

    #[test]
    fn backward_runs_reverse_and_clears_tapes() {
        let mut s = chain();
        s.forward(&Tree::leaf(nda!([[1.0, 2.0]])), true).unwrap();
        assert!(!tapes_are_empty(&s));
        let gx = s.backward(&Tree::leaf(nda!([[1.0]]))).unwrap();
        assert!(tapes_are_empty(&s));
        // Through fc2 the cotangent is [1, 1]; relu kills the negative
        // lane; fc1 maps it back by w^T.
        assert_array_close(gx.as_leaf().unwrap(), &nda!([[1.0, 0.0]]));
    }

    #[test]
    fn get_finds_members_by_name() {
        let mut s = chain();
        assert!(s.get("fc1").is_some());
        assert!(s.get("fc1").unwrap().as_model().is_some());
        assert!(s.get("act").unwrap().as_model().is_none());
        assert!(s.get("missing").is_none());
    }
}
