use loam_core::{Error, NdArray, Result};
use loam_tree::Tree;

use crate::init::random_uniform_signed;
use crate::module::{Model, Operation};

// Embedding - a lookup table mapping integer token ids to dense rows.
//
// Forward gathers rows by id; backward scatter-adds the incoming
// cotangent rows into the gradient table. Token gradients do not exist,
// so backward returns zeros for the input.

/// A trainable token embedding table of shape
/// `[num_embeddings, embedding_dim]`.
pub struct Embedding {
    num_embeddings: usize,
    embedding_dim: usize,

    embeddings: NdArray,
    grad: NdArray,

    input_ids: Vec<NdArray>,
}

impl Embedding {
    /// Create a table initialized uniformly in [-1, 1).
    pub fn new(num_embeddings: usize, embedding_dim: usize) -> Embedding {
        let embeddings = random_uniform_signed(&[num_embeddings, embedding_dim]);
        let grad = NdArray::zeros(embeddings.dims());
        Embedding {
            num_embeddings,
            embedding_dim,
            embeddings,
            grad,
            input_ids: Vec::new(),
        }
    }

    /// Validate a raw f32 as a token id.
    fn token_id(&self, value: f32) -> Result<usize> {
        if value.fract() != 0.0 || value < 0.0 || (value as usize) >= self.num_embeddings {
            return Err(Error::InvalidTokenId {
                value: value as f64,
                vocab: self.num_embeddings,
            });
        }
        Ok(value as usize)
    }
}

impl Operation for Embedding {
    /// `[batch] of ids -> [batch, embedding_dim]`
    fn forward(&mut self, input: &Tree, training: bool) -> Result<Tree> {
        let input = input.as_leaf()?;
        if input.rank() != 1 {
            return Err(Error::RankMismatch {
                expected: 1,
                got: input.rank(),
            });
        }
        let batch_size = input.dims()[0];

        if training {
            self.input_ids.push(input.clone());
        }

        let output = NdArray::zeros(vec![batch_size, self.embedding_dim]);
        for i in 0..batch_size {
            let id = self.token_id(input.get(&[i])?.item()?)?;
            output.set(&[i], &self.embeddings.get(&[id])?)?;
        }
        Ok(Tree::leaf(output))
    }

    fn backward(&mut self, gradient: &Tree) -> Result<Tree> {
        let gradient = gradient.as_leaf()?;
        if gradient.rank() != 2 {
            return Err(Error::RankMismatch {
                expected: 2,
                got: gradient.rank(),
            });
        }
        if gradient.dims()[1] != self.embedding_dim {
            return Err(Error::ShapeMismatch {
                expected: loam_core::Shape::from((gradient.dims()[0], self.embedding_dim)),
                got: gradient.shape().clone(),
            });
        }
        let batch_size = gradient.dims()[0];

        let ids = self
            .input_ids
            .pop()
            .ok_or(Error::EmptyTape { layer: "Embedding" })?;

        for i in 0..batch_size {
            let id = self.token_id(ids.get(&[i])?.item()?)?;
            let row = self.grad.get(&[id])?;
            row.set(&[], &row.add(&gradient.get(&[i])?)?)?;
        }

        // Token ids carry no gradient.
        Ok(Tree::leaf(NdArray::zeros(batch_size)))
    }

    fn tape_depths(&self) -> Vec<usize> {
        vec![self.input_ids.len()]
    }
}

impl Model for Embedding {
    fn params(&self) -> Tree {
        Tree::seq([Tree::leaf(self.embeddings.clone())])
    }

    fn grads(&self) -> Tree {
        Tree::seq([Tree::leaf(self.grad.clone())])
    }
}
