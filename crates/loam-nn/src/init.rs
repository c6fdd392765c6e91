use rand::Rng;

use loam_core::{numerical, NdArray};

// Parameter initializers. All take the shape as a plain slice so they can
// be passed as `init` functions to layer constructors.

/// Uniform in [0, 1).
pub fn random_uniform(shape: &[usize]) -> NdArray {
    let mut rng = rand::thread_rng();
    NdArray::from_fn(shape, |_| rng.gen::<f32>())
}

/// Uniform in [-1, 1).
pub fn random_uniform_signed(shape: &[usize]) -> NdArray {
    let mut rng = rand::thread_rng();
    NdArray::from_fn(shape, |_| rng.gen::<f32>() * 2.0 - 1.0)
}

/// Normal with the given mean and standard deviation.
pub fn random_normal(shape: &[usize], mu: f64, sigma: f64) -> NdArray {
    NdArray::from_fn(shape, |_| numerical::sample_normal(mu, sigma) as f32)
}

/// Xavier-style initialization: normal draws scaled by rank over the sum
/// of the dimensions.
pub fn xavier(shape: &[usize]) -> NdArray {
    let variance = shape.len() as f64 / shape.iter().sum::<usize>() as f64;
    random_normal(shape, 0.0, variance)
}
