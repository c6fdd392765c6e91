//! # loam-nn
//!
//! Layers, losses, optimizers, and the numerical-gradient test harness,
//! built on loam-core arrays and loam-tree structures.
//!
//! Every layer implements [`Operation`] (forward/backward with a LIFO
//! tape) and parameterized layers implement [`Model`] on top of it.
//! Gradients are written by hand per layer and validated against finite
//! differences by the [`gradcheck`] helpers.

pub mod activation;
pub mod conv1d;
pub mod dense;
pub mod dropout;
pub mod embedding;
pub mod gradcheck;
pub mod init;
pub mod loss;
pub mod metrics;
pub mod module;
pub mod optim;
pub mod rnn;
pub mod sequential;
pub mod serialize;

pub use activation::{relu, sigmoid, tanh, Relu, Sigmoid, Tanh};
pub use conv1d::Conv1D;
pub use dense::Dense;
pub use dropout::Dropout;
pub use embedding::Embedding;
pub use gradcheck::{
    check_model_grads, check_model_param_grads, check_operation_grad, numerical_grad,
    numerical_grad_tree,
};
pub use init::{random_normal, random_uniform, random_uniform_signed, xavier};
pub use loss::{one_hot_encode, softmax, Loss, SoftmaxCrossEntropy, SseLoss};
pub use metrics::{accuracy, mse, multiclass_accuracy, sse};
pub use module::{tapes_are_empty, Model, Operation};
pub use optim::{GradientDescent, Momentum, Optimizer};
pub use rnn::{GruCell, RnnCell, SimpleRnn};
pub use sequential::{Layer, Sequential};
pub use serialize::{load_model_json, save_model_json};
