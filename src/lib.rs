//! Mountain Lake neural network trainer
//!
//! A small feed-forward / convolutional network trained one example at a
//! time with stochastic gradient descent. The network is declared as an
//! ordered list of layer tokens in a JSON configuration; shapes are inferred
//! from the training corpus and every buffer is allocated once up front.
//!
//! # Modules
//!
//! - `layers`: stateless layer primitives (Affine, MatMul, Convolution, Pooling, ReLU, Sigmoid, SoftmaxWithLoss)
//! - `architecture`: structure parsing and shape inference
//! - `network`: the orchestrator owning all per-layer buffers
//! - `config`: JSON configuration loading
//! - `dataset`: training / test corpus
//! - `optimizers`: SGD update rule
//! - `utils`: RNG, activation helpers

pub mod architecture;
pub mod config;
pub mod dataset;
pub mod error;
pub mod layers;
pub mod network;
pub mod optimizers;
pub mod utils;

pub use config::{load_config, NetworkConfig};
pub use dataset::{Dataset, Split};
pub use error::{NetworkError, Result};
pub use network::{AccuracyReport, NeuralNetwork};
