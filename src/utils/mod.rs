//! Shared utilities: reproducible random initialisation and the softmax/argmax
//! helpers used by the loss layer and accuracy scoring.

pub mod activations;
pub mod rng;

pub use rng::{SimpleRng, WeightInit};
