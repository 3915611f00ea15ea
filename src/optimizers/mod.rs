//! Parameter update rules
//!
//! The network applies an [`Optimizer`] to every weight and bias buffer after
//! a backward pass. Only plain stochastic gradient descent is provided.

pub mod sgd;

pub use sgd::SGD;

/// Update rule applied to one parameter buffer at a time.
pub trait Optimizer {
    /// Update `parameters` in place from `gradients` of the same length.
    ///
    /// # Panics
    ///
    /// Implementations may panic if the two slices differ in length.
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]);

    /// Current step size.
    fn learning_rate(&self) -> f32;

    /// Replace the step size, e.g. for a manual decay schedule.
    fn set_learning_rate(&mut self, lr: f32);
}
