//! Stochastic Gradient Descent (SGD) optimizer
//!
//! `parameter = parameter - learning_rate * gradient`, with no momentum,
//! clipping or weight decay.

use crate::optimizers::Optimizer;

/// Vanilla stochastic gradient descent.
///
/// # Example
///
/// ```
/// use mountain_lake_nn::optimizers::{Optimizer, SGD};
///
/// let mut optimizer = SGD::new(0.1);
/// let mut weights = vec![1.0, 2.0, 3.0];
/// optimizer.update(&mut weights, &[0.1, 0.2, 0.3]);
/// assert!((weights[0] - 0.99).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct SGD {
    learning_rate: f32,
}

impl SGD {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for SGD {
    /// Applies `parameter[i] -= learning_rate * gradient[i]`.
    ///
    /// # Panics
    ///
    /// Panics if `parameters` and `gradients` have different lengths.
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );

        for (param, grad) in parameters.iter_mut().zip(gradients.iter()) {
            *param -= self.learning_rate * grad;
        }
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}
