//! Fused softmax and cross-entropy terminal layer.

use crate::utils::activations::softmax;

/// Guards the logarithm against probabilities of exactly zero.
pub const LOG_EPSILON: f32 = 1e-7;

/// Cross-entropy of `probabilities` against the class `label`.
pub fn cross_entropy(probabilities: &[f32], label: usize) -> f32 {
    -(probabilities[label] + LOG_EPSILON).ln()
}

/// Softmax followed by cross-entropy.
///
/// Writes the class probabilities into `probabilities` and returns the loss
/// `-ln(Y[label] + 1e-7)`.
pub fn forward(label: usize, logits: &[f32], probabilities: &mut [f32]) -> f32 {
    softmax(logits, probabilities);
    cross_entropy(probabilities, label)
}

/// Combined gradient: `dA = Y` with `dA[label] -= 1`.
///
/// `probabilities` is left untouched.
pub fn backward(probabilities: &[f32], label: usize, grad_input: &mut [f32]) {
    grad_input.copy_from_slice(probabilities);
    grad_input[label] -= 1.0;
}

/// Terminal loss stage.
///
/// Kept apart from [`Layer`](crate::layers::Layer) because it consumes a
/// label and produces a scalar.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftmaxWithLoss;

impl SoftmaxWithLoss {
    pub fn forward(&self, label: usize, logits: &[f32], probabilities: &mut [f32]) -> f32 {
        forward(label, logits, probabilities)
    }

    pub fn backward(&self, probabilities: &[f32], label: usize, grad_input: &mut [f32]) {
        backward(probabilities, label, grad_input);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_forward_known_values() {
        let logits: Vec<f32> = (0..10).map(|i| i as f32 / 100.0).collect();
        let mut y = vec![0.0f32; 10];

        let loss = forward(3, &logits, &mut y);

        assert_relative_eq!(y[0], 0.09556032, epsilon = 1e-7);
        assert_relative_eq!(y[5], 0.10045981, epsilon = 1e-7);
        assert_relative_eq!(y[9], 0.10455965, epsilon = 1e-7);
        assert_relative_eq!(loss, 2.317_996_5, epsilon = 1e-6);
    }

    #[test]
    fn test_backward_does_not_mutate_probabilities() {
        let y: Vec<f32> = (0..10).map(|i| i as f32 / 100.0).collect();
        let mut da = vec![0.0f32; 10];

        backward(&y, 3, &mut da);

        assert_eq!(da[0], 0.0);
        assert_relative_eq!(da[3], -0.97, epsilon = 1e-7);
        assert_eq!(da[9], 0.09);
        assert_eq!(y[3], 0.03);
    }

    #[test]
    fn test_loss_is_finite_for_zero_probability() {
        let y = [1.0, 0.0];
        let loss = cross_entropy(&y, 1);
        assert!(loss.is_finite());
        assert_relative_eq!(loss, -(1e-7f32).ln());
    }
}
