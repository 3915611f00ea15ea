//! Bias-free linear layer: `A = X·W`.

use crate::architecture::LayerKind;
use crate::layers::affine::{accumulate_product, input_gradient, weight_gradient};
use crate::layers::{BackwardPass, Layer, Parameters};

/// Computes `output = input · weights`.
pub fn forward(input: &[f32], weights: &[f32], output: &mut [f32]) {
    output.fill(0.0);
    accumulate_product(input, weights, output);
}

/// Writes `dW = Xᵗ·dA`, and `dX = dA·Wᵗ` only when `position >= 2`.
pub fn backward(
    input: &[f32],
    weights: &[f32],
    grad_output: &[f32],
    grad_weights: &mut [f32],
    grad_input: &mut [f32],
    position: usize,
) {
    weight_gradient(input, grad_output, grad_weights);
    if position >= 2 {
        input_gradient(weights, grad_output, grad_input);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MatMul;

impl Layer for MatMul {
    fn kind(&self) -> LayerKind {
        LayerKind::MatMul
    }

    fn forward(&self, input: &[f32], params: &Parameters, output: &mut [f32]) {
        forward(input, &params.weights, output);
    }

    fn backward(&self, pass: BackwardPass<'_>, grads: &mut Parameters, grad_input: &mut [f32]) {
        backward(
            pass.input,
            &pass.params.weights,
            pass.grad_output,
            &mut grads.weights,
            grad_input,
            pass.position,
        );
    }
}
