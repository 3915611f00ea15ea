//! Logistic sigmoid activation.

use crate::architecture::LayerKind;
use crate::layers::{BackwardPass, Layer, Parameters};
use crate::utils::activations::sigmoid;

/// `Z = 1 / (1 + e^-A)` elementwise.
pub fn forward(input: &[f32], output: &mut [f32]) {
    for (z, &a) in output.iter_mut().zip(input) {
        *z = sigmoid(a);
    }
}

/// `dA = dZ ⊙ Z ⊙ (1 - Z)`, using the forward output `Z`.
pub fn backward(grad_output: &[f32], output: &[f32], grad_input: &mut [f32]) {
    for ((da, &dz), &z) in grad_input.iter_mut().zip(grad_output).zip(output) {
        *da = dz * z * (1.0 - z);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sigmoid;

impl Layer for Sigmoid {
    fn kind(&self) -> LayerKind {
        LayerKind::Sigmoid
    }

    fn forward(&self, input: &[f32], _params: &Parameters, output: &mut [f32]) {
        forward(input, output);
    }

    fn backward(&self, pass: BackwardPass<'_>, _grads: &mut Parameters, grad_input: &mut [f32]) {
        backward(pass.grad_output, pass.output, grad_input);
    }
}
