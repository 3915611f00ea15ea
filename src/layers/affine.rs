//! Affine (fully connected) layer
//!
//! Performs `A = X·W + B` where `X` is `1 × K`, `W` is `K × M` (row-major)
//! and `B` is `1 × M`.

use crate::architecture::LayerKind;
use crate::layers::{BackwardPass, Layer, Parameters};

/// Computes `output = input · weights + biases`.
///
/// # Arguments
///
/// * `input` - Row vector of K values
/// * `weights` - K × M matrix, row-major
/// * `biases` - M values, also the output width
/// * `output` - Destination of length M
///
/// # Example
///
/// ```
/// use mountain_lake_nn::layers::affine;
///
/// let weights = [1.0, 2.0, 3.0, 4.0];
/// let mut output = [0.0; 2];
/// affine::forward(&[1.0, 1.0], &weights, &[0.5, -0.5], &mut output);
/// assert_eq!(output, [4.5, 5.5]);
/// ```
pub fn forward(input: &[f32], weights: &[f32], biases: &[f32], output: &mut [f32]) {
    output.copy_from_slice(biases);
    accumulate_product(input, weights, output);
}

/// Backward pass of the affine map.
///
/// Writes `dB = dA` and `dW = Xᵗ·dA`. `dX = dA·Wᵗ` is written only when
/// `position >= 2`; for the first real layer `grad_input` is left untouched.
pub fn backward(
    input: &[f32],
    weights: &[f32],
    grad_output: &[f32],
    grad_biases: &mut [f32],
    grad_weights: &mut [f32],
    grad_input: &mut [f32],
    position: usize,
) {
    grad_biases.copy_from_slice(grad_output);
    weight_gradient(input, grad_output, grad_weights);
    if position >= 2 {
        input_gradient(weights, grad_output, grad_input);
    }
}

/// `output += input · weights` for a row vector input.
pub(crate) fn accumulate_product(input: &[f32], weights: &[f32], output: &mut [f32]) {
    let cols = output.len();
    debug_assert_eq!(weights.len(), input.len() * cols, "weight shape mismatch");
    for (&x, row) in input.iter().zip(weights.chunks_exact(cols)) {
        for (out, &w) in output.iter_mut().zip(row) {
            *out += x * w;
        }
    }
}

/// `grad_weights = inputᵗ · grad_output` (outer product).
pub(crate) fn weight_gradient(input: &[f32], grad_output: &[f32], grad_weights: &mut [f32]) {
    let cols = grad_output.len();
    debug_assert_eq!(grad_weights.len(), input.len() * cols, "gradient shape mismatch");
    for (&x, row) in input.iter().zip(grad_weights.chunks_exact_mut(cols)) {
        for (g, &d) in row.iter_mut().zip(grad_output) {
            *g = x * d;
        }
    }
}

/// `grad_input = grad_output · weightsᵗ`.
pub(crate) fn input_gradient(weights: &[f32], grad_output: &[f32], grad_input: &mut [f32]) {
    let cols = grad_output.len();
    for (gx, row) in grad_input.iter_mut().zip(weights.chunks_exact(cols)) {
        *gx = row.iter().zip(grad_output).map(|(&w, &d)| w * d).sum();
    }
}

/// Affine layer stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct Affine;

impl Layer for Affine {
    fn kind(&self) -> LayerKind {
        LayerKind::Affine
    }

    fn forward(&self, input: &[f32], params: &Parameters, output: &mut [f32]) {
        forward(input, &params.weights, &params.biases, output);
    }

    fn backward(&self, pass: BackwardPass<'_>, grads: &mut Parameters, grad_input: &mut [f32]) {
        backward(
            pass.input,
            &pass.params.weights,
            pass.grad_output,
            &mut grads.biases,
            &mut grads.weights,
            grad_input,
            pass.position,
        );
    }
}
