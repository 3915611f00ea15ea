//! Layer trait definition for network stages
//!
//! Layers are stateless: every buffer they read or write is borrowed from the
//! network for the duration of one call. Learnable parameters and their
//! gradients live in [`Parameters`] records owned by the network.

use crate::architecture::LayerKind;

/// Learnable parameters of one layer (or their gradients).
///
/// Parameterless layers carry empty buffers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    /// Weights stored row-major (affine: `inputs × outputs`,
    /// convolution: `filters × filter_height × filter_width`)
    pub weights: Vec<f32>,
    /// One bias per output column (affine) or per filter (convolution)
    pub biases: Vec<f32>,
}

impl Parameters {
    pub fn new(weights: Vec<f32>, biases: Vec<f32>) -> Self {
        Self { weights, biases }
    }

    /// Zero-filled buffers of the same shape.
    pub fn zeros_like(other: &Parameters) -> Self {
        Self {
            weights: vec![0.0; other.weights.len()],
            biases: vec![0.0; other.biases.len()],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty() && self.biases.is_empty()
    }

    /// Total number of scalars across weights and biases.
    pub fn len(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

/// Borrowed inputs of one backward step.
pub struct BackwardPass<'a> {
    /// The input the forward pass consumed (previous layer's output)
    pub input: &'a [f32],
    /// The output the forward pass produced
    pub output: &'a [f32],
    /// Gradient of the loss with respect to `output`
    pub grad_output: &'a [f32],
    /// Current parameter values
    pub params: &'a Parameters,
    /// Position of the layer in the network; 1 is the first real layer
    pub position: usize,
}

impl BackwardPass<'_> {
    /// Whether an upstream gradient is wanted at all.
    ///
    /// Nothing consumes the gradient of the raw input, so the first real
    /// layer skips computing it.
    pub fn needs_input_gradient(&self) -> bool {
        self.position >= 2
    }
}

/// Core trait for network layers.
///
/// All computing layer types (Affine, Convolution, Pooling, ...) implement
/// this trait so the network can drive them without knowing their type.
///
/// # Example
///
/// ```ignore
/// let mut output = vec![0.0f32; output_size];
/// layer.forward(&input, &params, &mut output);
///
/// let mut grad_input = vec![0.0f32; input.len()];
/// layer.backward(
///     BackwardPass { input: &input, output: &output, grad_output: &grad_output,
///                    params: &params, position: 2 },
///     &mut grads,
///     &mut grad_input,
/// );
/// ```
pub trait Layer {
    /// The layer type tag.
    fn kind(&self) -> LayerKind;

    /// Forward propagation.
    ///
    /// Reads `input` and `params`, overwrites `output`. Buffer sizes are a
    /// caller contract; implementations only debug-assert them.
    fn forward(&self, input: &[f32], params: &Parameters, output: &mut [f32]);

    /// Backward propagation.
    ///
    /// Overwrites `grads` (never accumulates) and, where the layer propagates
    /// upstream, `grad_input`. Layers that skip the input gradient leave
    /// `grad_input` untouched.
    fn backward(&self, pass: BackwardPass<'_>, grads: &mut Parameters, grad_input: &mut [f32]);
}
