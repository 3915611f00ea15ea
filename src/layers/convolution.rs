//! 2D convolution layer
//!
//! Single-channel convolution with zero padding, arbitrary stride and several
//! output filters. The flat input is read as an `input_height × input_width`
//! row-major image; the output is the concatenation of each filter's feature
//! map, each in row-major spatial order.

use crate::architecture::LayerKind;
use crate::layers::{BackwardPass, Layer, Parameters};
use std::borrow::Cow;

/// Geometry of a convolution layer, fixed once the network is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvConfig {
    pub pad: usize,
    pub stride: usize,
    pub filter_height: usize,
    pub filter_width: usize,
    pub filter_count: usize,
    /// Input maps the layer consumes; kernels are single-channel, so the
    /// network only accepts 1
    pub channel_count: usize,
    pub input_height: usize,
    pub input_width: usize,
    pub output_height: usize,
    pub output_width: usize,
}

impl ConvConfig {
    /// Builds a config and derives the output shape:
    /// `(input - filter + 2*pad) / stride + 1` in each dimension.
    ///
    /// Returns `None` when the stride is zero, the filter does not fit in
    /// the padded input, or any derived buffer size overflows `usize`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pad: usize,
        stride: usize,
        filter_height: usize,
        filter_width: usize,
        filter_count: usize,
        channel_count: usize,
        input_height: usize,
        input_width: usize,
    ) -> Option<Self> {
        let border = pad.checked_mul(2)?;
        let padded_height = input_height.checked_add(border)?;
        let padded_width = input_width.checked_add(border)?;
        if stride == 0
            || filter_height == 0
            || filter_width == 0
            || filter_height > padded_height
            || filter_width > padded_width
        {
            return None;
        }
        let cc = Self {
            pad,
            stride,
            filter_height,
            filter_width,
            filter_count,
            channel_count,
            input_height,
            input_width,
            output_height: (padded_height - filter_height) / stride + 1,
            output_width: (padded_width - filter_width) / stride + 1,
        };

        // every size the layer later computes unchecked must fit in usize
        padded_height.checked_mul(padded_width)?;
        cc.output_height.checked_mul(cc.output_width)?.checked_mul(filter_count)?;
        filter_height.checked_mul(filter_width)?.checked_mul(filter_count)?;
        cc.map_size().checked_mul(cc.kernel_size())?;
        Some(cc)
    }

    /// Values per filter (`filter_height × filter_width`).
    pub fn kernel_size(&self) -> usize {
        self.filter_height * self.filter_width
    }

    /// Spatial positions per feature map.
    pub fn map_size(&self) -> usize {
        self.output_height * self.output_width
    }

    /// Total output length across all filters.
    pub fn output_size(&self) -> usize {
        self.map_size() * self.filter_count
    }

    pub fn input_size(&self) -> usize {
        self.input_height * self.input_width
    }

    fn padded_width(&self) -> usize {
        self.input_width + 2 * self.pad
    }

    fn padded_height(&self) -> usize {
        self.input_height + 2 * self.pad
    }
}

/// Embeds the input image into a zero border of `pad` cells.
fn padded_input<'a>(input: &'a [f32], cc: &ConvConfig) -> Cow<'a, [f32]> {
    if cc.pad == 0 {
        return Cow::Borrowed(&input[..cc.input_size()]);
    }
    let width = cc.padded_width();
    let mut padded = vec![0.0f32; cc.padded_height() * width];
    for (r, row) in input.chunks_exact(cc.input_width).take(cc.input_height).enumerate() {
        let start = (r + cc.pad) * width + cc.pad;
        padded[start..start + cc.input_width].copy_from_slice(row);
    }
    Cow::Owned(padded)
}

/// Gathers every receptive field into one row of a
/// `(output_height·output_width) × (filter_height·filter_width)` matrix.
fn gather_windows(padded: &[f32], cc: &ConvConfig) -> Vec<f32> {
    let width = cc.padded_width();
    let kernel = cc.kernel_size();
    let mut columns = vec![0.0f32; cc.map_size() * kernel];
    for r in 0..cc.output_height {
        for c in 0..cc.output_width {
            let row = &mut columns[(r * cc.output_width + c) * kernel..][..kernel];
            for k in 0..cc.filter_height {
                let src = (r * cc.stride + k) * width + c * cc.stride;
                row[k * cc.filter_width..(k + 1) * cc.filter_width]
                    .copy_from_slice(&padded[src..src + cc.filter_width]);
            }
        }
    }
    columns
}

/// Forward convolution.
///
/// Filter `m` writes its map at offset `m · output_height · output_width`.
///
/// # Arguments
///
/// * `input` - Row-major `input_height × input_width` image
/// * `weights` - `filter_count` flattened kernels back to back
/// * `biases` - One scalar per filter
/// * `output` - Destination of length [`ConvConfig::output_size`]
/// * `cc` - Layer geometry
///
/// # Example
///
/// ```
/// use mountain_lake_nn::layers::{convolution, ConvConfig};
///
/// // 3x3 ramp, one 2x2 all-ones filter, stride 1, no padding
/// let cc = ConvConfig::new(0, 1, 2, 2, 1, 1, 3, 3).unwrap();
/// let input: Vec<f32> = (1..=9).map(|v| v as f32).collect();
/// let mut output = vec![0.0; cc.output_size()];
///
/// convolution::forward(&input, &[1.0; 4], &[0.5], &mut output, &cc);
/// assert_eq!(output, vec![12.5, 16.5, 24.5, 28.5]);
/// ```
pub fn forward(input: &[f32], weights: &[f32], biases: &[f32], output: &mut [f32], cc: &ConvConfig) {
    debug_assert_eq!(output.len(), cc.output_size(), "convolution output size mismatch");
    let padded = padded_input(input, cc);
    let columns = gather_windows(&padded, cc);
    let kernel = cc.kernel_size();
    let map = cc.map_size();

    for (m, (filter, out_map)) in weights
        .chunks_exact(kernel)
        .zip(output.chunks_exact_mut(map))
        .take(cc.filter_count)
        .enumerate()
    {
        let bias = biases[m];
        for (out, window) in out_map.iter_mut().zip(columns.chunks_exact(kernel)) {
            let mut acc = 0.0f32;
            for (&x, &w) in window.iter().zip(filter) {
                acc += w * x;
            }
            *out = acc + bias;
        }
    }
}

/// Bias and weight gradients.
///
/// `dB[m]` is the sum of filter `m`'s output-gradient slice. `dW[m, i, j]` is
/// the dot product of that slice with the padded-input values visited at
/// kernel offset `(i, j)` across all output positions.
pub fn parameter_gradients(
    input: &[f32],
    grad_output: &[f32],
    grad_biases: &mut [f32],
    grad_weights: &mut [f32],
    cc: &ConvConfig,
) {
    let map = cc.map_size();
    let kernel = cc.kernel_size();
    let width = cc.padded_width();
    let padded = padded_input(input, cc);

    for (m, slice) in grad_output.chunks_exact(map).take(cc.filter_count).enumerate() {
        grad_biases[m] = slice.iter().sum();

        let filter_grad = &mut grad_weights[m * kernel..(m + 1) * kernel];
        for i in 0..cc.filter_height {
            for j in 0..cc.filter_width {
                let mut acc = 0.0f32;
                for k in 0..cc.output_height {
                    let row = (k * cc.stride + i) * width + j;
                    for l in 0..cc.output_width {
                        acc += padded[row + l * cc.stride] * slice[k * cc.output_width + l];
                    }
                }
                filter_grad[i * cc.filter_width + j] = acc;
            }
        }
    }
}

/// Input gradient: scatters every output gradient back through its filter
/// onto the receptive field it came from, then drops the padding border.
pub fn input_gradient(weights: &[f32], grad_output: &[f32], grad_input: &mut [f32], cc: &ConvConfig) {
    let map = cc.map_size();
    let kernel = cc.kernel_size();
    let width = cc.padded_width();
    let mut padded_grad = vec![0.0f32; cc.padded_height() * width];

    for (slice, filter) in grad_output
        .chunks_exact(map)
        .zip(weights.chunks_exact(kernel))
        .take(cc.filter_count)
    {
        for r in 0..cc.output_height {
            for c in 0..cc.output_width {
                let g = slice[r * cc.output_width + c];
                for k in 0..cc.filter_height {
                    let dst = (r * cc.stride + k) * width + c * cc.stride;
                    let taps = &filter[k * cc.filter_width..(k + 1) * cc.filter_width];
                    for (cell, &w) in padded_grad[dst..dst + cc.filter_width].iter_mut().zip(taps) {
                        *cell += g * w;
                    }
                }
            }
        }
    }

    for (r, row) in grad_input
        .chunks_exact_mut(cc.input_width)
        .take(cc.input_height)
        .enumerate()
    {
        let start = (r + cc.pad) * width + cc.pad;
        row.copy_from_slice(&padded_grad[start..start + cc.input_width]);
    }
}

/// Full backward pass: parameter gradients always, the input gradient only
/// when `position >= 2`.
///
/// # Arguments
///
/// * `input` - The image the forward pass consumed
/// * `weights` - Current kernels, read only for the input gradient
/// * `grad_output` - Upstream gradient, one slice per filter map
/// * `grad_biases`, `grad_weights` - Overwritten with `dB` and `dW`
/// * `grad_input` - Overwritten with `dX` at position 2 or later, untouched otherwise
/// * `position` - 1-based index of the layer in the network
#[allow(clippy::too_many_arguments)]
pub fn backward(
    input: &[f32],
    weights: &[f32],
    grad_output: &[f32],
    grad_biases: &mut [f32],
    grad_weights: &mut [f32],
    grad_input: &mut [f32],
    cc: &ConvConfig,
    position: usize,
) {
    parameter_gradients(input, grad_output, grad_biases, grad_weights, cc);
    if position >= 2 {
        input_gradient(weights, grad_output, grad_input, cc);
    }
}

/// Convolution layer stage.
///
/// A `FirstConvolution` never propagates to its input, wherever it sits.
#[derive(Debug, Clone, Copy)]
pub struct Convolution {
    config: ConvConfig,
    first: bool,
}

impl Convolution {
    pub fn new(config: ConvConfig) -> Self {
        Self {
            config,
            first: false,
        }
    }

    /// The first-layer variant, which never computes an input gradient.
    pub fn first(config: ConvConfig) -> Self {
        Self {
            config,
            first: true,
        }
    }

    pub fn config(&self) -> &ConvConfig {
        &self.config
    }
}

impl Layer for Convolution {
    fn kind(&self) -> LayerKind {
        if self.first {
            LayerKind::FirstConvolution
        } else {
            LayerKind::Convolution
        }
    }

    fn forward(&self, input: &[f32], params: &Parameters, output: &mut [f32]) {
        forward(input, &params.weights, &params.biases, output, &self.config);
    }

    fn backward(&self, pass: BackwardPass<'_>, grads: &mut Parameters, grad_input: &mut [f32]) {
        parameter_gradients(
            pass.input,
            pass.grad_output,
            &mut grads.biases,
            &mut grads.weights,
            &self.config,
        );
        if !self.first && pass.needs_input_gradient() {
            input_gradient(&pass.params.weights, pass.grad_output, grad_input, &self.config);
        }
    }
}
