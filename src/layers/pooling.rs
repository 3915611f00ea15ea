//! Spatial pooling layer
//!
//! Max or average pooling applied to every feature map independently, with a
//! `pool_height × pool_width` window moved by `stride` and no padding.

use crate::architecture::LayerKind;
use crate::layers::{BackwardPass, Layer, Parameters};

/// Reduction applied to each pooling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolType {
    #[default]
    Max,
    Average,
}

impl PoolType {
    /// `"Max"` selects max pooling; every other value selects averaging.
    pub fn from_config_value(value: &str) -> Self {
        if value == "Max" {
            PoolType::Max
        } else {
            PoolType::Average
        }
    }
}

/// Geometry of a pooling layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolConfig {
    pub pool_height: usize,
    pub pool_width: usize,
    pub stride: usize,
    pub pool_type: PoolType,
    pub filter_count: usize,
    pub input_height: usize,
    pub input_width: usize,
    pub output_height: usize,
    pub output_width: usize,
}

impl PoolConfig {
    /// Builds a config with output shape `(input - pool) / stride + 1`.
    ///
    /// Returns `None` when the stride is zero, the window does not fit, or
    /// the maps overflow `usize`.
    pub fn new(
        pool_height: usize,
        pool_width: usize,
        stride: usize,
        pool_type: PoolType,
        filter_count: usize,
        input_height: usize,
        input_width: usize,
    ) -> Option<Self> {
        if stride == 0
            || pool_height == 0
            || pool_width == 0
            || pool_height > input_height
            || pool_width > input_width
        {
            return None;
        }
        let pc = Self {
            pool_height,
            pool_width,
            stride,
            pool_type,
            filter_count,
            input_height,
            input_width,
            output_height: (input_height - pool_height) / stride + 1,
            output_width: (input_width - pool_width) / stride + 1,
        };
        input_height.checked_mul(input_width)?.checked_mul(filter_count)?;
        pool_height.checked_mul(pool_width)?;
        Some(pc)
    }

    pub fn window_size(&self) -> usize {
        self.pool_height * self.pool_width
    }

    pub fn input_map_size(&self) -> usize {
        self.input_height * self.input_width
    }

    pub fn output_map_size(&self) -> usize {
        self.output_height * self.output_width
    }

    pub fn output_size(&self) -> usize {
        self.output_map_size() * self.filter_count
    }

    /// Flat offset (within one map) of window cell `(k, l)` for output `(r, c)`.
    fn cell(&self, r: usize, c: usize, k: usize, l: usize) -> usize {
        (r * self.stride + k) * self.input_width + c * self.stride + l
    }

    /// Offset of the first maximum in the window, scanning row by row.
    fn argmax(&self, map: &[f32], r: usize, c: usize) -> usize {
        let mut best = self.cell(r, c, 0, 0);
        for k in 0..self.pool_height {
            for l in 0..self.pool_width {
                let idx = self.cell(r, c, k, l);
                if map[idx] > map[best] {
                    best = idx;
                }
            }
        }
        best
    }
}

/// Forward pooling: one output per window, per feature map.
///
/// `input` holds `filter_count` maps of `input_height × input_width` values
/// back to back; `output` receives the pooled maps in the same order.
pub fn forward(input: &[f32], output: &mut [f32], pc: &PoolConfig) {
    debug_assert_eq!(output.len(), pc.output_size(), "pooling output size mismatch");
    let window = pc.window_size() as f32;

    for (map, out_map) in input
        .chunks_exact(pc.input_map_size())
        .zip(output.chunks_exact_mut(pc.output_map_size()))
        .take(pc.filter_count)
    {
        for r in 0..pc.output_height {
            for c in 0..pc.output_width {
                out_map[r * pc.output_width + c] = match pc.pool_type {
                    PoolType::Max => map[pc.argmax(map, r, c)],
                    PoolType::Average => {
                        let mut sum = 0.0f32;
                        for k in 0..pc.pool_height {
                            for l in 0..pc.pool_width {
                                sum += map[pc.cell(r, c, k, l)];
                            }
                        }
                        sum / window
                    }
                };
            }
        }
    }
}

/// Backward pooling.
///
/// Max: the whole upstream gradient goes to the first maximum of each window.
/// Average: it is spread evenly, `dZ / (pool_height · pool_width)` per cell.
/// Cells outside every window get zero; overlapping windows add up.
///
/// # Arguments
///
/// * `grad_output` - Upstream gradient, [`PoolConfig::output_size`] values
/// * `grad_input` - Overwritten with the routed gradient, one map per filter
/// * `input` - The maps the forward pass consumed, used to find each maximum
/// * `pc` - Layer geometry
///
/// # Example
///
/// ```
/// use mountain_lake_nn::layers::{pooling, PoolConfig, PoolType};
///
/// let pc = PoolConfig::new(2, 2, 2, PoolType::Max, 1, 2, 2).unwrap();
/// let input = [0.1, 0.9, 0.4, 0.9];
/// let mut grad_input = [0.0; 4];
///
/// pooling::backward(&[2.0], &mut grad_input, &input, &pc);
/// assert_eq!(grad_input, [0.0, 2.0, 0.0, 0.0]);
/// ```
pub fn backward(grad_output: &[f32], grad_input: &mut [f32], input: &[f32], pc: &PoolConfig) {
    let window = pc.window_size() as f32;

    for ((map, grad_map), grad_out_map) in input
        .chunks_exact(pc.input_map_size())
        .zip(grad_input.chunks_exact_mut(pc.input_map_size()))
        .zip(grad_output.chunks_exact(pc.output_map_size()))
        .take(pc.filter_count)
    {
        grad_map.fill(0.0);
        for r in 0..pc.output_height {
            for c in 0..pc.output_width {
                let g = grad_out_map[r * pc.output_width + c];
                match pc.pool_type {
                    PoolType::Max => grad_map[pc.argmax(map, r, c)] += g,
                    PoolType::Average => {
                        let share = g / window;
                        for k in 0..pc.pool_height {
                            for l in 0..pc.pool_width {
                                grad_map[pc.cell(r, c, k, l)] += share;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Pooling layer stage.
#[derive(Debug, Clone, Copy)]
pub struct Pooling {
    config: PoolConfig,
}

impl Pooling {
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl Layer for Pooling {
    fn kind(&self) -> LayerKind {
        LayerKind::Pooling
    }

    fn forward(&self, input: &[f32], _params: &Parameters, output: &mut [f32]) {
        forward(input, output, &self.config);
    }

    fn backward(&self, pass: BackwardPass<'_>, _grads: &mut Parameters, grad_input: &mut [f32]) {
        backward(pass.grad_output, grad_input, pass.input, &self.config);
    }
}
