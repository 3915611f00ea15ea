//! Network architecture: structure parsing and shape inference
//!
//! Turns the ordered `neural_network.struct` entries into layer specs, then
//! walks them front to back, deriving every layer's output shape from the
//! previous layer and the layer's own configuration section.

use crate::config::NetworkConfig;
use crate::error::{NetworkError, Result};
use crate::layers::{
    Affine, ConvConfig, Convolution, Layer, MatMul, PoolConfig, PoolType, Pooling, Relu, Sigmoid,
};
use log::debug;
use std::fmt;
use std::str::FromStr;

/// Type tag of a network stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Virtual layer 0 holding the raw example
    Input,
    Affine,
    MatMul,
    Convolution,
    FirstConvolution,
    Pooling,
    Relu,
    Sigmoid,
    SoftmaxWithLoss,
}

impl LayerKind {
    /// The token used for this kind in structure declarations.
    pub fn token(&self) -> &'static str {
        match self {
            LayerKind::Input => "Input",
            LayerKind::Affine => "Affine",
            LayerKind::MatMul => "MatMul",
            LayerKind::Convolution => "Convolution",
            LayerKind::FirstConvolution => "FirstConvolution",
            LayerKind::Pooling => "Pooling",
            LayerKind::Relu => "ReLU",
            LayerKind::Sigmoid => "Sigmoid",
            LayerKind::SoftmaxWithLoss => "SoftmaxWithLoss",
        }
    }

    /// Whether the layer owns weights and biases.
    pub fn has_parameters(&self) -> bool {
        matches!(
            self,
            LayerKind::Affine
                | LayerKind::MatMul
                | LayerKind::Convolution
                | LayerKind::FirstConvolution
        )
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for LayerKind {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Affine" => Ok(LayerKind::Affine),
            "MatMul" => Ok(LayerKind::MatMul),
            "Convolution" => Ok(LayerKind::Convolution),
            "FirstConvolution" => Ok(LayerKind::FirstConvolution),
            "Pooling" => Ok(LayerKind::Pooling),
            "ReLU" => Ok(LayerKind::Relu),
            "Sigmoid" => Ok(LayerKind::Sigmoid),
            "SoftmaxWithLoss" => Ok(LayerKind::SoftmaxWithLoss),
            other => Err(NetworkError::UnknownLayerType(other.to_string())),
        }
    }
}

/// One parsed structure entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSpec {
    pub kind: LayerKind,
    /// Name used to look up the layer's configuration section
    pub name: String,
    /// Explicit output size from a `:N` suffix
    pub declared_output_size: Option<usize>,
}

impl FromStr for LayerSpec {
    type Err = NetworkError;

    /// Parses `Type[-variant][:size]`, e.g. `Affine:10` or `Convolution-1`.
    fn from_str(entry: &str) -> Result<Self> {
        let entry = entry.trim();
        let (name, declared_output_size) = match entry.split_once(':') {
            Some((name, size)) => {
                let size = size
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| NetworkError::InvalidValue {
                        key: "neural_network.struct".to_string(),
                        value: entry.to_string(),
                    })?;
                (name.trim(), Some(size))
            }
            None => (entry, None),
        };
        let type_token = name.split_once('-').map_or(name, |(token, _)| token);
        Ok(Self {
            kind: type_token.parse()?,
            name: name.to_string(),
            declared_output_size,
        })
    }
}

/// Parses the whole structure declaration.
///
/// Fails when the declaration is empty, contains an unknown type, or places
/// `SoftmaxWithLoss` anywhere but last.
pub fn parse_structure(entries: &[String]) -> Result<Vec<LayerSpec>> {
    if entries.is_empty() || (entries.len() == 1 && entries[0].trim().is_empty()) {
        return Err(NetworkError::EmptyStructure);
    }

    let specs = entries
        .iter()
        .map(|entry| entry.parse::<LayerSpec>())
        .collect::<Result<Vec<_>>>()?;

    for (i, spec) in specs.iter().enumerate() {
        if spec.kind == LayerKind::SoftmaxWithLoss && i + 1 != specs.len() {
            return Err(NetworkError::MisplacedLossLayer {
                name: spec.name.clone(),
                position: i + 1,
                layers: specs.len(),
            });
        }
    }

    Ok(specs)
}

/// Inferred shape of one layer's output.
///
/// For every layer past the input,
/// `output_size == output_height * output_width * (filter count or 1)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptor {
    pub kind: LayerKind,
    pub name: String,
    pub output_height: usize,
    pub output_width: usize,
    pub output_size: usize,
}

impl LayerDescriptor {
    /// Descriptor of the virtual input layer for `rows × cols` examples.
    pub fn input(rows: usize, cols: usize) -> Self {
        Self {
            kind: LayerKind::Input,
            name: "Input".to_string(),
            output_height: rows,
            output_width: cols,
            output_size: rows * cols,
        }
    }
}

/// What the network should run at one position.
pub enum Stage {
    Input,
    Compute(Box<dyn Layer>),
    Loss,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Input => f.write_str("Input"),
            Stage::Compute(layer) => write!(f, "Compute({})", layer.kind()),
            Stage::Loss => f.write_str("Loss"),
        }
    }
}

/// A fully shaped layer, ready for buffer allocation.
#[derive(Debug)]
pub struct LayerPlan {
    pub descriptor: LayerDescriptor,
    pub stage: Stage,
    /// Number of weights to draw from `Normal(0, 0.01)`
    pub weight_count: usize,
    /// Number of zero-initialised biases
    pub bias_count: usize,
}

/// Builds the plan for the whole network, input layer first.
///
/// `rows × cols` is the shape of one training example.
pub fn plan_network(config: &NetworkConfig, rows: usize, cols: usize) -> Result<Vec<LayerPlan>> {
    let entries = config.structure().ok_or(NetworkError::UndefinedStructure)?;
    let specs = parse_structure(entries)?;

    let mut plans = Vec::with_capacity(specs.len() + 1);
    plans.push(LayerPlan {
        descriptor: LayerDescriptor::input(rows, cols),
        stage: Stage::Input,
        weight_count: 0,
        bias_count: 0,
    });

    for spec in &specs {
        let prev = &plans[plans.len() - 1].descriptor;
        let plan = plan_layer(config, spec, prev)?;
        debug!(
            "layer {} '{}': {}x{} -> {} values, {} weights, {} biases",
            plans.len(),
            plan.descriptor.name,
            plan.descriptor.output_height,
            plan.descriptor.output_width,
            plan.descriptor.output_size,
            plan.weight_count,
            plan.bias_count
        );
        plans.push(plan);
    }

    Ok(plans)
}

fn plan_layer(config: &NetworkConfig, spec: &LayerSpec, prev: &LayerDescriptor) -> Result<LayerPlan> {
    match spec.kind {
        LayerKind::Affine | LayerKind::MatMul => plan_linear(spec, prev),
        LayerKind::Convolution | LayerKind::FirstConvolution => plan_convolution(config, spec, prev),
        LayerKind::Pooling => plan_pooling(config, spec, prev),
        LayerKind::Relu | LayerKind::Sigmoid => {
            let stage: Box<dyn Layer> = if spec.kind == LayerKind::Relu {
                Box::new(Relu)
            } else {
                Box::new(Sigmoid)
            };
            Ok(LayerPlan {
                descriptor: LayerDescriptor {
                    kind: spec.kind,
                    name: spec.name.clone(),
                    ..prev.clone()
                },
                stage: Stage::Compute(stage),
                weight_count: 0,
                bias_count: 0,
            })
        }
        LayerKind::SoftmaxWithLoss => Ok(LayerPlan {
            descriptor: LayerDescriptor {
                kind: spec.kind,
                name: spec.name.clone(),
                output_height: 1,
                output_width: 1,
                output_size: 1,
            },
            stage: Stage::Loss,
            weight_count: 0,
            bias_count: 0,
        }),
        LayerKind::Input => Err(NetworkError::UnknownLayerType(spec.name.clone())),
    }
}

fn plan_linear(spec: &LayerSpec, prev: &LayerDescriptor) -> Result<LayerPlan> {
    let outputs = spec
        .declared_output_size
        .filter(|&size| size > 0)
        .ok_or_else(|| NetworkError::MissingOutputSize(spec.name.clone()))?;
    let weight_count = prev
        .output_size
        .checked_mul(outputs)
        .ok_or_else(|| NetworkError::InvalidGeometry {
            name: spec.name.clone(),
            reason: format!(
                "{} x {} weights overflow the addressable size",
                prev.output_size, outputs
            ),
        })?;
    let (stage, bias_count): (Box<dyn Layer>, usize) = match spec.kind {
        LayerKind::MatMul => (Box::new(MatMul), 0),
        _ => (Box::new(Affine), outputs),
    };
    Ok(LayerPlan {
        descriptor: LayerDescriptor {
            kind: spec.kind,
            name: spec.name.clone(),
            output_height: 1,
            output_width: outputs,
            output_size: outputs,
        },
        stage: Stage::Compute(stage),
        weight_count,
        bias_count,
    })
}

fn plan_convolution(
    config: &NetworkConfig,
    spec: &LayerSpec,
    prev: &LayerDescriptor,
) -> Result<LayerPlan> {
    let name = spec.name.as_str();
    let pad = config.require_usize(name, "pad", |s| s.pad)?;
    let stride = config.require_usize(name, "stride", |s| s.stride)?;
    let filter_count = config.require_usize(name, "filter_num", |s| s.filter_num)?;
    let filter_height = config.require_usize(name, "filter_height", |s| s.filter_height)?;
    let filter_width = config.require_usize(name, "filter_width", |s| s.filter_width)?;
    let channel_count = config.require_usize(name, "channel_num", |s| s.channel_num)?;

    if channel_count != 1 {
        return Err(NetworkError::InvalidGeometry {
            name: spec.name.clone(),
            reason: format!("channel_num is {}, only single-channel input is supported", channel_count),
        });
    }
    check_input_maps(spec, prev, channel_count)?;

    let cc = ConvConfig::new(
        pad,
        stride,
        filter_height,
        filter_width,
        filter_count,
        channel_count,
        prev.output_height,
        prev.output_width,
    )
    .ok_or_else(|| NetworkError::InvalidGeometry {
        name: spec.name.clone(),
        reason: format!(
            "{}x{} filter with stride {} and pad {} does not fit a {}x{} input with {} filters",
            filter_height, filter_width, stride, pad, prev.output_height, prev.output_width, filter_count
        ),
    })?;

    let stage = if spec.kind == LayerKind::FirstConvolution {
        Convolution::first(cc)
    } else {
        Convolution::new(cc)
    };
    Ok(LayerPlan {
        descriptor: LayerDescriptor {
            kind: spec.kind,
            name: spec.name.clone(),
            output_height: cc.output_height,
            output_width: cc.output_width,
            output_size: cc.output_size(),
        },
        stage: Stage::Compute(Box::new(stage)),
        weight_count: filter_count * cc.kernel_size(),
        bias_count: filter_count,
    })
}

/// Checks that the previous output is exactly `maps` feature maps of
/// `output_height × output_width` values.
fn check_input_maps(spec: &LayerSpec, prev: &LayerDescriptor, maps: usize) -> Result<()> {
    let expected = prev
        .output_height
        .checked_mul(prev.output_width)
        .and_then(|map| map.checked_mul(maps));
    if expected != Some(prev.output_size) {
        return Err(NetworkError::InvalidGeometry {
            name: spec.name.clone(),
            reason: format!(
                "expects {} maps of {}x{} but the previous layer '{}' produces {} values",
                maps, prev.output_height, prev.output_width, prev.name, prev.output_size
            ),
        });
    }
    Ok(())
}

fn plan_pooling(config: &NetworkConfig, spec: &LayerSpec, prev: &LayerDescriptor) -> Result<LayerPlan> {
    let name = spec.name.as_str();
    let pool_height = config.require_usize(name, "pool_height", |s| s.pool_height)?;
    let pool_width = config.require_usize(name, "pool_width", |s| s.pool_width)?;
    let stride = config.require_usize(name, "stride", |s| s.stride)?;
    let pool_type = config.require_str(name, "type", |s| s.pool_type.as_deref())?;
    let filter_count = config.require_usize(name, "filter_num", |s| s.filter_num)?;
    check_input_maps(spec, prev, filter_count)?;

    let pc = PoolConfig::new(
        pool_height,
        pool_width,
        stride,
        PoolType::from_config_value(pool_type),
        filter_count,
        prev.output_height,
        prev.output_width,
    )
    .ok_or_else(|| NetworkError::InvalidGeometry {
        name: spec.name.clone(),
        reason: format!(
            "{}x{} window with stride {} does not fit a {}x{} input",
            pool_height, pool_width, stride, prev.output_height, prev.output_width
        ),
    })?;

    Ok(LayerPlan {
        descriptor: LayerDescriptor {
            kind: spec.kind,
            name: spec.name.clone(),
            output_height: pc.output_height,
            output_width: pc.output_width,
            output_size: pc.output_size(),
        },
        stage: Stage::Compute(Box::new(Pooling::new(pc))),
        weight_count: 0,
        bias_count: 0,
    })
}
