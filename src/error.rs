//! Error types for network construction and training.
//!
//! Configuration and allocation failures abort initialisation. The remaining
//! variants are runtime checks on data handed to an initialised network.

use thiserror::Error;

/// Everything that can go wrong while building or driving a [`NeuralNetwork`].
///
/// [`NeuralNetwork`]: crate::network::NeuralNetwork
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("undefined \"neural_network.struct\"")]
    UndefinedStructure,

    #[error("there are no layers defined in the neural network structure")]
    EmptyStructure,

    #[error("unknown layer type '{0}'")]
    UnknownLayerType(String),

    #[error("layer configuration is incomplete: missing '{key}'")]
    MissingKey { key: String },

    #[error("invalid value '{value}' for '{key}'")]
    InvalidValue { key: String, value: String },

    #[error("layer '{0}' requires an explicit output size (e.g. '{0}:10')")]
    MissingOutputSize(String),

    #[error("'{name}' must be the last layer (found at position {position} of {layers})")]
    MisplacedLossLayer {
        name: String,
        position: usize,
        layers: usize,
    },

    #[error("invalid geometry for layer '{name}': {reason}")]
    InvalidGeometry { name: String, reason: String },

    #[error("memory allocation failed for {count} values of layer '{name}'")]
    Allocation { name: String, count: usize },

    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("label {label} is out of range for {classes} classes")]
    LabelOutOfRange { label: usize, classes: usize },

    #[error("example index {index} is out of range ({count} examples)")]
    ExampleOutOfRange { index: usize, count: usize },

    #[error("network has no terminal SoftmaxWithLoss layer")]
    MissingLossLayer,

    #[error("no supervision label has been loaded")]
    MissingLabel,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NetworkError>;
