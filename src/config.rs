//! Configuration structures for network construction
//!
//! A network is described by a JSON document with one `neural_network` section
//! holding the ordered layer structure and training settings, plus one section
//! per named convolution or pooling layer holding that layer's geometry.
//! In dotted-key terms, `neural_network.struct` lives at
//! `{"neural_network": {"struct": [...]}}` and `Convolution-1.pad` at
//! `{"Convolution-1": {"pad": 0}}`.

use crate::error::{NetworkError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Learning rate used when `neural_network.learning_rate` is not set.
pub const DEFAULT_LEARNING_RATE: f32 = 0.01;

/// Top-level network configuration.
///
/// # Example
///
/// ```json
/// {
///   "neural_network": {
///     "struct": ["Convolution-1", "ReLU", "Pooling-1", "Affine:10", "SoftmaxWithLoss"],
///     "learning_rate": 0.01
///   },
///   "Convolution-1": {
///     "pad": 0, "stride": 1, "filter_num": 8,
///     "filter_height": 5, "filter_width": 5, "channel_num": 1
///   },
///   "Pooling-1": {
///     "pool_height": 2, "pool_width": 2, "stride": 2, "type": "Max", "filter_num": 8
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkConfig {
    /// Global settings (`neural_network.*`)
    pub neural_network: Option<NetworkSection>,

    /// Per-layer sections keyed by layer name (`<name>.*`)
    #[serde(flatten)]
    pub sections: HashMap<String, LayerSection>,
}

/// The `neural_network` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkSection {
    /// Ordered layer declarations, e.g. `"Affine:5"`, `"Convolution-1"`
    #[serde(rename = "struct")]
    pub structure: Option<Vec<String>>,

    /// Step size for plain SGD updates
    pub learning_rate: Option<f32>,
}

/// Geometry keys of one convolution or pooling layer.
///
/// Convolution layers read `pad`, `stride`, `filter_num`, `filter_height`,
/// `filter_width` and `channel_num`. Pooling layers read `pool_height`,
/// `pool_width`, `stride`, `type` and `filter_num`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LayerSection {
    pub pad: Option<usize>,
    pub stride: Option<usize>,
    pub filter_num: Option<usize>,
    pub filter_height: Option<usize>,
    pub filter_width: Option<usize>,
    pub channel_num: Option<usize>,
    pub pool_height: Option<usize>,
    pub pool_width: Option<usize>,
    /// `"Max"` selects max pooling; any other value selects average pooling
    #[serde(rename = "type")]
    pub pool_type: Option<String>,
}

impl NetworkConfig {
    /// Parses and validates a configuration from a JSON string.
    pub fn from_json_str(contents: &str) -> Result<Self> {
        let config: NetworkConfig = serde_json::from_str(contents)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// The declared layer structure (`neural_network.struct`), if any.
    pub fn structure(&self) -> Option<&[String]> {
        self.neural_network
            .as_ref()
            .and_then(|nn| nn.structure.as_deref())
    }

    /// The configured learning rate, or [`DEFAULT_LEARNING_RATE`].
    pub fn learning_rate(&self) -> f32 {
        self.neural_network
            .as_ref()
            .and_then(|nn| nn.learning_rate)
            .unwrap_or(DEFAULT_LEARNING_RATE)
    }

    /// The section for a named layer, if one was written.
    pub fn section(&self, name: &str) -> Option<&LayerSection> {
        self.sections.get(name)
    }

    /// Looks up a required integer key `<name>.<key>`.
    ///
    /// `field` projects the key out of the layer's section.
    pub fn require_usize(
        &self,
        name: &str,
        key: &str,
        field: impl Fn(&LayerSection) -> Option<usize>,
    ) -> Result<usize> {
        self.section(name)
            .and_then(field)
            .ok_or_else(|| NetworkError::MissingKey {
                key: format!("{}.{}", name, key),
            })
    }

    /// Looks up a required string key `<name>.<key>`.
    pub fn require_str<'a>(
        &'a self,
        name: &str,
        key: &str,
        field: impl Fn(&'a LayerSection) -> Option<&'a str>,
    ) -> Result<&'a str> {
        self.section(name)
            .and_then(field)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| NetworkError::MissingKey {
                key: format!("{}.{}", name, key),
            })
    }
}

/// Loads a network configuration from a JSON file.
///
/// Reads the file at `path`, deserializes it into a [`NetworkConfig`] and
/// validates the global settings. Per-layer keys are checked later, when the
/// structure is turned into layers.
///
/// # Examples
///
/// ```no_run
/// use mountain_lake_nn::config::load_config;
///
/// let cfg = load_config("config/mlp.json").unwrap();
/// assert!(cfg.structure().is_some());
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<NetworkConfig> {
    let contents = fs::read_to_string(path)?;
    NetworkConfig::from_json_str(&contents)
}

fn validate_config(config: &NetworkConfig) -> Result<()> {
    if let Some(rate) = config.neural_network.as_ref().and_then(|nn| nn.learning_rate) {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(NetworkError::InvalidValue {
                key: "neural_network.learning_rate".to_string(),
                value: rate.to_string(),
            });
        }
    }

    for (name, section) in &config.sections {
        if section.stride == Some(0) {
            return Err(NetworkError::InvalidValue {
                key: format!("{}.stride", name),
                value: "0".to_string(),
            });
        }
    }

    Ok(())
}
