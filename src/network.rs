//! Network orchestrator
//!
//! Owns every per-layer buffer (parameters, gradients, outputs and output
//! gradients) in one ordered arena indexed by layer position, with position 0
//! holding a copy of the current example. Layers only ever see borrowed
//! slices of these buffers for the duration of a call.

use crate::architecture::{plan_network, LayerDescriptor, LayerKind, LayerPlan, Stage};
use crate::config::{load_config, NetworkConfig};
use crate::dataset::{Dataset, Split};
use crate::error::{NetworkError, Result};
use crate::layers::{BackwardPass, Parameters, SoftmaxWithLoss};
use crate::optimizers::{Optimizer, SGD};
use crate::utils::activations::argmax;
use crate::utils::rng::{SimpleRng, WeightInit};
use log::{debug, info};
use std::path::Path;

/// Mean of the normal distribution weights are drawn from.
pub const WEIGHT_INIT_MEAN: f32 = 0.0;
/// Standard deviation of the normal distribution weights are drawn from.
pub const WEIGHT_INIT_STD_DEV: f32 = 0.01;

/// Per-layer state.
struct LayerNode {
    descriptor: LayerDescriptor,
    stage: Stage,
    params: Parameters,
    grads: Parameters,
    output: Vec<f32>,
    grad_output: Vec<f32>,
}

impl LayerNode {
    fn allocate<R: WeightInit + ?Sized>(plan: LayerPlan, init: &mut R) -> Result<Self> {
        let name = plan.descriptor.name.as_str();
        let mut weights = zeroed(name, plan.weight_count)?;
        init.fill_normal(&mut weights, WEIGHT_INIT_MEAN, WEIGHT_INIT_STD_DEV);
        let params = Parameters::new(weights, zeroed(name, plan.bias_count)?);
        let grads = Parameters::new(
            zeroed(name, plan.weight_count)?,
            zeroed(name, plan.bias_count)?,
        );
        let output = zeroed(name, plan.descriptor.output_size)?;
        let grad_output = zeroed(name, plan.descriptor.output_size)?;

        Ok(Self {
            descriptor: plan.descriptor,
            stage: plan.stage,
            params,
            grads,
            output,
            grad_output,
        })
    }
}

/// A zero-filled buffer, reporting allocation failure instead of aborting.
fn zeroed(name: &str, count: usize) -> Result<Vec<f32>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(count)
        .map_err(|_| NetworkError::Allocation {
            name: name.to_string(),
            count,
        })?;
    buffer.resize(count, 0.0);
    Ok(buffer)
}

/// Training and test accuracy, as fractions in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyReport {
    pub train: f32,
    pub test: f32,
}

impl AccuracyReport {
    /// `train,test` line for a CSV training log.
    pub fn csv_row(&self) -> String {
        format!("{:.6},{:.6}", self.train, self.test)
    }
}

/// Feed-forward network trained one example at a time with plain SGD.
///
/// Layer 0 is the virtual input layer; layers `1..=L` follow the declared
/// structure. When the last layer is `SoftmaxWithLoss`, [`predict`] stops
/// before it and [`forward`] finishes with it.
///
/// [`predict`]: NeuralNetwork::predict
/// [`forward`]: NeuralNetwork::forward
pub struct NeuralNetwork {
    nodes: Vec<LayerNode>,
    dataset: Dataset,
    optimizer: SGD,
    loss_layer: SoftmaxWithLoss,
    probabilities: Vec<f32>,
    label: Option<usize>,
    loss: f32,
}

impl NeuralNetwork {
    /// Builds a network from a configuration and a training corpus.
    ///
    /// Shapes are inferred from the corpus' example size; weights are drawn
    /// from `Normal(0, 0.01)` through `init`, everything else starts at zero.
    ///
    /// # Arguments
    ///
    /// * `config` - Parsed configuration holding the layer structure
    /// * `dataset` - Corpus whose example shape fixes the input layer
    /// * `init` - Source of the initial weights
    ///
    /// # Example
    ///
    /// ```
    /// use mountain_lake_nn::utils::SimpleRng;
    /// use mountain_lake_nn::{Dataset, NetworkConfig, NeuralNetwork};
    ///
    /// let config = NetworkConfig::from_json_str(
    ///     r#"{ "neural_network": { "struct": ["Affine:4", "ReLU", "Affine:3", "SoftmaxWithLoss"] } }"#,
    /// )
    /// .unwrap();
    /// let dataset = Dataset::new(2, 2, vec![0.0; 4], vec![1], vec![], vec![]).unwrap();
    /// let nn = NeuralNetwork::new(&config, dataset, &mut SimpleRng::new(7)).unwrap();
    ///
    /// assert_eq!(nn.layer_count(), 4);
    /// assert_eq!(nn.parameter_count(), 4 * 4 + 4 + 4 * 3 + 3);
    /// ```
    pub fn new<R: WeightInit + ?Sized>(
        config: &NetworkConfig,
        dataset: Dataset,
        init: &mut R,
    ) -> Result<Self> {
        let plans = plan_network(config, dataset.rows(), dataset.cols())?;
        let nodes = plans
            .into_iter()
            .map(|plan| LayerNode::allocate(plan, init))
            .collect::<Result<Vec<_>>>()?;

        let probabilities = match nodes.last() {
            Some(last) if matches!(last.stage, Stage::Loss) => {
                let logits = &nodes[nodes.len() - 2].descriptor;
                zeroed(&last.descriptor.name, logits.output_size)?
            }
            _ => Vec::new(),
        };

        let network = Self {
            nodes,
            dataset,
            optimizer: SGD::new(config.learning_rate()),
            loss_layer: SoftmaxWithLoss,
            probabilities,
            label: None,
            loss: 0.0,
        };
        info!(
            "initialised network: {} layers, {} parameters, learning rate {}",
            network.layer_count(),
            network.parameter_count(),
            network.learning_rate()
        );
        Ok(network)
    }

    /// Loads the configuration at `path` and builds a network whose weights
    /// are seeded from `seed`.
    pub fn from_config_file<P: AsRef<Path>>(path: P, dataset: Dataset, seed: u64) -> Result<Self> {
        let config = load_config(path)?;
        let mut rng = SimpleRng::new(seed);
        Self::new(&config, dataset, &mut rng)
    }

    /// Number of declared layers, excluding the input layer.
    pub fn layer_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Descriptor of the layer at `index` (0 is the input layer).
    pub fn layer(&self, index: usize) -> Option<&LayerDescriptor> {
        self.nodes.get(index).map(|node| &node.descriptor)
    }

    pub fn parameters(&self, index: usize) -> Option<&Parameters> {
        self.nodes.get(index).map(|node| &node.params)
    }

    /// Mutable access to a layer's parameters, e.g. to load known weights.
    ///
    /// Buffer lengths must not change.
    pub fn parameters_mut(&mut self, index: usize) -> Option<&mut Parameters> {
        self.nodes.get_mut(index).map(|node| &mut node.params)
    }

    pub fn gradients(&self, index: usize) -> Option<&Parameters> {
        self.nodes.get(index).map(|node| &node.grads)
    }

    pub fn output(&self, index: usize) -> Option<&[f32]> {
        self.nodes.get(index).map(|node| node.output.as_slice())
    }

    pub fn output_gradient(&self, index: usize) -> Option<&[f32]> {
        self.nodes.get(index).map(|node| node.grad_output.as_slice())
    }

    /// Softmax output of the most recent [`forward`](Self::forward).
    pub fn probabilities(&self) -> &[f32] {
        &self.probabilities
    }

    /// Loss of the most recent [`forward`](Self::forward).
    pub fn loss(&self) -> f32 {
        self.loss
    }

    pub fn label(&self) -> Option<usize> {
        self.label
    }

    pub fn learning_rate(&self) -> f32 {
        self.optimizer.learning_rate()
    }

    pub fn set_learning_rate(&mut self, rate: f32) {
        self.optimizer.set_learning_rate(rate);
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Total learnable scalars across all layers.
    pub fn parameter_count(&self) -> usize {
        self.nodes.iter().map(|node| node.params.len()).sum()
    }

    fn has_loss_layer(&self) -> bool {
        self.nodes
            .last()
            .is_some_and(|node| node.descriptor.kind == LayerKind::SoftmaxWithLoss)
    }

    /// Index of the last layer [`predict`](Self::predict) runs.
    fn last_compute_index(&self) -> usize {
        if self.has_loss_layer() {
            self.nodes.len() - 2
        } else {
            self.nodes.len() - 1
        }
    }

    fn check_label(&self, label: usize) -> Result<()> {
        if self.has_loss_layer() && label >= self.probabilities.len() {
            return Err(NetworkError::LabelOutOfRange {
                label,
                classes: self.probabilities.len(),
            });
        }
        Ok(())
    }

    /// Copies `example` into the input layer and records its label.
    ///
    /// The caller's buffer is never aliased. Both the example length and the
    /// label are checked before anything is written, so a rejected call
    /// leaves the previous input and label in place.
    ///
    /// # Arguments
    ///
    /// * `example` - One flattened `rows × cols` example
    /// * `label` - Supervision class, or `None` for prediction only
    ///
    /// # Errors
    ///
    /// [`NetworkError::ShapeMismatch`] for a wrongly sized example and
    /// [`NetworkError::LabelOutOfRange`] for a label beyond the class count.
    pub fn set_input(&mut self, example: &[f32], label: Option<usize>) -> Result<()> {
        let expected = self.nodes[0].output.len();
        if example.len() != expected {
            return Err(NetworkError::ShapeMismatch {
                what: "input example".to_string(),
                expected,
                actual: example.len(),
            });
        }
        if let Some(label) = label {
            self.check_label(label)?;
        }
        self.nodes[0].output.copy_from_slice(example);
        self.label = label;
        Ok(())
    }

    fn load_example(&mut self, split: Split, index: usize) -> Result<usize> {
        let (example, label) = self.dataset.example(split, index)?;
        self.nodes[0].output.copy_from_slice(example);
        Ok(label)
    }

    /// Runs every computing layer in order on the current input and returns
    /// the final (pre-loss) output.
    ///
    /// ```ignore
    /// nn.set_input(&image, None)?;
    /// let digit = argmax(nn.predict());
    /// ```
    pub fn predict(&mut self) -> &[f32] {
        let last = self.last_compute_index();
        for i in 1..=last {
            let (before, rest) = self.nodes.split_at_mut(i);
            let prev = &before[i - 1];
            let node = &mut rest[0];
            if let Stage::Compute(layer) = &node.stage {
                layer.forward(&prev.output, &node.params, &mut node.output);
            }
        }
        &self.nodes[last].output
    }

    /// [`predict`](Self::predict) followed by the softmax/cross-entropy layer.
    ///
    /// Requires a label from [`set_input`](Self::set_input) or
    /// [`gradient`](Self::gradient).
    pub fn forward(&mut self) -> Result<f32> {
        if !self.has_loss_layer() {
            return Err(NetworkError::MissingLossLayer);
        }
        let label = self.label.ok_or(NetworkError::MissingLabel)?;
        self.predict();

        let last = self.nodes.len() - 1;
        let logits = &self.nodes[last - 1].output;
        let loss = self
            .loss_layer
            .forward(label, logits, &mut self.probabilities);
        self.nodes[last].output[0] = loss;
        self.loss = loss;
        Ok(loss)
    }

    /// Backpropagates from the loss layer down to layer 1.
    ///
    /// Each layer writes its input gradient into the previous layer's
    /// output-gradient slot, which that layer reads on the next step.
    /// Parameter gradients are overwritten, not accumulated.
    ///
    /// # Errors
    ///
    /// [`NetworkError::MissingLabel`] before any input carried a label and
    /// [`NetworkError::MissingLossLayer`] without a terminal `SoftmaxWithLoss`.
    pub fn backward(&mut self) -> Result<()> {
        if !self.has_loss_layer() {
            return Err(NetworkError::MissingLossLayer);
        }
        let label = self.label.ok_or(NetworkError::MissingLabel)?;

        for i in (1..self.nodes.len()).rev() {
            let (before, rest) = self.nodes.split_at_mut(i);
            let prev = &mut before[i - 1];
            let node = &mut rest[0];
            match &node.stage {
                Stage::Loss => {
                    self.loss_layer
                        .backward(&self.probabilities, label, &mut prev.grad_output);
                }
                Stage::Compute(layer) => layer.backward(
                    BackwardPass {
                        input: &prev.output,
                        output: &node.output,
                        grad_output: &node.grad_output,
                        params: &node.params,
                        position: i,
                    },
                    &mut node.grads,
                    &mut prev.grad_output,
                ),
                Stage::Input => {}
            }
        }
        Ok(())
    }

    /// One SGD step: `W -= lr * dW`, `B -= lr * dB` for every layer with
    /// parameters.
    pub fn update(&mut self) {
        for node in self.nodes.iter_mut().skip(1) {
            if !node.descriptor.kind.has_parameters() {
                continue;
            }
            self.optimizer
                .update(&mut node.params.weights, &node.grads.weights);
            self.optimizer
                .update(&mut node.params.biases, &node.grads.biases);
        }
    }

    /// Loads training example `index`, then runs forward and backward.
    ///
    /// This is the unit of work a training loop repeats: afterwards every
    /// layer's gradient buffers describe this one example, ready for
    /// [`update`](Self::update).
    ///
    /// # Arguments
    ///
    /// * `index` - Position of the example in the training split
    ///
    /// # Returns
    ///
    /// The example's cross-entropy loss.
    ///
    /// # Errors
    ///
    /// [`NetworkError::ExampleOutOfRange`] and
    /// [`NetworkError::LabelOutOfRange`] are reported before the input layer
    /// is touched. [`NetworkError::MissingLossLayer`] when the structure does
    /// not end in `SoftmaxWithLoss`.
    ///
    /// # Example
    ///
    /// ```
    /// use mountain_lake_nn::utils::SimpleRng;
    /// use mountain_lake_nn::{Dataset, NetworkConfig, NeuralNetwork};
    ///
    /// let config = NetworkConfig::from_json_str(
    ///     r#"{ "neural_network": { "struct": ["Affine:3", "SoftmaxWithLoss"] } }"#,
    /// )
    /// .unwrap();
    /// let dataset = Dataset::new(1, 2, vec![0.5, 1.0], vec![2], vec![], vec![]).unwrap();
    /// let mut nn = NeuralNetwork::new(&config, dataset, &mut SimpleRng::new(1)).unwrap();
    ///
    /// let loss = nn.gradient(0).unwrap();
    /// nn.update();
    /// assert!(nn.gradient(0).unwrap() < loss);
    /// ```
    pub fn gradient(&mut self, index: usize) -> Result<f32> {
        let (_, label) = self.dataset.example(Split::Train, index)?;
        self.check_label(label)?;
        self.load_example(Split::Train, index)?;
        self.label = Some(label);
        let loss = self.forward()?;
        self.backward()?;
        Ok(loss)
    }

    /// One pass over the training examples in `order`, updating after every
    /// example.
    ///
    /// # Arguments
    ///
    /// * `order` - Training indices in visiting order, usually a shuffle
    ///
    /// # Returns
    ///
    /// The mean loss over `order`, or `0.0` when it is empty.
    pub fn train_epoch(&mut self, order: &[usize]) -> Result<f32> {
        let mut total = 0.0f32;
        for &index in order {
            total += self.gradient(index)?;
            self.update();
        }
        let mean = if order.is_empty() {
            0.0
        } else {
            total / order.len() as f32
        };
        debug!("epoch over {} examples, mean loss {:.6}", order.len(), mean);
        Ok(mean)
    }

    /// Fraction of `split` whose arg-max prediction matches the label.
    ///
    /// Parameters are not modified.
    pub fn accuracy(&mut self, split: Split) -> Result<f32> {
        let count = self.dataset.len(split);
        if count == 0 {
            return Ok(0.0);
        }
        let mut correct = 0usize;
        for i in 0..count {
            let label = self.load_example(split, i)?;
            if argmax(self.predict()) == Some(label) {
                correct += 1;
            }
        }
        Ok(correct as f32 / count as f32)
    }

    /// Accuracy on both splits.
    pub fn evaluate(&mut self) -> Result<AccuracyReport> {
        let report = AccuracyReport {
            train: self.accuracy(Split::Train)?,
            test: self.accuracy(Split::Test)?,
        };
        info!(
            "accuracy of training data: {:.2}%, accuracy of test data: {:.2}%",
            report.train * 100.0,
            report.test * 100.0
        );
        Ok(report)
    }
}
