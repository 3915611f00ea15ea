//! End-to-end tests for the network orchestrator
//!
//! - Loss decreases after one gradient + update cycle
//! - Predict is deterministic and leaves parameters alone
//! - Shape inference for a convolutional stack
//! - Analytic gradients against finite differences
//! - Configuration and runtime errors

use approx::assert_abs_diff_eq;
use mountain_lake_nn::layers::Parameters;
use mountain_lake_nn::utils::SimpleRng;
use mountain_lake_nn::{Dataset, NetworkConfig, NetworkError, NeuralNetwork, Split};

fn config(json: &str) -> NetworkConfig {
    NetworkConfig::from_json_str(json).expect("valid config")
}

fn structure(layers: &str) -> NetworkConfig {
    config(&format!(r#"{{ "neural_network": {{ "struct": {} }} }}"#, layers))
}

/// Three 2x2 training examples and two test examples.
fn tiny_dataset() -> Dataset {
    Dataset::new(
        2,
        2,
        vec![
            0.9, 0.1, 0.2, 0.0, //
            0.0, 0.8, 0.1, 0.3, //
            0.2, 0.2, 0.7, 0.9,
        ],
        vec![0, 7, 3],
        vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0],
        vec![0, 7],
    )
    .unwrap()
}

/// Deterministic weights with magnitudes large enough for finite differences.
fn spread_parameters(params: &mut Parameters, salt: usize) {
    for (i, w) in params.weights.iter_mut().enumerate() {
        *w = (((i + salt) * 7) % 17) as f32 / 17.0 - 0.5;
    }
    for (i, b) in params.biases.iter_mut().enumerate() {
        *b = (((i + salt) * 3) % 5) as f32 * 0.1 - 0.2;
    }
}

// ============================================================================
// Training cycle
// ============================================================================

mod training_tests {
    use super::*;

    #[test]
    fn test_gradient_update_decreases_loss() {
        let cfg = structure(r#"["Affine:5", "Sigmoid", "Affine:10", "SoftmaxWithLoss"]"#);
        let mut nn = NeuralNetwork::new(&cfg, tiny_dataset(), &mut SimpleRng::new(42)).unwrap();

        let first = nn.gradient(1).unwrap();
        nn.update();
        let second = nn.gradient(1).unwrap();

        assert!(first.is_finite());
        assert!(second < first, "loss did not decrease: {first} -> {second}");
        assert_eq!(nn.label(), Some(7));
        assert_eq!(nn.output(4).unwrap(), &[second]);
    }

    #[test]
    fn test_train_epoch_reduces_mean_loss() {
        let cfg = config(
            r#"{ "neural_network": { "struct": ["Affine:8", "ReLU", "Affine:10", "SoftmaxWithLoss"], "learning_rate": 0.2 } }"#,
        );
        let mut nn = NeuralNetwork::new(&cfg, tiny_dataset(), &mut SimpleRng::new(7)).unwrap();
        let order = [0usize, 1, 2];

        let first = nn.train_epoch(&order).unwrap();
        let mut last = first;
        for _ in 0..30 {
            last = nn.train_epoch(&order).unwrap();
        }

        assert!(last < first, "mean loss did not decrease: {first} -> {last}");
        let accuracy = nn.accuracy(Split::Train).unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
    }

    #[test]
    fn test_train_epoch_empty_order() {
        let cfg = structure(r#"["Affine:10", "SoftmaxWithLoss"]"#);
        let mut nn = NeuralNetwork::new(&cfg, tiny_dataset(), &mut SimpleRng::new(1)).unwrap();
        let before = nn.parameters(1).unwrap().clone();

        assert_eq!(nn.train_epoch(&[]).unwrap(), 0.0);
        assert_eq!(nn.parameters(1).unwrap(), &before);
    }

    #[test]
    fn test_learning_rate_default_and_override() {
        let cfg = structure(r#"["Affine:10", "SoftmaxWithLoss"]"#);
        let mut nn = NeuralNetwork::new(&cfg, tiny_dataset(), &mut SimpleRng::new(1)).unwrap();
        assert_eq!(nn.learning_rate(), 0.01);

        nn.set_learning_rate(0.0);
        nn.gradient(0).unwrap();
        let before = nn.parameters(1).unwrap().clone();
        nn.update();
        assert_eq!(nn.parameters(1).unwrap(), &before);
    }
}

// ============================================================================
// Predict and accuracy
// ============================================================================

mod inference_tests {
    use super::*;

    #[test]
    fn test_predict_is_repeatable() {
        let cfg = structure(r#"["Affine:6", "Sigmoid", "MatMul:10", "SoftmaxWithLoss"]"#);
        let mut nn = NeuralNetwork::new(&cfg, tiny_dataset(), &mut SimpleRng::new(9)).unwrap();
        nn.set_input(&[0.3, 0.1, 0.4, 0.1], None).unwrap();

        let first = nn.predict().to_vec();
        let second = nn.predict().to_vec();

        assert_eq!(first.len(), 10);
        assert_eq!(first, second);
    }

    #[test]
    fn test_accuracy_with_known_weights() {
        let cfg = structure(r#"["Affine:8", "SoftmaxWithLoss"]"#);
        let mut nn = NeuralNetwork::new(&cfg, tiny_dataset(), &mut SimpleRng::new(1)).unwrap();

        // class k < 4 scores pixel k; class 7 is a constant 0.85
        let params = nn.parameters_mut(1).unwrap();
        params.weights.fill(0.0);
        for pixel in 0..4 {
            params.weights[pixel * 8 + pixel] = 1.0;
        }
        params.biases.fill(0.0);
        params.biases[7] = 0.85;
        let before = nn.parameters(1).unwrap().clone();

        // train: argmax 0, 7 and 3, all correct
        assert_eq!(nn.accuracy(Split::Train).unwrap(), 1.0);
        // test: argmax 0 (label 0), then a tie between classes 2 and 3 (label 7)
        let report = nn.evaluate().unwrap();
        assert_abs_diff_eq!(report.test, 0.5, epsilon = 1e-6);
        assert_eq!(nn.parameters(1).unwrap(), &before);
    }
}

// ============================================================================
// Shape inference
// ============================================================================

mod shape_tests {
    use super::*;

    fn cnn_config() -> NetworkConfig {
        config(
            r#"{
                "neural_network": {
                    "struct": ["FirstConvolution-1", "ReLU", "Pooling-1", "Affine:10", "SoftmaxWithLoss"]
                },
                "FirstConvolution-1": {
                    "pad": 1, "stride": 1, "filter_num": 3,
                    "filter_height": 3, "filter_width": 3, "channel_num": 1
                },
                "Pooling-1": {
                    "pool_height": 2, "pool_width": 2, "stride": 2, "type": "Max", "filter_num": 3
                }
            }"#,
        )
    }

    fn blank_dataset(side: usize) -> Dataset {
        Dataset::new(side, side, vec![0.5; side * side], vec![4], vec![], vec![]).unwrap()
    }

    #[test]
    fn test_cnn_shapes() {
        let nn = NeuralNetwork::new(&cnn_config(), blank_dataset(8), &mut SimpleRng::new(5)).unwrap();

        assert_eq!(nn.layer_count(), 5);
        let sizes: Vec<usize> = (0..=5).map(|i| nn.layer(i).unwrap().output_size).collect();
        assert_eq!(sizes, vec![64, 192, 192, 48, 10, 1]);

        let conv = nn.layer(1).unwrap();
        assert_eq!((conv.output_height, conv.output_width), (8, 8));
        let pool = nn.layer(3).unwrap();
        assert_eq!((pool.output_height, pool.output_width), (4, 4));

        assert_eq!(nn.parameters(1).unwrap().weights.len(), 27);
        assert_eq!(nn.parameters(1).unwrap().biases, vec![0.0; 3]);
        assert_eq!(nn.parameters(4).unwrap().weights.len(), 480);
        assert_eq!(nn.parameter_count(), 27 + 3 + 480 + 10);
        assert_eq!(nn.probabilities().len(), 10);
    }

    #[test]
    fn test_cnn_gradient_runs() {
        let mut nn = NeuralNetwork::new(&cnn_config(), blank_dataset(8), &mut SimpleRng::new(5)).unwrap();
        let loss = nn.gradient(0).unwrap();

        assert!(loss.is_finite());
        assert!(nn.gradients(1).unwrap().weights.iter().any(|&g| g != 0.0));
        let total: f32 = nn.probabilities().iter().sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_weights_drawn_from_small_normal() {
        let cfg = structure(r#"["Affine:100", "SoftmaxWithLoss"]"#);
        let nn = NeuralNetwork::new(&cfg, blank_dataset(10), &mut SimpleRng::new(11)).unwrap();
        let weights = &nn.parameters(1).unwrap().weights;

        let n = weights.len() as f32;
        let mean = weights.iter().sum::<f32>() / n;
        let var = weights.iter().map(|w| (w - mean).powi(2)).sum::<f32>() / n;
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(var.sqrt(), 0.01, epsilon = 1e-3);
    }
}

// ============================================================================
// Gradient checking
// ============================================================================

mod gradient_check_tests {
    use super::*;

    /// Compares every parameter gradient of `layers` against central
    /// differences of the loss on training example 0.
    fn check_gradients(nn: &mut NeuralNetwork, layers: &[usize]) {
        nn.gradient(0).unwrap();
        let eps = 1e-2f32;

        for &layer in layers {
            let analytic = nn.gradients(layer).unwrap().clone();
            for i in 0..analytic.weights.len() {
                let numeric = central_difference(nn, eps, |p| &mut p.parameters_mut(layer).unwrap().weights[i]);
                assert_abs_diff_eq!(analytic.weights[i], numeric, epsilon = 2e-3);
            }
            for i in 0..analytic.biases.len() {
                let numeric = central_difference(nn, eps, |p| &mut p.parameters_mut(layer).unwrap().biases[i]);
                assert_abs_diff_eq!(analytic.biases[i], numeric, epsilon = 2e-3);
            }
        }
    }

    fn central_difference(
        nn: &mut NeuralNetwork,
        eps: f32,
        slot: impl Fn(&mut NeuralNetwork) -> &mut f32,
    ) -> f32 {
        let original = *slot(nn);
        *slot(nn) = original + eps;
        let plus = nn.forward().unwrap();
        *slot(nn) = original - eps;
        let minus = nn.forward().unwrap();
        *slot(nn) = original;
        (plus - minus) / (2.0 * eps)
    }

    #[test]
    fn test_mlp_gradients() {
        let cfg = structure(r#"["Affine:5", "Sigmoid", "Affine:8", "SoftmaxWithLoss"]"#);
        let mut nn = NeuralNetwork::new(&cfg, tiny_dataset(), &mut SimpleRng::new(3)).unwrap();
        spread_parameters(nn.parameters_mut(1).unwrap(), 0);
        spread_parameters(nn.parameters_mut(3).unwrap(), 5);

        check_gradients(&mut nn, &[1, 3]);
    }

    #[test]
    fn test_stacked_convolution_gradients() {
        let cfg = config(
            r#"{
                "neural_network": {
                    "struct": ["Convolution-1", "Sigmoid", "Convolution-2", "Sigmoid", "Pooling-1", "MatMul:3", "SoftmaxWithLoss"]
                },
                "Convolution-1": {
                    "pad": 1, "stride": 1, "filter_num": 1,
                    "filter_height": 3, "filter_width": 3, "channel_num": 1
                },
                "Convolution-2": {
                    "pad": 0, "stride": 1, "filter_num": 2,
                    "filter_height": 3, "filter_width": 3, "channel_num": 1
                },
                "Pooling-1": {
                    "pool_height": 2, "pool_width": 2, "stride": 2, "type": "Average", "filter_num": 2
                }
            }"#,
        );
        let pixels: Vec<f32> = (0..36).map(|i| ((i * 5) % 9) as f32 / 9.0).collect();
        let dataset = Dataset::new(6, 6, pixels, vec![2], vec![], vec![]).unwrap();
        let mut nn = NeuralNetwork::new(&cfg, dataset, &mut SimpleRng::new(4)).unwrap();
        assert_eq!(nn.layer(3).unwrap().output_size, 32);
        assert_eq!(nn.layer(5).unwrap().output_size, 8);

        spread_parameters(nn.parameters_mut(1).unwrap(), 1);
        spread_parameters(nn.parameters_mut(3).unwrap(), 2);
        spread_parameters(nn.parameters_mut(6).unwrap(), 3);

        // layer 1 gradients only match if layer 3 propagates to its input
        check_gradients(&mut nn, &[1, 3, 6]);
    }
}

// ============================================================================
// Errors
// ============================================================================

mod error_tests {
    use super::*;

    #[test]
    fn test_missing_conv_section() {
        let cfg = structure(r#"["Convolution-1", "Affine:10", "SoftmaxWithLoss"]"#);
        let result = NeuralNetwork::new(&cfg, tiny_dataset(), &mut SimpleRng::new(1));
        assert!(matches!(result, Err(NetworkError::MissingKey { ref key }) if key == "Convolution-1.pad"));
    }

    #[test]
    fn test_missing_pool_type() {
        let cfg = config(
            r#"{
                "neural_network": { "struct": ["Pooling-1"] },
                "Pooling-1": { "pool_height": 2, "pool_width": 2, "stride": 2, "filter_num": 1 }
            }"#,
        );
        let result = NeuralNetwork::new(&cfg, tiny_dataset(), &mut SimpleRng::new(1));
        assert!(matches!(result, Err(NetworkError::MissingKey { ref key }) if key == "Pooling-1.type"));
    }

    #[test]
    fn test_empty_and_undefined_structure() {
        let result = NeuralNetwork::new(&structure("[]"), tiny_dataset(), &mut SimpleRng::new(1));
        assert!(matches!(result, Err(NetworkError::EmptyStructure)));

        let result = NeuralNetwork::new(&config("{}"), tiny_dataset(), &mut SimpleRng::new(1));
        assert!(matches!(result, Err(NetworkError::UndefinedStructure)));
    }

    #[test]
    fn test_unknown_layer_type() {
        let cfg = structure(r#"["Affine:10", "Tanh", "SoftmaxWithLoss"]"#);
        let result = NeuralNetwork::new(&cfg, tiny_dataset(), &mut SimpleRng::new(1));
        assert!(matches!(result, Err(NetworkError::UnknownLayerType(ref t)) if t == "Tanh"));
    }

    #[test]
    fn test_label_beyond_classes() {
        let cfg = structure(r#"["Affine:5", "SoftmaxWithLoss"]"#);
        let mut nn = NeuralNetwork::new(&cfg, tiny_dataset(), &mut SimpleRng::new(1)).unwrap();

        assert!(nn.gradient(0).is_ok());
        assert!(matches!(
            nn.gradient(1),
            Err(NetworkError::LabelOutOfRange { label: 7, classes: 5 })
        ));
        assert!(matches!(
            nn.gradient(3),
            Err(NetworkError::ExampleOutOfRange { index: 3, count: 3 })
        ));
    }

    #[test]
    fn test_oversized_affine_is_an_error() {
        let cfg = structure(r#"["Affine:9223372036854775807", "SoftmaxWithLoss"]"#);
        let result = NeuralNetwork::new(&cfg, tiny_dataset(), &mut SimpleRng::new(1));
        assert!(matches!(result, Err(NetworkError::InvalidGeometry { .. })));
    }

    #[test]
    fn test_pool_filter_count_mismatch() {
        let cfg = config(
            r#"{
                "neural_network": { "struct": ["FirstConvolution-1", "Pooling-1", "Affine:10", "SoftmaxWithLoss"] },
                "FirstConvolution-1": {
                    "pad": 0, "stride": 1, "filter_num": 3,
                    "filter_height": 1, "filter_width": 1, "channel_num": 1
                },
                "Pooling-1": { "pool_height": 1, "pool_width": 1, "stride": 1, "type": "Max", "filter_num": 4 }
            }"#,
        );
        let result = NeuralNetwork::new(&cfg, tiny_dataset(), &mut SimpleRng::new(1));
        assert!(matches!(result, Err(NetworkError::InvalidGeometry { ref name, .. }) if name == "Pooling-1"));
    }

    #[test]
    fn test_backward_before_label() {
        let cfg = structure(r#"["Affine:10", "SoftmaxWithLoss"]"#);
        let mut nn = NeuralNetwork::new(&cfg, tiny_dataset(), &mut SimpleRng::new(1)).unwrap();
        assert!(matches!(nn.backward(), Err(NetworkError::MissingLabel)));
    }
}
