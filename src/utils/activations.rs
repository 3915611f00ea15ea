//! Elementwise helpers shared by the activation and loss layers.

/// Sigmoid of a single value: 1 / (1 + exp(-x)).
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable softmax of `logits` written into `probabilities`.
///
/// Subtracts the maximum logit before exponentiating so large inputs do not
/// overflow.
pub fn softmax(logits: &[f32], probabilities: &mut [f32]) {
    debug_assert_eq!(logits.len(), probabilities.len(), "softmax length mismatch");
    if logits.is_empty() {
        return;
    }

    let max_value = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let mut sum = 0.0f32;
    for (p, &a) in probabilities.iter_mut().zip(logits) {
        *p = (a - max_value).exp();
        sum += *p;
    }

    for p in probabilities.iter_mut() {
        *p /= sum;
    }
}

/// Index of the first maximum element, or `None` for an empty slice.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON_F32: f32 = 1e-6;

    #[test]
    fn test_sigmoid_zero() {
        assert_eq!(sigmoid(0.0), 0.5);
    }

    #[test]
    fn test_sigmoid_bounds() {
        assert!(sigmoid(2.0) > 0.5 && sigmoid(2.0) < 1.0);
        assert!(sigmoid(-2.0) > 0.0 && sigmoid(-2.0) < 0.5);
    }

    #[test]
    fn test_softmax_sum() {
        let logits = [1.0, 2.0, 3.0];
        let mut probs = [0.0; 3];
        softmax(&logits, &mut probs);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < EPSILON_F32);
    }

    #[test]
    fn test_softmax_numerical_stability() {
        let logits = [1000.0, 1001.0, 1002.0];
        let mut probs = [0.0; 3];
        softmax(&logits, &mut probs);
        assert!(!probs.iter().any(|x| x.is_nan() || x.is_infinite()));
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < EPSILON_F32);
    }

    #[test]
    fn test_argmax_first_maximum_wins() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[-3.0]), Some(0));
        assert_eq!(argmax(&[]), None);
    }
}
