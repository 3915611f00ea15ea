//! Rectified linear unit.

use crate::architecture::LayerKind;
use crate::layers::{BackwardPass, Layer, Parameters};

/// `Z = max(A, 0)` elementwise.
pub fn forward(input: &[f32], output: &mut [f32]) {
    for (z, &a) in output.iter_mut().zip(input) {
        *z = if a > 0.0 { a } else { 0.0 };
    }
}

/// `dA = dZ` where the forward output was positive, otherwise 0.
pub fn backward(grad_output: &[f32], output: &[f32], grad_input: &mut [f32]) {
    for ((da, &dz), &z) in grad_input.iter_mut().zip(grad_output).zip(output) {
        *da = if z > 0.0 { dz } else { 0.0 };
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Relu;

impl Layer for Relu {
    fn kind(&self) -> LayerKind {
        LayerKind::Relu
    }

    fn forward(&self, input: &[f32], _params: &Parameters, output: &mut [f32]) {
        forward(input, output);
    }

    fn backward(&self, pass: BackwardPass<'_>, _grads: &mut Parameters, grad_input: &mut [f32]) {
        backward(pass.grad_output, pass.output, grad_input);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward() {
        let a = [-1.0, 0.0, 0.02, 3.5];
        let mut z = [9.0; 4];
        forward(&a, &mut z);
        assert_eq!(z, [0.0, 0.0, 0.02, 3.5]);
    }

    #[test]
    fn test_backward_masks_on_output() {
        let dz: Vec<f32> = (0..5).map(|i| i as f32 / 100.0).collect();
        let z: Vec<f32> = (0..5).map(|i| i as f32 / 50.0).collect();
        let mut da = [1.0; 5];
        backward(&dz, &z, &mut da);
        assert_eq!(da[0], 0.0);
        assert_eq!(da[2], 0.02);
        assert_eq!(da[4], dz[4]);
    }
}
