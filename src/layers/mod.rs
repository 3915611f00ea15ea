//! Layer primitives
//!
//! Every primitive exposes free `forward`/`backward` functions over borrowed
//! flat buffers, plus a unit-like stage type implementing [`Layer`] so the
//! network can hold them in one ordered sequence. The terminal
//! [`SoftmaxWithLoss`] stage is driven separately because it needs a label.

mod r#trait;
pub mod affine;
pub mod convolution;
pub mod matmul;
pub mod pooling;
pub mod relu;
pub mod sigmoid;
pub mod softmax_with_loss;

pub use r#trait::{BackwardPass, Layer, Parameters};
pub use affine::Affine;
pub use convolution::{ConvConfig, Convolution};
pub use matmul::MatMul;
pub use pooling::{PoolConfig, PoolType, Pooling};
pub use relu::Relu;
pub use sigmoid::Sigmoid;
pub use softmax_with_loss::SoftmaxWithLoss;
