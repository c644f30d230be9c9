//! CPU fusion passes.
//!
//! - [`rnn_mat`] - groups per-time-step matmuls sharing weights into one product
//! - [`batch_dot`] - folds a concat of per-batch matmuls into `BatchDot`
//! - [`sigmoid_mul`] - folds a product of two activations into `SigmoidMultiply`

pub mod batch_dot;
pub mod rnn_mat;
pub mod sigmoid_mul;

pub use batch_dot::BatchDotFusion;
pub use rnn_mat::RnnMatFusion;
pub use sigmoid_mul::SigmoidMultiplyFusion;
