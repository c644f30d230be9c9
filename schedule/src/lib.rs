//! Graph rewriting passes for the loom CPU back end.
//!
//! # Module Organization
//!
//! - [`fusion`] - Pattern-driven fusions (RNN matmul grouping, batched dot, sigmoid-multiply)
//! - [`pass`] - The [`GraphPass`] trait and the [`PassManager`] pipeline
//! - [`config`] - Pipeline configuration with environment fallbacks
//! - [`error`] - Error types and result handling
//!
//! Matching itself lives in `loom_ir::pattern`; this crate only decides what
//! to do with the matches.

pub mod config;
pub mod error;
pub mod fusion;
pub mod pass;

#[cfg(test)]
pub mod test;

pub use config::{FusionKind, PipelineConfig};
pub use error::{Error, Result};
pub use fusion::{BatchDotFusion, RnnMatFusion, SigmoidMultiplyFusion};
pub use pass::{GraphPass, PassManager, PipelineStats};

pub use loom_ir::pattern;
