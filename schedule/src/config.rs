//! Pipeline configuration.
//!
//! Typed configuration for the CPU fusion pipeline with bon builders and
//! environment variable fallbacks.

use bon::bon;
use strum::IntoEnumIterator;

// ============================================================================
// FUSIONS
// ============================================================================

/// Fusion passes known to the CPU pipeline, in registration order.
///
/// Names (`rnn_mat`, `batch_dot`, `sigmoid_multiply`) are used in logs and in
/// `LOOM_DISABLE_FUSION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::EnumIter, strum::IntoStaticStr, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FusionKind {
    RnnMat,
    BatchDot,
    SigmoidMultiply,
}

/// A boolean environment flag is set when present and not `0`.
fn flag_set(value: Option<&str>) -> bool {
    matches!(value, Some(value) if value != "0")
}

/// Parse a comma separated list of fusion names. Unknown names are ignored.
pub fn parse_fusion_list(list: &str) -> Vec<FusionKind> {
    list.split(',').filter_map(|name| name.trim().parse().ok()).collect()
}

// ============================================================================
// PIPELINE CONFIGURATION
// ============================================================================

/// Configuration of the CPU fusion pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub rnn_mat_fusion: bool,
    pub batch_dot_fusion: bool,
    pub sigmoid_multiply_fusion: bool,
    /// Reclaim nodes orphaned by a modifying pass before the next pass runs.
    pub collect_garbage: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { rnn_mat_fusion: true, batch_dot_fusion: true, sigmoid_multiply_fusion: true, collect_garbage: true }
    }
}

#[bon]
impl PipelineConfig {
    /// Create a pipeline configuration with builder pattern.
    #[builder]
    pub fn new(
        #[builder(default = true)] rnn_mat_fusion: bool,
        #[builder(default = true)] batch_dot_fusion: bool,
        #[builder(default = true)] sigmoid_multiply_fusion: bool,
        #[builder(default = true)] collect_garbage: bool,
    ) -> Self {
        Self { rnn_mat_fusion, batch_dot_fusion, sigmoid_multiply_fusion, collect_garbage }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `LOOM_DISABLE_FUSION` - Comma separated fusions to skip (`rnn_mat,batch_dot,sigmoid_multiply`)
    /// * `LOOM_KEEP_DEAD_NODES` - Keep orphaned nodes between passes when set to anything but `0`
    pub fn from_env() -> Self {
        let disabled = std::env::var("LOOM_DISABLE_FUSION").map(|list| parse_fusion_list(&list)).unwrap_or_default();
        let collect_garbage = !flag_set(std::env::var("LOOM_KEEP_DEAD_NODES").ok().as_deref());

        Self {
            rnn_mat_fusion: !disabled.contains(&FusionKind::RnnMat),
            batch_dot_fusion: !disabled.contains(&FusionKind::BatchDot),
            sigmoid_multiply_fusion: !disabled.contains(&FusionKind::SigmoidMultiply),
            collect_garbage,
        }
    }

    pub fn is_enabled(&self, kind: FusionKind) -> bool {
        match kind {
            FusionKind::RnnMat => self.rnn_mat_fusion,
            FusionKind::BatchDot => self.batch_dot_fusion,
            FusionKind::SigmoidMultiply => self.sigmoid_multiply_fusion,
        }
    }
}
