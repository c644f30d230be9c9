//! Graph passes and the pipeline that runs them.

use loom_ir::Graph;
use strum::IntoEnumIterator;
use tracing::{debug, info, trace};

use crate::Result;
use crate::config::{FusionKind, PipelineConfig};
use crate::fusion::{BatchDotFusion, RnnMatFusion, SigmoidMultiplyFusion};

/// A rewrite over a whole graph.
///
/// `run` processes the graph once and reports whether it changed anything.
/// Finding nothing to rewrite is `Ok(false)`, never an error.
pub trait GraphPass {
    fn name(&self) -> &'static str;

    fn run(&mut self, graph: &mut Graph) -> Result<bool>;
}

/// Outcome of one [`PassManager::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub passes_run: usize,
    pub passes_modified: usize,
    pub nodes_collected: usize,
}

/// Ordered list of passes, each run once per [`run`](Self::run).
pub struct PassManager {
    passes: Vec<Box<dyn GraphPass>>,
    collect_garbage: bool,
}

impl Default for PassManager {
    fn default() -> Self {
        Self { passes: Vec::new(), collect_garbage: true }
    }
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The CPU fusions enabled by `config`, in pipeline order.
    pub fn cpu_fusions(config: &PipelineConfig) -> Self {
        let mut manager = Self::new().with_garbage_collection(config.collect_garbage);
        for kind in FusionKind::iter().filter(|&kind| config.is_enabled(kind)) {
            match kind {
                FusionKind::RnnMat => manager.register(RnnMatFusion::new()),
                FusionKind::BatchDot => manager.register(BatchDotFusion::new()),
                FusionKind::SigmoidMultiply => manager.register(SigmoidMultiplyFusion::new()),
            };
        }
        manager
    }

    pub fn with_garbage_collection(mut self, enabled: bool) -> Self {
        self.collect_garbage = enabled;
        self
    }

    pub fn register(&mut self, pass: impl GraphPass + 'static) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    #[tracing::instrument(skip_all, fields(passes = self.passes.len(), nodes.initial = graph.node_count()))]
    pub fn run(&mut self, graph: &mut Graph) -> Result<PipelineStats> {
        let mut stats = PipelineStats::default();
        for pass in &mut self.passes {
            let modified = pass.run(graph)?;
            stats.passes_run += 1;
            if modified {
                stats.passes_modified += 1;
                if self.collect_garbage {
                    stats.nodes_collected += graph.collect_garbage();
                }
                trace!(pass = pass.name(), graph = %graph.results_tree(), "rewritten graph");
            }
            debug!(pass = pass.name(), modified, nodes = graph.node_count(), "pass finished");
        }
        info!(modified = stats.passes_modified, collected = stats.nodes_collected, "pipeline finished");
        Ok(stats)
    }
}
