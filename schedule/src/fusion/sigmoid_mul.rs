//! Folds `Multiply(act(x), act(y))` into one `SigmoidMultiply(x, y)` node,
//! where each `act` is `Sigmoid` or `Tanh`.

use loom_ir::pattern::{Pattern, is_activation};
use loom_ir::{ActivationKind, Graph, Label, Matcher, NodeId, OpKind};
use snafu::ResultExt;
use tracing::{debug, trace};

use crate::error::*;
use crate::pass::GraphPass;

const NAME: &str = "sigmoid_multiply";

pub struct SigmoidMultiplyFusion {
    matcher: Matcher,
    lhs: Label,
    rhs: Label,
}

impl Default for SigmoidMultiplyFusion {
    fn default() -> Self {
        Self::new()
    }
}

impl SigmoidMultiplyFusion {
    pub fn new() -> Self {
        let lhs = Label::new("activation_1").with_predicate(is_activation());
        let rhs = Label::new("activation_2").with_predicate(is_activation());
        Self { matcher: Matcher::new(Pattern::multiply(&lhs, &rhs)), lhs, rhs }
    }
}

/// Input and kind of an activation that only feeds the multiply.
fn exclusive_activation(graph: &Graph, activation: NodeId) -> Option<(NodeId, ActivationKind)> {
    if graph.consumers(activation).len() != 1 || graph.results().contains(&activation) {
        return None;
    }
    let node = &graph[activation];
    Some((node.arg(0)?, ActivationKind::from_kind(node.kind())?))
}

impl GraphPass for SigmoidMultiplyFusion {
    fn name(&self) -> &'static str {
        NAME
    }

    #[tracing::instrument(skip_all, fields(pass = NAME))]
    fn run(&mut self, graph: &mut Graph) -> Result<bool> {
        let mut modified = false;
        for node in graph.ordered_ops() {
            if graph[node].kind() != OpKind::Multiply || !self.matcher.match_node(graph, node) {
                continue;
            }
            let map = self.matcher.pattern_map();
            let (Some(lhs), Some(rhs)) = (map.get(&self.lhs), map.get(&self.rhs)) else { continue };
            let (Some((x, input_1)), Some((y, input_2))) =
                (exclusive_activation(graph, lhs), exclusive_activation(graph, rhs))
            else {
                trace!(multiply = %node, "activation is shared, not fusing");
                continue;
            };

            let fused = graph.sigmoid_multiply(x, y, input_1, input_2).context(RewriteSnafu { pass: NAME })?;
            graph.replace_node(node, fused).context(RewriteSnafu { pass: NAME })?;
            debug!(multiply = %node, %fused, ?input_1, ?input_2, "multiply fused");
            modified = true;
        }
        Ok(modified)
    }
}
