//! Shared-weight matmul fusion across time steps.
//!
//! Unrolled recurrent layers compute, for every time step `t`,
//!
//! ```text
//! Add(Dot(Reshape(Slice(D)[:, t, :]), Reshape(W)), Broadcast(b))
//! ```
//!
//! with the same data `D: [x, T, z]`, weights `W` and bias `b`. All steps can be
//! computed by one `[x*T, z] x [z, v]` product. Every site then reads its rows
//! back with a strided slice: row `i*T + t` of the fused result is row `i` of
//! step `t`.

use itertools::Itertools;
use loom_ir::pattern::{Pattern, ShapeConstraint, is_broadcast, is_reshape, is_slice};
use loom_ir::shape::is_identity_order;
use loom_ir::{Graph, Label, Matcher, NodeId, Op};
use snafu::ResultExt;
use tracing::{debug, trace};

use crate::error::*;
use crate::pass::GraphPass;

const NAME: &str = "rnn_mat";

/// One time step that all three patterns accepted.
#[derive(Debug, Clone, Copy)]
struct Site {
    root: NodeId,
    data_slice: NodeId,
    weights_reshape: NodeId,
    bias_broadcast: NodeId,
}

/// Identity of the shared operands: data, weights and bias sources.
type GroupKey = (NodeId, NodeId, NodeId);

/// Validated rewrite of one group.
#[derive(Debug)]
struct FusionPlan {
    data: NodeId,
    weights: NodeId,
    bias: NodeId,
    weights_reshape: NodeId,
    batch: usize,
    steps: usize,
    features: usize,
    outputs: usize,
    /// `(site root, time step)`.
    sites: Vec<(NodeId, usize)>,
}

pub struct RnnMatFusion {
    data: Matcher,
    weights: Matcher,
    bias: Matcher,
    data_slice: Label,
    weights_reshape: Label,
    bias_broadcast: Label,
}

impl Default for RnnMatFusion {
    fn default() -> Self {
        Self::new()
    }
}

impl RnnMatFusion {
    pub fn new() -> Self {
        let data_slice = Label::new("data_slice").with_predicate(is_slice()).with_shape(ShapeConstraint::Rank(3));
        let weights_reshape =
            Label::new("weights_reshape").with_predicate(is_reshape()).with_shape(ShapeConstraint::Rank(2));
        let bias_broadcast =
            Label::new("bias_broadcast").with_predicate(is_broadcast()).with_shape(ShapeConstraint::Rank(2));

        let data = Pattern::add(
            Pattern::dot(Pattern::reshape(&data_slice), Label::new("weights")),
            Label::new("bias"),
        );
        let weights = Pattern::add(
            Pattern::dot(Label::new("data").with_shape(ShapeConstraint::Rank(2)), &weights_reshape),
            Label::new("bias"),
        );
        let bias = Pattern::add(Label::new("product").with_shape(ShapeConstraint::Rank(2)), &bias_broadcast);

        Self {
            data: Matcher::new(data),
            weights: Matcher::new(weights),
            bias: Matcher::new(bias),
            data_slice,
            weights_reshape,
            bias_broadcast,
        }
    }

    /// All three patterns must accept `node` in one attempt; nothing carries
    /// over from earlier candidates.
    fn match_site(&mut self, graph: &Graph, node: NodeId) -> Option<Site> {
        if !(self.data.match_node(graph, node) && self.weights.match_node(graph, node) && self.bias.match_node(graph, node))
        {
            return None;
        }
        Some(Site {
            root: node,
            data_slice: self.data.pattern_map().get(&self.data_slice)?,
            weights_reshape: self.weights.pattern_map().get(&self.weights_reshape)?,
            bias_broadcast: self.bias.pattern_map().get(&self.bias_broadcast)?,
        })
    }
}

impl GraphPass for RnnMatFusion {
    fn name(&self) -> &'static str {
        NAME
    }

    #[tracing::instrument(skip_all, fields(pass = NAME))]
    fn run(&mut self, graph: &mut Graph) -> Result<bool> {
        let mut candidates = Vec::new();
        for node in graph.ordered_ops() {
            if let Some(site) = self.match_site(graph, node)
                && let Some(key) = group_key(graph, &site)
            {
                trace!(root = %node, data = %key.0, weights = %key.1, bias = %key.2, "candidate site");
                candidates.push((key, site));
            }
        }

        let mut modified = false;
        let groups = candidates.into_iter().into_group_map().into_iter().sorted_unstable_by_key(|(key, _)| *key);
        for (key, sites) in groups {
            if sites.len() < 2 {
                trace!(data = %key.0, "single site, nothing to share");
                continue;
            }
            match plan_group(graph, key, &sites) {
                Ok(plan) => {
                    debug!(sites = plan.sites.len(), data = %plan.data, weights = %plan.weights, "fusing group");
                    apply(graph, plan)?;
                    modified = true;
                }
                Err(reason) => debug!(sites = sites.len(), data = %key.0, reason, "group discarded"),
            }
        }
        Ok(modified)
    }
}

fn group_key(graph: &Graph, site: &Site) -> Option<GroupKey> {
    Some((graph[site.data_slice].arg(0)?, graph[site.weights_reshape].arg(0)?, graph[site.bias_broadcast].arg(0)?))
}

/// Check every site of the group before anything is rewritten.
fn plan_group(graph: &Graph, (data, weights, bias): GroupKey, sites: &[Site]) -> Result<FusionPlan, &'static str> {
    let &[batch, steps, features] = graph[data].shape().as_slice() else {
        return Err("data is not rank 3");
    };
    let weights_op = graph[sites[0].weights_reshape].op();
    let &[reduced, outputs] = graph[sites[0].weights_reshape].shape().as_slice() else {
        return Err("weights are not a matrix");
    };
    if reduced != features {
        return Err("weights do not contract the feature axis");
    }
    if graph[bias].shape().as_slice() != [outputs] {
        return Err("bias is not a vector over the outputs");
    }

    let mut planned = Vec::with_capacity(sites.len());
    for site in sites {
        let step = match graph[site.data_slice].op() {
            Op::Slice { lower_bounds, upper_bounds, strides }
                if strides.iter().all(|&s| s == 1)
                    && lower_bounds[0] == 0
                    && upper_bounds[0] == batch
                    && lower_bounds[2] == 0
                    && upper_bounds[2] == features
                    && upper_bounds[1] == lower_bounds[1] + 1 =>
            {
                lower_bounds[1]
            }
            _ => return Err("slice does not select a single full time step"),
        };

        let dot = graph[site.root].arg(0).ok_or("site has no product")?;
        if !matches!(graph[dot].op(), Op::Dot { reduction_axes_count: 1 }) {
            return Err("product contracts more than one axis");
        }
        let data_reshape = graph[dot].arg(0).ok_or("product has no data operand")?;
        match graph[data_reshape].op() {
            Op::Reshape { input_order, output_shape }
                if is_identity_order(input_order) && output_shape.as_slice() == [batch, features] => {}
            _ => return Err("data reshape does not drop the time axis"),
        }

        if graph[site.weights_reshape].op() != weights_op {
            return Err("sites reshape the weights differently");
        }
        match graph[site.bias_broadcast].op() {
            Op::Broadcast { shape, broadcast_axes }
                if shape.as_slice() == [batch, outputs] && broadcast_axes.iter().copied().eq([0usize]) => {}
            _ => return Err("bias is not broadcast along the batch axis"),
        }

        if [data, weights, bias].into_iter().any(|source| graph.depends_on(source, site.root)) {
            return Err("shared operand depends on a site");
        }
        planned.push((site.root, step));
    }

    Ok(FusionPlan {
        data,
        weights,
        bias,
        weights_reshape: sites[0].weights_reshape,
        batch,
        steps,
        features,
        outputs,
        sites: planned,
    })
}

fn apply(graph: &mut Graph, plan: FusionPlan) -> Result<()> {
    let rows = plan.batch * plan.steps;
    let flat = graph.reshape(plan.data, &[0, 1, 2], &[rows, plan.features]).context(RewriteSnafu { pass: NAME })?;
    let weights = graph.copy_with_new_args(plan.weights_reshape, &[plan.weights]).context(RewriteSnafu { pass: NAME })?;
    let product = graph.dot(flat, weights).context(RewriteSnafu { pass: NAME })?;
    let bias = graph.broadcast(plan.bias, &[rows, plan.outputs], &[0]).context(RewriteSnafu { pass: NAME })?;
    let fused = graph.add(product, bias).context(RewriteSnafu { pass: NAME })?;

    for (root, step) in plan.sites {
        let slice = graph
            .strided_slice(fused, &[step, 0], &[rows, plan.outputs], &[plan.steps, 1])
            .context(RewriteSnafu { pass: NAME })?;
        graph.replace_node(root, slice).context(RewriteSnafu { pass: NAME })?;
        trace!(%root, %slice, step, "site replaced");
    }
    Ok(())
}
