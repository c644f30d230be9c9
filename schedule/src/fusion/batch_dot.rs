//! Batched matmul recovery.
//!
//! Frontends lower a batched product into one 2-D `Dot` per batch entry and
//! concatenate the results:
//!
//! ```text
//! Concat[axis 0](
//!     Reshape(Dot(Reshape(Skip(Slice(A))), Reshape(Skip(Slice(B))))),   // batch 0
//!     ...
//! )
//! ```
//!
//! A transposed operand shows up as one extra reshape that swaps the trailing
//! axes before the 2-D reshape. The number of reshapes on each branch of the
//! match path therefore decides the transpose flags of the fused `BatchDot`.

use loom_ir::op::transpose_last_two;
use loom_ir::pattern::{Pattern, ShapeConstraint, is_reshape};
use loom_ir::shape::{is_identity_order, permute_shape};
use loom_ir::{Graph, Label, Matcher, NodeId, Op, OpKind};
use snafu::ResultExt;
use tracing::{debug, trace};

use crate::error::*;
use crate::pass::GraphPass;

const NAME: &str = "batch_dot";

/// Reshapes on a branch without a transpose: the 2-D reshape and the root reshape.
const PLAIN_RESHAPES: usize = 2;
const TRANSPOSED_RESHAPES: usize = PLAIN_RESHAPES + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    fn arg_index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }
}

/// One concat operand accepted by the template.
#[derive(Debug, Clone, Copy)]
struct Operand {
    lhs: NodeId,
    rhs: NodeId,
    transpose_a: bool,
    transpose_b: bool,
}

pub struct BatchDotFusion {
    matcher: Matcher,
    param_0: Label,
    param_1: Label,
}

impl Default for BatchDotFusion {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchDotFusion {
    pub fn new() -> Self {
        let param_0 = Label::new("param_0").with_shape(ShapeConstraint::Rank(3));
        let param_1 = Label::new("param_1").with_shape(ShapeConstraint::Rank(3));
        let branch = |source: &Label| Pattern::reshape(Pattern::skip(Pattern::slice(source), is_reshape()));
        let pattern = Pattern::reshape(Pattern::dot(branch(&param_0), branch(&param_1)));
        Self { matcher: Matcher::new(pattern), param_0, param_1 }
    }

    fn match_operand(&mut self, graph: &Graph, operand: NodeId) -> Result<Operand, &'static str> {
        if !self.matcher.match_node(graph, operand) {
            return Err("operand does not match the template");
        }
        let map = self.matcher.pattern_map();
        let lhs = map.get(&self.param_0).ok_or("left source unbound")?;
        let rhs = map.get(&self.param_1).ok_or("right source unbound")?;
        let path = self.matcher.match_path();
        Ok(Operand {
            lhs,
            rhs,
            transpose_a: transpose_flag(graph, path, operand, Side::Left)?,
            transpose_b: transpose_flag(graph, path, operand, Side::Right)?,
        })
    }

    fn plan(&mut self, graph: &Graph, concat: NodeId) -> Result<Operand, &'static str> {
        if !matches!(graph[concat].op(), Op::Concat { axis: 0 }) {
            return Err("concat is not along the batch axis");
        }
        let operands = graph[concat].args();

        let mut fused: Option<Operand> = None;
        for (batch, &operand) in operands.iter().enumerate() {
            let found = self.match_operand(graph, operand)?;
            check_branches(graph, self.matcher.match_path(), operand, batch)?;
            match fused {
                None => {
                    if found.lhs == found.rhs {
                        return Err("both branches read the same source");
                    }
                    fused = Some(found);
                }
                Some(first) => {
                    if (first.lhs, first.rhs) != (found.lhs, found.rhs) {
                        return Err("operands read different sources");
                    }
                    if (first.transpose_a, first.transpose_b) != (found.transpose_a, found.transpose_b) {
                        return Err("operands disagree on transposition");
                    }
                }
            }
        }
        let fused = fused.ok_or("concat has no operands")?;

        let (lhs_shape, rhs_shape) = (graph[fused.lhs].shape(), graph[fused.rhs].shape());
        if lhs_shape[0] != operands.len() || rhs_shape[0] != operands.len() {
            return Err("batch extent differs from the operand count");
        }
        let op = Op::BatchDot { transpose_a: fused.transpose_a, transpose_b: fused.transpose_b };
        match op.infer_shape(&[lhs_shape, rhs_shape]) {
            Ok(shape) if shape == *graph[concat].shape() => Ok(fused),
            _ => Err("batched product does not reproduce the concat shape"),
        }
    }
}

impl GraphPass for BatchDotFusion {
    fn name(&self) -> &'static str {
        NAME
    }

    #[tracing::instrument(skip_all, fields(pass = NAME))]
    fn run(&mut self, graph: &mut Graph) -> Result<bool> {
        let mut modified = false;
        for node in graph.ordered_ops() {
            if graph[node].kind() != OpKind::Concat {
                continue;
            }
            let fused = match self.plan(graph, node) {
                Ok(fused) => fused,
                Err(reason) => {
                    trace!(concat = %node, reason, "concat skipped");
                    continue;
                }
            };
            let batch_dot = graph
                .batch_dot(fused.lhs, fused.rhs, fused.transpose_a, fused.transpose_b)
                .context(RewriteSnafu { pass: NAME })?;
            graph.replace_node(node, batch_dot).context(RewriteSnafu { pass: NAME })?;
            debug!(
                concat = %node,
                %batch_dot,
                transpose_a = fused.transpose_a,
                transpose_b = fused.transpose_b,
                "concat replaced"
            );
            modified = true;
        }
        Ok(modified)
    }
}

/// Count reshapes from `root` down one side of the product, staying on the match path.
fn branch_reshapes(graph: &Graph, path: &[NodeId], root: NodeId, side: Side) -> usize {
    let mut count = 0;
    let mut current = Some(root);
    while let Some(id) = current.filter(|id| path.contains(id)) {
        let node = &graph[id];
        if node.kind() == OpKind::Reshape {
            count += 1;
        }
        current = match node.args() {
            [_, _] => node.arg(side.arg_index()),
            _ => node.arg(0),
        };
    }
    count
}

fn transpose_flag(graph: &Graph, path: &[NodeId], root: NodeId, side: Side) -> Result<bool, &'static str> {
    match branch_reshapes(graph, path, root, side) {
        PLAIN_RESHAPES => Ok(false),
        TRANSPOSED_RESHAPES => Ok(true),
        _ => Err("unexpected number of reshapes on a branch"),
    }
}

/// Check the movement ops of one matched operand feeding batch entry `batch`.
fn check_branches(graph: &Graph, path: &[NodeId], root: NodeId, batch: usize) -> Result<(), &'static str> {
    let dot = graph[root].arg(0).ok_or("root reshape has no product")?;
    if !matches!(graph[dot].op(), Op::Dot { reduction_axes_count: 1 }) {
        return Err("product contracts more than one axis");
    }
    match graph[root].op() {
        Op::Reshape { input_order, output_shape }
            if is_identity_order(input_order)
                && output_shape.first() == Some(&1)
                && output_shape[1..] == graph[dot].shape()[..] => {}
        _ => return Err("root reshape does not restore the batch axis"),
    }

    for side in [Side::Left, Side::Right] {
        let matrix = graph[dot].arg(side.arg_index()).ok_or("product is missing an operand")?;
        let mut current = graph[matrix].arg(0).ok_or("2-D reshape has no input")?;

        let input = graph[current].shape();
        match graph[matrix].op() {
            Op::Reshape { input_order, output_shape }
                if is_identity_order(input_order) && input.first() == Some(&1) && output_shape[..] == input[1..] => {}
            _ => return Err("2-D reshape does not drop the batch axis"),
        }

        while path.contains(&current) && graph[current].kind() == OpKind::Reshape {
            let absorbed = &graph[current];
            let source = absorbed.arg(0).ok_or("absorbed reshape has no input")?;
            let swap = transpose_last_two(3);
            match absorbed.op() {
                Op::Reshape { input_order, output_shape }
                    if *input_order == swap && *output_shape == permute_shape(graph[source].shape(), &swap) => {}
                _ => return Err("absorbed reshape is not a trailing-axes transpose"),
            }
            current = source;
        }

        let slice = &graph[current];
        let source = slice.arg(0).ok_or("slice has no input")?;
        let dims = graph[source].shape();
        match slice.op() {
            Op::Slice { lower_bounds, upper_bounds, strides }
                if strides.iter().all(|&s| s == 1)
                    && lower_bounds.as_slice() == [batch, 0, 0]
                    && upper_bounds.as_slice() == [batch + 1, dims[1], dims[2]] => {}
            _ => return Err("slice does not select one full batch entry"),
        }
    }
    Ok(())
}
