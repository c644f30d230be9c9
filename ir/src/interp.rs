//! Reference interpreter.
//!
//! Evaluates an `f32` graph node by node in [`Graph::ordered_ops`] order using
//! `ndarray`. It is the numeric oracle for the fusion passes and backs the
//! runtime's reference entry point.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use loom_dtype::DType;
use ndarray::{ArrayD, ArrayView2, Axis, Ix2, IxDyn, Slice, Zip};
use snafu::ensure;

use crate::error::*;
use crate::op::Op;
use crate::shape::Shape;
use crate::{Graph, Node, NodeId};

/// Evaluate every result of `graph`. `inputs[i]` feeds the parameter with index `i`.
pub fn evaluate(graph: &Graph, inputs: &[ArrayD<f32>]) -> Result<Vec<ArrayD<f32>>> {
    evaluate_with(graph, inputs, |_, _| {})
}

/// Like [`evaluate`], calling `observer` with the wall time of every evaluated
/// non-parameter node.
pub fn evaluate_with(
    graph: &Graph,
    inputs: &[ArrayD<f32>],
    mut observer: impl FnMut(&Node, Duration),
) -> Result<Vec<ArrayD<f32>>> {
    let parameters = graph.parameters();
    ensure!(inputs.len() == parameters.len(), InputCountMismatchSnafu { expected: parameters.len(), actual: inputs.len() });

    let mut values: HashMap<NodeId, ArrayD<f32>> = HashMap::new();
    for id in graph.ordered_ops() {
        let node = &graph[id];
        ensure!(node.dtype() == DType::Float32, UnsupportedDTypeSnafu { node: id, dtype: node.dtype() });

        let args: Vec<&ArrayD<f32>> = node.args().iter().filter_map(|arg| values.get(arg)).collect();
        let start = Instant::now();
        let value = eval_node(node, &args, inputs)?;
        if !matches!(node.op(), Op::Parameter { .. }) {
            observer(node, start.elapsed());
        }
        values.insert(id, value);
    }

    Ok(graph.results().iter().filter_map(|id| values.get(id).cloned()).collect())
}

fn eval_node(node: &Node, args: &[&ArrayD<f32>], inputs: &[ArrayD<f32>]) -> Result<ArrayD<f32>> {
    let id = node.id();
    let fail = |reason: String| EvaluationSnafu { node: id, reason }.build();

    let value = match node.op() {
        Op::Parameter { index, shape, .. } => {
            let input = &inputs[*index];
            let actual: Shape = input.shape().into();
            ensure!(actual == *shape, InputShapeMismatchSnafu { index: *index, expected: shape.clone(), actual });
            input.clone()
        }
        Op::Constant { shape, values } => {
            ArrayD::from_shape_vec(IxDyn(shape), values.clone()).map_err(|e| fail(e.to_string()))?
        }
        Op::Add => args[0] + args[1],
        Op::Subtract => args[0] - args[1],
        Op::Multiply => args[0] * args[1],
        Op::Negative => args[0].mapv(|x| -x),
        Op::Sigmoid => args[0].mapv(|x| 1.0 / (1.0 + (-x).exp())),
        Op::Tanh => args[0].mapv(f32::tanh),
        Op::SigmoidMultiply { input_1, input_2 } => {
            Zip::from(args[0]).and(args[1]).map_collect(|&x, &y| input_1.apply(x) * input_2.apply(y))
        }
        Op::Reshape { input_order, output_shape } => args[0]
            .view()
            .permuted_axes(IxDyn(input_order))
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order(IxDyn(output_shape))
            .map_err(|e| fail(e.to_string()))?,
        Op::Slice { lower_bounds, upper_bounds, strides } => args[0]
            .slice_each_axis(|axis| {
                let i = axis.axis.index();
                Slice::new(lower_bounds[i] as isize, Some(upper_bounds[i] as isize), strides[i] as isize)
            })
            .to_owned(),
        Op::Broadcast { shape, broadcast_axes } => {
            let mut view = args[0].view();
            for &axis in broadcast_axes {
                view = view.insert_axis(Axis(axis));
            }
            view.broadcast(IxDyn(shape)).ok_or_else(|| fail(format!("cannot broadcast to {shape:?}")))?.to_owned()
        }
        Op::Concat { axis } => {
            let views: Vec<_> = args.iter().map(|a| a.view()).collect();
            ndarray::concatenate(Axis(*axis), &views).map_err(|e| fail(e.to_string()))?
        }
        Op::Dot { reduction_axes_count } => {
            let (lhs, rhs) = (args[0], args[1]);
            let n = *reduction_axes_count;
            let k: usize = lhs.shape()[lhs.ndim() - n..].iter().product();
            let m: usize = lhs.shape()[..lhs.ndim() - n].iter().product();
            let cols: usize = rhs.shape()[n..].iter().product();
            let lhs2 = lhs.as_standard_layout().into_owned().into_shape_with_order((m, k)).map_err(|e| fail(e.to_string()))?;
            let rhs2 =
                rhs.as_standard_layout().into_owned().into_shape_with_order((k, cols)).map_err(|e| fail(e.to_string()))?;
            lhs2.dot(&rhs2).into_shape_with_order(IxDyn(node.shape())).map_err(|e| fail(e.to_string()))?
        }
        Op::BatchDot { transpose_a, transpose_b } => {
            let (lhs, rhs) = (args[0], args[1]);
            if lhs.shape()[0] == 0 {
                return Ok(ArrayD::zeros(IxDyn(node.shape())));
            }
            let mut products = Vec::with_capacity(lhs.shape()[0]);
            for batch in 0..lhs.shape()[0] {
                let a = as_matrix(lhs.index_axis(Axis(0), batch), *transpose_a).map_err(&fail)?;
                let b = as_matrix(rhs.index_axis(Axis(0), batch), *transpose_b).map_err(&fail)?;
                products.push(a.dot(&b));
            }
            let views: Vec<_> = products.iter().map(|p| p.view()).collect();
            ndarray::stack(Axis(0), &views).map_err(|e| fail(e.to_string()))?.into_dyn()
        }
    };
    Ok(value)
}

fn as_matrix(view: ndarray::ArrayViewD<'_, f32>, transpose: bool) -> std::result::Result<ArrayView2<'_, f32>, String> {
    let matrix = view.into_dimensionality::<Ix2>().map_err(|e| e.to_string())?;
    Ok(if transpose { matrix.reversed_axes() } else { matrix })
}
