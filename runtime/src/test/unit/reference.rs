use std::sync::Arc;

use loom_dtype::DType;
use loom_ir::interp::evaluate;
use loom_ir::{Graph, OpKind};
use loom_schedule::{PassManager, PipelineConfig};
use ndarray::{ArrayD, IxDyn};

use crate::error::Error;
use crate::{CallFrame, CallFrameConfig, ExternalFunction, HostTensor, ReferenceFunction, RuntimeContext, TensorView};

fn ramp(shape: &[usize], offset: f32) -> ArrayD<f32> {
    let len = shape.iter().product();
    ArrayD::from_shape_vec(IxDyn(shape), (0..len).map(|i| offset + i as f32 * 0.25).collect()).unwrap()
}

/// `Sigmoid(x) * Tanh(y) + x` over `[2, 3]` tensors.
fn gated_graph() -> Graph {
    let mut g = Graph::new();
    let x = g.parameter(&[2, 3], DType::Float32);
    let y = g.parameter(&[2, 3], DType::Float32);
    let gate = g.sigmoid(x).unwrap();
    let value = g.tanh(y).unwrap();
    let product = g.multiply(gate, value).unwrap();
    let sum = g.add(product, x).unwrap();
    g.add_result(sum);
    g
}

/// `Dot(x, w)` for `x: [2, 4]` and `w: [4, 3]`, plus the negated input.
fn two_result_graph() -> Graph {
    let mut g = Graph::new();
    let x = g.parameter(&[2, 4], DType::Float32);
    let w = g.parameter(&[4, 3], DType::Float32);
    let dot = g.dot(x, w).unwrap();
    let negated = g.negative(x).unwrap();
    g.add_result(dot);
    g.add_result(negated);
    g
}

fn run(graph: Graph, inputs: &[ArrayD<f32>], config: CallFrameConfig) -> (CallFrame, Vec<ArrayD<f32>>) {
    let shapes: Vec<Vec<usize>> = graph.results().iter().map(|&id| graph[id].shape().to_vec()).collect();
    let (function, entry) = ReferenceFunction::compile("reference", graph).unwrap();
    let mut frame = CallFrame::new(function, entry, config);

    let mut inputs: Vec<HostTensor> = inputs.iter().map(HostTensor::from_array).collect();
    let mut outputs: Vec<HostTensor> = shapes.iter().map(|shape| HostTensor::zeros(shape)).collect();
    let mut input_views: Vec<&mut dyn TensorView> = inputs.iter_mut().map(|t| t as &mut dyn TensorView).collect();
    let mut output_views: Vec<&mut dyn TensorView> = outputs.iter_mut().map(|t| t as &mut dyn TensorView).collect();
    frame.tensor_call(&mut input_views, &mut output_views).unwrap();

    let values = outputs.iter().map(|t| t.to_array().unwrap()).collect();
    (frame, values)
}

fn assert_close(actual: &[ArrayD<f32>], expected: &[ArrayD<f32>]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert_eq!(a.shape(), e.shape());
        for (x, y) in a.iter().zip(e) {
            assert!((x - y).abs() <= 1e-5, "{x} != {y}");
        }
    }
}

#[test]
fn test_frame_matches_interpreter() {
    let graph = two_result_graph();
    let inputs = [ramp(&[2, 4], -1.0), ramp(&[4, 3], 0.5)];
    let expected = evaluate(&graph, &inputs).unwrap();

    let (_, actual) = run(graph, &inputs, CallFrameConfig::default());
    assert_close(&actual, &expected);
}

#[test]
fn test_fused_graph_runs_through_frame() {
    let graph = gated_graph();
    let inputs = [ramp(&[2, 3], -0.75), ramp(&[2, 3], 0.1)];
    let expected = evaluate(&graph, &inputs).unwrap();

    let mut fused = graph.clone();
    let stats = PassManager::cpu_fusions(&PipelineConfig::default()).run(&mut fused).unwrap();
    assert_eq!(stats.passes_modified, 1);
    let kinds: Vec<OpKind> = fused.ordered_ops().iter().map(|&id| fused[id].kind()).collect();
    assert!(kinds.contains(&OpKind::SigmoidMultiply));

    let (_, actual) = run(fused, &inputs, CallFrameConfig::default());
    assert_close(&actual, &expected);
}

#[test]
fn test_layouts_are_row_major() {
    let (function, _) = ReferenceFunction::compile("layouts", two_result_graph()).unwrap();
    let shapes: Vec<&[usize]> = function.result_layouts().iter().flatten().map(|layout| layout.shape()).collect();
    assert_eq!(shapes, [&[2, 3][..], &[2, 4][..]]);
    assert!(function.parameter_layouts().iter().flatten().all(|layout| layout.is_row_major()));
}

#[test]
fn test_op_attrs_skip_parameters() {
    let (function, _) = ReferenceFunction::compile("ops", gated_graph()).unwrap();
    let names: Vec<&str> = function.op_attrs().iter().map(|attrs| attrs.name.as_str()).collect();
    assert_eq!(names.len(), 4);
    assert!(names.iter().all(|name| !name.starts_with("Parameter")));
}

#[test]
fn test_instrumented_timeline_covers_every_op() {
    let config = CallFrameConfig::builder().instrumentation(true).build();
    let (frame, _) = run(gated_graph(), &[ramp(&[2, 3], 0.0), ramp(&[2, 3], 1.0)], config);

    let timeline = frame.timeline();
    assert_eq!(timeline.len(), 4);
    assert!(timeline.iter().all(|&(_, micros)| micros >= 0));
    assert!(frame.get_performance_data().is_empty());
}

#[test]
fn test_integer_graph_is_rejected() {
    let mut g = Graph::new();
    let x = g.parameter(&[3], DType::Int32);
    g.add_result(x);

    let err = ReferenceFunction::compile("ints", g).unwrap_err();
    assert!(matches!(err, Error::UnsupportedDType { dtype: DType::Int32, .. }), "{err}");
}

#[test]
fn test_function_outlives_graph_owner() {
    let (function, entry) = ReferenceFunction::compile("shared", two_result_graph()).unwrap();
    let mut frame = CallFrame::new(function.clone(), entry, CallFrameConfig::default());
    assert_eq!(Arc::strong_count(&function), 2);

    let mut x = HostTensor::from_array(&ramp(&[2, 4], 0.0));
    let mut w = HostTensor::from_array(&ramp(&[4, 3], 0.0));
    let (mut dot, mut negated) = (HostTensor::zeros(&[2, 3]), HostTensor::zeros(&[2, 4]));
    frame.tensor_call(&mut [&mut x, &mut w], &mut [&mut dot, &mut negated]).unwrap();
    assert_eq!(negated.data()[1], -0.25);

    drop(frame);
    assert_eq!(Arc::strong_count(&function), 1);
}

#[test]
fn test_evaluation_failure_is_recorded() {
    let (function, entry) = ReferenceFunction::compile("short", two_result_graph()).unwrap();
    let mut ctx = RuntimeContext::new(Arc::from([]), None);

    // No input pointers for two parameters: the interpreter rejects the call.
    entry.invoke(&[], &[], ctx.raw_mut());

    let err = function.take_failure().unwrap();
    assert!(matches!(err, Error::Graph { source: loom_ir::Error::InputCountMismatch { expected: 2, actual: 0 } }), "{err}");
    assert!(function.take_failure().is_none());
}

#[test]
fn test_empty_contraction_populates_outputs() {
    let mut g = Graph::new();
    let a = g.parameter(&[2, 0], DType::Float32);
    let b = g.parameter(&[0, 3], DType::Float32);
    let d = g.dot(a, b).unwrap();
    g.add_result(d);

    let (function, entry) = ReferenceFunction::compile("empty", g).unwrap();
    let mut frame = CallFrame::new(function, entry, CallFrameConfig::default());
    let (mut a, mut b) = (HostTensor::zeros(&[2, 0]), HostTensor::zeros(&[0, 3]));
    let mut out = HostTensor::from_array(&ArrayD::from_elem(IxDyn(&[2, 3]), 42.0));

    frame.tensor_call(&mut [&mut a, &mut b], &mut [&mut out]).unwrap();
    assert_eq!(out.data(), &[0.0; 6]);
}
