use loom_dtype::DType;
use ndarray::{ArrayD, IxDyn, arr2, arr3};

use crate::error::Error;
use crate::interp::{evaluate, evaluate_with};
use crate::{ActivationKind, Graph};

fn iota(shape: &[usize]) -> ArrayD<f32> {
    let len = shape.iter().product::<usize>();
    ArrayD::from_shape_vec(IxDyn(shape), (0..len).map(|v| v as f32).collect()).unwrap()
}

#[test]
fn test_reshape_transposes_before_reinterpreting() {
    let mut g = Graph::new();
    let x = g.parameter(&[2, 3], DType::Float32);
    let r = g.reshape(x, &[1, 0], &[3, 2]).unwrap();
    g.add_result(r);

    let out = evaluate(&g, &[iota(&[2, 3])]).unwrap();
    assert_eq!(out[0], arr2(&[[0.0, 3.0], [1.0, 4.0], [2.0, 5.0]]).into_dyn());
}

#[test]
fn test_strided_slice() {
    let mut g = Graph::new();
    let x = g.parameter(&[4, 3], DType::Float32);
    let s = g.strided_slice(x, &[1, 0], &[4, 3], &[2, 2]).unwrap();
    g.add_result(s);

    let out = evaluate(&g, &[iota(&[4, 3])]).unwrap();
    assert_eq!(out[0], arr2(&[[3.0, 5.0], [9.0, 11.0]]).into_dyn());
}

#[test]
fn test_broadcast_leading_axis() {
    let mut g = Graph::new();
    let b = g.parameter(&[2], DType::Float32);
    let bb = g.broadcast(b, &[3, 2], &[0]).unwrap();
    g.add_result(bb);

    let out = evaluate(&g, &[iota(&[2])]).unwrap();
    assert_eq!(out[0], arr2(&[[0.0, 1.0], [0.0, 1.0], [0.0, 1.0]]).into_dyn());
}

#[test]
fn test_dot_and_add() {
    let mut g = Graph::new();
    let a = g.parameter(&[2, 2], DType::Float32);
    let w = g.parameter(&[2, 1], DType::Float32);
    let c = g.constant(&[2, 1], vec![10.0, 20.0]).unwrap();
    let d = g.dot(a, w).unwrap();
    let sum = g.add(d, c).unwrap();
    g.add_result(sum);

    let out = evaluate(&g, &[iota(&[2, 2]), iota(&[2, 1])]).unwrap();
    assert_eq!(out[0], arr2(&[[11.0], [23.0]]).into_dyn());
}

#[test]
fn test_dot_with_empty_contraction_is_zero() {
    let mut g = Graph::new();
    let a = g.parameter(&[2, 0], DType::Float32);
    let b = g.parameter(&[0, 3], DType::Float32);
    let d = g.dot(a, b).unwrap();
    g.add_result(d);

    let out = evaluate(&g, &[iota(&[2, 0]), iota(&[0, 3])]).unwrap();
    assert_eq!(out[0], ArrayD::<f32>::zeros(IxDyn(&[2, 3])));
}

#[test]
fn test_batch_dot_without_batches() {
    let mut g = Graph::new();
    let a = g.parameter(&[0, 2, 3], DType::Float32);
    let b = g.parameter(&[0, 3, 4], DType::Float32);
    let d = g.batch_dot(a, b, false, false).unwrap();
    g.add_result(d);

    let out = evaluate(&g, &[iota(&[0, 2, 3]), iota(&[0, 3, 4])]).unwrap();
    assert_eq!(out[0].shape(), &[0, 2, 4]);
}

#[test]
fn test_batch_dot_with_transposes() {
    let mut g = Graph::new();
    let a = g.parameter(&[2, 2, 2], DType::Float32);
    let b = g.parameter(&[2, 2, 2], DType::Float32);
    let plain = g.batch_dot(a, b, false, false).unwrap();
    let both = g.batch_dot(a, b, true, true).unwrap();
    g.add_result(plain);
    g.add_result(both);

    let lhs = iota(&[2, 2, 2]);
    let rhs = ArrayD::from_elem(IxDyn(&[2, 2, 2]), 1.0);
    let out = evaluate(&g, &[lhs, rhs]).unwrap();
    assert_eq!(out[0], arr3(&[[[1.0, 1.0], [5.0, 5.0]], [[9.0, 9.0], [13.0, 13.0]]]).into_dyn());
    assert_eq!(out[1], arr3(&[[[2.0, 2.0], [4.0, 4.0]], [[10.0, 10.0], [12.0, 12.0]]]).into_dyn());
}

#[test]
fn test_concat_and_sigmoid_multiply() {
    let mut g = Graph::new();
    let x = g.parameter(&[1, 2], DType::Float32);
    let y = g.parameter(&[1, 2], DType::Float32);
    let cat = g.concat(&[x, y], 0).unwrap();
    let fused = g.sigmoid_multiply(x, y, ActivationKind::Sigmoid, ActivationKind::Tanh).unwrap();
    g.add_result(cat);
    g.add_result(fused);

    let xs = ArrayD::from_elem(IxDyn(&[1, 2]), 0.0);
    let ys = ArrayD::from_elem(IxDyn(&[1, 2]), 1.0);
    let out = evaluate(&g, &[xs, ys]).unwrap();
    assert_eq!(out[0], arr2(&[[0.0, 0.0], [1.0, 1.0]]).into_dyn());
    let expected = 0.5 * 1.0f32.tanh();
    assert!(out[1].iter().all(|&v| (v - expected).abs() < 1e-6));
}

#[test]
fn test_input_validation() {
    let mut g = Graph::new();
    let x = g.parameter(&[2], DType::Float32);
    let n = g.negative(x).unwrap();
    g.add_result(n);

    assert_eq!(evaluate(&g, &[]).unwrap_err(), Error::InputCountMismatch { expected: 1, actual: 0 });
    assert!(matches!(evaluate(&g, &[iota(&[3])]).unwrap_err(), Error::InputShapeMismatch { index: 0, .. }));
}

#[test]
fn test_rejects_non_f32() {
    let mut g = Graph::new();
    let x = g.parameter(&[2], DType::Int32);
    g.add_result(x);
    assert_eq!(evaluate(&g, &[iota(&[2])]).unwrap_err(), Error::UnsupportedDType { node: x, dtype: DType::Int32 });
}

#[test]
fn test_observer_sees_every_computed_node() {
    let mut g = Graph::new();
    let x = g.parameter(&[2], DType::Float32);
    let t = g.tanh(x).unwrap();
    let n = g.negative(t).unwrap();
    g.add_result(n);

    let mut seen = Vec::new();
    evaluate_with(&g, &[iota(&[2])], |node, _| seen.push(node.id())).unwrap();
    assert_eq!(seen, vec![t, n]);
}
