use loom_dtype::DType;

use crate::error::Error;
use crate::{Graph, NodeId, OpKind};

/// `x -> tanh -> (neg, sigmoid) -> add`, result `add`.
fn diamond() -> (Graph, [NodeId; 5]) {
    let mut g = Graph::new();
    let x = g.parameter(&[2, 2], DType::Float32);
    let t = g.tanh(x).unwrap();
    let n = g.negative(t).unwrap();
    let s = g.sigmoid(t).unwrap();
    let a = g.add(n, s).unwrap();
    g.add_result(a);
    (g, [x, t, n, s, a])
}

fn position(order: &[NodeId], id: NodeId) -> usize {
    order.iter().position(|&n| n == id).unwrap()
}

#[test]
fn test_add_node_registers_parameters_and_consumers() {
    let mut g = Graph::new();
    let x = g.parameter(&[2], DType::Float32);
    let y = g.parameter(&[2], DType::Float32);
    let sum = g.add(x, y).unwrap();

    assert_eq!(g.parameters(), &[x, y]);
    assert!(matches!(g[y].op(), crate::Op::Parameter { index: 1, .. }));
    assert_eq!(g.consumers(x), &[sum]);
    assert_eq!(g.consumers(sum), &[] as &[NodeId]);
    assert_eq!(g[sum].shape().as_slice(), &[2]);
}

#[test]
fn test_consumers_are_tracked() {
    let (g, [x, t, n, s, a]) = diamond();
    assert_eq!(g.consumers(x), &[t]);
    assert_eq!(g.consumers(t), &[n, s]);
    assert_eq!(g.consumers(a), &[] as &[NodeId]);
    assert_eq!(g[a].args(), &[n, s]);
}

#[test]
fn test_repeated_argument_is_one_consumer() {
    let mut g = Graph::new();
    let x = g.parameter(&[3], DType::Float32);
    let sq = g.multiply(x, x).unwrap();
    assert_eq!(g.consumers(x), &[sq]);
    assert_eq!(g[sq].args(), &[x, x]);
}

#[test]
fn test_ordered_ops_is_topological() {
    let (g, ids) = diamond();
    let order = g.ordered_ops();
    assert_eq!(order.len(), 5);
    for &id in &order {
        for &arg in g[id].args() {
            assert!(position(&order, arg) < position(&order, id), "{arg} must precede {id}");
        }
    }
    assert_eq!(order.first(), Some(&ids[0]));
    assert_eq!(order.last(), Some(&ids[4]));
    assert_eq!(order, g.ordered_ops());
}

#[test]
fn test_ordered_ops_skips_unreachable() {
    let (mut g, [x, ..]) = diamond();
    let dangling = g.negative(x).unwrap();
    assert!(!g.ordered_ops().contains(&dangling));
    assert_eq!(g.node_count(), 5);
}

#[test]
fn test_replace_node_moves_consumers() {
    let (mut g, [x, t, n, s, a]) = diamond();
    let r = g.sigmoid(x).unwrap();
    g.replace_node(t, r).unwrap();

    assert_eq!(g[n].args(), &[r]);
    assert_eq!(g[s].args(), &[r]);
    assert_eq!(g.consumers(r), &[n, s]);
    assert!(g.consumers(t).is_empty());
    assert!(!g.ordered_ops().contains(&t));
    assert_eq!(g.results(), &[a]);
}

#[test]
fn test_replace_node_updates_results() {
    let (mut g, [x, _, _, _, a]) = diamond();
    let r = g.tanh(x).unwrap();
    g.replace_node(a, r).unwrap();
    assert_eq!(g.results(), &[r]);
}

#[test]
fn test_replace_node_rejects_shape_change() {
    let (mut g, [_, t, n, s, _]) = diamond();
    let other = g.parameter(&[4], DType::Float32);
    let err = g.replace_node(t, other).unwrap_err();
    assert!(matches!(err, Error::IncompatibleReplacement { .. }), "{err}");
    assert_eq!(g.consumers(t), &[n, s]);
    assert_eq!(g[n].args(), &[t]);
}

#[test]
fn test_replace_node_rejects_dtype_change() {
    let (mut g, [_, t, ..]) = diamond();
    let other = g.parameter(&[2, 2], DType::Float64);
    assert!(matches!(g.replace_node(t, other), Err(Error::IncompatibleReplacement { .. })));
}

#[test]
fn test_replace_node_rejects_cycle() {
    let (mut g, [_, t, n, _, _]) = diamond();
    let after_n = g.tanh(n).unwrap();
    let err = g.replace_node(t, after_n).unwrap_err();
    assert_eq!(err, Error::CyclicReplacement { old: t, new: after_n, consumer: n });
}

#[test]
fn test_replace_node_with_own_consumer() {
    let (mut g, [_, t, n, s, _]) = diamond();
    let wrapped = g.tanh(t).unwrap();
    g.replace_node(t, wrapped).unwrap();
    assert_eq!(g[wrapped].args(), &[t]);
    assert_eq!(g[n].args(), &[wrapped]);
    assert_eq!(g[s].args(), &[wrapped]);
    assert_eq!(g.consumers(t), &[wrapped]);
}

#[test]
fn test_copy_with_new_args() {
    let (mut g, [x, t, ..]) = diamond();
    let y = g.parameter(&[2, 2], DType::Float32);
    let copy = g.copy_with_new_args(t, &[y]).unwrap();
    assert_eq!(g[copy].kind(), OpKind::Tanh);
    assert_eq!(g[copy].args(), &[y]);
    assert_eq!(g[t].args(), &[x]);

    let err = g.copy_with_new_args(t, &[x, y]).unwrap_err();
    assert_eq!(err, Error::ArgumentCountMismatch { kind: OpKind::Tanh, expected: 1, actual: 2 });
}

#[test]
fn test_copy_with_new_args_reinfers_shape() {
    let mut g = Graph::new();
    let a = g.parameter(&[2, 2], DType::Float32);
    let b = g.parameter(&[3, 3], DType::Float32);
    let neg = g.negative(a).unwrap();
    let copy = g.copy_with_new_args(neg, &[b]).unwrap();
    assert_eq!(g[copy].shape().as_slice(), &[3, 3]);
}

#[test]
fn test_collect_garbage() {
    let (mut g, [x, t, n, s, a]) = diamond();
    let r = g.sigmoid(x).unwrap();
    g.replace_node(t, r).unwrap();

    assert_eq!(g.collect_garbage(), 1);
    assert!(g.get(t).is_none());
    assert_eq!(g.consumers(x), &[r]);
    for id in [x, n, s, a, r] {
        assert!(g.get(id).is_some());
    }
    assert_eq!(g.collect_garbage(), 0);
}

#[test]
fn test_collect_garbage_keeps_parameters() {
    let mut g = Graph::new();
    let x = g.parameter(&[1], DType::Float32);
    let unused = g.parameter(&[1], DType::Float32);
    let n = g.negative(x).unwrap();
    g.add_result(n);
    assert_eq!(g.collect_garbage(), 0);
    assert_eq!(g.parameters(), &[x, unused]);
}

#[test]
#[should_panic(expected = "was collected")]
fn test_collected_node_panics_on_index() {
    let (mut g, [x, ..]) = diamond();
    let dead = g.negative(x).unwrap();
    g.collect_garbage();
    let _ = &g[dead];
}
