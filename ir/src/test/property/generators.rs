//! Generators for property-based testing.
//!
//! Graphs are built from a random "program": a list of steps, each applying
//! one op to nodes created by earlier steps. Every generated graph is valid by
//! construction and has its last node as the only result.

use loom_dtype::DType;
use proptest::prelude::*;

use crate::pattern::{Pattern, Predicate, is_reshape};
use crate::{Graph, Label, NodeId, OpKind};

/// Every node in generated graphs has this shape.
pub const SHAPE: [usize; 2] = [2, 2];

#[derive(Debug, Clone, Copy)]
pub enum Step {
    Negative(usize),
    Tanh(usize),
    Sigmoid(usize),
    Transpose(usize),
    Add(usize, usize),
    Multiply(usize, usize),
}

pub fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        any::<usize>().prop_map(Step::Negative),
        any::<usize>().prop_map(Step::Tanh),
        any::<usize>().prop_map(Step::Sigmoid),
        any::<usize>().prop_map(Step::Transpose),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Step::Add(a, b)),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Step::Multiply(a, b)),
    ]
}

/// Build a graph from `steps` over `params` parameters. Step operands index
/// into the nodes built so far (modulo their count).
pub fn build_graph(params: usize, steps: &[Step]) -> (Graph, Vec<NodeId>) {
    let mut g = Graph::new();
    let mut nodes: Vec<NodeId> = (0..params.max(1)).map(|_| g.parameter(&SHAPE, DType::Float32)).collect();
    for step in steps {
        let pick = |i: usize| nodes[i % nodes.len()];
        let id = match *step {
            Step::Negative(a) => g.negative(pick(a)),
            Step::Tanh(a) => g.tanh(pick(a)),
            Step::Sigmoid(a) => g.sigmoid(pick(a)),
            Step::Transpose(a) => g.reshape(pick(a), &[1, 0], &SHAPE),
            Step::Add(a, b) => g.add(pick(a), pick(b)),
            Step::Multiply(a, b) => g.multiply(pick(a), pick(b)),
        }
        .expect("generated steps are shape-consistent");
        nodes.push(id);
    }
    if let Some(&last) = nodes.last() {
        g.add_result(last);
    }
    (g, nodes)
}

pub fn arb_graph() -> impl Strategy<Value = (Graph, Vec<NodeId>)> {
    (1usize..=3, prop::collection::vec(arb_step(), 1..16)).prop_map(|(params, steps)| build_graph(params, &steps))
}

/// A fixed menu of patterns exercising labels, skips and concrete ops.
pub fn pattern_menu() -> Vec<Pattern> {
    let x = Label::new("x");
    let y = Label::new("y");
    let act = Label::new("act").with_predicate(crate::pattern::is_activation());
    vec![
        Pattern::add(&x, &y),
        Pattern::add(&x, &x),
        Pattern::multiply(&act, &y),
        Pattern::skip(Pattern::op(OpKind::Tanh, [Pattern::from(&x)]), is_reshape()),
        Pattern::op(OpKind::Negative, [Pattern::skip(&x, Predicate::kind(OpKind::Negative))]),
        Pattern::from(Label::new("leaf").with_predicate(Predicate::kind(OpKind::Parameter))),
    ]
}
