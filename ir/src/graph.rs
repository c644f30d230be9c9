//! Node arena.
//!
//! The [`Graph`] exclusively owns every [`Node`]. Nodes reference their
//! arguments through [`NodeId`] handles, and the graph keeps a reverse-edge
//! table of consumers next to the arena. Identity of a node is the value of its
//! handle, so two handles denote the same node iff they compare equal.
//!
//! Nodes are appended, never moved. A node stops being part of the computation
//! once nothing reachable from the results references it; [`Graph::collect_garbage`]
//! reclaims such nodes and their edges.

use std::fmt;
use std::ops::Index;

use loom_dtype::DType;
use smallvec::SmallVec;
use snafu::ensure;
use tracing::{debug, trace};

use crate::error::*;
use crate::op::{ActivationKind, Op, OpKind};
use crate::shape::{AxisSet, Shape};

/// Stable handle of a node inside its [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

pub type NodeArgs = SmallVec<[NodeId; 4]>;

/// One operation vertex.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    op: Op,
    args: NodeArgs,
    shape: Shape,
    dtype: DType,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }

    pub fn args(&self) -> &[NodeId] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<NodeId> {
        self.args.get(index).copied()
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Debug name such as `Reshape_12`.
    pub fn name(&self) -> String {
        let kind: &'static str = self.kind().into();
        format!("{kind}_{}", self.id.0)
    }
}

/// Arena-backed dataflow DAG.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Option<Node>>,
    consumers: Vec<NodeArgs>,
    parameters: Vec<NodeId>,
    results: Vec<NodeId>,
}

impl Index<NodeId> for Graph {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match self.nodes.get(id.index()) {
            Some(Some(node)) => node,
            Some(None) => panic!("{id} was collected"),
            None => panic!("{id} does not belong to this graph"),
        }
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    /// Nodes currently consuming `id`, each listed once.
    pub fn consumers(&self, id: NodeId) -> &[NodeId] {
        self.consumers.get(id.index()).map(SmallVec::as_slice).unwrap_or_default()
    }

    /// Parameters in index order.
    pub fn parameters(&self) -> &[NodeId] {
        &self.parameters
    }

    pub fn results(&self) -> &[NodeId] {
        &self.results
    }

    pub fn add_result(&mut self, id: NodeId) {
        self.results.push(id);
    }

    /// Append a node, validating its arguments and inferring its shape.
    pub fn add_node(&mut self, op: Op, args: &[NodeId]) -> Result<NodeId> {
        let shape = {
            let arg_shapes: SmallVec<[&Shape; 4]> = args.iter().map(|&arg| self[arg].shape()).collect();
            op.infer_shape(&arg_shapes)?
        };
        let dtype = match op.leaf_dtype() {
            Some(dtype) => dtype,
            None => {
                let lhs = self[args[0]].dtype();
                if let Some(rhs) = args.iter().map(|&arg| self[arg].dtype()).find(|&d| d != lhs) {
                    return DTypeMismatchSnafu { lhs, rhs }.fail();
                }
                lhs
            }
        };

        let id = NodeId(self.nodes.len() as u32);
        let op = match op {
            Op::Parameter { shape, dtype, .. } => {
                self.parameters.push(id);
                Op::Parameter { index: self.parameters.len() - 1, shape, dtype }
            }
            op => op,
        };

        let mut unique_args = NodeArgs::new();
        for &arg in args {
            if !unique_args.contains(&arg) {
                unique_args.push(arg);
                self.consumers[arg.index()].push(id);
            }
        }

        trace!(node = %id, op = %op, shape = ?shape.as_slice(), "add node");
        self.nodes.push(Some(Node { id, op, args: args.iter().copied().collect(), shape, dtype }));
        self.consumers.push(NodeArgs::new());
        Ok(id)
    }

    // =========================================================================
    // Builders
    // =========================================================================

    pub fn parameter(&mut self, shape: &[usize], dtype: DType) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let index = self.parameters.len();
        self.parameters.push(id);
        self.nodes.push(Some(Node {
            id,
            op: Op::Parameter { index, shape: shape.into(), dtype },
            args: NodeArgs::new(),
            shape: shape.into(),
            dtype,
        }));
        self.consumers.push(NodeArgs::new());
        id
    }

    pub fn constant(&mut self, shape: &[usize], values: Vec<f32>) -> Result<NodeId> {
        self.add_node(Op::Constant { shape: shape.into(), values }, &[])
    }

    pub fn add(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId> {
        self.add_node(Op::Add, &[lhs, rhs])
    }

    pub fn subtract(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId> {
        self.add_node(Op::Subtract, &[lhs, rhs])
    }

    pub fn multiply(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId> {
        self.add_node(Op::Multiply, &[lhs, rhs])
    }

    pub fn negative(&mut self, arg: NodeId) -> Result<NodeId> {
        self.add_node(Op::Negative, &[arg])
    }

    pub fn sigmoid(&mut self, arg: NodeId) -> Result<NodeId> {
        self.add_node(Op::Sigmoid, &[arg])
    }

    pub fn tanh(&mut self, arg: NodeId) -> Result<NodeId> {
        self.add_node(Op::Tanh, &[arg])
    }

    pub fn reshape(&mut self, arg: NodeId, input_order: &[usize], output_shape: &[usize]) -> Result<NodeId> {
        self.add_node(Op::Reshape { input_order: input_order.into(), output_shape: output_shape.into() }, &[arg])
    }

    /// Unit-stride slice `[lower, upper)`.
    pub fn slice(&mut self, arg: NodeId, lower: &[usize], upper: &[usize]) -> Result<NodeId> {
        let strides: SmallVec<[usize; 4]> = SmallVec::from_elem(1, lower.len());
        self.strided_slice(arg, lower, upper, &strides)
    }

    pub fn strided_slice(&mut self, arg: NodeId, lower: &[usize], upper: &[usize], strides: &[usize]) -> Result<NodeId> {
        let op = Op::Slice { lower_bounds: lower.into(), upper_bounds: upper.into(), strides: strides.into() };
        self.add_node(op, &[arg])
    }

    pub fn broadcast(&mut self, arg: NodeId, shape: &[usize], axes: &[usize]) -> Result<NodeId> {
        let broadcast_axes: AxisSet = axes.iter().copied().collect();
        self.add_node(Op::Broadcast { shape: shape.into(), broadcast_axes }, &[arg])
    }

    /// Matrix product contracting one axis.
    pub fn dot(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId> {
        self.add_node(Op::Dot { reduction_axes_count: 1 }, &[lhs, rhs])
    }

    pub fn concat(&mut self, args: &[NodeId], axis: usize) -> Result<NodeId> {
        self.add_node(Op::Concat { axis }, args)
    }

    pub fn batch_dot(&mut self, lhs: NodeId, rhs: NodeId, transpose_a: bool, transpose_b: bool) -> Result<NodeId> {
        self.add_node(Op::BatchDot { transpose_a, transpose_b }, &[lhs, rhs])
    }

    pub fn sigmoid_multiply(
        &mut self,
        lhs: NodeId,
        rhs: NodeId,
        input_1: ActivationKind,
        input_2: ActivationKind,
    ) -> Result<NodeId> {
        self.add_node(Op::SigmoidMultiply { input_1, input_2 }, &[lhs, rhs])
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Nodes reachable from the results, every argument before its consumers.
    ///
    /// The order is a deterministic post-order: results in order, arguments
    /// left to right.
    pub fn ordered_ops(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<(NodeId, usize)> = Vec::new();

        for &root in &self.results {
            if visited[root.index()] {
                continue;
            }
            visited[root.index()] = true;
            stack.push((root, 0));

            while let Some(&(id, next)) = stack.last() {
                match self[id].arg(next) {
                    Some(arg) => {
                        let top = stack.len() - 1;
                        stack[top].1 += 1;
                        if !visited[arg.index()] {
                            visited[arg.index()] = true;
                            stack.push((arg, 0));
                        }
                    }
                    None => {
                        order.push(id);
                        stack.pop();
                    }
                }
            }
        }
        order
    }

    /// Number of nodes reachable from the results.
    pub fn node_count(&self) -> usize {
        self.ordered_ops().len()
    }

    /// Whether `ancestor` is reachable from `id` through argument edges (or is `id`).
    pub fn depends_on(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if current == ancestor {
                return true;
            }
            if !std::mem::replace(&mut visited[current.index()], true) {
                stack.extend(self[current].args.iter().copied());
            }
        }
        false
    }

    // =========================================================================
    // Rewriting
    // =========================================================================

    /// Redirect every consumer edge and result slot of `old` to `new`.
    ///
    /// `new` must produce the same shape and dtype. A consumer of `old` that
    /// `new` itself depends on would close a cycle and is rejected. Nothing is
    /// mutated unless the replacement is valid.
    pub fn replace_node(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        if old == new {
            return Ok(());
        }

        let (old_node, new_node) = (&self[old], &self[new]);
        ensure!(
            old_node.shape == new_node.shape && old_node.dtype == new_node.dtype,
            IncompatibleReplacementSnafu {
                old,
                new,
                old_shape: old_node.shape.clone(),
                new_shape: new_node.shape.clone(),
                old_dtype: old_node.dtype,
                new_dtype: new_node.dtype,
            }
        );

        let consumers: NodeArgs = self.consumers(old).iter().copied().filter(|&c| c != new).collect();
        if let Some(&consumer) = consumers.iter().find(|&&c| self.depends_on(new, c)) {
            return CyclicReplacementSnafu { old, new, consumer }.fail();
        }

        for &consumer in &consumers {
            if let Some(node) = self.nodes[consumer.index()].as_mut() {
                for arg in node.args.iter_mut().filter(|arg| **arg == old) {
                    *arg = new;
                }
            }
            if !self.consumers[new.index()].contains(&consumer) {
                self.consumers[new.index()].push(consumer);
            }
        }
        self.consumers[old.index()].retain(|c| *c == new);

        for result in self.results.iter_mut().filter(|r| **r == old) {
            *result = new;
        }

        trace!(%old, %new, consumers = consumers.len(), "replace node");
        Ok(())
    }

    /// New node with the same op as `id` applied to `new_args`.
    pub fn copy_with_new_args(&mut self, id: NodeId, new_args: &[NodeId]) -> Result<NodeId> {
        let node = &self[id];
        let expected = node.args.len();
        ensure!(
            new_args.len() == expected,
            ArgumentCountMismatchSnafu { kind: node.kind(), expected, actual: new_args.len() }
        );
        let op = node.op.clone();
        self.add_node(op, new_args)
    }

    /// Drop nodes that are neither reachable from the results nor parameters.
    ///
    /// Returns the number of collected nodes. Handles of collected nodes must
    /// not be used afterwards.
    pub fn collect_garbage(&mut self) -> usize {
        let mut live = vec![false; self.nodes.len()];
        for id in self.ordered_ops() {
            live[id.index()] = true;
        }
        for &param in &self.parameters {
            live[param.index()] = true;
        }

        let mut collected = 0;
        for index in 0..self.nodes.len() {
            if live[index] {
                continue;
            }
            if let Some(node) = self.nodes[index].take() {
                for arg in &node.args {
                    self.consumers[arg.index()].retain(|c| *c != node.id);
                }
                self.consumers[index].clear();
                collected += 1;
            }
        }

        if collected > 0 {
            debug!(collected, remaining = self.nodes.iter().flatten().count(), "collected dead nodes");
        }
        collected
    }
}
