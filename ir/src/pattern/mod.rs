//! Structural pattern matching over [`Graph`](crate::Graph) regions.
//!
//! A [`Pattern`] is a small tree built from three primitives:
//!
//! - [`Label`]: a wildcard with an optional predicate and shape constraint that
//!   binds to one node. Repeated occurrences must meet the same node.
//! - `Skip`: absorbs zero or more nodes accepted by its predicate (descending
//!   through each node's sole argument) and hands the first rejected node to
//!   its inner pattern.
//! - `Op`: a concrete operation kind with positional argument patterns.
//!
//! [`Matcher`] runs one pattern against a candidate node and exposes the
//! resulting [`PatternMap`] and match path. Matching never mutates the graph.

pub mod helpers;
pub mod label;
pub mod matcher;

use smallvec::SmallVec;

use crate::NodeId;
use crate::op::OpKind;

pub use helpers::{Predicate, is_activation, is_broadcast, is_kind, is_reshape, is_slice};
pub use label::{Label, LabelId, ShapeConstraint};
pub use matcher::Matcher;

// =============================================================================
// Pattern tree
// =============================================================================

#[derive(Debug, Clone)]
pub enum Pattern {
    Label(Label),
    Skip { predicate: Predicate, inner: Box<Pattern> },
    Op { kind: OpKind, args: Vec<Pattern> },
}

impl Pattern {
    pub fn op(kind: OpKind, args: impl IntoIterator<Item = Pattern>) -> Self {
        Self::Op { kind, args: args.into_iter().collect() }
    }

    /// Absorb any chain of nodes accepted by `predicate` in front of `inner`.
    pub fn skip(inner: impl Into<Pattern>, predicate: Predicate) -> Self {
        Self::Skip { predicate, inner: Box::new(inner.into()) }
    }

    pub fn add(lhs: impl Into<Pattern>, rhs: impl Into<Pattern>) -> Self {
        Self::op(OpKind::Add, [lhs.into(), rhs.into()])
    }

    pub fn multiply(lhs: impl Into<Pattern>, rhs: impl Into<Pattern>) -> Self {
        Self::op(OpKind::Multiply, [lhs.into(), rhs.into()])
    }

    pub fn dot(lhs: impl Into<Pattern>, rhs: impl Into<Pattern>) -> Self {
        Self::op(OpKind::Dot, [lhs.into(), rhs.into()])
    }

    pub fn reshape(arg: impl Into<Pattern>) -> Self {
        Self::op(OpKind::Reshape, [arg.into()])
    }

    pub fn slice(arg: impl Into<Pattern>) -> Self {
        Self::op(OpKind::Slice, [arg.into()])
    }

    pub fn broadcast(arg: impl Into<Pattern>) -> Self {
        Self::op(OpKind::Broadcast, [arg.into()])
    }
}

impl From<Label> for Pattern {
    fn from(label: Label) -> Self {
        Self::Label(label)
    }
}

impl From<&Label> for Pattern {
    fn from(label: &Label) -> Self {
        Self::Label(label.clone())
    }
}

// =============================================================================
// PatternMap
// =============================================================================

/// Label bindings of one successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternMap {
    bindings: SmallVec<[(LabelId, NodeId); 8]>,
}

impl PatternMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, label: &Label) -> Option<NodeId> {
        self.get_id(label.id())
    }

    pub fn get_id(&self, id: LabelId) -> Option<NodeId> {
        self.bindings.iter().find(|(bound, _)| *bound == id).map(|&(_, node)| node)
    }

    pub fn contains(&self, label: &Label) -> bool {
        self.get(label).is_some()
    }

    /// Bind `id`, replacing any earlier binding.
    pub fn insert(&mut self, id: LabelId, node: NodeId) {
        match self.bindings.iter_mut().find(|(bound, _)| *bound == id) {
            Some(slot) => slot.1 = node,
            None => self.bindings.push((id, node)),
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Bindings in the order they were made.
    pub fn iter(&self) -> impl Iterator<Item = (LabelId, NodeId)> + '_ {
        self.bindings.iter().copied()
    }
}

impl std::ops::Index<&Label> for PatternMap {
    type Output = NodeId;

    /// Panics if `label` is unbound.
    fn index(&self, label: &Label) -> &NodeId {
        match self.bindings.iter().find(|(bound, _)| *bound == label.id()) {
            Some((_, node)) => node,
            None => panic!("label {label:?} is not bound"),
        }
    }
}
