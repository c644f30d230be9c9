//! Node predicates used by labels and skips.
//!
//! These cover the conditions the CPU fusions check: a node's kind, and the
//! activation kinds that fold into `SigmoidMultiply`.

use std::fmt;
use std::sync::Arc;

use crate::op::{ActivationKind, OpKind};
use crate::Node;

/// Named boolean test over a node.
#[derive(Clone)]
pub struct Predicate {
    name: &'static str,
    test: Arc<dyn Fn(&Node) -> bool + Send + Sync>,
}

impl Predicate {
    pub fn new(name: &'static str, test: impl Fn(&Node) -> bool + Send + Sync + 'static) -> Self {
        Self { name, test: Arc::new(test) }
    }

    /// Accepts nodes of exactly `kind`.
    pub fn kind(kind: OpKind) -> Self {
        Self::new(kind.into(), move |node| node.kind() == kind)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn test(&self, node: &Node) -> bool {
        (self.test)(node)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({})", self.name)
    }
}

pub fn is_kind(kind: OpKind) -> Predicate {
    Predicate::kind(kind)
}

#[inline]
pub fn is_reshape() -> Predicate {
    is_kind(OpKind::Reshape)
}

#[inline]
pub fn is_slice() -> Predicate {
    is_kind(OpKind::Slice)
}

#[inline]
pub fn is_broadcast() -> Predicate {
    is_kind(OpKind::Broadcast)
}

/// Accepts `Sigmoid` and `Tanh` nodes.
pub fn is_activation() -> Predicate {
    Predicate::new("Activation", |node| ActivationKind::from_kind(node.kind()).is_some())
}
