//! Pattern wildcards.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::Node;
use crate::pattern::Predicate;
use crate::shape::Shape;

static LABEL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identity of a [`Label`]. Clones of a label share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(u64);

/// Shape a label accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ShapeConstraint {
    #[default]
    Any,
    Rank(usize),
    Exact(Shape),
}

impl ShapeConstraint {
    pub fn accepts(&self, shape: &[usize]) -> bool {
        match self {
            Self::Any => true,
            Self::Rank(rank) => shape.len() == *rank,
            Self::Exact(expected) => expected.as_slice() == shape,
        }
    }
}

/// Wildcard that binds to exactly one node per match.
///
/// A label binds the first node it is matched against (if the predicate and
/// shape constraint accept it); every later occurrence of the same label in
/// the pattern must then meet that very node.
#[derive(Clone)]
pub struct Label {
    id: LabelId,
    name: &'static str,
    predicate: Option<Predicate>,
    shape: ShapeConstraint,
}

impl Label {
    /// Label accepting any node.
    pub fn new(name: &'static str) -> Self {
        let id = LabelId(LABEL_ID_COUNTER.fetch_add(1, Ordering::Relaxed));
        Self { id, name, predicate: None, shape: ShapeConstraint::Any }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_shape(mut self, shape: ShapeConstraint) -> Self {
        self.shape = shape;
        self
    }

    pub fn id(&self) -> LabelId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn shape_constraint(&self) -> &ShapeConstraint {
        &self.shape
    }

    /// Whether an unbound occurrence of this label may bind `node`.
    pub fn accepts(&self, node: &Node) -> bool {
        self.predicate.as_ref().is_none_or(|p| p.test(node)) && self.shape.accepts(node.shape())
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Label")
            .field("id", &self.id.0)
            .field("name", &self.name)
            .field("predicate", &self.predicate)
            .field("shape", &self.shape)
            .finish()
    }
}
