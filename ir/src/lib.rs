//! Dataflow graph IR for the loom CPU back end.
//!
//! # Module Organization
//!
//! - [`graph`] - Node arena, consumer table and in-place rewriting (`replace_node`)
//! - [`op`] - Closed operation enum with shape inference
//! - [`shape`] - Shape, coordinate and axis helpers
//! - [`pattern`] - Labels, skips and the structural [`Matcher`]
//! - [`interp`] - `ndarray` reference interpreter
//! - [`error`] - Error types and result handling
//!
//! Graph rendering for logs lives in `tree` and is exposed as [`Graph::tree`].

pub mod error;
pub mod graph;
pub mod interp;
pub mod op;
pub mod pattern;
pub mod shape;
mod tree;


pub use error::{Error, Result};
pub use graph::{Graph, Node, NodeArgs, NodeId};
pub use loom_dtype::DType;
pub use op::{ActivationKind, Op, OpKind};
pub use pattern::{Label, Matcher, Pattern, PatternMap, Predicate, ShapeConstraint};
pub use shape::{AxisSet, AxisVector, Coordinate, Shape, Strides};
