use loom_dtype::DType;
use snafu::Snafu;

use crate::{NodeId, OpKind, shape::Shape};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Operation received the wrong number of arguments.
    #[snafu(display("{kind:?} expects {expected} arguments, got {actual}"))]
    ArityMismatch { kind: OpKind, expected: usize, actual: usize },

    /// `copy_with_new_args` called with a different argument count.
    #[snafu(display("incorrect number of new arguments for {kind:?}: expected {expected}, got {actual}"))]
    ArgumentCountMismatch { kind: OpKind, expected: usize, actual: usize },

    /// Arguments of an operation disagree on element type.
    #[snafu(display("dtype mismatch: cannot combine {lhs} and {rhs}"))]
    DTypeMismatch { lhs: DType, rhs: DType },

    /// Elementwise operation on differently shaped arguments.
    #[snafu(display("{kind:?} requires equal shapes, got {lhs:?} and {rhs:?}"))]
    ShapeMismatch { kind: OpKind, lhs: Shape, rhs: Shape },

    /// Reshape input order is not a permutation of the argument axes.
    #[snafu(display("input order {order:?} is not a permutation of {rank} axes"))]
    InvalidInputOrder { order: Vec<usize>, rank: usize },

    /// Reshape changes the number of elements.
    #[snafu(display("reshape size mismatch: input size {input_size} != output size {output_size}"))]
    ReshapeSizeMismatch { input_size: usize, output_size: usize },

    /// Slice bounds, strides and argument rank disagree.
    #[snafu(display("invalid slice of {shape:?}: lower {lower:?}, upper {upper:?}, strides {strides:?}"))]
    InvalidSlice { shape: Shape, lower: Vec<usize>, upper: Vec<usize>, strides: Vec<usize> },

    /// Broadcast axes do not describe how the argument expands into the target shape.
    #[snafu(display("cannot broadcast {input:?} to {output:?} along axes {axes:?}"))]
    InvalidBroadcast { input: Shape, output: Shape, axes: Vec<usize> },

    /// Contracted extents of a dot product differ.
    #[snafu(display("dot contraction mismatch: {lhs:?} x {rhs:?} over {reduction_axes_count} axes"))]
    DotShapeMismatch { lhs: Shape, rhs: Shape, reduction_axes_count: usize },

    /// Batched matmul operands are not compatible rank-3 tensors.
    #[snafu(display("batch dot mismatch: {lhs:?} (transpose {transpose_a}) x {rhs:?} (transpose {transpose_b})"))]
    BatchDotShapeMismatch { lhs: Shape, rhs: Shape, transpose_a: bool, transpose_b: bool },

    /// Concatenated arguments disagree outside the concatenation axis.
    #[snafu(display("cannot concatenate {shapes:?} along axis {axis}"))]
    ConcatShapeMismatch { shapes: Vec<Shape>, axis: usize },

    /// Constant data does not fill its declared shape.
    #[snafu(display("constant of shape {shape:?} needs {expected} values, got {actual}"))]
    ConstantSizeMismatch { shape: Shape, expected: usize, actual: usize },

    /// Replacement node would change what consumers of the old node observe.
    #[snafu(display("cannot replace {old} ({old_shape:?}, {old_dtype}) with {new} ({new_shape:?}, {new_dtype})"))]
    IncompatibleReplacement {
        old: NodeId,
        new: NodeId,
        old_shape: Shape,
        new_shape: Shape,
        old_dtype: DType,
        new_dtype: DType,
    },

    /// Replacement node depends on a consumer of the node it replaces.
    #[snafu(display("replacing {old} with {new} would create a cycle through {consumer}"))]
    CyclicReplacement { old: NodeId, new: NodeId, consumer: NodeId },

    /// Interpreter received the wrong number of parameter values.
    #[snafu(display("graph has {expected} parameters, got {actual} inputs"))]
    InputCountMismatch { expected: usize, actual: usize },

    /// Interpreter input does not have the parameter's shape.
    #[snafu(display("input {index} has shape {actual:?}, parameter expects {expected:?}"))]
    InputShapeMismatch { index: usize, expected: Shape, actual: Shape },

    /// Interpreter only evaluates `f32` graphs.
    #[snafu(display("{node} has dtype {dtype}, interpreter supports f32 only"))]
    UnsupportedDType { node: NodeId, dtype: DType },

    /// Interpreter failed to evaluate a node.
    #[snafu(display("evaluating {node} failed: {reason}"))]
    Evaluation { node: NodeId, reason: String },
}
