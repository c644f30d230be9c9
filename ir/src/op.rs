//! Operation enum and shape inference.
//!
//! [`Op`] is closed: every pass and the interpreter match on it exhaustively.
//! Arguments are not stored here; the [`Graph`](crate::Graph) keeps them as
//! [`NodeId`](crate::NodeId) edges next to the op.

use std::fmt;

use loom_dtype::DType;
use smallvec::SmallVec;
use snafu::ensure;

use crate::error::*;
use crate::shape::{AxisSet, AxisVector, Coordinate, Shape, Strides, is_permutation, shape_size, slice_shape};

/// Operation kind without attributes.
///
/// Patterns compare kinds only, so a pattern `Reshape` matches any reshape
/// regardless of its input order or output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::EnumIter, strum::IntoStaticStr)]
pub enum OpKind {
    Parameter,
    Constant,
    Add,
    Subtract,
    Multiply,
    Negative,
    Sigmoid,
    Tanh,
    Reshape,
    Slice,
    Broadcast,
    Dot,
    Concat,
    BatchDot,
    SigmoidMultiply,
}

impl OpKind {
    /// Fixed argument count; `None` for variadic kinds.
    pub const fn arity(self) -> Option<usize> {
        match self {
            Self::Parameter | Self::Constant => Some(0),
            Self::Negative | Self::Sigmoid | Self::Tanh | Self::Reshape | Self::Slice | Self::Broadcast => Some(1),
            Self::Add | Self::Subtract | Self::Multiply | Self::Dot | Self::BatchDot | Self::SigmoidMultiply => Some(2),
            Self::Concat => None,
        }
    }
}

/// Activation folded into a [`Op::SigmoidMultiply`] input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::IntoStaticStr)]
pub enum ActivationKind {
    Sigmoid,
    Tanh,
}

impl ActivationKind {
    pub const fn from_kind(kind: OpKind) -> Option<Self> {
        match kind {
            OpKind::Sigmoid => Some(Self::Sigmoid),
            OpKind::Tanh => Some(Self::Tanh),
            _ => None,
        }
    }

    pub fn apply(self, x: f32) -> f32 {
        match self {
            Self::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Self::Tanh => x.tanh(),
        }
    }
}

/// A graph operation with its attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    // Leaves
    Parameter {
        index: usize,
        shape: Shape,
        dtype: DType,
    },
    Constant {
        shape: Shape,
        values: Vec<f32>,
    },

    // Elementwise
    Add,
    Subtract,
    Multiply,
    Negative,
    Sigmoid,
    Tanh,

    // Movement
    /// Permutes the argument by `input_order`, then reinterprets it row-major as `output_shape`.
    Reshape {
        input_order: AxisVector,
        output_shape: Shape,
    },
    /// Strided window `[lower, upper)` of the argument.
    Slice {
        lower_bounds: Coordinate,
        upper_bounds: Coordinate,
        strides: Strides,
    },
    /// Replicates the argument along `broadcast_axes` of `shape`.
    Broadcast {
        shape: Shape,
        broadcast_axes: AxisSet,
    },
    Concat {
        axis: usize,
    },

    // Contractions
    /// Contracts the last `reduction_axes_count` axes of the first argument
    /// with the first ones of the second.
    Dot {
        reduction_axes_count: usize,
    },
    /// `[N, m, k] x [N, k, n] -> [N, m, n]`, each operand optionally transposed
    /// in its trailing two axes.
    BatchDot {
        transpose_a: bool,
        transpose_b: bool,
    },

    // Fused
    SigmoidMultiply {
        input_1: ActivationKind,
        input_2: ActivationKind,
    },
}

impl Op {
    pub fn kind(&self) -> OpKind {
        match self {
            Self::Parameter { .. } => OpKind::Parameter,
            Self::Constant { .. } => OpKind::Constant,
            Self::Add => OpKind::Add,
            Self::Subtract => OpKind::Subtract,
            Self::Multiply => OpKind::Multiply,
            Self::Negative => OpKind::Negative,
            Self::Sigmoid => OpKind::Sigmoid,
            Self::Tanh => OpKind::Tanh,
            Self::Reshape { .. } => OpKind::Reshape,
            Self::Slice { .. } => OpKind::Slice,
            Self::Broadcast { .. } => OpKind::Broadcast,
            Self::Concat { .. } => OpKind::Concat,
            Self::Dot { .. } => OpKind::Dot,
            Self::BatchDot { .. } => OpKind::BatchDot,
            Self::SigmoidMultiply { .. } => OpKind::SigmoidMultiply,
        }
    }

    pub fn arity(&self) -> Option<usize> {
        self.kind().arity()
    }

    /// Element type of a leaf op. Non-leaf ops inherit the dtype of their arguments.
    pub fn leaf_dtype(&self) -> Option<DType> {
        match self {
            Self::Parameter { dtype, .. } => Some(*dtype),
            Self::Constant { .. } => Some(DType::Float32),
            _ => None,
        }
    }

    /// Validate argument shapes and compute the output shape.
    pub fn infer_shape(&self, args: &[&Shape]) -> Result<Shape> {
        let kind = self.kind();
        match kind.arity() {
            Some(expected) => ensure!(args.len() == expected, ArityMismatchSnafu { kind, expected, actual: args.len() }),
            None => ensure!(!args.is_empty(), ArityMismatchSnafu { kind, expected: 1usize, actual: 0usize }),
        }

        match self {
            Self::Parameter { shape, .. } => Ok(shape.clone()),
            Self::Constant { shape, values } => {
                let expected = shape_size(shape);
                ensure!(values.len() == expected, ConstantSizeMismatchSnafu { shape: shape.clone(), expected, actual: values.len() });
                Ok(shape.clone())
            }
            Self::Add | Self::Subtract | Self::Multiply | Self::SigmoidMultiply { .. } => {
                ensure!(args[0] == args[1], ShapeMismatchSnafu { kind, lhs: args[0].clone(), rhs: args[1].clone() });
                Ok(args[0].clone())
            }
            Self::Negative | Self::Sigmoid | Self::Tanh => Ok(args[0].clone()),
            Self::Reshape { input_order, output_shape } => {
                let input = args[0];
                ensure!(
                    is_permutation(input_order, input.len()),
                    InvalidInputOrderSnafu { order: input_order.to_vec(), rank: input.len() }
                );
                let (input_size, output_size) = (shape_size(input), shape_size(output_shape));
                ensure!(input_size == output_size, ReshapeSizeMismatchSnafu { input_size, output_size });
                Ok(output_shape.clone())
            }
            Self::Slice { lower_bounds, upper_bounds, strides } => {
                let input = args[0];
                let rank = input.len();
                let valid = lower_bounds.len() == rank
                    && upper_bounds.len() == rank
                    && strides.len() == rank
                    && (0..rank).all(|axis| {
                        lower_bounds[axis] <= upper_bounds[axis] && upper_bounds[axis] <= input[axis] && strides[axis] > 0
                    });
                ensure!(
                    valid,
                    InvalidSliceSnafu {
                        shape: input.clone(),
                        lower: lower_bounds.to_vec(),
                        upper: upper_bounds.to_vec(),
                        strides: strides.to_vec(),
                    }
                );
                Ok(slice_shape(lower_bounds, upper_bounds, strides))
            }
            Self::Broadcast { shape, broadcast_axes } => {
                let input = args[0];
                let kept: Shape =
                    shape.iter().enumerate().filter(|(axis, _)| !broadcast_axes.contains(axis)).map(|(_, &d)| d).collect();
                let axes_in_range = broadcast_axes.iter().all(|&axis| axis < shape.len());
                ensure!(
                    axes_in_range && kept == *input,
                    InvalidBroadcastSnafu {
                        input: input.clone(),
                        output: shape.clone(),
                        axes: broadcast_axes.iter().copied().collect::<Vec<_>>(),
                    }
                );
                Ok(shape.clone())
            }
            Self::Concat { axis } => {
                let first = args[0];
                let axis = *axis;
                let compatible = axis < first.len()
                    && args.iter().all(|shape| {
                        shape.len() == first.len()
                            && shape.iter().zip(first.iter()).enumerate().all(|(i, (a, b))| i == axis || a == b)
                    });
                ensure!(
                    compatible,
                    ConcatShapeMismatchSnafu { shapes: args.iter().map(|s| (*s).clone()).collect::<Vec<_>>(), axis }
                );
                let mut out = first.clone();
                out[axis] = args.iter().map(|shape| shape[axis]).sum();
                Ok(out)
            }
            Self::Dot { reduction_axes_count } => {
                let (lhs, rhs) = (args[0], args[1]);
                let n = *reduction_axes_count;
                let valid = n <= lhs.len() && n <= rhs.len() && lhs[lhs.len() - n..] == rhs[..n];
                ensure!(valid, DotShapeMismatchSnafu { lhs: lhs.clone(), rhs: rhs.clone(), reduction_axes_count: n });
                Ok(lhs[..lhs.len() - n].iter().chain(&rhs[n..]).copied().collect())
            }
            Self::BatchDot { transpose_a, transpose_b } => {
                let (lhs, rhs) = (args[0], args[1]);
                let err = || BatchDotShapeMismatchSnafu {
                    lhs: lhs.clone(),
                    rhs: rhs.clone(),
                    transpose_a: *transpose_a,
                    transpose_b: *transpose_b,
                };
                ensure!(lhs.len() == 3 && rhs.len() == 3 && lhs[0] == rhs[0], err());
                let (m, k) = if *transpose_a { (lhs[2], lhs[1]) } else { (lhs[1], lhs[2]) };
                let (k2, n) = if *transpose_b { (rhs[2], rhs[1]) } else { (rhs[1], rhs[2]) };
                ensure!(k == k2, err());
                Ok(SmallVec::from_slice(&[lhs[0], m, n]))
            }
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.kind().into();
        match self {
            Self::Parameter { index, .. } => write!(f, "{name}({index})"),
            Self::Constant { values, .. } => write!(f, "{name}(len={})", values.len()),
            Self::Reshape { input_order, output_shape } => {
                write!(f, "{name}(order={:?}, shape={:?})", input_order.as_slice(), output_shape.as_slice())
            }
            Self::Slice { lower_bounds, upper_bounds, strides } => write!(
                f,
                "{name}(lower={:?}, upper={:?}, strides={:?})",
                lower_bounds.as_slice(),
                upper_bounds.as_slice(),
                strides.as_slice()
            ),
            Self::Broadcast { shape, broadcast_axes } => {
                write!(f, "{name}(shape={:?}, axes={broadcast_axes:?})", shape.as_slice())
            }
            Self::Concat { axis } => write!(f, "{name}(axis={axis})"),
            Self::Dot { reduction_axes_count } => write!(f, "{name}(reduce={reduction_axes_count})"),
            Self::BatchDot { transpose_a, transpose_b } => write!(f, "{name}(ta={transpose_a}, tb={transpose_b})"),
            Self::SigmoidMultiply { input_1, input_2 } => write!(f, "{name}({input_1:?}, {input_2:?})"),
            Self::Add | Self::Subtract | Self::Multiply | Self::Negative | Self::Sigmoid | Self::Tanh => {
                f.write_str(name)
            }
        }
    }
}

/// Input-order helper used by movement builders: reverse the trailing two axes.
pub fn transpose_last_two(rank: usize) -> AxisVector {
    let mut order: AxisVector = (0..rank).collect();
    if rank >= 2 {
        order.swap(rank - 2, rank - 1);
    }
    order
}

