//! Error types for the CPU runtime.

use snafu::Snafu;

/// Result type for runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while preparing or invoking a compiled function.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The compiled function describes a different number of positions than were passed.
    #[snafu(display(
        "Error propagating {role} layouts: tensor view and layout descriptor counts do not match \
         ({expected} descriptors, {actual} tensors)"
    ))]
    LayoutCountMismatch { role: &'static str, expected: usize, actual: usize },

    /// The compiled function has no layout for one position.
    #[snafu(display("Error propagating {role} layouts: layout information missing for tensor {index}"))]
    MissingLayout { role: &'static str, index: usize },

    /// A tensor does not have the shape or dtype its layout describes.
    #[snafu(display(
        "Error propagating {role} layouts: tensor {index} is {actual_dtype} {actual:?}, layout expects {expected_dtype} {expected:?}"
    ))]
    TensorMismatch {
        role: &'static str,
        index: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
        expected_dtype: loom_dtype::DType,
        actual_dtype: loom_dtype::DType,
    },

    /// Graph error occurred.
    #[snafu(display("Graph error: {source}"))]
    Graph { source: loom_ir::Error },

    /// The reference backend only runs `f32` graphs.
    #[snafu(display("Unsupported dtype {dtype} at {node}"))]
    UnsupportedDType { node: loom_ir::NodeId, dtype: loom_dtype::DType },

    /// Host data does not fit the tensor shape.
    #[snafu(display("Array shape error: {source}"))]
    ArrayShape { source: ndarray::ShapeError },

    /// JIT compilation failed.
    #[snafu(display("JIT compilation failed: {reason}"))]
    JitCompilation { reason: String },

    /// Function not found in module.
    #[snafu(display("Function '{name}' not found in module"))]
    FunctionNotFound { name: String },
}
