//! Tensor arguments of a call.
//!
//! A call frame sees tensors only through [`TensorView`]: it binds the layout
//! the compiled function expects and hands the raw data pointer to the entry
//! point. Storage is owned by the caller.

use std::sync::Arc;

use loom_dtype::DType;
use loom_ir::shape::{Shape, shape_size};
use ndarray::{ArrayD, IxDyn};
use snafu::ResultExt;

use crate::error::*;
use crate::layout::LayoutDescriptor;

/// One leaf tensor passed to a compiled function.
///
/// # Safety
///
/// Compiled code reads and writes through [`data_ptr`](Self::data_ptr) without
/// further checks. The pointer must be non-null, aligned for `dtype()` and valid
/// for reads and writes of `shape_size(shape()) * dtype().bytes()` bytes for
/// the whole duration of a call, and no other reference may access that memory
/// meanwhile.
pub unsafe trait TensorView {
    fn shape(&self) -> &[usize];

    fn dtype(&self) -> DType;

    /// Layout bound by the most recent call, if any.
    fn layout(&self) -> Option<&Arc<LayoutDescriptor>>;

    fn set_layout(&mut self, layout: Arc<LayoutDescriptor>);

    /// Start of the tensor's storage. Must stay valid while a call is running.
    fn data_ptr(&mut self) -> *mut u8;
}

/// Possibly nested call argument.
pub enum TensorArg<'a> {
    Tensor(&'a mut dyn TensorView),
    Tuple(Vec<TensorArg<'a>>),
}

impl<'a> TensorArg<'a> {
    /// Leaf tensors in depth-first order.
    pub fn flatten(self) -> Vec<&'a mut dyn TensorView> {
        let mut leaves = Vec::new();
        self.flatten_into(&mut leaves);
        leaves
    }

    fn flatten_into(self, leaves: &mut Vec<&'a mut dyn TensorView>) {
        match self {
            Self::Tensor(tensor) => leaves.push(tensor),
            Self::Tuple(items) => items.into_iter().for_each(|item| item.flatten_into(leaves)),
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Tensor(_) => 1,
            Self::Tuple(items) => items.iter().map(Self::leaf_count).sum(),
        }
    }
}

impl<'a, T: TensorView> From<&'a mut T> for TensorArg<'a> {
    fn from(tensor: &'a mut T) -> Self {
        Self::Tensor(tensor)
    }
}

// =============================================================================
// Host tensors
// =============================================================================

/// Dense `f32` tensor in host memory.
#[derive(Debug, Clone, PartialEq)]
pub struct HostTensor {
    shape: Shape,
    data: Vec<f32>,
    layout: Option<Arc<LayoutDescriptor>>,
}

impl HostTensor {
    pub fn zeros(shape: &[usize]) -> Self {
        Self { shape: shape.into(), data: vec![0.0; shape_size(shape)], layout: None }
    }

    /// Copy of `array` in row-major order.
    pub fn from_array(array: &ArrayD<f32>) -> Self {
        Self { shape: array.shape().into(), data: array.iter().copied().collect(), layout: None }
    }

    pub fn to_array(&self) -> Result<ArrayD<f32>> {
        ArrayD::from_shape_vec(IxDyn(&self.shape), self.data.clone()).context(ArrayShapeSnafu)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

// SAFETY: `data` always holds `shape_size(shape)` `f32` values and is
// borrowed mutably for the duration of a call.
unsafe impl TensorView for HostTensor {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn dtype(&self) -> DType {
        DType::Float32
    }

    fn layout(&self) -> Option<&Arc<LayoutDescriptor>> {
        self.layout.as_ref()
    }

    fn set_layout(&mut self, layout: Arc<LayoutDescriptor>) {
        self.layout = Some(layout);
    }

    fn data_ptr(&mut self) -> *mut u8 {
        self.data.as_mut_ptr().cast()
    }
}
