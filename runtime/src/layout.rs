//! Physical memory layouts.

use loom_dtype::DType;
use loom_ir::shape::{Shape, Strides, row_major_strides, shape_size};

/// Physical layout the compiled function expects at one parameter or result position.
///
/// Strides are in elements, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayoutDescriptor {
    shape: Shape,
    strides: Strides,
    dtype: DType,
}

impl LayoutDescriptor {
    pub fn new(shape: &[usize], strides: &[usize], dtype: DType) -> Self {
        Self { shape: shape.into(), strides: strides.into(), dtype }
    }

    /// Dense C-order layout.
    pub fn row_major(shape: &[usize], dtype: DType) -> Self {
        Self { shape: shape.into(), strides: row_major_strides(shape), dtype }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn element_count(&self) -> usize {
        shape_size(&self.shape)
    }

    /// Bytes spanned by the layout, from the first to one past the last element.
    pub fn size_bytes(&self) -> usize {
        if self.shape.contains(&0) {
            return 0;
        }
        let last = self.shape.iter().zip(&self.strides).map(|(&dim, &stride)| (dim - 1) * stride).sum::<usize>();
        (last + 1) * self.dtype.bytes()
    }

    pub fn is_row_major(&self) -> bool {
        self.strides == row_major_strides(&self.shape)
    }
}
