//! Shape, coordinate and axis helpers shared by shape inference, the
//! interpreter and the fusion passes.
//!
//! All shapes are concrete. Strides are counted in elements, not bytes.

use std::collections::BTreeSet;

use smallvec::SmallVec;

/// Tensor shape.
///
/// Inline capacity of 4 covers the ranks the CPU fusions deal with.
pub type Shape = SmallVec<[usize; 4]>;

/// Axis permutation applied by a reshape before it reinterprets its input.
pub type AxisVector = SmallVec<[usize; 4]>;

/// Per-axis position inside a tensor (slice bounds).
pub type Coordinate = SmallVec<[usize; 4]>;

/// Per-axis step, in elements.
pub type Strides = SmallVec<[usize; 4]>;

/// Ordered set of axes (broadcast axes).
pub type AxisSet = BTreeSet<usize>;

// =========================================================================
// Shape Utilities
// =========================================================================

/// Number of elements in a tensor of `shape`. Scalars (`[]`) hold one element.
pub fn shape_size(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Row-major strides for `shape`.
pub fn row_major_strides(shape: &[usize]) -> Strides {
    let mut strides: Strides = SmallVec::from_elem(1, shape.len());
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

/// `[0, 1, .., rank)`.
pub fn identity_order(rank: usize) -> AxisVector {
    (0..rank).collect()
}

pub fn is_identity_order(order: &[usize]) -> bool {
    order.iter().enumerate().all(|(i, &axis)| i == axis)
}

/// Whether `order` is a permutation of `0..rank`.
pub fn is_permutation(order: &[usize], rank: usize) -> bool {
    if order.len() != rank {
        return false;
    }
    let mut seen: SmallVec<[bool; 8]> = SmallVec::from_elem(false, rank);
    order.iter().all(|&axis| axis < rank && !std::mem::replace(&mut seen[axis], true))
}

/// Shape of `shape` with its axes reordered by `order`.
pub fn permute_shape(shape: &[usize], order: &[usize]) -> Shape {
    order.iter().map(|&axis| shape[axis]).collect()
}

/// Output shape of a strided slice: `ceil((upper - lower) / stride)` per axis.
///
/// Callers validate `lower <= upper` and non-zero strides first.
pub fn slice_shape(lower: &[usize], upper: &[usize], strides: &[usize]) -> Shape {
    lower.iter().zip(upper).zip(strides).map(|((&lo, &hi), &step)| (hi - lo).div_ceil(step)).collect()
}
