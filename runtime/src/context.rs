//! Runtime context of a compiled function.
//!
//! The entry point receives a [`RawRuntimeContext`] with a C layout. It
//! carries the kernel primitive handles and, when instrumentation is enabled,
//! a buffer with one duration slot per instrumented op. [`RuntimeContext`]
//! owns both for the lifetime of a call frame and releases them on drop.

use std::ptr;
use std::sync::Arc;

use tracing::debug;

use crate::function::PrimitiveHandle;

/// Context as seen by compiled code.
#[repr(C)]
#[derive(Debug)]
pub struct RawRuntimeContext {
    primitives: *const PrimitiveHandle,
    primitive_count: usize,
    /// Null when instrumentation is disabled.
    op_durations: *mut i64,
    op_duration_count: usize,
}

impl RawRuntimeContext {
    pub fn primitives(&self) -> &[PrimitiveHandle] {
        // SAFETY: set from the `Arc` kept alive by the owning `RuntimeContext`.
        unsafe { std::slice::from_raw_parts(self.primitives, self.primitive_count) }
    }

    /// Duration slots, indexed like the function's instrumented ops.
    pub fn op_durations_mut(&mut self) -> Option<&mut [i64]> {
        if self.op_durations.is_null() {
            return None;
        }
        // SAFETY: allocated with `op_duration_count` slots by `RuntimeContext::new`.
        Some(unsafe { std::slice::from_raw_parts_mut(self.op_durations, self.op_duration_count) })
    }

    fn op_durations(&self) -> Option<&[i64]> {
        if self.op_durations.is_null() {
            return None;
        }
        // SAFETY: see `op_durations_mut`.
        Some(unsafe { std::slice::from_raw_parts(self.op_durations, self.op_duration_count) })
    }
}

/// Owner of one frame's runtime resources.
pub struct RuntimeContext {
    raw: Box<RawRuntimeContext>,
    primitives: Arc<[PrimitiveHandle]>,
}

impl RuntimeContext {
    /// Bind `primitives` and, if `instrumented_ops` is given, allocate that many duration slots.
    pub fn new(primitives: Arc<[PrimitiveHandle]>, instrumented_ops: Option<usize>) -> Self {
        let (op_durations, op_duration_count) = match instrumented_ops {
            Some(count) => (Box::into_raw(vec![0i64; count].into_boxed_slice()).cast::<i64>(), count),
            None => (ptr::null_mut(), 0),
        };
        let raw = Box::new(RawRuntimeContext {
            primitives: primitives.as_ptr(),
            primitive_count: primitives.len(),
            op_durations,
            op_duration_count,
        });
        debug!(primitives = primitives.len(), durations = ?instrumented_ops, "runtime context set up");
        Self { raw, primitives }
    }

    pub fn primitives(&self) -> &[PrimitiveHandle] {
        &self.primitives
    }

    /// Latest durations, `None` without instrumentation.
    pub fn op_durations(&self) -> Option<&[i64]> {
        self.raw.op_durations()
    }

    pub fn is_instrumented(&self) -> bool {
        !self.raw.op_durations.is_null()
    }

    pub(crate) fn raw_mut(&mut self) -> &mut RawRuntimeContext {
        &mut self.raw
    }
}

impl Drop for RuntimeContext {
    fn drop(&mut self) {
        let durations = std::mem::replace(&mut self.raw.op_durations, ptr::null_mut());
        if !durations.is_null() {
            // SAFETY: produced by `Box::into_raw` in `new` with this length and nulled above.
            drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(durations, self.raw.op_duration_count)) });
        }
        debug!(primitives = self.primitives.len(), "runtime context released");
    }
}
