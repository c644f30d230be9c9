//! Compiled functions as seen by a call frame.

use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

use crate::context::RawRuntimeContext;
use crate::engine::ExecutionEngine;
use crate::error::Error;
use crate::layout::LayoutDescriptor;

/// Opaque handle of a kernel primitive owned by the primitive backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PrimitiveHandle(*mut c_void);

impl PrimitiveHandle {
    pub const fn from_raw(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub const fn as_ptr(self) -> *mut c_void {
        self.0
    }
}

/// An instrumented operation of a compiled function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpAttributes {
    pub name: String,
}

impl OpAttributes {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Native entry point signature: input pointers, output pointers, runtime context.
pub type NativeEntryPoint = unsafe extern "C" fn(*const *mut u8, *const *mut u8, *mut RawRuntimeContext);

type Invoke = dyn Fn(&[*mut u8], &[*mut u8], &mut RawRuntimeContext) + Send + Sync;

/// Callable produced by a backend for one compiled function.
#[derive(Clone)]
pub struct EntryPoint {
    name: String,
    invoke: Arc<Invoke>,
}

impl EntryPoint {
    pub fn new(
        name: impl Into<String>,
        invoke: impl Fn(&[*mut u8], &[*mut u8], &mut RawRuntimeContext) + Send + Sync + 'static,
    ) -> Self {
        Self { name: name.into(), invoke: Arc::new(invoke) }
    }

    /// Wrap a native function.
    ///
    /// # Safety
    ///
    /// `function` must accept one pointer per flattened input and output, in
    /// order, and must only access the runtime context through the fields of
    /// [`RawRuntimeContext`].
    pub unsafe fn from_native(name: impl Into<String>, function: NativeEntryPoint) -> Self {
        Self::new(name, move |inputs, outputs, ctx| unsafe { function(inputs.as_ptr(), outputs.as_ptr(), ctx) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self, inputs: &[*mut u8], outputs: &[*mut u8], ctx: &mut RawRuntimeContext) {
        (self.invoke)(inputs, outputs, ctx)
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryPoint({})", self.name)
    }
}

/// Compiler output a call frame binds to.
///
/// Layout slices are indexed by flattened parameter and result position. A
/// `None` entry means the compiler did not assign a layout, which makes the
/// function uncallable.
pub trait ExternalFunction {
    fn name(&self) -> &str;

    fn parameter_layouts(&self) -> &[Option<Arc<LayoutDescriptor>>];

    fn result_layouts(&self) -> &[Option<Arc<LayoutDescriptor>>];

    /// Operations that report durations when instrumentation is enabled.
    fn op_attrs(&self) -> &[OpAttributes];

    fn primitives(&self) -> Arc<[PrimitiveHandle]> {
        Arc::from([])
    }

    fn execution_engine(&self) -> Option<&dyn ExecutionEngine> {
        None
    }

    /// Failure reported by the entry point during the latest invocation.
    ///
    /// Reading it clears it. Entry points without a failure channel never fail.
    fn take_failure(&self) -> Option<Error> {
        None
    }
}
