//! LLVM JIT engine for natively compiled functions.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use bon::bon;
use inkwell::OptimizationLevel;
use inkwell::context::Context;
use inkwell::module::Module;
use snafu::OptionExt;

use crate::engine::{ExecutionEngine, SymbolAddress};
use crate::error::*;
use crate::function::{EntryPoint, ExternalFunction, NativeEntryPoint, OpAttributes, PrimitiveHandle};
use crate::layout::LayoutDescriptor;

/// JIT-compiled LLVM module with proper context ownership.
///
/// Uses Box<Context> for stable addressing and ManuallyDrop for correct drop order.
pub struct LlvmEngine {
    /// Not accessed directly; must outlive module and engine.
    #[allow(dead_code)]
    context: Box<Context>,

    /// SAFETY: 'static is a lie, the context is boxed and dropped last.
    module: ManuallyDrop<Module<'static>>,

    /// SAFETY: same as `module`.
    execution_engine: ManuallyDrop<inkwell::execution_engine::ExecutionEngine<'static>>,

    name: String,
}

impl LlvmEngine {
    /// Parse, verify and JIT compile textual LLVM IR.
    pub fn compile_ir(ir: &str, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let context = Box::new(Context::create());

        // SAFETY: the context is boxed (stable address) and `Drop` releases
        // the engine and module before it.
        let context_ref: &'static Context = unsafe { &*(context.as_ref() as *const Context) };

        let buffer = inkwell::memory_buffer::MemoryBuffer::create_from_memory_range_copy(ir.as_bytes(), &name);
        let module = context_ref
            .create_module_from_ir(buffer)
            .map_err(|e| Error::JitCompilation { reason: format!("Failed to parse LLVM IR: {e}") })?;
        if let Err(err) = module.verify() {
            return JitCompilationSnafu { reason: format!("Module verification failed: {err}") }.fail();
        }
        let execution_engine = module
            .create_jit_execution_engine(OptimizationLevel::Aggressive)
            .map_err(|e| Error::JitCompilation { reason: format!("Failed to create execution engine: {e}") })?;

        Ok(Self { context, module: ManuallyDrop::new(module), execution_engine: ManuallyDrop::new(execution_engine), name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry point bound to the function `symbol`.
    ///
    /// # Safety
    ///
    /// `symbol` must have the [`NativeEntryPoint`] signature, and the returned
    /// entry point must not be invoked after this engine is dropped.
    pub unsafe fn entry_point(&self, symbol: &str) -> Result<EntryPoint> {
        let address = self.find_symbol(symbol).context(FunctionNotFoundSnafu { name: symbol })?;
        // SAFETY: guaranteed by the caller.
        unsafe {
            let function = std::mem::transmute::<SymbolAddress, NativeEntryPoint>(address);
            Ok(EntryPoint::from_native(symbol, function))
        }
    }
}

impl ExecutionEngine for LlvmEngine {
    fn find_symbol(&self, name: &str) -> Option<SymbolAddress> {
        self.module.get_function(name)?;
        self.execution_engine.get_function_address(name).ok()
    }
}

impl Drop for LlvmEngine {
    fn drop(&mut self) {
        // SAFETY: ExecutionEngine -> Module -> Context.
        unsafe {
            ManuallyDrop::drop(&mut self.execution_engine);
            ManuallyDrop::drop(&mut self.module);
        }
    }
}

/// Natively compiled function with its layouts and instrumented ops.
pub struct LlvmFunction {
    engine: LlvmEngine,
    parameter_layouts: Vec<Option<Arc<LayoutDescriptor>>>,
    result_layouts: Vec<Option<Arc<LayoutDescriptor>>>,
    op_attrs: Vec<OpAttributes>,
    primitives: Arc<[PrimitiveHandle]>,
}

#[bon]
impl LlvmFunction {
    #[builder]
    pub fn new(
        engine: LlvmEngine,
        #[builder(default)] parameter_layouts: Vec<Option<Arc<LayoutDescriptor>>>,
        #[builder(default)] result_layouts: Vec<Option<Arc<LayoutDescriptor>>>,
        #[builder(default)] op_attrs: Vec<OpAttributes>,
        #[builder(default = Arc::from([]))] primitives: Arc<[PrimitiveHandle]>,
    ) -> Self {
        Self { engine, parameter_layouts, result_layouts, op_attrs, primitives }
    }

    pub fn engine(&self) -> &LlvmEngine {
        &self.engine
    }
}

impl ExternalFunction for LlvmFunction {
    fn name(&self) -> &str {
        self.engine.name()
    }

    fn parameter_layouts(&self) -> &[Option<Arc<LayoutDescriptor>>] {
        &self.parameter_layouts
    }

    fn result_layouts(&self) -> &[Option<Arc<LayoutDescriptor>>] {
        &self.result_layouts
    }

    fn op_attrs(&self) -> &[OpAttributes] {
        &self.op_attrs
    }

    fn primitives(&self) -> Arc<[PrimitiveHandle]> {
        self.primitives.clone()
    }

    fn execution_engine(&self) -> Option<&dyn ExecutionEngine> {
        Some(&self.engine)
    }
}
