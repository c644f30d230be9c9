//! CPU runtime for compiled loom functions.
//!
//! A backend turns a graph into an [`ExternalFunction`] (layouts, instrumented
//! ops, primitive handles) plus an [`EntryPoint`]. A [`CallFrame`] binds the
//! two, owns the [`RuntimeContext`] handed to every invocation, propagates
//! layouts onto the caller's tensors and reports performance data.
//!
//! # Backends
//!
//! - [`reference`] - runs the `loom_ir` interpreter, always available
//! - `llvm` - JIT compiled LLVM IR (feature `llvm`)

pub mod call_frame;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod function;
pub mod layout;
#[cfg(feature = "llvm")]
pub mod llvm;
pub mod reference;
pub mod tensor;


pub use call_frame::{CallFrame, propagate_layouts};
pub use config::CallFrameConfig;
pub use context::{RawRuntimeContext, RuntimeContext};
pub use engine::{ExecutionEngine, PerformanceCounter, SymbolAddress, SymbolTable};
pub use error::*;
pub use function::{EntryPoint, ExternalFunction, NativeEntryPoint, OpAttributes, PrimitiveHandle};
pub use layout::LayoutDescriptor;
#[cfg(feature = "llvm")]
pub use llvm::{LlvmEngine, LlvmFunction};
pub use reference::ReferenceFunction;
pub use tensor::{HostTensor, TensorArg, TensorView};
