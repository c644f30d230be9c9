//! Invocation of compiled functions.

use std::sync::Arc;

use smallvec::SmallVec;
use snafu::{OptionExt, ensure};
use tracing::{debug, trace};

use crate::config::CallFrameConfig;
use crate::context::RuntimeContext;
use crate::engine::{PerformanceCounter, read_debug_timers};
use crate::error::*;
use crate::function::{EntryPoint, ExternalFunction};
use crate::layout::LayoutDescriptor;
use crate::tensor::{TensorArg, TensorView};

type Pointers = SmallVec<[*mut u8; 8]>;

/// Executable handle of one compiled function.
///
/// The frame owns the function's [`RuntimeContext`] for its whole lifetime:
/// the context is set up by [`new`](Self::new) and released when the frame is
/// dropped, whether or not any call succeeded. A frame can be called any
/// number of times, one call at a time.
pub struct CallFrame {
    external: Arc<dyn ExternalFunction>,
    entry: EntryPoint,
    config: CallFrameConfig,
    ctx: RuntimeContext,
}

impl CallFrame {
    #[tracing::instrument(skip_all, fields(function = external.name(), instrumentation = config.instrumentation))]
    pub fn new(external: Arc<dyn ExternalFunction>, entry: EntryPoint, config: CallFrameConfig) -> Self {
        let instrumented_ops = config.instrumentation.then(|| external.op_attrs().len());
        let ctx = RuntimeContext::new(external.primitives(), instrumented_ops);
        Self { external, entry, config, ctx }
    }

    /// Call with possibly nested arguments, flattened depth-first.
    pub fn call(&mut self, inputs: Vec<TensorArg<'_>>, outputs: Vec<TensorArg<'_>>) -> Result<()> {
        let mut inputs: Vec<_> = inputs.into_iter().flat_map(TensorArg::flatten).collect();
        let mut outputs: Vec<_> = outputs.into_iter().flat_map(TensorArg::flatten).collect();
        self.tensor_call(&mut inputs, &mut outputs)
    }

    /// Call with flat leaf tensors.
    ///
    /// Both inputs and outputs are checked against the function's layouts
    /// before any layout is bound; on a mismatch the entry point is not invoked.
    /// A failure the entry point reports is returned instead of `Ok`, and the
    /// outputs must then be treated as unpopulated.
    #[tracing::instrument(skip_all, fields(function = self.external.name(), inputs = inputs.len(), outputs = outputs.len()))]
    pub fn tensor_call(
        &mut self,
        inputs: &mut [&mut dyn TensorView],
        outputs: &mut [&mut dyn TensorView],
    ) -> Result<()> {
        let (parameter_layouts, result_layouts) = (self.external.parameter_layouts(), self.external.result_layouts());
        check_layouts("input", inputs, parameter_layouts)?;
        check_layouts("output", outputs, result_layouts)?;
        bind_layouts(inputs, parameter_layouts);
        bind_layouts(outputs, result_layouts);

        let input_ptrs: Pointers = inputs.iter_mut().map(|tensor| tensor.data_ptr()).collect();
        let output_ptrs: Pointers = outputs.iter_mut().map(|tensor| tensor.data_ptr()).collect();

        trace!(entry = self.entry.name(), "invoking entry point");
        self.entry.invoke(&input_ptrs, &output_ptrs, self.ctx.raw_mut());
        if let Some(err) = self.external.take_failure() {
            debug!(entry = self.entry.name(), %err, "entry point failed");
            return Err(err);
        }

        if self.config.instrumentation {
            for (op, micros) in self.timeline() {
                debug!(op, micros, "op timing");
            }
        }
        Ok(())
    }

    /// `(op name, microseconds)` of the latest call. Empty without instrumentation.
    pub fn timeline(&self) -> Vec<(&str, i64)> {
        let Some(durations) = self.ctx.op_durations() else {
            return Vec::new();
        };
        self.external.op_attrs().iter().zip(durations).map(|(attrs, &micros)| (attrs.name.as_str(), micros)).collect()
    }

    /// Debug timers exported by the compiled code.
    ///
    /// Empty when instrumentation is disabled, when the function has no
    /// execution engine, or when the engine lacks any of the timer hooks.
    pub fn get_performance_data(&self) -> Vec<PerformanceCounter> {
        if !self.config.instrumentation {
            return Vec::new();
        }
        self.external.execution_engine().map(read_debug_timers).unwrap_or_default()
    }

    pub fn external_function(&self) -> &Arc<dyn ExternalFunction> {
        &self.external
    }

    pub fn entry_point(&self) -> &EntryPoint {
        &self.entry
    }

    pub fn config(&self) -> CallFrameConfig {
        self.config
    }

    pub fn runtime_context(&self) -> &RuntimeContext {
        &self.ctx
    }
}

fn check_layouts(
    role: &'static str,
    tensors: &[&mut dyn TensorView],
    layouts: &[Option<Arc<LayoutDescriptor>>],
) -> Result<()> {
    ensure!(
        layouts.len() == tensors.len(),
        LayoutCountMismatchSnafu { role, expected: layouts.len(), actual: tensors.len() }
    );
    for (index, (tensor, layout)) in tensors.iter().zip(layouts).enumerate() {
        let layout = layout.as_ref().context(MissingLayoutSnafu { role, index })?;
        ensure!(
            tensor.shape() == layout.shape() && tensor.dtype() == layout.dtype(),
            TensorMismatchSnafu {
                role,
                index,
                expected: layout.shape().to_vec(),
                actual: tensor.shape().to_vec(),
                expected_dtype: layout.dtype(),
                actual_dtype: tensor.dtype(),
            }
        );
    }
    Ok(())
}

fn bind_layouts(tensors: &mut [&mut dyn TensorView], layouts: &[Option<Arc<LayoutDescriptor>>]) {
    for (tensor, layout) in tensors.iter_mut().zip(layouts.iter().flatten()) {
        tensor.set_layout(layout.clone());
    }
}

/// Bind the layout of every position to its tensor.
///
/// Nothing is bound unless the counts match and every position has a layout
/// that agrees with its tensor.
pub fn propagate_layouts(
    role: &'static str,
    tensors: &mut [&mut dyn TensorView],
    layouts: &[Option<Arc<LayoutDescriptor>>],
) -> Result<()> {
    check_layouts(role, tensors, layouts)?;
    bind_layouts(tensors, layouts);
    Ok(())
}
