//! Reference backend.
//!
//! Compiles a graph into an entry point that runs the `loom_ir` interpreter
//! over the raw tensor pointers of a call. Every non-parameter node is an
//! instrumented op, so a rewritten graph can be executed and timed end to end
//! through a [`CallFrame`](crate::CallFrame).

use std::collections::HashMap;
use std::sync::Arc;

use loom_dtype::DType;
use loom_ir::interp::evaluate_with;
use loom_ir::{Graph, NodeId, Op};
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use parking_lot::Mutex;
use snafu::ensure;
use tracing::error;

use crate::error::*;
use crate::function::{EntryPoint, ExternalFunction, OpAttributes};
use crate::layout::LayoutDescriptor;

/// Compiled form of an `f32` graph.
#[derive(Debug)]
pub struct ReferenceFunction {
    name: String,
    parameter_layouts: Vec<Option<Arc<LayoutDescriptor>>>,
    result_layouts: Vec<Option<Arc<LayoutDescriptor>>>,
    op_attrs: Vec<OpAttributes>,
    failure: Arc<Mutex<Option<loom_ir::Error>>>,
}

impl ReferenceFunction {
    #[tracing::instrument(skip_all, fields(name = %name.as_ref(), nodes = graph.node_count()))]
    pub fn compile(name: impl AsRef<str>, graph: Graph) -> Result<(Arc<Self>, EntryPoint)> {
        let name = name.as_ref();
        let order = graph.ordered_ops();
        for &id in graph.parameters().iter().chain(&order) {
            let dtype = graph[id].dtype();
            ensure!(dtype == DType::Float32, UnsupportedDTypeSnafu { node: id, dtype });
        }

        let layout = |id: NodeId| Some(Arc::new(LayoutDescriptor::row_major(graph[id].shape(), DType::Float32)));
        let parameter_layouts = graph.parameters().iter().map(|&id| layout(id)).collect();
        let result_layouts = graph.results().iter().map(|&id| layout(id)).collect();

        let ops: Vec<NodeId> =
            order.into_iter().filter(|&id| !matches!(graph[id].op(), Op::Parameter { .. })).collect();
        let op_attrs = ops.iter().map(|&id| OpAttributes::new(graph[id].name())).collect();
        let slots: HashMap<NodeId, usize> = ops.iter().enumerate().map(|(slot, &id)| (id, slot)).collect();

        let failure = Arc::new(Mutex::new(None));
        let function =
            Arc::new(Self { name: name.to_owned(), parameter_layouts, result_layouts, op_attrs, failure: failure.clone() });
        let entry = EntryPoint::new(name, move |inputs, outputs, ctx| {
            let arguments: Vec<ArrayD<f32>> = graph
                .parameters()
                .iter()
                .zip(inputs)
                .map(|(&id, &ptr)| {
                    // SAFETY: the call frame checked the tensor against this parameter's layout and
                    // `TensorView` guarantees the buffer covers it.
                    unsafe { ArrayViewD::from_shape_ptr(IxDyn(graph[id].shape()), ptr.cast::<f32>().cast_const()) }
                        .to_owned()
                })
                .collect();

            let mut durations = ctx.op_durations_mut();
            let evaluated = evaluate_with(&graph, &arguments, |node, elapsed| {
                if let Some(durations) = durations.as_deref_mut()
                    && let Some(&slot) = slots.get(&node.id())
                {
                    durations[slot] = i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX);
                }
            });

            match evaluated {
                Ok(values) => {
                    for (&ptr, value) in outputs.iter().zip(&values) {
                        // SAFETY: as for the inputs, against this result's layout.
                        let out = unsafe { std::slice::from_raw_parts_mut(ptr.cast::<f32>(), value.len()) };
                        out.iter_mut().zip(value.iter()).for_each(|(dst, &src)| *dst = src);
                    }
                }
                Err(err) => {
                    error!(%err, "reference evaluation failed");
                    *failure.lock() = Some(err);
                }
            }
        });
        Ok((function, entry))
    }
}

impl ExternalFunction for ReferenceFunction {
    fn name(&self) -> &str {
        &self.name
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

    fn take_failure(&self) -> Option<Error> {
        self.failure.lock().take().map(|source| Error::Graph { source })
    }
}
