use loom_ir::Graph;
use loom_ir::interp::evaluate;
use ndarray::{ArrayD, IxDyn};
use proptest::prelude::*;

use crate::config::PipelineConfig;
use crate::pass::PassManager;
use crate::test::fixtures::*;

fn arb_rnn_dims() -> impl Strategy<Value = RnnDims> {
    (1usize..=3, 2usize..=5, 1usize..=4, 1usize..=3)
        .prop_map(|(batch, steps, features, outputs)| RnnDims { batch, steps, features, outputs })
}

fn arb_inputs(g: &Graph) -> impl Strategy<Value = Vec<ArrayD<f32>>> + use<> {
    let shapes: Vec<Vec<usize>> = g.parameters().iter().map(|&p| g[p].shape().to_vec()).collect();
    shapes
        .into_iter()
        .map(|shape| {
            let len = shape.iter().product::<usize>();
            prop::collection::vec(-2.0f32..2.0, len)
                .prop_map(move |values| ArrayD::from_shape_vec(IxDyn(&shape), values).unwrap())
        })
        .collect::<Vec<_>>()
}

fn arb_rnn() -> impl Strategy<Value = (Graph, Vec<ArrayD<f32>>)> {
    arb_rnn_dims().prop_flat_map(|dims| {
        let (g, _) = unrolled_rnn(dims);
        let inputs = arb_inputs(&g);
        (Just(g), inputs)
    })
}

fn arb_split_batch_dot() -> impl Strategy<Value = (Graph, Vec<ArrayD<f32>>)> {
    (1usize..=4, (1usize..=3, 1usize..=3, 1usize..=3), any::<bool>(), any::<bool>()).prop_flat_map(
        |(batch, dims, transpose_a, transpose_b)| {
            let (g, _) = split_batch_dot(batch, dims, transpose_a, transpose_b);
            let inputs = arb_inputs(&g);
            (Just(g), inputs)
        },
    )
}

fn run_pipeline(g: &mut Graph) -> usize {
    PassManager::cpu_fusions(&PipelineConfig::default()).run(g).unwrap().passes_modified
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn rnn_fusion_preserves_values((graph, inputs) in arb_rnn()) {
        let expected = evaluate(&graph, &inputs).unwrap();
        let mut fused = graph.clone();
        prop_assert_eq!(run_pipeline(&mut fused), 1);
        assert_close(&evaluate(&fused, &inputs).unwrap(), &expected);
    }

    #[test]
    fn batch_dot_fusion_preserves_values((graph, inputs) in arb_split_batch_dot()) {
        let expected = evaluate(&graph, &inputs).unwrap();
        let mut fused = graph.clone();
        prop_assert_eq!(run_pipeline(&mut fused), 1);
        assert_close(&evaluate(&fused, &inputs).unwrap(), &expected);
    }

    /// A second pipeline run finds nothing left to fuse.
    #[test]
    fn fusion_is_idempotent((graph, _) in prop_oneof![arb_rnn(), arb_split_batch_dot()]) {
        let mut fused = graph;
        run_pipeline(&mut fused);
        let order = fused.ordered_ops();
        prop_assert_eq!(run_pipeline(&mut fused), 0);
        prop_assert_eq!(fused.ordered_ops(), order);
    }
}
