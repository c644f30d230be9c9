use std::sync::Arc;

use loom_dtype::DType;
use ndarray::{ArrayD, IxDyn};

use crate::{HostTensor, LayoutDescriptor, TensorArg, TensorView};

#[test]
fn test_host_tensor_round_trips_array() {
    let array = ArrayD::from_shape_vec(IxDyn(&[2, 3]), (0..6).map(|i| i as f32).collect()).unwrap();
    let tensor = HostTensor::from_array(&array);
    assert_eq!(tensor.shape(), &[2, 3]);
    assert_eq!(tensor.dtype(), DType::Float32);
    assert_eq!(tensor.to_array().unwrap(), array);
}

#[test]
fn test_from_array_copies_logical_order() {
    let array = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap().reversed_axes();
    assert_eq!(HostTensor::from_array(&array).data(), &[1.0, 3.0, 2.0, 4.0]);
}

#[test]
fn test_set_layout() {
    let mut tensor = HostTensor::zeros(&[2]);
    assert!(tensor.layout().is_none());
    let layout = Arc::new(LayoutDescriptor::row_major(&[2], DType::Float32));
    tensor.set_layout(layout.clone());
    assert_eq!(tensor.layout(), Some(&layout));
}

#[test]
fn test_nested_arguments_flatten_depth_first() {
    let mut tensors: Vec<HostTensor> = (0..4).map(|i| HostTensor::zeros(&[i + 1])).collect();
    let [a, b, c, d] = tensors.as_mut_slice() else { unreachable!() };
    let arg = TensorArg::Tuple(vec![
        a.into(),
        TensorArg::Tuple(vec![TensorArg::Tuple(vec![b.into()]), c.into()]),
        TensorArg::Tuple(Vec::new()),
        d.into(),
    ]);
    assert_eq!(arg.leaf_count(), 4);

    let shapes: Vec<usize> = arg.flatten().iter().map(|t| t.shape()[0]).collect();
    assert_eq!(shapes, [1, 2, 3, 4]);
}

#[test]
fn test_data_ptr_covers_row_major_layout() {
    for shape in [&[2, 3][..], &[0, 4][..], &[][..]] {
        let mut tensor = HostTensor::zeros(shape);
        let layout = LayoutDescriptor::row_major(shape, tensor.dtype());
        let ptr = tensor.data_ptr();
        assert!(!ptr.is_null());
        assert!(ptr.cast::<f32>().is_aligned());
        assert_eq!(tensor.data().len() * DType::Float32.bytes(), layout.size_bytes());
    }
}
