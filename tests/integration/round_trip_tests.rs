//! Flatten/unflatten round-trip tests

use super::fixtures::*;
use super::init_test_logging;
use approx::assert_relative_eq;
use candle_core::{DType, Device, Tensor};
use proptest::prelude::*;
use tensor_buckets::{
    flatten, flatten_dense_tensors, flatten_sparse_tensors, unflatten, unflatten_dense_tensors,
    unflatten_sparse_tensors, AnyTensor, FlatBuffer, Result,
};

#[test]
fn test_three_dense_tensors_round_trip() -> Result<()> {
    init_test_logging();

    let tensors = vec![
        dense_f32(&[1., 2., 3., 4.], &[2, 2]),
        dense_f32(&[5., 6., 7.], &[3]),
        dense_f32(&[8., 9., 10., 11.], &[1, 4]),
    ];

    let flat = flatten_dense_tensors(&tensors)?;
    assert_eq!(flat.elem_count(), 4 + 3 + 4);

    let restored = unflatten_dense_tensors(&flat, &tensors)?;
    assert_eq!(restored.len(), 3);
    assert_eq!(restored[0].dims(), &[2, 2]);
    assert_eq!(restored[1].dims(), &[3]);
    assert_eq!(restored[2].dims(), &[1, 4]);
    assert_eq!(restored[0].to_vec2::<f32>()?, vec![vec![1., 2.], vec![3., 4.]]);
    assert_eq!(restored[1].to_vec1::<f32>()?, vec![5., 6., 7.]);
    assert_eq!(restored[2].to_vec2::<f32>()?, vec![vec![8., 9., 10., 11.]]);

    Ok(())
}

#[test]
fn test_elementwise_work_on_flat_buffer_matches_individual_work() -> Result<()> {
    let tensors = vec![ramp(&[3, 3], DType::F32), ramp(&[5], DType::F32)];
    let flat = flatten_dense_tensors(&tensors)?;
    let scaled = (flat * 0.5)?;

    for (original, restored) in tensors.iter().zip(unflatten_dense_tensors(&scaled, &tensors)?) {
        let expected = (original * 0.5)?.flatten_all()?.to_vec1::<f32>()?;
        let actual = restored.flatten_all()?.to_vec1::<f32>()?;
        for (e, a) in expected.iter().zip(&actual) {
            assert_relative_eq!(e, a);
        }
    }

    Ok(())
}

#[test]
fn test_sparse_round_trip_keeps_dense_shapes() -> Result<()> {
    init_test_logging();

    let tensors = vec![
        sparse_f32(&[0., 1., 0., 2.], &[2, 2]),
        sparse_f32(&[0., 0., 4.], &[3]),
        sparse_f32(&[9., 0., 0., 0., 0., 8., 7., 0.], &[2, 2, 2]),
    ];

    let flat = flatten_sparse_tensors(&tensors)?;
    assert_eq!(flat.values.elem_count(), 2 + 1 + 3);
    // 2-D, 1-D and 3-D index columns
    assert_eq!(flat.indices.elem_count(), 2 * 2 + 1 + 3 * 3);

    let restored = unflatten_sparse_tensors(&flat, &tensors)?;
    for (original, restored) in tensors.iter().zip(&restored) {
        assert_eq!(original.dims(), restored.dims());
        assert_eq!(original.nnz(), restored.nnz());
        assert_eq!(
            original.to_dense()?.flatten_all()?.to_vec1::<f32>()?,
            restored.to_dense()?.flatten_all()?.to_vec1::<f32>()?
        );
    }

    Ok(())
}

#[test]
fn test_any_tensor_dispatch() -> Result<()> {
    let sparse: Vec<AnyTensor> = vec![
        sparse_f32(&[1., 0.], &[2]).into(),
        sparse_f32(&[0., 0., 3.], &[3]).into(),
    ];
    let flat = flatten(&sparse)?;
    assert!(matches!(flat, FlatBuffer::Sparse(_)));
    let restored = unflatten(&flat, &sparse)?;
    assert!(restored.iter().all(AnyTensor::is_sparse));
    assert_eq!(values_f64(&restored[1]), vec![0., 0., 3.]);

    let dense: Vec<AnyTensor> = vec![ramp(&[2], DType::BF16).into(), ramp(&[1, 3], DType::BF16).into()];
    let flat = flatten(&dense)?;
    assert!(matches!(flat, FlatBuffer::Dense(_)));
    assert_eq!(flat.elem_count(), 5);

    Ok(())
}

fn shapes() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(prop::collection::vec(1usize..5, 0..4), 1..6)
}

proptest! {
    #[test]
    fn prop_dense_round_trip(shapes in shapes()) {
        let tensors: Vec<Tensor> = shapes
            .iter()
            .enumerate()
            .map(|(i, shape)| {
                let numel: usize = shape.iter().product();
                let values: Vec<f32> = (0..numel).map(|v| (v + 100 * i) as f32).collect();
                Tensor::from_vec(values, shape.as_slice(), &Device::Cpu).unwrap()
            })
            .collect();

        let flat = flatten_dense_tensors(&tensors).unwrap();
        let total: usize = tensors.iter().map(|t| t.elem_count()).sum();
        prop_assert_eq!(flat.elem_count(), total);

        let restored = unflatten_dense_tensors(&flat, &tensors).unwrap();
        prop_assert_eq!(restored.len(), tensors.len());
        for (original, restored) in tensors.iter().zip(&restored) {
            prop_assert_eq!(original.dims(), restored.dims());
            prop_assert_eq!(
                original.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
                restored.flatten_all().unwrap().to_vec1::<f32>().unwrap()
            );
        }
    }

    #[test]
    fn prop_sparse_round_trip(
        masks in prop::collection::vec(prop::collection::vec(any::<bool>(), 1..12), 1..5)
    ) {
        let tensors: Vec<AnyTensor> = masks
            .iter()
            .map(|mask| {
                let values: Vec<f32> = mask
                    .iter()
                    .enumerate()
                    .map(|(i, &keep)| if keep || i == 0 { i as f32 + 1.0 } else { 0.0 })
                    .collect();
                sparse_f32(&values, &[values.len()]).into()
            })
            .collect();

        let flat = flatten(&tensors).unwrap();
        let restored = unflatten(&flat, &tensors).unwrap();
        for (original, restored) in tensors.iter().zip(&restored) {
            prop_assert_eq!(original.dims(), restored.dims());
            prop_assert_eq!(values_f64(original), values_f64(restored));
        }
    }
}
