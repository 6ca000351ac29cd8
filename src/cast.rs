//! Casting tensors between types and devices

use candle_core::{DType, Device};
use tracing::trace;

use crate::error::{Error, Result};
use crate::tensor::{AnyTensor, SparseTensor, StorageKind, TensorLike, TensorType};

/// Convert `tensor` to `target`.
///
/// A tensor that already has the target type is returned as is. Density
/// cannot change: casting sparse to dense (or back) is an error.
pub fn cast(tensor: &AnyTensor, target: TensorType) -> Result<AnyTensor> {
    let current = tensor.tensor_type();
    if current == target {
        return Ok(tensor.clone());
    }

    trace!("Casting tensor from {} to {}", current, target);
    match (tensor, target.sparse) {
        (AnyTensor::Sparse(_), false) => Err(Error::density_mismatch(
            "cannot cast sparse tensor to dense tensor",
        )),
        (AnyTensor::Dense(_), true) => Err(Error::density_mismatch(
            "cannot cast dense tensor to sparse tensor",
        )),
        (AnyTensor::Dense(t), false) => {
            let device = target.storage.device()?;
            Ok(AnyTensor::Dense(t.to_dtype(target.dtype)?.to_device(&device)?))
        }
        (AnyTensor::Sparse(t), true) => {
            let device = target.storage.device()?;
            let values = t.values().to_dtype(target.dtype)?.to_device(&device)?;
            let indices = t.indices().to_dtype(DType::I64)?.to_device(&device)?;
            Ok(AnyTensor::Sparse(SparseTensor::new(indices, values, t.shape().clone())?))
        }
    }
}

/// Convert only the element kind, keeping storage and density
pub fn cast_dtype(tensor: &AnyTensor, dtype: DType) -> Result<AnyTensor> {
    let target = TensorType {
        dtype,
        ..tensor.tensor_type()
    };
    cast(tensor, target)
}

/// Move `tensor` to `device`, or return it unchanged if it is already there
pub fn to_device(tensor: &AnyTensor, device: &Device) -> Result<AnyTensor> {
    if StorageKind::of(tensor.device()) == StorageKind::of(device) {
        return Ok(tensor.clone());
    }

    let moved = match tensor {
        AnyTensor::Dense(t) => AnyTensor::Dense(t.to_device(device)?),
        AnyTensor::Sparse(t) => AnyTensor::Sparse(SparseTensor::new(
            t.indices().to_device(device)?,
            t.values().to_device(device)?,
            t.shape().clone(),
        )?),
    };
    Ok(moved)
}
