//! Flatten same-typed tensors into one contiguous buffer and back
//!
//! Element-wise work on a flat buffer is equivalent to doing the same work
//! on each tensor individually, which is what makes bucketed communication
//! of many small gradients cheap.

use candle_core::Tensor;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::ops::running_totals;
use crate::tensor::{ensure_same_type, AnyTensor, SparseTensor, StorageKind, TensorLike, TensorType};

/// Flattened indices and values of a sparse tensor sequence
#[derive(Debug, Clone)]
pub struct SparseFlat {
    /// Concatenated index tensors
    pub indices: Tensor,
    /// Concatenated value tensors
    pub values: Tensor,
}

/// Output of `flatten`: one buffer for dense inputs, an index/value pair for sparse inputs
#[derive(Debug, Clone)]
pub enum FlatBuffer {
    /// Contiguous 1-D buffer
    Dense(Tensor),
    /// Independently flattened indices and values
    Sparse(SparseFlat),
}

impl FlatBuffer {
    /// Total number of elements held (indices + values for sparse buffers)
    pub fn elem_count(&self) -> usize {
        match self {
            Self::Dense(flat) => flat.elem_count(),
            Self::Sparse(flat) => flat.indices.elem_count() + flat.values.elem_count(),
        }
    }

    /// Borrow the dense buffer
    pub fn as_dense(&self) -> Result<&Tensor> {
        match self {
            Self::Dense(flat) => Ok(flat),
            Self::Sparse(_) => Err(Error::density_mismatch(
                "expected a dense flat buffer, found a sparse one",
            )),
        }
    }

    /// Borrow the sparse buffer pair
    pub fn as_sparse(&self) -> Result<&SparseFlat> {
        match self {
            Self::Sparse(flat) => Ok(flat),
            Self::Dense(_) => Err(Error::density_mismatch(
                "expected a sparse flat buffer, found a dense one",
            )),
        }
    }
}

/// Concatenate dense tensors of one type into a contiguous 1-D buffer
pub fn flatten_dense_tensors(tensors: &[Tensor]) -> Result<Tensor> {
    let tensor_type = ensure_same_type(tensors, "flatten")?;

    if let [single] = tensors {
        return Ok(single.flatten_all()?);
    }

    let parts = tensors
        .iter()
        .map(|t| t.flatten_all())
        .collect::<candle_core::Result<Vec<_>>>()?;
    let flat = Tensor::cat(&parts, 0)?;

    trace!(
        "Flattened {} {} tensors into {} elements",
        tensors.len(),
        tensor_type,
        flat.elem_count()
    );
    Ok(flat)
}

/// Flatten the indices and the values of sparse tensors of one type
pub fn flatten_sparse_tensors(tensors: &[SparseTensor]) -> Result<SparseFlat> {
    ensure_same_type(tensors, "flatten")?;

    let indices: Vec<Tensor> = tensors.iter().map(|t| t.indices().clone()).collect();
    let values: Vec<Tensor> = tensors.iter().map(|t| t.values().clone()).collect();

    Ok(SparseFlat {
        indices: flatten_dense_tensors(&indices)?,
        values: flatten_dense_tensors(&values)?,
    })
}

/// Slice `flat` back into tensors shaped like `tensors`
pub fn unflatten_dense_tensors(flat: &Tensor, tensors: &[Tensor]) -> Result<Vec<Tensor>> {
    let expected = ensure_same_type(tensors, "unflatten")?;
    let found = flat.tensor_type();
    if found != expected {
        return Err(Error::TypeMismatch {
            expected,
            found,
            context: "unflatten flat buffer".to_string(),
        });
    }

    split_flat(flat, tensors)
}

/// Rebuild sparse tensors from a flattened index/value pair
pub fn unflatten_sparse_tensors(flat: &SparseFlat, tensors: &[SparseTensor]) -> Result<Vec<SparseTensor>> {
    let expected = ensure_same_type(tensors, "unflatten")?;
    let found = TensorType::sparse(StorageKind::of(flat.values.device()), flat.values.dtype());
    if found != expected {
        return Err(Error::TypeMismatch {
            expected,
            found,
            context: "unflatten sparse values".to_string(),
        });
    }

    let index_parts: Vec<Tensor> = tensors.iter().map(|t| t.indices().clone()).collect();
    let value_parts: Vec<Tensor> = tensors.iter().map(|t| t.values().clone()).collect();

    let indices = split_flat(&flat.indices, &index_parts)?;
    let values = split_flat(&flat.values, &value_parts)?;

    tensors
        .iter()
        .zip(indices)
        .zip(values)
        .map(|((t, i), v)| SparseTensor::new(i, v, t.shape().clone()))
        .collect()
}

/// Flatten a homogeneous sequence of dense or sparse tensors
pub fn flatten(tensors: &[AnyTensor]) -> Result<FlatBuffer> {
    let sparse = ensure_same_density(tensors, "flatten")?;

    let flat = if sparse {
        let parts = tensors
            .iter()
            .map(|t| t.as_sparse().cloned())
            .collect::<Result<Vec<_>>>()?;
        FlatBuffer::Sparse(flatten_sparse_tensors(&parts)?)
    } else {
        let parts = tensors
            .iter()
            .map(|t| t.as_dense().cloned())
            .collect::<Result<Vec<_>>>()?;
        FlatBuffer::Dense(flatten_dense_tensors(&parts)?)
    };

    debug!(
        "Flattened {} tensors into a buffer of {} elements",
        tensors.len(),
        flat.elem_count()
    );
    Ok(flat)
}

/// Inverse of `flatten` against the tensors that produced the buffer
pub fn unflatten(flat: &FlatBuffer, tensors: &[AnyTensor]) -> Result<Vec<AnyTensor>> {
    let sparse = ensure_same_density(tensors, "unflatten")?;

    match (flat, sparse) {
        (FlatBuffer::Dense(buffer), false) => {
            let parts = tensors
                .iter()
                .map(|t| t.as_dense().cloned())
                .collect::<Result<Vec<_>>>()?;
            Ok(unflatten_dense_tensors(buffer, &parts)?
                .into_iter()
                .map(AnyTensor::Dense)
                .collect())
        }
        (FlatBuffer::Sparse(pair), true) => {
            let parts = tensors
                .iter()
                .map(|t| t.as_sparse().cloned())
                .collect::<Result<Vec<_>>>()?;
            Ok(unflatten_sparse_tensors(pair, &parts)?
                .into_iter()
                .map(AnyTensor::Sparse)
                .collect())
        }
        (FlatBuffer::Dense(_), true) => Err(Error::density_mismatch(
            "cannot unflatten a dense buffer into sparse tensors",
        )),
        (FlatBuffer::Sparse(_), false) => Err(Error::density_mismatch(
            "cannot unflatten a sparse buffer into dense tensors",
        )),
    }
}

fn ensure_same_density(tensors: &[AnyTensor], operation: &str) -> Result<bool> {
    let first = tensors
        .first()
        .ok_or_else(|| Error::empty_input(format!("{} needs at least one tensor", operation)))?;
    let sparse = first.is_sparse();

    if let Some(index) = tensors.iter().position(|t| t.is_sparse() != sparse) {
        return Err(Error::density_mismatch(format!(
            "{} input {} is {} but the sequence started {}",
            operation,
            index,
            if sparse { "dense" } else { "sparse" },
            if sparse { "sparse" } else { "dense" },
        )));
    }

    Ok(sparse)
}

fn split_flat(flat: &Tensor, tensors: &[Tensor]) -> Result<Vec<Tensor>> {
    if flat.rank() != 1 {
        return Err(Error::shape_mismatch(format!(
            "flat buffer must be 1-D, got shape {:?}",
            flat.dims()
        )));
    }

    let expected: usize = tensors.iter().map(|t| t.elem_count()).sum();
    if expected != flat.elem_count() {
        return Err(Error::CountMismatch {
            expected,
            found: flat.elem_count(),
        });
    }

    let ends = running_totals(tensors.iter().map(|t| t.elem_count()));
    tensors
        .iter()
        .zip(ends)
        .map(|(t, end)| {
            let numel = t.elem_count();
            Ok(flat.narrow(0, end - numel, numel)?.reshape(t.dims())?)
        })
        .collect()
}
