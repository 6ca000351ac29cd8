//! COO sparse tensors

use candle_core::{DType, Device, Shape, Tensor};

use super::{StorageKind, TensorLike, TensorType, INDEX_ELEMENT_SIZE};
use crate::error::{Error, Result};

/// Sparse tensor in coordinate format.
///
/// `indices` has shape `[ndim, nnz]` and element kind `i64`, `values` has
/// shape `[nnz]`, and `shape` is the logical dense shape.
#[derive(Debug, Clone)]
pub struct SparseTensor {
    indices: Tensor,
    values: Tensor,
    shape: Shape,
}

impl SparseTensor {
    /// Build a sparse tensor from its parts.
    ///
    /// Integer indices of any width are widened to `i64`.
    pub fn new(indices: Tensor, values: Tensor, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();

        if indices.rank() != 2 {
            return Err(Error::invalid_input(format!(
                "sparse indices must be 2-D [ndim, nnz], got shape {:?}",
                indices.dims()
            )));
        }
        if values.rank() != 1 {
            return Err(Error::invalid_input(format!(
                "sparse values must be 1-D [nnz], got shape {:?}",
                values.dims()
            )));
        }

        let (ndim, nnz) = indices.dims2()?;
        if ndim != shape.rank() {
            return Err(Error::invalid_input(format!(
                "sparse indices cover {} dims but dense shape {:?} has {}",
                ndim,
                shape.dims(),
                shape.rank()
            )));
        }
        if values.dim(0)? != nnz {
            return Err(Error::invalid_input(format!(
                "sparse tensor has {} index columns but {} values",
                nnz,
                values.dim(0)?
            )));
        }
        if !indices.dtype().is_int() {
            return Err(Error::invalid_input(format!(
                "sparse indices must be integers, got {}",
                indices.dtype().as_str()
            )));
        }
        if !indices.device().same_device(values.device()) {
            return Err(Error::invalid_input(
                "sparse indices and values live on different devices",
            ));
        }

        let indices = if indices.dtype() == DType::I64 {
            indices
        } else {
            indices.to_dtype(DType::I64)?
        };

        Ok(Self {
            indices,
            values,
            shape,
        })
    }

    /// Collect the non-zero entries of a dense tensor.
    ///
    /// Values are gathered in the tensor's own element kind, so integer
    /// tensors keep every bit.
    pub fn from_dense(dense: &Tensor) -> Result<Self> {
        let dims = dense.dims().to_vec();
        let device = dense.device();
        let flat = dense.flatten_all()?;
        let mask = flat.ne(0f64)?.to_device(&Device::Cpu)?.to_vec1::<u8>()?;
        let strides = row_major_strides(&dims);

        let positions: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter(|(_, keep)| **keep != 0)
            .map(|(i, _)| i)
            .collect();
        let nnz = positions.len();

        let mut coords = vec![0i64; dims.len() * nnz];
        for (column, &linear) in positions.iter().enumerate() {
            let mut rest = linear;
            for (d, stride) in strides.iter().enumerate() {
                coords[d * nnz + column] = (rest / stride) as i64;
                rest %= stride;
            }
        }

        let indices = Tensor::from_vec(coords, (dims.len(), nnz), device)?;
        let values = if nnz == 0 {
            Tensor::zeros(0, dense.dtype(), device)?
        } else {
            let ids: Vec<i64> = positions.iter().map(|&i| i as i64).collect();
            flat.index_select(&Tensor::from_vec(ids, nnz, device)?, 0)?
        };

        Self::new(indices, values, dims)
    }

    /// Index tensor `[ndim, nnz]`
    pub fn indices(&self) -> &Tensor {
        &self.indices
    }

    /// Value tensor `[nnz]`
    pub fn values(&self) -> &Tensor {
        &self.values
    }

    /// Logical dense shape
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Logical dense dimensions
    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.values.elem_count()
    }

    /// Element kind of the values
    pub fn dtype(&self) -> DType {
        self.values.dtype()
    }

    /// Device holding indices and values
    pub fn device(&self) -> &Device {
        self.values.device()
    }

    /// Scatter the stored entries into a dense tensor; duplicates are summed
    pub fn to_dense(&self) -> Result<Tensor> {
        let dims = self.shape.dims();
        let nnz = self.nnz();
        let zeros = Tensor::zeros(self.shape.elem_count(), self.dtype(), self.device())?;
        if nnz == 0 {
            return Ok(zeros.reshape(dims)?);
        }

        let coords = self.indices.to_device(&Device::Cpu)?.to_vec2::<i64>()?;
        let strides = row_major_strides(dims);

        let mut linear = vec![0i64; nnz];
        for (column, position) in linear.iter_mut().enumerate() {
            let mut offset = 0usize;
            for (d, row) in coords.iter().enumerate() {
                let coord = row[column];
                if coord < 0 || coord as usize >= dims[d] {
                    return Err(Error::shape_mismatch(format!(
                        "sparse index {} out of range for dim {} of size {}",
                        coord, d, dims[d]
                    )));
                }
                offset += coord as usize * strides[d];
            }
            *position = offset as i64;
        }

        let ids = Tensor::from_vec(linear, nnz, self.device())?;
        Ok(zeros.index_add(&ids, &self.values, 0)?.reshape(dims)?)
    }
}

impl TensorLike for SparseTensor {
    fn tensor_type(&self) -> TensorType {
        TensorType::sparse(StorageKind::of(self.device()), self.dtype())
    }

    fn byte_size(&self) -> usize {
        self.indices.elem_count() * INDEX_ELEMENT_SIZE + self.values.byte_size()
    }
}

pub(crate) fn row_major_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; dims.len()];
    for d in (0..dims.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * dims[d + 1];
    }
    strides
}
