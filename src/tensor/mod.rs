//! Tensor buffer model
//!
//! This module describes the tensors the bucketing utilities operate on:
//! - `StorageKind`: where a buffer lives (CPU, CUDA ordinal, Metal ordinal)
//! - `TensorType`: storage kind + element kind + density, the grouping key
//! - `AnyTensor`: a dense candle `Tensor` or a `SparseTensor`
//! - `TensorLike`: the minimal contract chunking and reordering need

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use candle_core::{DType, Device, DeviceLocation, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub mod sparse;

pub use sparse::SparseTensor;

/// Byte width of a sparse index element (indices are always `i64`)
pub const INDEX_ELEMENT_SIZE: usize = 8;

/// Physical location of a tensor buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StorageKind {
    /// Host memory
    #[default]
    Cpu,
    /// CUDA device with the given ordinal
    Cuda(usize),
    /// Metal device with the given ordinal
    Metal(usize),
}

impl StorageKind {
    /// Storage kind of an existing device
    pub fn of(device: &Device) -> Self {
        match device.location() {
            DeviceLocation::Cpu => Self::Cpu,
            DeviceLocation::Cuda { gpu_id } => Self::Cuda(gpu_id),
            DeviceLocation::Metal { gpu_id } => Self::Metal(gpu_id),
        }
    }

    /// Open the device this storage kind refers to
    pub fn device(&self) -> Result<Device> {
        let device = match self {
            Self::Cpu => Device::Cpu,
            Self::Cuda(ordinal) => Device::new_cuda(*ordinal)?,
            Self::Metal(ordinal) => Device::new_metal(*ordinal)?,
        };
        Ok(device)
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
            Self::Metal(ordinal) => write!(f, "metal:{}", ordinal),
        }
    }
}

impl FromStr for StorageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, ordinal) = match s.split_once(':') {
            Some((kind, ordinal)) => {
                let ordinal = ordinal.parse::<usize>().map_err(|_| {
                    Error::invalid_input(format!("invalid device ordinal in '{}'", s))
                })?;
                (kind, Some(ordinal))
            }
            None => (s, None),
        };

        match (kind.to_ascii_lowercase().as_str(), ordinal) {
            ("cpu", None) => Ok(Self::Cpu),
            ("cpu", Some(_)) => Err(Error::invalid_input(format!(
                "cpu storage takes no ordinal, got '{}'",
                s
            ))),
            ("cuda" | "gpu", ordinal) => Ok(Self::Cuda(ordinal.unwrap_or(0))),
            ("metal", ordinal) => Ok(Self::Metal(ordinal.unwrap_or(0))),
            _ => Err(Error::invalid_input(format!("unknown device '{}'", s))),
        }
    }
}

impl TryFrom<String> for StorageKind {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<StorageKind> for String {
    fn from(value: StorageKind) -> Self {
        value.to_string()
    }
}

/// Parse an element kind name such as `f32` or `bf16`
pub fn parse_dtype(name: &str) -> Result<DType> {
    let dtype = match name.to_ascii_lowercase().as_str() {
        "u8" | "uint8" => DType::U8,
        "u32" | "uint32" => DType::U32,
        "i64" | "int64" | "long" => DType::I64,
        "bf16" | "bfloat16" => DType::BF16,
        "f16" | "float16" | "half" => DType::F16,
        "f32" | "float32" | "float" => DType::F32,
        "f64" | "float64" | "double" => DType::F64,
        _ => return Err(Error::invalid_input(format!("unsupported dtype '{}'", name))),
    };
    Ok(dtype)
}

/// Identity of a tensor for grouping purposes.
///
/// Two tensors can share a flat buffer only if their types are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorType {
    /// Where the buffer lives
    pub storage: StorageKind,
    /// Element kind (for sparse tensors, the kind of the values)
    pub dtype: DType,
    /// Whether the tensor is sparse
    pub sparse: bool,
}

impl TensorType {
    /// Dense tensor type
    pub fn dense(storage: StorageKind, dtype: DType) -> Self {
        Self {
            storage,
            dtype,
            sparse: false,
        }
    }

    /// Sparse tensor type
    pub fn sparse(storage: StorageKind, dtype: DType) -> Self {
        Self {
            storage,
            dtype,
            sparse: true,
        }
    }

    /// Byte width of one element
    pub fn element_size(&self) -> usize {
        self.dtype.size_in_bytes()
    }
}

impl Hash for TensorType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.storage.hash(state);
        self.dtype.as_str().hash(state);
        self.sparse.hash(state);
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sparse {
            write!(f, "{}.sparse.{}", self.storage, self.dtype.as_str())
        } else {
            write!(f, "{}.{}", self.storage, self.dtype.as_str())
        }
    }
}

/// What chunking and reordering need to know about a tensor
pub trait TensorLike {
    /// Grouping key
    fn tensor_type(&self) -> TensorType;

    /// Bytes occupied by the tensor's buffers
    fn byte_size(&self) -> usize;
}

impl<T: TensorLike + ?Sized> TensorLike for &T {
    fn tensor_type(&self) -> TensorType {
        (**self).tensor_type()
    }

    fn byte_size(&self) -> usize {
        (**self).byte_size()
    }
}

impl TensorLike for Tensor {
    fn tensor_type(&self) -> TensorType {
        TensorType::dense(StorageKind::of(self.device()), self.dtype())
    }

    fn byte_size(&self) -> usize {
        self.elem_count() * self.dtype().size_in_bytes()
    }
}

/// A dense or sparse tensor
#[derive(Debug, Clone)]
pub enum AnyTensor {
    /// Strided dense tensor
    Dense(Tensor),
    /// COO sparse tensor
    Sparse(SparseTensor),
}

impl AnyTensor {
    /// Whether this is a sparse tensor
    pub fn is_sparse(&self) -> bool {
        matches!(self, Self::Sparse(_))
    }

    /// Logical (dense) dimensions
    pub fn dims(&self) -> &[usize] {
        match self {
            Self::Dense(t) => t.dims(),
            Self::Sparse(t) => t.dims(),
        }
    }

    /// Logical (dense) element count
    pub fn elem_count(&self) -> usize {
        self.dims().iter().product()
    }

    /// Element kind
    pub fn dtype(&self) -> DType {
        match self {
            Self::Dense(t) => t.dtype(),
            Self::Sparse(t) => t.dtype(),
        }
    }

    /// Device holding the buffers
    pub fn device(&self) -> &Device {
        match self {
            Self::Dense(t) => t.device(),
            Self::Sparse(t) => t.device(),
        }
    }

    /// Borrow as a dense tensor
    pub fn as_dense(&self) -> Result<&Tensor> {
        match self {
            Self::Dense(t) => Ok(t),
            Self::Sparse(_) => Err(Error::density_mismatch(
                "expected a dense tensor, found a sparse tensor",
            )),
        }
    }

    /// Borrow as a sparse tensor
    pub fn as_sparse(&self) -> Result<&SparseTensor> {
        match self {
            Self::Sparse(t) => Ok(t),
            Self::Dense(_) => Err(Error::density_mismatch(
                "expected a sparse tensor, found a dense tensor",
            )),
        }
    }

    /// Materialise as a dense tensor (sparse tensors are scattered into zeros)
    pub fn to_dense(&self) -> Result<Tensor> {
        match self {
            Self::Dense(t) => Ok(t.clone()),
            Self::Sparse(t) => t.to_dense(),
        }
    }
}

impl TensorLike for AnyTensor {
    fn tensor_type(&self) -> TensorType {
        match self {
            Self::Dense(t) => t.tensor_type(),
            Self::Sparse(t) => t.tensor_type(),
        }
    }

    fn byte_size(&self) -> usize {
        match self {
            Self::Dense(t) => t.byte_size(),
            Self::Sparse(t) => t.byte_size(),
        }
    }
}

impl From<Tensor> for AnyTensor {
    fn from(tensor: Tensor) -> Self {
        Self::Dense(tensor)
    }
}

impl From<SparseTensor> for AnyTensor {
    fn from(tensor: SparseTensor) -> Self {
        Self::Sparse(tensor)
    }
}

/// Check that every tensor shares the first tensor's type
pub(crate) fn ensure_same_type<T: TensorLike>(tensors: &[T], operation: &str) -> Result<TensorType> {
    let first = tensors
        .first()
        .ok_or_else(|| Error::empty_input(format!("{} needs at least one tensor", operation)))?;
    let expected = first.tensor_type();

    for (index, tensor) in tensors.iter().enumerate().skip(1) {
        let found = tensor.tensor_type();
        if found != expected {
            return Err(Error::TypeMismatch {
                expected,
                found,
                context: format!("{} input {}", operation, index),
            });
        }
    }

    Ok(expected)
}
