//! Metadata-only tensor descriptions for planning chunk layouts
//!
//! A manifest lists tensors by name, shape, element kind and device, without
//! any data. It can be written by hand (JSON or YAML) or read from the header
//! of a `.safetensors` file, and lets the chunker compute a bucket plan
//! without allocating a single buffer.

use std::path::Path;

use candle_core::DType;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chunk::take_tensors;
use crate::error::{Error, Result};
use crate::tensor::{parse_dtype, StorageKind, TensorLike, TensorType, INDEX_ELEMENT_SIZE};

/// Sparse layout of a manifest entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseSpec {
    /// Number of stored entries
    pub nnz: usize,
}

/// One tensor described by metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorSpec {
    /// Tensor name
    pub name: String,
    /// Dense shape
    pub shape: Vec<usize>,
    /// Element kind, e.g. "f32"
    #[serde(with = "dtype_name")]
    pub dtype: DType,
    /// Device, e.g. "cpu" or "cuda:1"
    #[serde(default)]
    pub device: StorageKind,
    /// Present for sparse tensors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse: Option<SparseSpec>,
}

impl TensorLike for TensorSpec {
    fn tensor_type(&self) -> TensorType {
        TensorType {
            storage: self.device,
            dtype: self.dtype,
            sparse: self.sparse.is_some(),
        }
    }

    fn byte_size(&self) -> usize {
        self.checked_byte_size().unwrap_or(usize::MAX)
    }
}

impl TensorSpec {
    /// Byte size, or `None` if it does not fit in `usize`
    pub fn checked_byte_size(&self) -> Option<usize> {
        let element = self.dtype.size_in_bytes();
        match self.sparse {
            Some(SparseSpec { nnz }) => {
                let indices = self
                    .shape
                    .len()
                    .checked_mul(nnz)?
                    .checked_mul(INDEX_ELEMENT_SIZE)?;
                indices.checked_add(nnz.checked_mul(element)?)
            }
            None => self
                .shape
                .iter()
                .try_fold(element, |bytes, &dim| bytes.checked_mul(dim)),
        }
    }
}

/// One bucket of a chunk plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketPlan {
    /// Position in production order
    pub index: usize,
    /// Shared tensor type, e.g. "cuda:0.f16"
    pub tensor_type: String,
    /// Member tensor names, in manifest order
    pub tensors: Vec<String>,
    /// Cumulative byte size
    pub bytes: usize,
}

/// Ordered list of tensor descriptions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Tensors in communication order
    pub tensors: Vec<TensorSpec>,
}

impl Manifest {
    /// Load a manifest from `.json`, `.yaml`/`.yml` or `.safetensors`
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let manifest: Self = match extension.as_str() {
            "json" => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            "yaml" | "yml" => serde_yaml::from_str(&std::fs::read_to_string(path)?)?,
            "safetensors" => Self::from_safetensors(path)?,
            _ => {
                return Err(Error::invalid_input(format!(
                    "unsupported manifest format: {}",
                    path.display()
                )))
            }
        };

        manifest.validate()?;
        info!("Loaded manifest with {} tensors from {}", manifest.tensors.len(), path.display());
        Ok(manifest)
    }

    /// Reject entries whose byte size, or the manifest total, overflows `usize`
    pub fn validate(&self) -> Result<()> {
        let mut total = 0usize;
        for spec in &self.tensors {
            let bytes = spec.checked_byte_size().ok_or_else(|| {
                Error::invalid_input(format!(
                    "tensor '{}' with shape {:?} is too large to describe",
                    spec.name, spec.shape
                ))
            })?;
            total = total
                .checked_add(bytes)
                .ok_or_else(|| Error::invalid_input("manifest total byte size overflows"))?;
        }
        Ok(())
    }

    /// Describe the tensors stored in a safetensors file, in storage order
    pub fn from_safetensors(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        // SAFETY: the mapping is read-only and dropped before returning
        let mmap = unsafe { memmap2::MmapOptions::new().map(&file)? };
        let tensors = safetensors::SafeTensors::deserialize(&mmap)?;

        let base = mmap.as_ptr() as usize;
        let mut entries = tensors
            .tensors()
            .into_iter()
            .map(|(name, view)| {
                let offset = view.data().as_ptr() as usize - base;
                let spec = TensorSpec {
                    name,
                    shape: view.shape().to_vec(),
                    dtype: safetensors_dtype(view.dtype())?,
                    device: StorageKind::Cpu,
                    sparse: None,
                };
                Ok((offset, spec))
            })
            .collect::<Result<Vec<_>>>()?;
        entries.sort_by_key(|(offset, _)| *offset);

        debug!("Read {} tensor headers from safetensors file", entries.len());
        Ok(Self {
            tensors: entries.into_iter().map(|(_, spec)| spec).collect(),
        })
    }

    /// Total bytes described by the manifest
    pub fn total_bytes(&self) -> usize {
        self.tensors
            .iter()
            .map(TensorLike::byte_size)
            .fold(0, usize::saturating_add)
    }

    /// Chunk the manifest's tensors under `size_limit`
    pub fn plan(&self, size_limit: usize) -> Result<Vec<BucketPlan>> {
        self.validate()?;
        let plan = take_tensors(&self.tensors, size_limit)?
            .enumerate()
            .map(|(index, chunk)| BucketPlan {
                index,
                tensor_type: chunk.tensor_type.to_string(),
                tensors: chunk.tensors.iter().map(|t| t.name.clone()).collect(),
                bytes: chunk.bytes,
            })
            .collect();
        Ok(plan)
    }
}

fn safetensors_dtype(dtype: safetensors::Dtype) -> Result<DType> {
    use safetensors::Dtype;

    let dtype = match dtype {
        Dtype::U8 => DType::U8,
        Dtype::U32 => DType::U32,
        Dtype::I64 => DType::I64,
        Dtype::BF16 => DType::BF16,
        Dtype::F16 => DType::F16,
        Dtype::F32 => DType::F32,
        Dtype::F64 => DType::F64,
        other => {
            return Err(Error::invalid_input(format!(
                "unsupported safetensors dtype {:?}",
                other
            )))
        }
    };
    Ok(dtype)
}

mod dtype_name {
    use candle_core::DType;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dtype: &DType, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(dtype.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DType, D::Error> {
        let name = String::deserialize(deserializer)?;
        super::parse_dtype(&name).map_err(de::Error::custom)
    }
}
