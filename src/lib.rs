//! Tensor Buckets - flatten, chunk and reorder tensors for bulk transfer
//!
//! Many small tensors (typically gradients) are expensive to communicate one
//! at a time. This crate groups them into same-typed chunks under a byte
//! budget, flattens each chunk into one contiguous buffer, and restores the
//! individual tensors and their original order afterwards.

#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

pub mod cast;
pub mod chunk;
pub mod coalesce;
pub mod config;
pub mod error;
pub mod flatten;
pub mod logging;
pub mod mailbox;
pub mod manifest;
pub mod ops;
pub mod reorder;
pub mod tensor;

// Re-exports
pub use cast::{cast, cast_dtype, to_device};
pub use chunk::{take_tensors, Chunk, TakeTensors};
pub use coalesce::{
    apply_coalesced, apply_coalesced_parallel, apply_with_config, plan_stats, CoalesceStats,
};
pub use config::{BucketConfig, Config, SystemConfig};
pub use error::{Error, Result};
pub use flatten::{
    flatten, flatten_dense_tensors, flatten_sparse_tensors, unflatten, unflatten_dense_tensors,
    unflatten_sparse_tensors, FlatBuffer, SparseFlat,
};
pub use mailbox::Mailbox;
pub use manifest::{BucketPlan, Manifest, SparseSpec, TensorSpec};
pub use ops::{accumulate, rebuild_tensor, repeat, running_totals};
pub use reorder::reorder_tensors_as;
pub use tensor::{AnyTensor, SparseTensor, StorageKind, TensorLike, TensorType};
