//! Size-bounded chunking of tensor sequences
//!
//! `take_tensors` groups tensors into chunks of one type whose cumulative
//! byte size stays within a limit. Chunks are produced lazily: a chunk is
//! yielded as soon as the next tensor of its type would overflow it, and the
//! remaining partial chunks are yielded once the input is exhausted, in the
//! order their types were first seen.

use std::collections::HashMap;
use std::iter::FusedIterator;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::tensor::{TensorLike, TensorType};

/// Tensors of one type whose cumulative size respects the chunk limit
/// (unless the chunk is a single oversized tensor)
#[derive(Debug, Clone)]
pub struct Chunk<T> {
    /// Type shared by every tensor in the chunk
    pub tensor_type: TensorType,
    /// Tensors in input order
    pub tensors: Vec<T>,
    /// Cumulative byte size
    pub bytes: usize,
}

impl<T> Chunk<T> {
    fn empty(tensor_type: TensorType) -> Self {
        Self {
            tensor_type,
            tensors: Vec::new(),
            bytes: 0,
        }
    }

    /// Number of tensors in the chunk
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Whether the chunk holds no tensors
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    fn take(&mut self) -> Self {
        let tensor_type = self.tensor_type;
        std::mem::replace(self, Self::empty(tensor_type))
    }
}

/// Lazy chunk producer returned by [`take_tensors`]
pub struct TakeTensors<I: Iterator> {
    inner: I,
    size_limit: usize,
    // Accumulators in first-seen order, indexed through `slots`
    buckets: Vec<Chunk<I::Item>>,
    slots: HashMap<TensorType, usize>,
    exhausted: bool,
    drain_position: usize,
}

/// Group `tensors` into same-typed chunks of at most `size_limit` bytes.
///
/// Within a type, tensors keep their input order across chunks. A tensor
/// larger than the limit becomes a chunk of its own.
pub fn take_tensors<I>(tensors: I, size_limit: usize) -> Result<TakeTensors<I::IntoIter>>
where
    I: IntoIterator,
    I::Item: TensorLike,
{
    if size_limit == 0 {
        return Err(Error::invalid_input("chunk size limit must be greater than 0"));
    }

    Ok(TakeTensors {
        inner: tensors.into_iter(),
        size_limit,
        buckets: Vec::new(),
        slots: HashMap::new(),
        exhausted: false,
        drain_position: 0,
    })
}

impl<I> TakeTensors<I>
where
    I: Iterator,
    I::Item: TensorLike,
{
    /// Configured byte limit
    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    fn slot_for(&mut self, tensor_type: TensorType) -> usize {
        if let Some(&slot) = self.slots.get(&tensor_type) {
            return slot;
        }
        self.buckets.push(Chunk::empty(tensor_type));
        let slot = self.buckets.len() - 1;
        self.slots.insert(tensor_type, slot);
        slot
    }
}

impl<I> Iterator for TakeTensors<I>
where
    I: Iterator,
    I::Item: TensorLike,
{
    type Item = Chunk<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.exhausted {
            let Some(tensor) = self.inner.next() else {
                self.exhausted = true;
                debug!("Chunk input exhausted, {} type accumulators", self.buckets.len());
                break;
            };

            let tensor_type = tensor.tensor_type();
            let size = tensor.byte_size();
            let slot = self.slot_for(tensor_type);
            let limit = self.size_limit;
            let bucket = &mut self.buckets[slot];

            let full = if bucket.bytes.saturating_add(size) > limit && !bucket.is_empty() {
                Some(bucket.take())
            } else {
                None
            };

            if size > limit {
                trace!(
                    "Tensor of {} bytes exceeds chunk limit {}, it will be chunked alone",
                    size,
                    limit
                );
            }
            bucket.tensors.push(tensor);
            bucket.bytes = bucket.bytes.saturating_add(size);

            if let Some(chunk) = full {
                trace!(
                    "Yielding {} chunk of {} tensors ({} bytes)",
                    chunk.tensor_type,
                    chunk.len(),
                    chunk.bytes
                );
                return Some(chunk);
            }
        }

        while self.drain_position < self.buckets.len() {
            let bucket = &mut self.buckets[self.drain_position];
            self.drain_position += 1;
            if !bucket.is_empty() {
                return Some(bucket.take());
            }
        }

        None
    }
}

impl<I> FusedIterator for TakeTensors<I>
where
    I: Iterator,
    I::Item: TensorLike,
{
}
