//! Bucketed apply: run one operation per flat buffer instead of per tensor
//!
//! The pipeline chunks the input by type and byte limit, flattens each
//! chunk, hands the flat buffer to the caller's operation (an all-reduce,
//! a broadcast, a scaling step), unflattens the result and finally restores
//! the input order.

use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::chunk::{take_tensors, Chunk};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::flatten::{flatten, unflatten, FlatBuffer};
use crate::reorder::reorder_tensors_as;
use crate::tensor::AnyTensor;

/// Summary of one bucketed pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoalesceStats {
    /// Number of chunks processed
    pub chunks: usize,
    /// Number of tensors processed
    pub tensors: usize,
    /// Byte size of each chunk, in processing order
    pub chunk_bytes: Vec<usize>,
}

/// Apply `op` to `tensors` one flat buffer per chunk.
///
/// `op` must return a buffer with the same density, type and element count
/// as the one it was given. Any failure aborts the whole call.
#[instrument(skip(tensors, op), fields(count = tensors.len()))]
pub fn apply_coalesced<F>(tensors: &[AnyTensor], size_limit: usize, mut op: F) -> Result<Vec<AnyTensor>>
where
    F: FnMut(&FlatBuffer) -> Result<FlatBuffer>,
{
    let mut outputs = Vec::with_capacity(tensors.len());
    let mut stats = CoalesceStats::default();

    for chunk in take_tensors(tensors, size_limit)? {
        stats.record(&chunk);
        outputs.extend(process_chunk(&chunk, &mut op)?);
    }

    debug!(
        "Processed {} tensors in {} chunks ({:?} bytes)",
        stats.tensors, stats.chunks, stats.chunk_bytes
    );
    reorder_tensors_as(outputs, tensors)
}

/// Same contract as [`apply_coalesced`], with chunks processed on the rayon pool
#[instrument(skip(tensors, op), fields(count = tensors.len()))]
pub fn apply_coalesced_parallel<F>(tensors: &[AnyTensor], size_limit: usize, op: F) -> Result<Vec<AnyTensor>>
where
    F: Fn(&FlatBuffer) -> Result<FlatBuffer> + Send + Sync,
{
    let chunks: Vec<Chunk<&AnyTensor>> = take_tensors(tensors, size_limit)?.collect();
    let stats = CoalesceStats::from_chunks(&chunks);
    info!(
        "Processing {} tensors in {} chunks on {} threads",
        stats.tensors,
        stats.chunks,
        rayon::current_num_threads()
    );

    let processed = chunks
        .par_iter()
        .map(|chunk| process_chunk(chunk, &op))
        .collect::<Result<Vec<_>>>()?;

    reorder_tensors_as(processed.into_iter().flatten(), tensors)
}

/// Run the sequential or the parallel pipeline, as `config` asks
pub fn apply_with_config<F>(tensors: &[AnyTensor], config: &Config, op: F) -> Result<Vec<AnyTensor>>
where
    F: Fn(&FlatBuffer) -> Result<FlatBuffer> + Send + Sync,
{
    config.validate()?;
    let size_limit = config.bucket.size_limit_bytes;
    if !config.bucket.parallel {
        return apply_coalesced(tensors, size_limit, op);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.system.num_threads)
        .build()
        .map_err(|e| Error::config(format!("failed to build thread pool: {}", e)))?;
    pool.install(|| apply_coalesced_parallel(tensors, size_limit, &op))
}

/// Chunk statistics without running any operation
pub fn plan_stats(tensors: &[AnyTensor], size_limit: usize) -> Result<CoalesceStats> {
    let chunks: Vec<_> = take_tensors(tensors, size_limit)?.collect();
    Ok(CoalesceStats::from_chunks(&chunks))
}

impl CoalesceStats {
    fn record<T>(&mut self, chunk: &Chunk<T>) {
        self.chunks += 1;
        self.tensors += chunk.len();
        self.chunk_bytes.push(chunk.bytes);
    }

    fn from_chunks<T>(chunks: &[Chunk<T>]) -> Self {
        let mut stats = Self::default();
        for chunk in chunks {
            stats.record(chunk);
        }
        stats
    }
}

fn process_chunk<F>(chunk: &Chunk<&AnyTensor>, op: F) -> Result<Vec<AnyTensor>>
where
    F: FnOnce(&FlatBuffer) -> Result<FlatBuffer>,
{
    let members: Vec<AnyTensor> = chunk.tensors.iter().map(|t| (*t).clone()).collect();
    let flat = flatten(&members)?;
    let result = op(&flat)?;
    unflatten(&result, &members)
}
