//! Reorder tensors to follow a reference ordering within their types

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::error::{Error, Result};
use crate::tensor::{TensorLike, TensorType};

/// Pair `tensors` with `ordered` by type and consumption order.
///
/// `tensors` must already be in the same order as `ordered` within each type
/// (which is what chunking preserves). The result has the length and the
/// positional type sequence of `ordered`, with elements taken from `tensors`.
pub fn reorder_tensors_as<T, R>(tensors: impl IntoIterator<Item = T>, ordered: &[R]) -> Result<Vec<T>>
where
    T: TensorLike,
    R: TensorLike,
{
    let mut queues: HashMap<TensorType, VecDeque<T>> = HashMap::new();
    for tensor in tensors {
        queues.entry(tensor.tensor_type()).or_default().push_back(tensor);
    }

    let reordered = ordered
        .iter()
        .enumerate()
        .map(|(position, reference)| {
            let tensor_type = reference.tensor_type();
            queues
                .get_mut(&tensor_type)
                .and_then(VecDeque::pop_front)
                .ok_or(Error::ReorderExhausted {
                    tensor_type,
                    position,
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let leftover: usize = queues.values().map(VecDeque::len).sum();
    if leftover > 0 {
        debug!("Reorder left {} unmatched tensors behind", leftover);
    }

    Ok(reordered)
}
