//! Standalone tensor helpers: tiling, strided rebuild and running totals

use candle_core::Tensor;

use crate::error::{Error, Result};

/// Running totals of `iter` under `combine`.
///
/// `accumulate([1, 2, 3, 4, 5], |a, b| a + b)` yields `1 3 6 10 15`.
pub fn accumulate<I, F>(iter: I, mut combine: F) -> impl Iterator<Item = I::Item>
where
    I: IntoIterator,
    I::Item: Clone,
    F: FnMut(I::Item, I::Item) -> I::Item,
{
    let mut iter = iter.into_iter();
    let first = iter.next();
    let seed = first.clone();

    first.into_iter().chain(iter.scan(seed, move |total, element| {
        let next = combine(total.take()?, element);
        *total = Some(next.clone());
        Some(next)
    }))
}

/// Running sums of element counts, i.e. the end offset of each slice
pub fn running_totals<I>(iter: I) -> impl Iterator<Item = usize>
where
    I: IntoIterator<Item = usize>,
{
    accumulate(iter, |a, b| a + b)
}

/// Tile `tensor` `repeats[i]` times along dimension `i`, copying its data.
///
/// Extra leading entries in `repeats` add new leading dimensions.
pub fn repeat(tensor: &Tensor, repeats: &[usize]) -> Result<Tensor> {
    let rank = tensor.rank();
    if repeats.len() < rank {
        return Err(Error::invalid_input(format!(
            "number of dimensions of repeat dims ({}) can not be smaller than number of dimensions of tensor ({})",
            repeats.len(),
            rank
        )));
    }

    let mut padded = vec![1usize; repeats.len() - rank];
    padded.extend_from_slice(tensor.dims());
    let target: Vec<usize> = padded.iter().zip(repeats).map(|(d, r)| d * r).collect();

    if target.iter().any(|&d| d == 0) {
        return Ok(Tensor::zeros(target, tensor.dtype(), tensor.device())?);
    }

    let mut tiled = tensor.reshape(padded)?;
    for (dim, &count) in repeats.iter().enumerate() {
        if count > 1 {
            let copies = vec![&tiled; count];
            let next = Tensor::cat(&copies, dim)?;
            tiled = next;
        }
    }

    Ok(tiled)
}

/// Rebuild a tensor from a 1-D storage buffer, an element offset, a shape
/// and per-dimension strides (in elements). The result is contiguous.
pub fn rebuild_tensor(
    storage: &Tensor,
    storage_offset: usize,
    size: &[usize],
    stride: &[usize],
) -> Result<Tensor> {
    if storage.rank() != 1 {
        return Err(Error::shape_mismatch(format!(
            "storage must be 1-D, got shape {:?}",
            storage.dims()
        )));
    }
    if size.len() != stride.len() {
        return Err(Error::shape_mismatch(format!(
            "size {:?} and stride {:?} have different ranks",
            size, stride
        )));
    }

    let numel: usize = size.iter().product();
    if numel == 0 {
        return Ok(Tensor::zeros(size, storage.dtype(), storage.device())?);
    }

    let last = storage_offset
        + size
            .iter()
            .zip(stride)
            .map(|(&s, &st)| (s - 1) * st)
            .sum::<usize>();
    if last >= storage.elem_count() {
        return Err(Error::shape_mismatch(format!(
            "view reaches element {} but storage holds {}",
            last,
            storage.elem_count()
        )));
    }
    if last > u32::MAX as usize {
        return Err(Error::invalid_input("storage too large for a 32-bit gather"));
    }

    let mut gather = Vec::with_capacity(numel);
    let mut counter = vec![0usize; size.len()];
    for _ in 0..numel {
        let position = storage_offset
            + counter
                .iter()
                .zip(stride)
                .map(|(&c, &st)| c * st)
                .sum::<usize>();
        gather.push(position as u32);

        for d in (0..size.len()).rev() {
            counter[d] += 1;
            if counter[d] < size[d] {
                break;
            }
            counter[d] = 0;
        }
    }

    let ids = Tensor::from_vec(gather, numel, storage.device())?;
    Ok(storage.index_select(&ids, 0)?.reshape(size)?)
}
