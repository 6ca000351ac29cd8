//! Chunking and reordering against real tensors

use super::fixtures::*;
use super::init_test_logging;
use candle_core::DType;
use proptest::prelude::*;
use std::collections::HashMap;
use tensor_buckets::{reorder_tensors_as, take_tensors, AnyTensor, Result, TensorLike, TensorType};
use test_case::test_case;

/// `count` f32 tensors of `bytes` bytes each
fn f32_tensors(count: usize, bytes: usize) -> Vec<AnyTensor> {
    (0..count).map(|_| ramp(&[bytes / 4], DType::F32).into()).collect()
}

#[test_case(5, 100, 250 => vec![200, 200, 100] ; "split on exceed with non-empty accumulator")]
#[test_case(1, 1000, 250 => vec![1000] ; "oversized singleton")]
#[test_case(4, 100, 400 => vec![400] ; "exact fit")]
#[test_case(3, 100, 100 => vec![100, 100, 100] ; "one per chunk")]
fn test_chunk_byte_sizes(count: usize, bytes: usize, limit: usize) -> Vec<usize> {
    init_test_logging();
    let tensors = f32_tensors(count, bytes);
    take_tensors(&tensors, limit)
        .unwrap()
        .map(|chunk| chunk.bytes)
        .collect()
}

#[test]
fn test_five_tensors_split_two_two_one() -> Result<()> {
    let tensors = f32_tensors(5, 100);
    let sizes: Vec<usize> = take_tensors(&tensors, 250)?.map(|c| c.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    Ok(())
}

#[test]
fn test_mixed_gradients_cover_input_once() -> Result<()> {
    init_test_logging();
    let tensors = gradient_set();
    let chunks: Vec<_> = take_tensors(&tensors, 64)?.collect();

    let mut seen: Vec<*const AnyTensor> = chunks
        .iter()
        .flat_map(|c| c.tensors.iter().map(|t| *t as *const AnyTensor))
        .collect();
    assert_eq!(seen.len(), tensors.len());
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), tensors.len());

    for chunk in &chunks {
        assert!(chunk.tensors.iter().all(|t| t.tensor_type() == chunk.tensor_type));
        assert!(chunk.len() == 1 || chunk.bytes <= 64);
        let total: usize = chunk.tensors.iter().map(|t| t.byte_size()).sum();
        assert_eq!(total, chunk.bytes);
    }

    Ok(())
}

#[test]
fn test_chunk_then_reorder_restores_input_order() -> Result<()> {
    let tensors = gradient_set();
    let chunked: Vec<&AnyTensor> = take_tensors(&tensors, 40)?
        .flat_map(|chunk| chunk.tensors)
        .collect();

    let restored = reorder_tensors_as(chunked, &tensors)?;
    for (original, restored) in tensors.iter().zip(&restored) {
        assert!(std::ptr::eq(original, *restored));
    }

    Ok(())
}

#[test]
fn test_trailing_chunks_follow_first_seen_types() -> Result<()> {
    let tensors = gradient_set();
    let order: Vec<TensorType> = take_tensors(&tensors, usize::MAX)?
        .map(|chunk| chunk.tensor_type)
        .collect();

    let mut first_seen: Vec<TensorType> = Vec::new();
    for tensor in &tensors {
        if !first_seen.contains(&tensor.tensor_type()) {
            first_seen.push(tensor.tensor_type());
        }
    }
    assert_eq!(order, first_seen);

    Ok(())
}

#[derive(Debug, Clone)]
struct Sketch {
    index: usize,
    size: usize,
    kind: u8,
}

impl TensorLike for Sketch {
    fn tensor_type(&self) -> TensorType {
        let dtype = match self.kind % 3 {
            0 => DType::F32,
            1 => DType::F16,
            _ => DType::BF16,
        };
        TensorType::dense(Default::default(), dtype)
    }

    fn byte_size(&self) -> usize {
        self.size
    }
}

fn sketches(items: &[(usize, u8)]) -> Vec<Sketch> {
    items
        .iter()
        .enumerate()
        .map(|(index, &(size, kind))| Sketch { index, size, kind })
        .collect()
}

proptest! {
    #[test]
    fn prop_chunks_partition_and_respect_limit(
        items in prop::collection::vec((0usize..300, 0u8..3), 0..40),
        limit in 1usize..400,
    ) {
        let tensors = sketches(&items);
        let chunks: Vec<_> = take_tensors(&tensors, limit).unwrap().collect();

        let mut per_type: HashMap<TensorType, Vec<usize>> = HashMap::new();
        let mut total = 0;
        for chunk in &chunks {
            prop_assert!(!chunk.is_empty());
            prop_assert!(chunk.len() == 1 || chunk.bytes <= limit);
            for tensor in &chunk.tensors {
                prop_assert_eq!(tensor.tensor_type(), chunk.tensor_type);
                per_type.entry(chunk.tensor_type).or_default().push(tensor.index);
            }
            total += chunk.len();
        }
        prop_assert_eq!(total, tensors.len());

        // Within a type, input order survives across chunks
        for indices in per_type.values() {
            prop_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn prop_reorder_inverts_chunking(
        kinds in prop::collection::vec(0u8..3, 0..30),
        limit in 1usize..64,
    ) {
        let items: Vec<(usize, u8)> = kinds.iter().map(|&kind| (16, kind)).collect();
        let tensors = sketches(&items);
        let chunked: Vec<&Sketch> = take_tensors(&tensors, limit)
            .unwrap()
            .flat_map(|chunk| chunk.tensors)
            .collect();

        let restored = reorder_tensors_as(chunked, &tensors).unwrap();
        let positions: Vec<usize> = restored.iter().map(|t| t.index).collect();
        prop_assert_eq!(positions, (0..tensors.len()).collect::<Vec<_>>());
    }
}
