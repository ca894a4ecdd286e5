//! Automatic codec recommendation from an array's rank and element type.

use crate::types::{Codec, DType};

/// Recommend a codec for an array of the given rank and dtype.
///
/// Pure and total; this is the single source of automatic codec selection
/// used by every layer that does not pin a codec explicitly.
///
/// The heuristics:
/// - 3D float32 is treated as orderbook data.
/// - 2D float32/int64 as temporal feature-vector series.
/// - 1D float32/int64 as temporal scalar series (shuffle/delta variants).
/// - Everything else falls back to general-purpose zstd.
pub fn recommend(rank: usize, dtype: DType) -> Codec {
    match (rank, dtype) {
        (3, DType::Float32) => Codec::GenericObSimdF32,
        (2, DType::Float32) => Codec::Temporal2dSimdF32,
        (2, DType::Int64) => Codec::Temporal2dSimdI64,
        (1, DType::Float32) => Codec::Temporal1dSimdF32XorShuffle,
        (1, DType::Int64) => Codec::Temporal1dSimdI64Delta,
        _ => Codec::ZstdCompressed,
    }
}
