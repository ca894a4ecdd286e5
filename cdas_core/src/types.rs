//! Core wire-contract types shared by the client layer and the engine:
//! codec tags, element-type tags, and the read-only summary records
//! returned by store operations.

use serde::{Deserialize, Serialize};

/// Encoding family applied to one chunk's payload.
///
/// The numeric id of each variant is stored in the file's chunk index and
/// shared with the engine; ids must never be renumbered or reused.
/// Variants are declared in id order so the derived `Ord` follows the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Codec {
    /// Uncompressed passthrough.
    #[serde(rename = "RAW")]
    Raw = 0,
    /// General-purpose zstd compression.
    #[serde(rename = "ZSTD_COMPRESSED")]
    ZstdCompressed = 1,

    // Exchange-specific orderbook codecs, kept for files written by older
    // producers. New writes use the GENERIC_OB family.
    #[serde(rename = "OKX_OB_SIMD_F16_AS_F32")]
    OkxObSimdF16AsF32 = 2,
    #[serde(rename = "OKX_OB_SIMD_F32")]
    OkxObSimdF32 = 3,
    #[serde(rename = "BINANCE_OB_SIMD_F16_AS_F32")]
    BinanceObSimdF16AsF32 = 4,
    #[serde(rename = "BINANCE_OB_SIMD_F32")]
    BinanceObSimdF32 = 5,

    // Orderbook-shaped data (3D: time, side, features).
    #[serde(rename = "GENERIC_OB_SIMD_F16_AS_F32")]
    GenericObSimdF16AsF32 = 6,
    #[serde(rename = "GENERIC_OB_SIMD_F32")]
    GenericObSimdF32 = 7,

    // Temporal 1D series (timestamps, price series).
    #[serde(rename = "TEMPORAL_1D_SIMD_F16_XOR_SHUFFLE_AS_F32")]
    Temporal1dSimdF16XorShuffleAsF32 = 8,
    #[serde(rename = "TEMPORAL_1D_SIMD_F32_XOR_SHUFFLE")]
    Temporal1dSimdF32XorShuffle = 9,
    #[serde(rename = "TEMPORAL_1D_SIMD_I64_XOR")]
    Temporal1dSimdI64Xor = 10,
    #[serde(rename = "TEMPORAL_1D_SIMD_I64_DELTA")]
    Temporal1dSimdI64Delta = 11,

    // Temporal 2D series (time series of feature vectors).
    #[serde(rename = "TEMPORAL_2D_SIMD_F16_AS_F32")]
    Temporal2dSimdF16AsF32 = 12,
    #[serde(rename = "TEMPORAL_2D_SIMD_F32")]
    Temporal2dSimdF32 = 13,
    #[serde(rename = "TEMPORAL_2D_SIMD_I64")]
    Temporal2dSimdI64 = 14,
}

impl Codec {
    /// Stable numeric id stored in the chunk index.
    #[inline]
    pub fn id(self) -> u16 {
        self as u16
    }

    /// Resolve a codec from its stored numeric id.
    pub fn from_id(id: u16) -> Option<Self> {
        use Codec::*;
        Some(match id {
            0 => Raw,
            1 => ZstdCompressed,
            2 => OkxObSimdF16AsF32,
            3 => OkxObSimdF32,
            4 => BinanceObSimdF16AsF32,
            5 => BinanceObSimdF32,
            6 => GenericObSimdF16AsF32,
            7 => GenericObSimdF32,
            8 => Temporal1dSimdF16XorShuffleAsF32,
            9 => Temporal1dSimdF32XorShuffle,
            10 => Temporal1dSimdI64Xor,
            11 => Temporal1dSimdI64Delta,
            12 => Temporal2dSimdF16AsF32,
            13 => Temporal2dSimdF32,
            14 => Temporal2dSimdI64,
            _ => return None,
        })
    }

    /// Wire name of the codec, as sent in `StoreChunk` requests.
    pub fn name(self) -> &'static str {
        use Codec::*;
        match self {
            Raw => "RAW",
            ZstdCompressed => "ZSTD_COMPRESSED",
            OkxObSimdF16AsF32 => "OKX_OB_SIMD_F16_AS_F32",
            OkxObSimdF32 => "OKX_OB_SIMD_F32",
            BinanceObSimdF16AsF32 => "BINANCE_OB_SIMD_F16_AS_F32",
            BinanceObSimdF32 => "BINANCE_OB_SIMD_F32",
            GenericObSimdF16AsF32 => "GENERIC_OB_SIMD_F16_AS_F32",
            GenericObSimdF32 => "GENERIC_OB_SIMD_F32",
            Temporal1dSimdF16XorShuffleAsF32 => "TEMPORAL_1D_SIMD_F16_XOR_SHUFFLE_AS_F32",
            Temporal1dSimdF32XorShuffle => "TEMPORAL_1D_SIMD_F32_XOR_SHUFFLE",
            Temporal1dSimdI64Xor => "TEMPORAL_1D_SIMD_I64_XOR",
            Temporal1dSimdI64Delta => "TEMPORAL_1D_SIMD_I64_DELTA",
            Temporal2dSimdF16AsF32 => "TEMPORAL_2D_SIMD_F16_AS_F32",
            Temporal2dSimdF32 => "TEMPORAL_2D_SIMD_F32",
            Temporal2dSimdI64 => "TEMPORAL_2D_SIMD_I64",
        }
    }
}

/// Element-type tag for array data.
///
/// The uppercase wire names (`FLOAT32`, `INT64`, ...) are fixed identifiers
/// understood by the engine. `Float16` is a valid stored tag but has no
/// native Rust scalar; its chunks can be inspected and moved as bytes only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DType {
    #[serde(rename = "FLOAT16")]
    Float16,
    #[serde(rename = "FLOAT32")]
    Float32,
    #[serde(rename = "FLOAT64")]
    Float64,
    #[serde(rename = "INT8")]
    Int8,
    #[serde(rename = "INT16")]
    Int16,
    #[serde(rename = "INT32")]
    Int32,
    #[serde(rename = "INT64")]
    Int64,
    #[serde(rename = "UINT8")]
    UInt8,
    #[serde(rename = "UINT16")]
    UInt16,
    #[serde(rename = "UINT32")]
    UInt32,
    #[serde(rename = "UINT64")]
    UInt64,
}

impl DType {
    /// Width of one element in bytes.
    #[inline]
    pub fn size_bytes(self) -> usize {
        use DType::*;
        match self {
            Int8 | UInt8 => 1,
            Float16 | Int16 | UInt16 => 2,
            Float32 | Int32 | UInt32 => 4,
            Float64 | Int64 | UInt64 => 8,
        }
    }

    /// Fixed uppercase wire identifier.
    pub fn name(self) -> &'static str {
        use DType::*;
        match self {
            Float16 => "FLOAT16",
            Float32 => "FLOAT32",
            Float64 => "FLOAT64",
            Int8 => "INT8",
            Int16 => "INT16",
            Int32 => "INT32",
            Int64 => "INT64",
            UInt8 => "UINT8",
            UInt16 => "UINT16",
            UInt32 => "UINT32",
            UInt64 => "UINT64",
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Native scalar types that map bidirectionally onto a [`DType`] tag.
pub trait Element: bytemuck::Pod {
    const DTYPE: DType;
}

macro_rules! impl_element {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(impl Element for $ty {
            const DTYPE: DType = DType::$tag;
        })*
    };
}

impl_element! {
    f32 => Float32,
    f64 => Float64,
    i8  => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8  => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
}

/// Read-only summary of one persisted chunk, as reported by `Inspect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Dense 0-based index assigned at write time.
    pub index: u64,
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub codec: Codec,
    pub encoded_size_bytes: u64,
    pub decoded_size_bytes: u64,
}

impl ChunkInfo {
    /// Number of elements in the chunk.
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Outcome of one successful chunk append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreResult {
    pub chunk_index: u64,
    pub original_size: u64,
    pub compressed_size: u64,
    /// `compressed / original`, or 0 when the original was empty.
    pub compression_ratio: f64,
}

/// Store-level metadata read from the file header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeaderInfo {
    pub version: u32,
    pub index_block_offset: u64,
    pub index_block_size: u64,
    /// Opaque user metadata blob, base64-encoded UTF-8 JSON. Empty when unset.
    #[serde(default)]
    pub user_metadata_base64: String,
}

/// Optional per-append codec parameters, forwarded to the engine inside the
/// `encoding` request field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecParams {
    /// Zstd compression level; negative levels trade ratio for speed.
    pub zstd_level: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_ids_are_the_wire_contract() {
        assert_eq!(Codec::Raw.id(), 0);
        assert_eq!(Codec::ZstdCompressed.id(), 1);
        assert_eq!(Codec::GenericObSimdF32.id(), 7);
        assert_eq!(Codec::Temporal1dSimdF32XorShuffle.id(), 9);
        assert_eq!(Codec::Temporal1dSimdI64Delta.id(), 11);
        assert_eq!(Codec::Temporal2dSimdI64.id(), 14);
        for id in 0..=14u16 {
            let codec = Codec::from_id(id).unwrap();
            assert_eq!(codec.id(), id);
        }
        assert!(Codec::from_id(15).is_none());
    }

    #[test]
    fn codec_serializes_as_wire_name() {
        let json = serde_json::to_string(&Codec::Temporal1dSimdI64Delta).unwrap();
        assert_eq!(json, "\"TEMPORAL_1D_SIMD_I64_DELTA\"");
        let back: Codec = serde_json::from_str("\"ZSTD_COMPRESSED\"").unwrap();
        assert_eq!(back, Codec::ZstdCompressed);
    }

    #[test]
    fn dtype_names_and_sizes() {
        assert_eq!(serde_json::to_string(&DType::Float32).unwrap(), "\"FLOAT32\"");
        assert_eq!(serde_json::to_string(&DType::UInt64).unwrap(), "\"UINT64\"");
        assert_eq!(DType::Float16.size_bytes(), 2);
        assert_eq!(DType::Int64.size_bytes(), 8);
        let back: DType = serde_json::from_str("\"FLOAT16\"").unwrap();
        assert_eq!(back, DType::Float16);
    }

    #[test]
    fn element_mapping_is_bidirectional() {
        assert_eq!(<f32 as Element>::DTYPE, DType::Float32);
        assert_eq!(<i64 as Element>::DTYPE, DType::Int64);
        assert_eq!(<u8 as Element>::DTYPE, DType::UInt8);
    }
}
