use std::io::{Read, Write};

use cdas_core::types::DType;

use crate::error::EngineError;

/// Magic bytes for CDAS version 1 stores.
/// 8 bytes: "CDAS1\n" followed by 2 null bytes.
pub const MAGIC: &[u8; 8] = b"CDAS1\n\x00\x00";

/// Fixed size of the file header in bytes.
///   magic[8] + version:u32 + chunk_count:u64 + index_offset:u64
///   + index_size:u64 + meta_offset:u64 + meta_len:u64 + reserved[12]
///   = 8 + 4 + 8 + 8 + 8 + 8 + 8 + 12 = 64
pub const HEADER_SIZE: u64 = 64;

pub const FORMAT_VERSION: u32 = 1;

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded representation of the 64-byte file header.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub version: u32,
    pub chunk_count: u64,
    /// Byte offset of the chunk index.
    pub index_offset: u64,
    /// Total size of the chunk index in bytes.
    pub index_size: u64,
    /// Byte offset of the user metadata blob (base64 text).
    pub meta_offset: u64,
    pub meta_len: u64,
}

impl FileHeader {
    /// Serialize to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[..8].copy_from_slice(MAGIC);
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf[12..20].copy_from_slice(&self.chunk_count.to_le_bytes());
        buf[20..28].copy_from_slice(&self.index_offset.to_le_bytes());
        buf[28..36].copy_from_slice(&self.index_size.to_le_bytes());
        buf[36..44].copy_from_slice(&self.meta_offset.to_le_bytes());
        buf[44..52].copy_from_slice(&self.meta_len.to_le_bytes());
        // reserved[12] stays zero
        buf
    }

    /// Deserialize from `HEADER_SIZE` bytes, checking the magic.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE as usize]) -> Result<Self, EngineError> {
        if &buf[..8] != MAGIC {
            return Err(EngineError::OperationFailed(
                "invalid magic bytes, not a CDAS1 store".into(),
            ));
        }
        let header = Self {
            version: u32::from_le_bytes(buf[8..12].try_into().unwrap_or_default()),
            chunk_count: u64::from_le_bytes(buf[12..20].try_into().unwrap_or_default()),
            index_offset: u64::from_le_bytes(buf[20..28].try_into().unwrap_or_default()),
            index_size: u64::from_le_bytes(buf[28..36].try_into().unwrap_or_default()),
            meta_offset: u64::from_le_bytes(buf[36..44].try_into().unwrap_or_default()),
            meta_len: u64::from_le_bytes(buf[44..52].try_into().unwrap_or_default()),
        };
        if header.version != FORMAT_VERSION {
            return Err(EngineError::OperationFailed(format!(
                "unsupported store version {} (only version {} is supported)",
                header.version, FORMAT_VERSION
            )));
        }
        Ok(header)
    }
}

// ── Chunk index entry ───────────────────────────────────────────────────────

/// One entry in the chunk index. Variable-size on disk because it carries
/// the chunk's shape:
///   offset:u64 + encoded_len:u64 + decoded_len:u64 + checksum:u64
///   + codec:u16 + dtype:u8 + rank:u8 + dims:u64 × rank
#[derive(Debug, Clone, Default)]
pub struct ChunkEntry {
    /// Byte offset of the encoded payload from the start of the file.
    pub offset: u64,
    pub encoded_len: u64,
    pub decoded_len: u64,
    /// xxhash3-64 of the encoded bytes.
    pub checksum: u64,
    pub codec: u16,
    pub dtype: u8,
    pub shape: Vec<u64>,
}

impl ChunkEntry {
    /// Serialized size of this entry in bytes.
    pub fn size_bytes(&self) -> u64 {
        36 + 8 * self.shape.len() as u64
    }

    pub fn write_to(&self, writer: &mut impl Write) -> std::io::Result<()> {
        writer.write_all(&self.offset.to_le_bytes())?;
        writer.write_all(&self.encoded_len.to_le_bytes())?;
        writer.write_all(&self.decoded_len.to_le_bytes())?;
        writer.write_all(&self.checksum.to_le_bytes())?;
        writer.write_all(&self.codec.to_le_bytes())?;
        writer.write_all(&[self.dtype, self.shape.len() as u8])?;
        for dim in &self.shape {
            writer.write_all(&dim.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn read_from(reader: &mut impl Read) -> std::io::Result<Self> {
        let mut fixed = [0u8; 36];
        reader.read_exact(&mut fixed)?;
        let rank = fixed[35] as usize;
        let mut shape = Vec::with_capacity(rank);
        let mut dim_buf = [0u8; 8];
        for _ in 0..rank {
            reader.read_exact(&mut dim_buf)?;
            shape.push(u64::from_le_bytes(dim_buf));
        }
        Ok(Self {
            offset: u64::from_le_bytes(fixed[0..8].try_into().unwrap_or_default()),
            encoded_len: u64::from_le_bytes(fixed[8..16].try_into().unwrap_or_default()),
            decoded_len: u64::from_le_bytes(fixed[16..24].try_into().unwrap_or_default()),
            checksum: u64::from_le_bytes(fixed[24..32].try_into().unwrap_or_default()),
            codec: u16::from_le_bytes(fixed[32..34].try_into().unwrap_or_default()),
            dtype: fixed[34],
            shape,
        })
    }
}

// ── Dtype codes ─────────────────────────────────────────────────────────────

pub fn dtype_code(dtype: DType) -> u8 {
    match dtype {
        DType::Float16 => 0,
        DType::Float32 => 1,
        DType::Float64 => 2,
        DType::Int8 => 3,
        DType::Int16 => 4,
        DType::Int32 => 5,
        DType::Int64 => 6,
        DType::UInt8 => 7,
        DType::UInt16 => 8,
        DType::UInt32 => 9,
        DType::UInt64 => 10,
    }
}

pub fn dtype_from_code(code: u8) -> Option<DType> {
    Some(match code {
        0 => DType::Float16,
        1 => DType::Float32,
        2 => DType::Float64,
        3 => DType::Int8,
        4 => DType::Int16,
        5 => DType::Int32,
        6 => DType::Int64,
        7 => DType::UInt8,
        8 => DType::UInt16,
        9 => DType::UInt32,
        10 => DType::UInt64,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = FileHeader {
            version: FORMAT_VERSION,
            chunk_count: 3,
            index_offset: 4096,
            index_size: 156,
            meta_offset: 4252,
            meta_len: 24,
        };
        let bytes = header.to_bytes();
        let back = FileHeader::from_bytes(&bytes).unwrap();
        assert_eq!(back.chunk_count, 3);
        assert_eq!(back.index_offset, 4096);
        assert_eq!(back.meta_len, 24);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut bytes = [0u8; HEADER_SIZE as usize];
        bytes[..8].copy_from_slice(b"NOTCDAS\x00");
        assert!(FileHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn entry_roundtrip_carries_shape() {
        let entry = ChunkEntry {
            offset: 64,
            encoded_len: 100,
            decoded_len: 400,
            checksum: 0xdead_beef,
            codec: 1,
            dtype: dtype_code(DType::Float32),
            shape: vec![50, 2],
        };
        let mut buf = Vec::new();
        entry.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, entry.size_bytes());
        let back = ChunkEntry::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(back.shape, vec![50, 2]);
        assert_eq!(dtype_from_code(back.dtype), Some(DType::Float32));
        assert_eq!(back.checksum, 0xdead_beef);
    }
}
