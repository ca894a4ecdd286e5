use std::io::{Read, Seek, SeekFrom, Write};

use xxhash_rust::xxh3::xxh3_64;

use cdas_core::protocol::{
    Ack, DataSpec, EncodingSpec, InspectResult, LoadChunksResult, OpRequest, Selection,
    StoreChunkResult, StoreConfig, UserMetadataResult,
};
use cdas_core::types::{ChunkInfo, Codec, FileHeaderInfo, StoreResult};

use crate::backend::{open_backend, Backend};
use crate::error::EngineError;
use crate::format::{
    dtype_code, dtype_from_code, ChunkEntry, FileHeader, FORMAT_VERSION, HEADER_SIZE,
};

/// Zstd level used when a request does not pin one.
const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// One open store: a seekable backend plus the in-memory chunk index.
///
/// # Layout written
/// ```text
/// [HEADER: 64 bytes]
/// [CHUNK 0] [CHUNK 1] ... [CHUNK N-1]      <- independently encoded chunks
/// [CHUNK INDEX: variable-size entries]
/// [USER METADATA: base64 text]
/// ```
/// Chunks are appended in place; the index and metadata are rewritten
/// behind the data region on every flush, and the header is rewritten
/// last so a torn flush leaves the previous index reachable.
pub struct NativeStore {
    backend: Box<dyn Backend>,
    entries: Vec<ChunkEntry>,
    user_metadata_base64: String,
    /// End of the chunk data region; the index is written here on flush.
    data_end: u64,
    writable: bool,
    dirty: bool,
}

impl NativeStore {
    pub fn open(config: &StoreConfig) -> Result<Self, EngineError> {
        let opened = open_backend(&config.backend)?;
        let initial_metadata = config
            .writer_options
            .as_ref()
            .and_then(|o| o.user_metadata_base64.clone());

        let mut store = Self {
            backend: opened.backend,
            entries: Vec::new(),
            user_metadata_base64: String::new(),
            data_end: HEADER_SIZE,
            writable: opened.writable,
            dirty: false,
        };

        if opened.fresh {
            store.user_metadata_base64 = initial_metadata.unwrap_or_default();
            // Placeholder header; the real one is written on flush.
            store.backend.write_all(&[0u8; HEADER_SIZE as usize])?;
            store.dirty = true;
        } else {
            if initial_metadata.is_some() {
                return Err(EngineError::Config(
                    "initial user metadata can only be set on a newly created store".into(),
                ));
            }
            store.load_existing()?;
        }
        Ok(store)
    }

    /// Read the header, chunk index, and metadata blob of an existing store.
    fn load_existing(&mut self) -> Result<(), EngineError> {
        let mut header_buf = [0u8; HEADER_SIZE as usize];
        self.backend.seek(SeekFrom::Start(0))?;
        self.backend.read_exact(&mut header_buf)?;
        let header = FileHeader::from_bytes(&header_buf)?;

        self.backend.seek(SeekFrom::Start(header.index_offset))?;
        self.entries = Vec::with_capacity(header.chunk_count as usize);
        for _ in 0..header.chunk_count {
            self.entries.push(ChunkEntry::read_from(&mut self.backend)?);
        }

        if header.meta_len > 0 {
            self.backend.seek(SeekFrom::Start(header.meta_offset))?;
            let mut meta = vec![0u8; header.meta_len as usize];
            self.backend.read_exact(&mut meta)?;
            self.user_metadata_base64 = String::from_utf8(meta).map_err(|_| {
                EngineError::OperationFailed("user metadata blob is not valid UTF-8".into())
            })?;
        }

        // New chunks overwrite the old index region and push it further out.
        self.data_end = header.index_offset;
        Ok(())
    }

    /// Dispatch one protocol operation.
    pub fn execute(
        &mut self,
        request: &OpRequest,
        input: Option<&[u8]>,
        output: Option<&mut [u8]>,
    ) -> Result<serde_json::Value, EngineError> {
        match request {
            OpRequest::StoreChunk { data_spec, encoding } => {
                self.store_chunk(data_spec, encoding, input)
            }
            OpRequest::LoadChunks {
                selection,
                check_checksums,
            } => self.load_chunks(selection, *check_checksums, output),
            OpRequest::Inspect => self.inspect(),
            OpRequest::GetUserMetadata => to_result(&UserMetadataResult {
                user_metadata_base64: self.user_metadata_base64.clone(),
            }),
            OpRequest::SetUserMetadata {
                user_metadata_base64,
            } => {
                self.require_writable()?;
                self.user_metadata_base64 = user_metadata_base64.clone();
                self.dirty = true;
                to_result(&Ack {})
            }
            OpRequest::Flush => {
                self.flush()?;
                to_result(&Ack {})
            }
        }
    }

    fn require_writable(&self) -> Result<(), EngineError> {
        if self.writable {
            Ok(())
        } else {
            Err(EngineError::OperationFailed(
                "store is open for reading only".into(),
            ))
        }
    }

    fn store_chunk(
        &mut self,
        spec: &DataSpec,
        encoding: &EncodingSpec,
        input: Option<&[u8]>,
    ) -> Result<serde_json::Value, EngineError> {
        self.require_writable()?;
        let input = input.ok_or_else(|| {
            EngineError::InvalidArgument("StoreChunk requires an input payload".into())
        })?;
        let expected: usize = spec.shape.iter().product::<usize>() * spec.dtype.size_bytes();
        if input.len() != expected {
            return Err(EngineError::InvalidArgument(format!(
                "payload is {} bytes but shape {:?} of {} implies {}",
                input.len(),
                spec.shape,
                spec.dtype.name(),
                expected
            )));
        }

        // Only two encoding families exist on disk: RAW passthrough and
        // zstd. Every non-RAW codec tag selects zstd; the tag itself is
        // preserved in the index for the client to see.
        let encoded = match encoding.codec {
            Codec::Raw => input.to_vec(),
            _ => zstd::bulk::compress(
                input,
                encoding.zstd_level.unwrap_or(DEFAULT_ZSTD_LEVEL),
            )?,
        };
        let checksum = xxh3_64(&encoded);

        self.backend.seek(SeekFrom::Start(self.data_end))?;
        self.backend.write_all(&encoded)?;

        let entry = ChunkEntry {
            offset: self.data_end,
            encoded_len: encoded.len() as u64,
            decoded_len: input.len() as u64,
            checksum,
            codec: encoding.codec.id(),
            dtype: dtype_code(spec.dtype),
            shape: spec.shape.iter().map(|&d| d as u64).collect(),
        };
        self.data_end += entry.encoded_len;
        let chunk_index = self.entries.len() as u64;
        self.entries.push(entry);
        self.dirty = true;

        let original_size = input.len() as u64;
        let compressed_size = encoded.len() as u64;
        to_result(&StoreChunkResult {
            details: StoreResult {
                chunk_index,
                original_size,
                compressed_size,
                compression_ratio: if original_size > 0 {
                    compressed_size as f64 / original_size as f64
                } else {
                    0.0
                },
            },
        })
    }

    fn load_chunks(
        &mut self,
        selection: &Selection,
        check_checksums: bool,
        output: Option<&mut [u8]>,
    ) -> Result<serde_json::Value, EngineError> {
        let (start, count) = match selection {
            Selection::All => (0, self.entries.len()),
            Selection::Range { start_index, count } => (*start_index, *count),
        };
        if start + count > self.entries.len() {
            return Err(EngineError::InvalidArgument(format!(
                "selection [{start}, {}) is out of range (total {})",
                start + count,
                self.entries.len()
            )));
        }
        if count == 0 {
            return to_result(&LoadChunksResult {
                final_shape: vec![0],
            });
        }

        let selected = self.entries[start..start + count].to_vec();
        let dtype = selected[0].dtype;
        if selected.iter().any(|e| e.dtype != dtype) {
            return Err(EngineError::InvalidArgument(
                "selected chunks do not share one dtype".into(),
            ));
        }

        let total_bytes: u64 = selected.iter().map(|e| e.decoded_len).sum();
        let output = output.ok_or_else(|| {
            EngineError::InvalidArgument("LoadChunks requires an output buffer".into())
        })?;
        if output.len() as u64 != total_bytes {
            return Err(EngineError::InvalidArgument(format!(
                "output buffer is {} bytes but the selection decodes to {}",
                output.len(),
                total_bytes
            )));
        }

        let mut cursor = 0usize;
        for (position, entry) in selected.iter().enumerate() {
            let mut encoded = vec![0u8; entry.encoded_len as usize];
            self.backend.seek(SeekFrom::Start(entry.offset))?;
            self.backend.read_exact(&mut encoded)?;

            if check_checksums {
                let computed = xxh3_64(&encoded);
                if computed != entry.checksum {
                    return Err(EngineError::OperationFailed(format!(
                        "chunk {} checksum mismatch: expected {:016x}, got {computed:016x}",
                        start + position,
                        entry.checksum
                    )));
                }
            }

            let slot = &mut output[cursor..cursor + entry.decoded_len as usize];
            if entry.codec == Codec::Raw.id() {
                slot.copy_from_slice(&encoded);
            } else {
                let decoded = zstd::bulk::decompress(&encoded, entry.decoded_len as usize)?;
                if decoded.len() as u64 != entry.decoded_len {
                    return Err(EngineError::OperationFailed(format!(
                        "chunk {} decoded to {} bytes but the index says {}",
                        start + position,
                        decoded.len(),
                        entry.decoded_len
                    )));
                }
                slot.copy_from_slice(&decoded);
            }
            cursor += entry.decoded_len as usize;
        }

        to_result(&LoadChunksResult {
            final_shape: final_shape(&selected, dtype)?,
        })
    }

    fn inspect(&self) -> Result<serde_json::Value, EngineError> {
        let mut summaries = Vec::with_capacity(self.entries.len());
        for (index, entry) in self.entries.iter().enumerate() {
            let dtype = dtype_from_code(entry.dtype).ok_or_else(|| {
                EngineError::OperationFailed(format!("unknown dtype code {}", entry.dtype))
            })?;
            let codec = Codec::from_id(entry.codec).ok_or_else(|| {
                EngineError::OperationFailed(format!("unknown codec id {}", entry.codec))
            })?;
            summaries.push(ChunkInfo {
                index: index as u64,
                shape: entry.shape.iter().map(|&d| d as usize).collect(),
                dtype,
                codec,
                encoded_size_bytes: entry.encoded_len,
                decoded_size_bytes: entry.decoded_len,
            });
        }
        to_result(&InspectResult {
            file_header: FileHeaderInfo {
                version: FORMAT_VERSION,
                index_block_offset: self.data_end,
                index_block_size: self.entries.iter().map(ChunkEntry::size_bytes).sum(),
                user_metadata_base64: self.user_metadata_base64.clone(),
            },
            total_chunks: self.entries.len(),
            chunk_summaries: summaries,
        })
    }

    /// Persist the chunk index, metadata blob, and header. No-op when
    /// nothing changed since the last flush.
    pub fn flush(&mut self) -> Result<(), EngineError> {
        if !self.writable || !self.dirty {
            return Ok(());
        }

        let index_offset = self.data_end;
        self.backend.seek(SeekFrom::Start(index_offset))?;
        for entry in &self.entries {
            entry.write_to(&mut self.backend)?;
        }
        let index_size: u64 = self.entries.iter().map(ChunkEntry::size_bytes).sum();

        let meta_offset = index_offset + index_size;
        self.backend.write_all(self.user_metadata_base64.as_bytes())?;

        let header = FileHeader {
            version: FORMAT_VERSION,
            chunk_count: self.entries.len() as u64,
            index_offset,
            index_size,
            meta_offset,
            meta_len: self.user_metadata_base64.len() as u64,
        };
        self.backend.seek(SeekFrom::Start(0))?;
        self.backend.write_all(&header.to_bytes())?;
        self.backend.flush()?;
        self.dirty = false;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), EngineError> {
        self.flush()
    }
}

/// Shape of the concatenation of `selected`, in index order.
///
/// When every chunk shares the same trailing dimensions the result keeps
/// them and sums the leading one; otherwise the data is reported flat.
fn final_shape(selected: &[ChunkEntry], dtype: u8) -> Result<Vec<usize>, EngineError> {
    let elem_size = dtype_from_code(dtype)
        .ok_or_else(|| EngineError::OperationFailed(format!("unknown dtype code {dtype}")))?
        .size_bytes() as u64;

    let first = &selected[0];
    let uniform = !first.shape.is_empty()
        && selected
            .iter()
            .all(|e| e.shape.len() == first.shape.len() && e.shape[1..] == first.shape[1..]);
    if uniform {
        let rows: u64 = selected.iter().map(|e| e.shape[0]).sum();
        let mut shape = Vec::with_capacity(first.shape.len());
        shape.push(rows as usize);
        shape.extend(first.shape[1..].iter().map(|&d| d as usize));
        Ok(shape)
    } else {
        let total_elements: u64 = selected.iter().map(|e| e.decoded_len / elem_size).sum();
        Ok(vec![total_elements as usize])
    }
}

fn to_result<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(value)
        .map_err(|e| EngineError::OperationFailed(format!("failed to serialize result: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdas_core::protocol::{BackendConfig, OpenMode};
    use cdas_core::types::DType;

    fn memory_store() -> NativeStore {
        NativeStore::open(&StoreConfig {
            backend: BackendConfig::Memory {
                mode: OpenMode::WriteTruncate,
            },
            writer_options: None,
        })
        .unwrap()
    }

    fn store_i64(store: &mut NativeStore, values: &[i64], codec: Codec) -> StoreResult {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let result = store
            .execute(
                &OpRequest::StoreChunk {
                    data_spec: DataSpec {
                        dtype: DType::Int64,
                        shape: vec![values.len()],
                    },
                    encoding: EncodingSpec {
                        codec,
                        zstd_level: None,
                    },
                },
                Some(&bytes),
                None,
            )
            .unwrap();
        serde_json::from_value::<StoreChunkResult>(result).unwrap().details
    }

    #[test]
    fn store_and_load_raw_chunk() {
        let mut store = memory_store();
        let details = store_i64(&mut store, &[1, 2, 3, 4], Codec::Raw);
        assert_eq!(details.chunk_index, 0);
        assert_eq!(details.original_size, 32);
        assert_eq!(details.compressed_size, 32);

        let mut out = vec![0u8; 32];
        let result = store
            .execute(
                &OpRequest::LoadChunks {
                    selection: Selection::All,
                    check_checksums: true,
                },
                None,
                Some(&mut out),
            )
            .unwrap();
        let loaded: LoadChunksResult = serde_json::from_value(result).unwrap();
        assert_eq!(loaded.final_shape, vec![4]);
        assert_eq!(&out[..8], &1i64.to_le_bytes());
    }

    #[test]
    fn non_raw_codecs_compress() {
        let mut store = memory_store();
        let values = vec![7i64; 4096];
        let details = store_i64(&mut store, &values, Codec::Temporal1dSimdI64Delta);
        assert!(details.compressed_size < details.original_size);
        assert!(details.compression_ratio < 1.0);

        let mut out = vec![0u8; values.len() * 8];
        store
            .execute(
                &OpRequest::LoadChunks {
                    selection: Selection::Range {
                        start_index: 0,
                        count: 1,
                    },
                    check_checksums: true,
                },
                None,
                Some(&mut out),
            )
            .unwrap();
        assert_eq!(&out[..8], &7i64.to_le_bytes());
        assert_eq!(&out[out.len() - 8..], &7i64.to_le_bytes());
    }

    #[test]
    fn payload_size_is_validated() {
        let mut store = memory_store();
        let err = store
            .execute(
                &OpRequest::StoreChunk {
                    data_spec: DataSpec {
                        dtype: DType::Int64,
                        shape: vec![4],
                    },
                    encoding: EncodingSpec {
                        codec: Codec::Raw,
                        zstd_level: None,
                    },
                },
                Some(&[0u8; 7]),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn selection_out_of_range_is_rejected() {
        let mut store = memory_store();
        store_i64(&mut store, &[1, 2], Codec::Raw);
        let mut out = vec![0u8; 16];
        let err = store
            .execute(
                &OpRequest::LoadChunks {
                    selection: Selection::Range {
                        start_index: 1,
                        count: 2,
                    },
                    check_checksums: false,
                },
                None,
                Some(&mut out),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn inspect_reports_codec_tags_verbatim() {
        let mut store = memory_store();
        store_i64(&mut store, &[1, 2, 3], Codec::Raw);
        store_i64(&mut store, &[4, 5, 6], Codec::Temporal1dSimdI64Xor);

        let result = store.execute(&OpRequest::Inspect, None, None).unwrap();
        let inspected: InspectResult = serde_json::from_value(result).unwrap();
        assert_eq!(inspected.total_chunks, 2);
        assert_eq!(inspected.chunk_summaries[0].codec, Codec::Raw);
        assert_eq!(
            inspected.chunk_summaries[1].codec,
            Codec::Temporal1dSimdI64Xor
        );
        assert_eq!(inspected.chunk_summaries[1].dtype, DType::Int64);
    }

    #[test]
    fn metadata_set_and_get() {
        let mut store = memory_store();
        store
            .execute(
                &OpRequest::SetUserMetadata {
                    user_metadata_base64: "e30=".into(),
                },
                None,
                None,
            )
            .unwrap();
        let result = store
            .execute(&OpRequest::GetUserMetadata, None, None)
            .unwrap();
        let meta: UserMetadataResult = serde_json::from_value(result).unwrap();
        assert_eq!(meta.user_metadata_base64, "e30=");
    }

    #[test]
    fn mixed_trailing_dims_load_flat() {
        let mut store = memory_store();
        let bytes: Vec<u8> = (0..12i64).flat_map(|v| v.to_le_bytes()).collect();
        for shape in [vec![6, 2], vec![12]] {
            store
                .execute(
                    &OpRequest::StoreChunk {
                        data_spec: DataSpec {
                            dtype: DType::Int64,
                            shape,
                        },
                        encoding: EncodingSpec {
                            codec: Codec::Raw,
                            zstd_level: None,
                        },
                    },
                    Some(&bytes),
                    None,
                )
                .unwrap();
        }
        let mut out = vec![0u8; 2 * bytes.len()];
        let result = store
            .execute(
                &OpRequest::LoadChunks {
                    selection: Selection::All,
                    check_checksums: true,
                },
                None,
                Some(&mut out),
            )
            .unwrap();
        let loaded: LoadChunksResult = serde_json::from_value(result).unwrap();
        assert_eq!(loaded.final_shape, vec![24]);
    }
}
