//! Append-side store handle: one encoded chunk per append, dense
//! sequential indices, explicit flush, flush-then-close on exit.

use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;

use crate::array::AnyArray;
use crate::bridge::EngineBridge;
use crate::engine::EngineProvider;
use crate::error::{Error, Result};
use crate::protocol::{
    Ack, BackendConfig, DataSpec, EncodingSpec, OpenMode, OpRequest, StoreChunkResult,
    StoreConfig, UserMetadataResult, WriterOptions,
};
use crate::select;
use crate::types::{Codec, CodecParams, StoreResult};

/// A writable store handle.
///
/// Appends go straight to the engine, one chunk per call; use
/// [`crate::chunker::BufferedAutoChunker`] or
/// [`crate::grouped::GroupedWriter`] for size-managed chunking.
pub struct ChunkWriter {
    bridge: EngineBridge,
    provider: Arc<dyn EngineProvider>,
}

impl ChunkWriter {
    /// Create (or truncate) a file-backed store, optionally setting its
    /// initial user metadata.
    ///
    /// The metadata must be a JSON document; it travels base64-encoded.
    pub fn create(
        provider: Arc<dyn EngineProvider>,
        path: impl AsRef<Path>,
        user_metadata: Option<&serde_json::Value>,
    ) -> Result<Self> {
        let backend = BackendConfig::File {
            mode: OpenMode::WriteTruncate,
            path: path.as_ref().to_path_buf(),
        };
        Self::open_with(provider, backend, user_metadata)
    }

    /// Append to an existing file-backed store (or create an empty one).
    ///
    /// Initial metadata cannot be set in append mode; use
    /// [`ChunkWriter::set_user_metadata`] instead.
    pub fn append_to(provider: Arc<dyn EngineProvider>, path: impl AsRef<Path>) -> Result<Self> {
        let backend = BackendConfig::File {
            mode: OpenMode::WriteAppend,
            path: path.as_ref().to_path_buf(),
        };
        Self::open_with(provider, backend, None)
    }

    /// Open a volatile memory-backed store. Contents are discarded on close.
    pub fn in_memory(provider: Arc<dyn EngineProvider>) -> Result<Self> {
        let backend = BackendConfig::Memory {
            mode: OpenMode::WriteTruncate,
        };
        Self::open_with(provider, backend, None)
    }

    fn open_with(
        provider: Arc<dyn EngineProvider>,
        backend: BackendConfig,
        user_metadata: Option<&serde_json::Value>,
    ) -> Result<Self> {
        let writer_options = match user_metadata {
            Some(value) => Some(WriterOptions {
                user_metadata_base64: Some(encode_metadata(value)?),
            }),
            None => None,
        };
        let config = StoreConfig {
            backend,
            writer_options,
        };
        let bridge = EngineBridge::open(provider.as_ref(), &config)?;
        Ok(Self { bridge, provider })
    }

    /// Append one array as one chunk, selecting the codec automatically
    /// from the array's rank and dtype. Selection is re-run on every call.
    pub fn append(&mut self, data: &AnyArray, params: &CodecParams) -> Result<StoreResult> {
        let codec = select::recommend(data.rank(), data.dtype());
        self.append_chunk(data, codec, params)
    }

    /// Append one array as one chunk with an explicit codec.
    ///
    /// The array is already validated by construction: [`AnyArray`] values
    /// are always row-major and carry a supported dtype, so nothing reaches
    /// the engine that it cannot store.
    pub fn append_chunk(
        &mut self,
        data: &AnyArray,
        codec: Codec,
        params: &CodecParams,
    ) -> Result<StoreResult> {
        let request = OpRequest::StoreChunk {
            data_spec: DataSpec {
                dtype: data.dtype(),
                shape: data.shape().to_vec(),
            },
            encoding: EncodingSpec {
                codec,
                zstd_level: params.zstd_level,
            },
        };
        let result: StoreChunkResult = self.bridge.execute(&request, Some(data.data()), None)?;
        Ok(result.details)
    }

    /// The store's current user metadata document.
    pub fn user_metadata(&mut self) -> Result<serde_json::Value> {
        let result: UserMetadataResult =
            self.bridge.execute(&OpRequest::GetUserMetadata, None, None)?;
        Ok(crate::reader::decode_metadata(&result.user_metadata_base64))
    }

    /// Replace the store's user metadata with a new JSON document.
    pub fn set_user_metadata(&mut self, value: &serde_json::Value) -> Result<()> {
        let request = OpRequest::SetUserMetadata {
            user_metadata_base64: encode_metadata(value)?,
        };
        let _: Ack = self.bridge.execute(&request, None, None)?;
        Ok(())
    }

    /// Ask the engine to persist everything appended so far.
    pub fn flush(&mut self) -> Result<()> {
        let _: Ack = self.bridge.execute(&OpRequest::Flush, None, None)?;
        Ok(())
    }

    /// Flush, then release the engine handle. A second close is a no-op;
    /// any other call on a closed writer fails with a state error.
    pub fn close(&mut self) -> Result<()> {
        if self.bridge.is_closed() {
            return Ok(());
        }
        self.flush()?;
        self.bridge.close();
        Ok(())
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.bridge.is_closed()
    }

    /// Open an independent, memory-backed scratch writer on the same
    /// provider.
    ///
    /// Calibration probes run through such a writer so that their sample
    /// chunks never touch this store.
    pub fn open_scratch(&self) -> Result<ChunkWriter> {
        ChunkWriter::in_memory(self.provider.clone())
    }
}

impl Drop for ChunkWriter {
    fn drop(&mut self) {
        if !self.bridge.is_closed() {
            if let Err(e) = self.close() {
                log::warn!("error while closing dropped writer: {e}");
            }
        }
    }
}

/// Serialize a JSON document and base64-encode it for transit.
fn encode_metadata(value: &serde_json::Value) -> Result<String> {
    let json = serde_json::to_string(value)
        .map_err(|e| Error::Config(format!("user metadata must be JSON-serializable: {e}")))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_is_compact_json_base64() {
        let value = serde_json::json!({ "source": "unit", "v": 1 });
        let encoded = encode_metadata(&value).unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        let round: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(round, value);
    }
}
