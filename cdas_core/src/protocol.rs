//! Typed request/response bodies for the engine operation protocol.
//!
//! Field and tag names are the wire contract; they are serialized to JSON
//! only at the [`crate::bridge::EngineBridge`] boundary. No other component
//! builds or parses JSON for engine traffic.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{ChunkInfo, Codec, DType, FileHeaderInfo, StoreResult};

// ── Open configuration ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenMode {
    Read,
    WriteTruncate,
    WriteAppend,
}

/// Storage backend selection, consumed solely by the engine on open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BackendConfig {
    File { mode: OpenMode, path: PathBuf },
    Memory { mode: OpenMode },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_metadata_base64: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writer_options: Option<WriterOptions>,
}

// ── Operation requests ─────────────────────────────────────────────────────

/// Dtype and shape of an array payload accompanying a `StoreChunk` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSpec {
    pub dtype: DType,
    pub shape: Vec<usize>,
}

/// Codec choice plus optional codec parameters for one chunk write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingSpec {
    pub codec: Codec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zstd_level: Option<i32>,
}

/// Which chunks a `LoadChunks` operation reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Selection {
    All,
    Range { start_index: usize, count: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op_type")]
pub enum OpRequest {
    StoreChunk {
        data_spec: DataSpec,
        encoding: EncodingSpec,
    },
    LoadChunks {
        selection: Selection,
        check_checksums: bool,
    },
    Inspect,
    GetUserMetadata,
    SetUserMetadata {
        user_metadata_base64: String,
    },
    Flush,
}

// ── Operation results ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreChunkResult {
    pub details: StoreResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadChunksResult {
    /// N-dimensional shape of the concatenated data written to the output
    /// buffer.
    pub final_shape: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectResult {
    pub file_header: FileHeaderInfo,
    pub chunk_summaries: Vec<ChunkInfo>,
    pub total_chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadataResult {
    pub user_metadata_base64: String,
}

/// Empty result body for operations that only acknowledge (e.g. `Flush`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {}
