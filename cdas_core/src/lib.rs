//! Client layer for append-only chunked array stores.
//!
//! Arrays go in as chunks through a [`ChunkWriter`] and come back out
//! through a [`ChunkReader`]; all storage work happens behind the
//! [`engine::Engine`] seam, driven over a JSON operation protocol. On top
//! of the raw handles sit a [`chunker::BufferedAutoChunker`] for
//! size-managed single streams and [`grouped::GroupedWriter`] /
//! [`grouped::GroupedReader`] for synchronized multi-stream data.

pub mod array;
pub mod bridge;
pub mod chunker;
pub mod engine;
pub mod error;
pub mod grouped;
pub mod protocol;
pub mod reader;
pub mod select;
pub mod types;
pub mod writer;

pub use array::AnyArray;
pub use chunker::{BufferedAutoChunker, ChunkerConfig};
pub use error::{Error, ErrorKind, Result};
pub use grouped::{ChunkGroup, GroupedReader, GroupedWriter, GroupedWriterConfig};
pub use reader::ChunkReader;
pub use types::{ChunkInfo, Codec, CodecParams, DType, FileHeaderInfo, StoreResult};
pub use writer::ChunkWriter;
