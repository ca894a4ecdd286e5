//! Read-side store handle: one lazy inspection, a cached chunk index
//! table, and range reads that concatenate chunks in write order.

use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use ndarray::Slice;

use crate::array::AnyArray;
use crate::bridge::EngineBridge;
use crate::engine::EngineProvider;
use crate::error::{Error, Result};
use crate::protocol::{
    BackendConfig, InspectResult, LoadChunksResult, OpenMode, OpRequest, Selection, StoreConfig,
};
use crate::types::{ChunkInfo, DType, FileHeaderInfo};

/// A read-only store handle.
///
/// The store is inspected once, lazily; header and chunk summaries are
/// cached for the reader's lifetime. The underlying store is append-only,
/// so the cache never goes stale for this handle.
pub struct ChunkReader {
    bridge: EngineBridge,
    check_checksums: bool,
    inspection: Option<InspectResult>,
}

impl ChunkReader {
    /// Open an existing file-backed store for reading.
    pub fn open(
        provider: Arc<dyn EngineProvider>,
        path: impl AsRef<Path>,
        check_checksums: bool,
    ) -> Result<Self> {
        let config = StoreConfig {
            backend: BackendConfig::File {
                mode: OpenMode::Read,
                path: path.as_ref().to_path_buf(),
            },
            writer_options: None,
        };
        let bridge = EngineBridge::open(provider.as_ref(), &config)?;
        Ok(Self {
            bridge,
            check_checksums,
            inspection: None,
        })
    }

    /// Run `Inspect` on first use and memoize the result.
    fn inspect_cache(&mut self) -> Result<&InspectResult> {
        if self.inspection.is_none() {
            let fetched: InspectResult = self.bridge.execute(&OpRequest::Inspect, None, None)?;
            self.inspection = Some(fetched);
        }
        // Populated just above; the ok_or only satisfies the borrow checker.
        self.inspection.as_ref().ok_or(Error::Closed)
    }

    /// Total number of chunks in the store.
    pub fn nchunks(&mut self) -> Result<usize> {
        Ok(self.inspect_cache()?.total_chunks)
    }

    /// Per-chunk summaries, in write order.
    pub fn chunks(&mut self) -> Result<Vec<ChunkInfo>> {
        Ok(self.inspect_cache()?.chunk_summaries.clone())
    }

    /// Store-level header metadata.
    pub fn file_header(&mut self) -> Result<FileHeaderInfo> {
        Ok(self.inspect_cache()?.file_header.clone())
    }

    /// The user metadata document stored in the header.
    ///
    /// Returns an empty object when no metadata is set. A blob that does
    /// not decode to JSON is surfaced raw under `"_raw_base64"` rather
    /// than dropped.
    pub fn user_metadata(&mut self) -> Result<serde_json::Value> {
        let encoded = self.file_header()?.user_metadata_base64;
        Ok(decode_metadata(&encoded))
    }

    /// Read one chunk by index. Negative indices count from the end.
    pub fn item(&mut self, index: isize) -> Result<AnyArray> {
        let len = self.nchunks()?;
        let resolved = if index < 0 { index + len as isize } else { index };
        if resolved < 0 || resolved as usize >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        let start = resolved as usize;
        self.load_range(start, start + 1)
    }

    /// Read a contiguous run of chunks and concatenate them, in write
    /// order, into one array.
    ///
    /// Open-ended and negative bounds resolve against the chunk count; a
    /// non-unit step is rejected. All selected chunks must share one dtype.
    pub fn read_slice(&mut self, slice: Slice) -> Result<AnyArray> {
        let len = self.nchunks()?;
        let (start, stop) = resolve_slice(slice, len)?;
        self.load_range(start, stop)
    }

    fn load_range(&mut self, start: usize, stop: usize) -> Result<AnyArray> {
        let selected: Vec<ChunkInfo> = {
            let cache = self.inspect_cache()?;
            cache.chunk_summaries[start..stop].to_vec()
        };
        // An empty selection never reaches the engine.
        let first = match selected.first() {
            Some(first) => first,
            None => return Ok(AnyArray::empty(DType::UInt8)),
        };
        let dtype = first.dtype;
        if selected.iter().any(|c| c.dtype != dtype) {
            return Err(Error::MixedDtypes);
        }

        // One pre-sized buffer, one engine round trip for the whole range.
        let total_elements: usize = selected.iter().map(ChunkInfo::num_elements).sum();
        let mut buffer = vec![0u8; total_elements * dtype.size_bytes()];
        let request = OpRequest::LoadChunks {
            selection: Selection::Range {
                start_index: start,
                count: stop - start,
            },
            check_checksums: self.check_checksums,
        };
        let result: LoadChunksResult = self.bridge.execute(&request, None, Some(&mut buffer))?;

        let final_shape = if result.final_shape.is_empty() {
            vec![total_elements]
        } else {
            result.final_shape
        };
        AnyArray::from_raw_parts(dtype, final_shape, buffer)
    }

    /// Release the engine handle. Safe to call more than once.
    pub fn close(&mut self) {
        self.bridge.close();
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.bridge.is_closed()
    }
}

/// Decode the stored metadata blob into a JSON document.
///
/// An unset blob decodes to an empty object; a blob that does not decode
/// to JSON is surfaced raw under `"_raw_base64"` rather than dropped.
pub(crate) fn decode_metadata(encoded: &str) -> serde_json::Value {
    if encoded.is_empty() {
        return serde_json::Value::Object(serde_json::Map::new());
    }
    let parsed = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok());
    match parsed {
        Some(value) => value,
        None => serde_json::json!({ "_raw_base64": encoded }),
    }
}

/// Resolve a possibly open-ended, possibly negative slice against `len`,
/// yielding concrete `[start, stop)` bounds. Only unit steps are supported.
pub(crate) fn resolve_slice(slice: Slice, len: usize) -> Result<(usize, usize)> {
    if slice.step != 1 {
        return Err(Error::StepNotSupported);
    }
    let clamp = |bound: isize| -> usize {
        let resolved = if bound < 0 { bound + len as isize } else { bound };
        resolved.clamp(0, len as isize) as usize
    };
    let start = clamp(slice.start);
    let stop = match slice.end {
        Some(end) => clamp(end),
        None => len,
    };
    Ok((start, stop.max(start)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_resolution_follows_python_semantics() {
        assert_eq!(resolve_slice(Slice::new(0, None, 1), 5).unwrap(), (0, 5));
        assert_eq!(resolve_slice(Slice::new(2, Some(4), 1), 5).unwrap(), (2, 4));
        assert_eq!(resolve_slice(Slice::new(-2, None, 1), 5).unwrap(), (3, 5));
        assert_eq!(resolve_slice(Slice::new(0, Some(-1), 1), 5).unwrap(), (0, 4));
        // Out-of-range bounds clamp instead of failing.
        assert_eq!(resolve_slice(Slice::new(-9, Some(99), 1), 5).unwrap(), (0, 5));
        // Inverted ranges resolve to an empty selection.
        assert_eq!(resolve_slice(Slice::new(4, Some(2), 1), 5).unwrap(), (4, 4));
    }

    #[test]
    fn non_unit_step_is_rejected() {
        let err = resolve_slice(Slice::new(0, None, 2), 5).unwrap_err();
        assert!(matches!(err, Error::StepNotSupported));
        let err = resolve_slice(Slice::new(0, None, -1), 5).unwrap_err();
        assert!(matches!(err, Error::StepNotSupported));
    }
}
