//! Adaptive buffered auto-chunking for a single logical array stream.
//!
//! The chunker accumulates appended fragments and emits one concatenated
//! chunk whenever the buffer reaches an estimated uncompressed threshold.
//! The threshold targets a *compressed* chunk size: a one-time calibration
//! probe writes a small leading sample through a throwaway memory store,
//! measures the achieved compression ratio, and sizes the buffer as
//! `target_chunk_bytes / ratio`, capped by a buffer multiplier.

use crate::array::AnyArray;
use crate::error::{Error, Result};
use crate::select;
use crate::types::{Codec, CodecParams, StoreResult};
use crate::writer::ChunkWriter;

/// Desired compressed size of one emitted chunk.
pub const DEFAULT_TARGET_CHUNK_BYTES: usize = 4 * 1024 * 1024;
/// Most optimistic compression ratio assumed when sizing buffers.
pub const DEFAULT_MIN_COMPRESSION_RATIO: f64 = 0.1;
/// Cap on the uncompressed buffer, as a multiple of the target.
pub const DEFAULT_MAX_BUFFER_MULTIPLIER: usize = 10;

/// Uncompressed bytes sampled by the calibration probe.
const SAMPLE_TARGET_BYTES: usize = 512 * 1024;
/// Fast zstd level used for probe writes; accuracy there matters less
/// than not stalling the first append.
const PROBE_ZSTD_LEVEL: i32 = -2;

/// Tuning knobs for [`BufferedAutoChunker`].
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub target_chunk_bytes: usize,
    /// Pinned codec; `None` lets the advisor pick on the first append.
    pub codec: Option<Codec>,
    pub codec_params: CodecParams,
    pub min_compression_ratio: f64,
    pub max_buffer_multiplier: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_chunk_bytes: DEFAULT_TARGET_CHUNK_BYTES,
            codec: None,
            codec_params: CodecParams::default(),
            min_compression_ratio: DEFAULT_MIN_COMPRESSION_RATIO,
            max_buffer_multiplier: DEFAULT_MAX_BUFFER_MULTIPLIER,
        }
    }
}

/// Buffers one array stream and writes size-managed chunks through a
/// [`ChunkWriter`].
///
/// Call [`finish`](Self::finish) when done: it flushes the trailing
/// partial chunk. Dropping the chunker with unflushed data logs a warning
/// instead of doing I/O, so an error unwinding past the chunker is never
/// masked by a failing flush.
pub struct BufferedAutoChunker<'w> {
    writer: &'w mut ChunkWriter,
    codec: Option<Codec>,
    codec_params: CodecParams,
    target_chunk_bytes: usize,
    min_compression_ratio: f64,
    max_buffer_bytes: usize,
    buffer: Vec<AnyArray>,
    buffered_bytes: usize,
    /// Estimated uncompressed bytes per emitted chunk. Set once by
    /// calibration and fixed thereafter.
    threshold: usize,
    calibrated: bool,
}

impl<'w> BufferedAutoChunker<'w> {
    pub fn new(writer: &'w mut ChunkWriter, config: ChunkerConfig) -> Self {
        let max_buffer_bytes = config.target_chunk_bytes * config.max_buffer_multiplier;
        // Optimistic pre-calibration estimate; replaced by the probe.
        let initial =
            (config.target_chunk_bytes as f64 / config.min_compression_ratio) as usize;
        Self {
            writer,
            codec: config.codec,
            codec_params: config.codec_params,
            target_chunk_bytes: config.target_chunk_bytes,
            min_compression_ratio: config.min_compression_ratio,
            max_buffer_bytes,
            buffer: Vec::new(),
            buffered_bytes: 0,
            threshold: initial.min(max_buffer_bytes),
            calibrated: false,
        }
    }

    /// Append one fragment, flushing a chunk when the buffer fills up.
    pub fn append(&mut self, data: AnyArray) -> Result<()> {
        if self.writer.is_closed() {
            return Err(Error::Closed);
        }
        if self.buffer.is_empty() && self.codec.is_none() {
            self.codec = Some(select::recommend(data.rank(), data.dtype()));
        }
        if !self.calibrated {
            self.calibrate(&data)?;
        }
        self.buffered_bytes += data.nbytes();
        self.buffer.push(data);
        if self.buffered_bytes >= self.threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Estimate the achievable compression ratio from a leading sample.
    ///
    /// The sample is written through a throwaway memory store so the probe
    /// chunk never lands in the real store; the scratch handle is closed
    /// as soon as the sizes are known.
    fn calibrate(&mut self, data: &AnyArray) -> Result<()> {
        if data.rows() == 0 {
            // Nothing to measure yet; try again on the next append.
            return Ok(());
        }
        self.calibrated = true;

        let sample = sample_rows(data);
        let codec = match self.codec {
            Some(codec) => codec,
            None => select::recommend(sample.rank(), sample.dtype()),
        };
        let mut probe = self.writer.open_scratch()?;
        let measured = probe.append_chunk(
            &sample,
            codec,
            &CodecParams {
                zstd_level: Some(PROBE_ZSTD_LEVEL),
            },
        )?;
        probe.close()?;

        let ratio = estimate_ratio(&measured, self.min_compression_ratio);
        let target = (self.target_chunk_bytes as f64 / ratio) as usize;
        self.threshold = target.min(self.max_buffer_bytes);
        log::debug!(
            "auto-chunker calibrated: ratio={ratio:.3}, threshold={} bytes",
            self.threshold
        );
        Ok(())
    }

    /// Concatenate the buffered fragments, in arrival order, into one
    /// chunk and write it. Returns `None` when the buffer is empty.
    ///
    /// On failure the buffer is left intact so no data is silently lost.
    pub fn flush(&mut self) -> Result<Option<StoreResult>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let full = AnyArray::concat(&self.buffer)?;
        let codec = match self.codec {
            Some(codec) => codec,
            None => select::recommend(full.rank(), full.dtype()),
        };
        let result = self.writer.append_chunk(&full, codec, &self.codec_params)?;
        self.buffer.clear();
        self.buffered_bytes = 0;
        Ok(Some(result))
    }

    /// Bytes currently buffered but not yet written.
    #[inline]
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    /// Flush the trailing partial chunk and consume the chunker.
    pub fn finish(mut self) -> Result<()> {
        self.flush()?;
        Ok(())
    }
}

impl Drop for BufferedAutoChunker<'_> {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            log::warn!(
                "auto-chunker dropped with {} unflushed bytes; call finish() to persist them",
                self.buffered_bytes
            );
        }
    }
}

/// Leading-row sample of roughly [`SAMPLE_TARGET_BYTES`] uncompressed.
pub(crate) fn sample_rows(data: &AnyArray) -> AnyArray {
    let row_bytes = data.row_bytes();
    let rows = if row_bytes == 0 {
        data.rows()
    } else {
        (SAMPLE_TARGET_BYTES / row_bytes).max(1)
    };
    data.head(rows)
}

/// `compressed / original` floored at `min_ratio`; an empty sample is
/// assumed to compress 2:1.
pub(crate) fn estimate_ratio(measured: &StoreResult, min_ratio: f64) -> f64 {
    if measured.original_size > 0 {
        (measured.compressed_size as f64 / measured.original_size as f64).max(min_ratio)
    } else {
        0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DType;

    #[test]
    fn sample_is_roughly_512k_of_rows() {
        // 1 KiB rows: expect 512 rows sampled.
        let data = AnyArray::from_raw_parts(
            DType::UInt8,
            vec![2048, 1024],
            vec![0u8; 2048 * 1024],
        )
        .unwrap();
        let sample = sample_rows(&data);
        assert_eq!(sample.rows(), 512);

        // Rows wider than the sample budget still sample one row.
        let wide = AnyArray::from_raw_parts(
            DType::UInt8,
            vec![4, 1024 * 1024],
            vec![0u8; 4 * 1024 * 1024],
        )
        .unwrap();
        assert_eq!(sample_rows(&wide).rows(), 1);
    }

    #[test]
    fn ratio_estimate_is_floored_and_defaulted() {
        let measured = StoreResult {
            chunk_index: 0,
            original_size: 1000,
            compressed_size: 10,
            compression_ratio: 0.01,
        };
        assert_eq!(estimate_ratio(&measured, 0.1), 0.1);

        let incompressible = StoreResult {
            compressed_size: 990,
            ..measured.clone()
        };
        assert!((estimate_ratio(&incompressible, 0.1) - 0.99).abs() < 1e-9);

        let empty = StoreResult {
            original_size: 0,
            ..measured
        };
        assert_eq!(estimate_ratio(&empty, 0.1), 0.5);
    }
}
