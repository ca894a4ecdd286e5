//! Synchronized multi-stream writing and reading.
//!
//! A [`GroupedWriter`] runs one buffer per named stream in lock-step and
//! flushes exactly one chunk per name, always in the same caller-supplied
//! name order. That fixed order is the whole synchronization contract:
//! nothing about the grouping is stored in the file. A [`GroupedReader`]
//! reverses it by partitioning the flat chunk sequence by position modulo
//! the number of names.

use std::collections::BTreeMap;

use ndarray::Slice;

use crate::array::AnyArray;
use crate::chunker::{
    estimate_ratio, sample_rows, DEFAULT_MAX_BUFFER_MULTIPLIER, DEFAULT_MIN_COMPRESSION_RATIO,
    DEFAULT_TARGET_CHUNK_BYTES,
};
use crate::error::{Error, Result};
use crate::reader::{resolve_slice, ChunkReader};
use crate::select;
use crate::types::{Codec, CodecParams, StoreResult};
use crate::writer::ChunkWriter;

/// One synchronized row group: one array per named stream.
pub type ChunkGroup = BTreeMap<String, AnyArray>;

/// Fast probe level, matching the single-stream chunker.
const PROBE_ZSTD_LEVEL: i32 = -2;

/// Tuning knobs for [`GroupedWriter`].
#[derive(Debug, Clone)]
pub struct GroupedWriterConfig {
    /// Desired total compressed size for one flush across all streams.
    pub target_chunk_bytes: usize,
    /// Per-name pinned codecs; unpinned names use the advisor.
    pub codecs: BTreeMap<String, Codec>,
    /// Per-name codec parameters.
    pub codec_params: BTreeMap<String, CodecParams>,
    pub min_compression_ratio: f64,
    pub max_buffer_multiplier: usize,
}

impl Default for GroupedWriterConfig {
    fn default() -> Self {
        Self {
            target_chunk_bytes: DEFAULT_TARGET_CHUNK_BYTES,
            codecs: BTreeMap::new(),
            codec_params: BTreeMap::new(),
            min_compression_ratio: DEFAULT_MIN_COMPRESSION_RATIO,
            max_buffer_multiplier: DEFAULT_MAX_BUFFER_MULTIPLIER,
        }
    }
}

/// Writer for time-aligned arrays (e.g. prices and volumes sampled
/// together).
///
/// All streams share one buffered-byte counter and one calibrated
/// threshold, so a flush always emits one chunk for every name. Partial
/// failure during a flush leaves the chunks written before the failing
/// name persisted; there is no rollback, and the caller should treat the
/// store as suspect after any flush error.
pub struct GroupedWriter<'w> {
    writer: &'w mut ChunkWriter,
    /// Flush order. Fixed at construction; the reader must be given the
    /// same sequence.
    names: Vec<String>,
    config: GroupedWriterConfig,
    max_buffer_bytes: usize,
    /// One fragment buffer per name, parallel to `names`.
    buffers: Vec<Vec<AnyArray>>,
    total_buffered_bytes: usize,
    threshold: usize,
    calibrated: bool,
}

impl std::fmt::Debug for GroupedWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupedWriter")
            .field("names", &self.names)
            .field("config", &self.config)
            .field("max_buffer_bytes", &self.max_buffer_bytes)
            .field("total_buffered_bytes", &self.total_buffered_bytes)
            .field("threshold", &self.threshold)
            .field("calibrated", &self.calibrated)
            .finish_non_exhaustive()
    }
}

impl<'w> GroupedWriter<'w> {
    pub fn new(
        writer: &'w mut ChunkWriter,
        names: &[&str],
        config: GroupedWriterConfig,
    ) -> Result<Self> {
        if names.is_empty() {
            return Err(Error::EmptyNames);
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(Error::DuplicateName((*name).to_string()));
            }
        }
        let max_buffer_bytes = config.target_chunk_bytes * config.max_buffer_multiplier;
        let initial =
            (config.target_chunk_bytes as f64 / config.min_compression_ratio) as usize;
        Ok(Self {
            writer,
            names: names.iter().map(|n| n.to_string()).collect(),
            buffers: vec![Vec::new(); names.len()],
            max_buffer_bytes,
            total_buffered_bytes: 0,
            threshold: initial.min(max_buffer_bytes),
            calibrated: false,
            config,
        })
    }

    /// Append one aligned group of arrays, one per name.
    ///
    /// Every append must carry exactly the configured name set, and all
    /// arrays must have the same leading-dimension row count.
    pub fn append(&mut self, group: &ChunkGroup) -> Result<()> {
        if self.writer.is_closed() {
            return Err(Error::Closed);
        }
        if group.is_empty() {
            return Ok(());
        }
        self.validate_keys(group)?;
        validate_row_counts(group)?;

        if !self.calibrated {
            self.calibrate(group)?;
        }

        for (position, name) in self.names.iter().enumerate() {
            if let Some(array) = group.get(name) {
                self.total_buffered_bytes += array.nbytes();
                self.buffers[position].push(array.clone());
            }
        }

        if self.total_buffered_bytes >= self.threshold {
            self.flush()?;
        }
        Ok(())
    }

    fn validate_keys(&self, group: &ChunkGroup) -> Result<()> {
        let missing: Vec<String> = self
            .names
            .iter()
            .filter(|name| !group.contains_key(*name))
            .cloned()
            .collect();
        let extra: Vec<String> = group
            .keys()
            .filter(|key| !self.names.contains(key))
            .cloned()
            .collect();
        if missing.is_empty() && extra.is_empty() {
            Ok(())
        } else {
            Err(Error::KeySetMismatch { missing, extra })
        }
    }

    /// One shared calibration across all streams: sample each stream,
    /// write every sample through one throwaway memory store, and derive a
    /// single threshold from the summed sizes.
    fn calibrate(&mut self, group: &ChunkGroup) -> Result<()> {
        self.calibrated = true;

        let mut probe = self.writer.open_scratch()?;
        let mut total = StoreResult {
            chunk_index: 0,
            original_size: 0,
            compressed_size: 0,
            compression_ratio: 0.0,
        };
        for (name, array) in group {
            if array.rows() == 0 {
                continue;
            }
            let sample = sample_rows(array);
            let codec = self.codec_for(name, &sample);
            let measured = probe.append_chunk(
                &sample,
                codec,
                &CodecParams {
                    zstd_level: Some(PROBE_ZSTD_LEVEL),
                },
            )?;
            total.original_size += measured.original_size;
            total.compressed_size += measured.compressed_size;
        }
        probe.close()?;

        let ratio = estimate_ratio(&total, self.config.min_compression_ratio);
        let target = (self.config.target_chunk_bytes as f64 / ratio) as usize;
        self.threshold = target.min(self.max_buffer_bytes);
        log::debug!(
            "grouped writer calibrated over {} streams: ratio={ratio:.3}, threshold={} bytes",
            self.names.len(),
            self.threshold
        );
        Ok(())
    }

    fn codec_for(&self, name: &str, data: &AnyArray) -> Codec {
        match self.config.codecs.get(name) {
            Some(codec) => *codec,
            None => select::recommend(data.rank(), data.dtype()),
        }
    }

    /// Write one concatenated chunk per name, in the fixed name order.
    pub fn flush(&mut self) -> Result<()> {
        if self.total_buffered_bytes == 0 {
            return Ok(());
        }
        let outcome = self.flush_buffers();
        // Recompute rather than zero: a partial failure leaves later
        // names' buffers intact for the caller to inspect.
        self.total_buffered_bytes = self
            .buffers
            .iter()
            .flatten()
            .map(AnyArray::nbytes)
            .sum();
        outcome
    }

    fn flush_buffers(&mut self) -> Result<()> {
        for (position, name) in self.names.iter().enumerate() {
            if self.buffers[position].is_empty() {
                continue;
            }
            let full = AnyArray::concat(&self.buffers[position])?;
            let codec = match self.config.codecs.get(name) {
                Some(codec) => *codec,
                None => select::recommend(full.rank(), full.dtype()),
            };
            let params = self
                .config
                .codec_params
                .get(name)
                .cloned()
                .unwrap_or_default();
            self.writer.append_chunk(&full, codec, &params)?;
            self.buffers[position].clear();
        }
        Ok(())
    }

    /// Bytes currently buffered across all streams.
    #[inline]
    pub fn buffered_bytes(&self) -> usize {
        self.total_buffered_bytes
    }

    /// Flush the trailing partial group and consume the writer.
    pub fn finish(mut self) -> Result<()> {
        self.flush()?;
        Ok(())
    }
}

impl Drop for GroupedWriter<'_> {
    fn drop(&mut self) {
        if self.total_buffered_bytes > 0 {
            log::warn!(
                "grouped writer dropped with {} unflushed bytes; call finish() to persist them",
                self.total_buffered_bytes
            );
        }
    }
}

fn validate_row_counts(group: &ChunkGroup) -> Result<()> {
    let mut rows = None;
    for array in group.values() {
        match rows {
            None => rows = Some(array.rows()),
            Some(expected) if expected != array.rows() => {
                return Err(Error::RowCountMismatch)
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Reader counterpart of [`GroupedWriter`].
///
/// Reconstructs row groups from the flat chunk sequence purely by
/// position: chunk `i` belongs to `names[i % names.len()]`. The name
/// order must match the order used when writing.
pub struct GroupedReader<'r> {
    reader: &'r mut ChunkReader,
    names: Vec<String>,
    /// Physical chunk indices per name, parallel to `names`.
    partitions: Vec<Vec<u64>>,
    num_groups: usize,
}

impl std::fmt::Debug for GroupedReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupedReader")
            .field("names", &self.names)
            .field("partitions", &self.partitions)
            .field("num_groups", &self.num_groups)
            .finish_non_exhaustive()
    }
}

impl<'r> GroupedReader<'r> {
    /// Partition the store's chunk list and validate its alignment.
    pub fn new(reader: &'r mut ChunkReader, names: &[&str]) -> Result<Self> {
        if names.is_empty() {
            return Err(Error::EmptyNames);
        }
        let chunks = reader.chunks()?;
        let total = chunks.len();
        if total % names.len() != 0 {
            return Err(Error::GroupAlignment {
                total,
                names: names.len(),
            });
        }

        let mut partitions: Vec<Vec<u64>> = vec![Vec::new(); names.len()];
        for (position, chunk) in chunks.iter().enumerate() {
            partitions[position % names.len()].push(chunk.index);
        }

        let num_groups = partitions[0].len();
        for (position, indices) in partitions.iter().enumerate().skip(1) {
            if indices.len() != num_groups {
                return Err(Error::GroupCountMismatch {
                    first: names[0].to_string(),
                    expected: num_groups,
                    name: names[position].to_string(),
                    found: indices.len(),
                });
            }
        }

        Ok(Self {
            reader,
            names: names.iter().map(|n| n.to_string()).collect(),
            partitions,
            num_groups,
        })
    }

    /// Number of synchronized row groups in the store.
    #[inline]
    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    /// Read one row group. Negative indices count from the end.
    pub fn group(&mut self, index: isize) -> Result<ChunkGroup> {
        let resolved = if index < 0 {
            index + self.num_groups as isize
        } else {
            index
        };
        if resolved < 0 || resolved as usize >= self.num_groups {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.num_groups,
            });
        }
        let mut group = ChunkGroup::new();
        for (position, name) in self.names.iter().enumerate() {
            let physical = self.partitions[position][resolved as usize];
            let array = self.reader.item(physical as isize)?;
            group.insert(name.clone(), array);
        }
        Ok(group)
    }

    /// Materialize a run of row groups.
    ///
    /// The returned sequence is independent of any reader cursor;
    /// iterating it twice yields the same groups both times.
    pub fn read_groups(&mut self, slice: Slice) -> Result<Vec<ChunkGroup>> {
        let (start, stop) = resolve_slice(slice, self.num_groups)?;
        let mut groups = Vec::with_capacity(stop - start);
        for index in start..stop {
            groups.push(self.group(index as isize)?);
        }
        Ok(groups)
    }

    /// Close the underlying reader.
    pub fn close(&mut self) {
        self.reader.close();
    }
}
