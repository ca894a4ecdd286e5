use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use cdas_core::{AnyArray, ChunkReader, DType};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "cdas",
    about = "Chunked Dense Array Store — inspect and read append-only array files",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Skip checksum verification on reads
    #[arg(long, global = true)]
    no_verify: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print header metadata and chunk index statistics
    Inspect {
        /// Store file to inspect
        file: PathBuf,
        /// Print per-chunk details
        #[arg(long)]
        chunks: bool,
    },
    /// Print the user metadata document as JSON
    Meta {
        /// Store file
        file: PathBuf,
    },
    /// Decode a single chunk by index and print its values
    Cat {
        /// Store file
        file: PathBuf,
        /// Zero-based chunk index (negative counts from the end)
        #[arg(short, long, allow_hyphen_values = true)]
        index: isize,
        /// Maximum number of rows to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn open_reader(file: &PathBuf, verify: bool) -> anyhow::Result<ChunkReader> {
    cdas_engine::open_reader(file, verify).with_context(|| format!("opening store {:?}", file))
}

fn format_shape(shape: &[usize]) -> String {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    format!("({})", dims.join(", "))
}

/// Render one row of a decoded chunk as text.
fn format_row(data: &AnyArray, row: usize) -> anyhow::Result<String> {
    let row_elems = data.shape()[1..].iter().product::<usize>().max(1);
    let start = row * row_elems;
    let values: Vec<String> = match data.dtype() {
        DType::Float32 => slice_strings::<f32>(data, start, row_elems)?,
        DType::Float64 => slice_strings::<f64>(data, start, row_elems)?,
        DType::Int8 => slice_strings::<i8>(data, start, row_elems)?,
        DType::Int16 => slice_strings::<i16>(data, start, row_elems)?,
        DType::Int32 => slice_strings::<i32>(data, start, row_elems)?,
        DType::Int64 => slice_strings::<i64>(data, start, row_elems)?,
        DType::UInt8 => slice_strings::<u8>(data, start, row_elems)?,
        DType::UInt16 => slice_strings::<u16>(data, start, row_elems)?,
        DType::UInt32 => slice_strings::<u32>(data, start, row_elems)?,
        DType::UInt64 => slice_strings::<u64>(data, start, row_elems)?,
        // No native scalar; show the raw bytes.
        DType::Float16 => data.data()[start * 2..(start + row_elems) * 2]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect(),
    };
    Ok(values.join("  "))
}

fn slice_strings<T: cdas_core::types::Element + std::fmt::Display>(
    data: &AnyArray,
    start: usize,
    count: usize,
) -> anyhow::Result<Vec<String>> {
    let values: Vec<T> = data.to_vec()?;
    Ok(values[start..start + count]
        .iter()
        .map(|v| v.to_string())
        .collect())
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_inspect(file: PathBuf, show_chunks: bool, verify: bool) -> anyhow::Result<()> {
    let mut reader = open_reader(&file, verify)?;
    let header = reader.file_header()?;
    let chunks = reader.chunks()?;
    let file_size = std::fs::metadata(&file)?.len();

    let decoded: u64 = chunks.iter().map(|c| c.decoded_size_bytes).sum();
    let encoded: u64 = chunks.iter().map(|c| c.encoded_size_bytes).sum();
    let ratio = if encoded == 0 {
        1.0
    } else {
        decoded as f64 / encoded as f64
    };

    println!("=== CDAS Store: {:?} ===", file);
    println!();
    println!("  format version : {}", header.version);
    println!("  chunks         : {}", chunks.len());
    println!("  decoded size   : {}", human_bytes(decoded));
    println!("  encoded size   : {}", human_bytes(encoded));
    println!("  file on disk   : {}", human_bytes(file_size));
    println!("  ratio          : {:.2}x", ratio);
    println!("  index offset   : {}", header.index_block_offset);
    println!("  index size     : {}", human_bytes(header.index_block_size));
    println!(
        "  user metadata  : {}",
        if header.user_metadata_base64.is_empty() {
            "none".to_string()
        } else {
            human_bytes(header.user_metadata_base64.len() as u64)
        }
    );

    if show_chunks {
        println!();
        println!(
            "  {:>6}  {:>8}  {:>14}  {:>12}  {:>12}  {}",
            "chunk", "dtype", "shape", "encoded", "decoded", "codec"
        );
        println!("  {}", "-".repeat(76));
        for c in &chunks {
            println!(
                "  {:>6}  {:>8}  {:>14}  {:>12}  {:>12}  {}",
                c.index,
                c.dtype.name(),
                format_shape(&c.shape),
                human_bytes(c.encoded_size_bytes),
                human_bytes(c.decoded_size_bytes),
                c.codec.name()
            );
        }
    }

    Ok(())
}

fn run_meta(file: PathBuf, verify: bool) -> anyhow::Result<()> {
    let mut reader = open_reader(&file, verify)?;
    let meta = reader.user_metadata()?;
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}

fn run_cat(file: PathBuf, index: isize, limit: usize, verify: bool) -> anyhow::Result<()> {
    let mut reader = open_reader(&file, verify)?;
    let data = reader
        .item(index)
        .with_context(|| format!("reading chunk {}", index))?;

    eprintln!(
        "chunk {}: dtype={} shape={}",
        index,
        data.dtype().name(),
        format_shape(data.shape())
    );
    let rows = data.rows().min(limit);
    for row in 0..rows {
        println!("{}", format_row(&data, row)?);
    }
    if data.rows() > rows {
        eprintln!("... ({} rows remaining not shown)", data.rows() - rows);
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let verify = !cli.no_verify;
    match cli.command {
        Commands::Inspect { file, chunks } => run_inspect(file, chunks, verify),
        Commands::Meta { file } => run_meta(file, verify),
        Commands::Cat { file, index, limit } => run_cat(file, index, limit, verify),
    }
}
