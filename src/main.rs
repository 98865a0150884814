use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::path::PathBuf;
use vibecol::{
    AggregateOptions, ColumnReader, Encoding, SortingWriter, WriterOptions,
    DEFAULT_BLOCK_SIZE_TARGET,
};

#[derive(Parser)]
#[command(name = "vibecol", version = "1.0.0", about = "Columnar (id, int64) file toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show file metadata (header, trailer, footer summary)
    Info {
        input: PathBuf,
        /// Emit machine-readable JSON instead of the table
        #[arg(long)]
        json: bool,
    },
    /// List per-block statistics from the footer index
    Blocks {
        input: PathBuf,
    },
    /// Print the decoded (id, value) pairs of one block
    Dump {
        input: PathBuf,
        /// Block index, 0-based
        #[arg(short, long, default_value = "0")]
        block: usize,
    },
    /// Aggregate the whole file: count, min, max, sum, avg
    Aggregate {
        input: PathBuf,
        /// Worker count; 0 or less uses all available cores
        #[arg(short, long, default_value = "1")]
        parallel: i32,
        /// Scan block data instead of trusting footer statistics
        #[arg(long)]
        skip_precalculated: bool,
        #[arg(long)]
        json: bool,
    },
    /// Write a synthetic file: sequential pairs (ids 1..=count, values
    /// id mod 100), or seeded-random pairs with --random
    Generate {
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, default_value = "100000")]
        count: u64,
        /// Encoding: raw, delta-id, delta-value, delta-both, varint,
        /// varint-id, varint-value, varint-both
        #[arg(short, long, default_value = "varint-both")]
        encoding: String,
        /// Target block size in bytes
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE_TARGET)]
        block_size: u32,
        /// Random-but-ascending ids with arbitrary int64 values instead of
        /// the sequential pattern
        #[arg(long)]
        random: bool,
        /// RNG seed for --random; the same seed reproduces the same file
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

#[derive(Serialize)]
struct InfoReport {
    path: String,
    file_size: u64,
    version: u32,
    encoding: &'static str,
    block_count: usize,
    block_size_target: u32,
    creation_time: u64,
    bitmap_offset: u64,
    bitmap_size: u64,
    distinct_ids: u64,
    total_count: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    match Cli::parse().command {
        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let reader = ColumnReader::open(&input)?;
            let (bitmap_offset, bitmap_size) = reader.bitmap_location();
            let report = InfoReport {
                path: input.display().to_string(),
                file_size: reader.file_size(),
                version: reader.version(),
                encoding: reader.encoding().name(),
                block_count: reader.block_count(),
                block_size_target: reader.block_size_target(),
                creation_time: reader.creation_time(),
                bitmap_offset,
                bitmap_size,
                distinct_ids: reader.get_global_id_bitmap()?.len(),
                total_count: reader.footer().iter().map(|e| e.count as u64).sum(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("── vibecol column file ──────────────────────────────────");
                println!("  Path               {}", report.path);
                println!(
                    "  File size          {} B ({:.2} MiB)",
                    report.file_size,
                    report.file_size as f64 / 1048576.0
                );
                println!("  Format version     {}", report.version);
                println!("  Encoding           {}", report.encoding);
                println!("  Blocks             {}", report.block_count);
                println!("  Block size target  {} B", report.block_size_target);
                println!("  Created (epoch s)  {}", report.creation_time);
                println!("  Bitmap offset      {} B", report.bitmap_offset);
                println!("  Bitmap size        {} B", report.bitmap_size);
                println!("  Distinct ids       {}", report.distinct_ids);
                println!("  Total pairs        {}", report.total_count);
            }
        }

        // ── Blocks ───────────────────────────────────────────────────────────
        Commands::Blocks { input } => {
            let reader = ColumnReader::open(&input)?;
            println!(
                "{:>5} {:>12} {:>8} {:>12} {:>12} {:>8} {:>16} {:>16}",
                "Block", "Offset", "Size", "MinId", "MaxId", "Count", "Min", "Max"
            );
            for (i, e) in reader.footer().iter().enumerate() {
                println!(
                    "{:>5} {:>12} {:>8} {:>12} {:>12} {:>8} {:>16} {:>16}",
                    i, e.block_offset, e.block_size, e.min_id, e.max_id, e.count, e.min_value,
                    e.max_value
                );
            }
        }

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump { input, block } => {
            let reader = ColumnReader::open(&input)?;
            let (ids, values) = reader.get_pairs(block)?;
            for (id, v) in ids.iter().zip(&values) {
                println!("{id}\t{v}");
            }
        }

        // ── Aggregate ────────────────────────────────────────────────────────
        Commands::Aggregate { input, parallel, skip_precalculated, json } => {
            let reader = ColumnReader::open(&input)?;
            let result = reader.aggregate(&AggregateOptions {
                skip_pre_calculated: skip_precalculated,
                parallel,
                ..Default::default()
            })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("  count  {}", result.count);
                println!("  min    {}", result.min);
                println!("  max    {}", result.max);
                println!("  sum    {}", result.sum);
                println!("  avg    {:.6}", result.avg);
            }
        }

        // ── Generate ─────────────────────────────────────────────────────────
        Commands::Generate { output, count, encoding, block_size, random, seed } => {
            let encoding = Encoding::from_name(&encoding)
                .ok_or_else(|| format!("unknown encoding: {encoding}"))?;
            let opts = WriterOptions { encoding, block_size_target: block_size };
            let mut writer = SortingWriter::create(&output, opts)?;
            // Batches of 10k keep memory flat on large counts.
            if random {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut next_id = 0u64;
                let mut remaining = count;
                while remaining > 0 {
                    let batch = remaining.min(10_000) as usize;
                    let mut ids = Vec::with_capacity(batch);
                    let mut values = Vec::with_capacity(batch);
                    for _ in 0..batch {
                        next_id += rng.gen_range(1..=8);
                        ids.push(next_id);
                        values.push(rng.gen::<i64>());
                    }
                    writer.write(&ids, &values)?;
                    remaining -= batch as u64;
                }
            } else {
                let mut next = 1u64;
                while next <= count {
                    let end = (next + 10_000).min(count + 1);
                    let ids: Vec<u64> = (next..end).collect();
                    let values: Vec<i64> = ids.iter().map(|id| (id % 100) as i64).collect();
                    writer.write(&ids, &values)?;
                    next = end;
                }
            }
            writer.close()?;
            let size = std::fs::metadata(&output)?.len();
            println!(
                "Created: {}  ({count} pairs, {} encoding, {size} B on disk)",
                output.display(),
                encoding.name()
            );
        }
    }
    Ok(())
}
