//! Crate-wide error type.
//!
//! Every failure is kind-tagged so callers can tell invalid input from
//! format corruption from plain I/O. [`ColumnError::BlockFull`] is flow
//! control, not failure: it reports how many items of a batch were written
//! so the sorting writer can resubmit the tail.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ColumnError>;

#[derive(Error, Debug)]
pub enum ColumnError {
    // ── Invalid input ────────────────────────────────────────────────────
    #[error("Cannot write an empty block")]
    EmptyBlock,
    #[error("Id/value length mismatch: {ids} ids vs {values} values")]
    LengthMismatch { ids: usize, values: usize },
    #[error("Ids must be strictly ascending: violation at index {index}")]
    UnsortedIds { index: usize },
    #[error("Block count {0} does not fit in 32 bits")]
    CountOverflow(usize),

    // ── Block full (retryable, never logged as an error) ─────────────────
    /// The target block size was exceeded mid-write. The first
    /// `items_written` items are on disk as a complete block; resubmit the
    /// remainder.
    #[error("Block full after {items_written} items")]
    BlockFull { items_written: usize },

    // ── Format violations ────────────────────────────────────────────────
    #[error("File too small to be a column file: {size} bytes")]
    FileTooSmall { size: u64 },
    #[error("Invalid file magic: expected {expected:#018x}, got {found:#018x}")]
    InvalidMagic { expected: u64, found: u64 },
    #[error("Invalid trailer magic: got {found:#018x}")]
    InvalidTrailerMagic { found: u64 },
    #[error("Unsupported format version {0}")]
    UnsupportedVersion(u32),
    #[error("Unknown column type {0}")]
    UnknownColumnType(u32),
    #[error("Unknown compression type {0}")]
    UnknownCompression(u32),
    #[error("Unknown encoding type {0}")]
    UnknownEncoding(u32),
    #[error("Footer size {footer_size} exceeds file layout (file size {file_size})")]
    CorruptFooter { footer_size: u64, file_size: u64 },
    #[error("Block index {index} out of range ({count} blocks)")]
    BlockIndexOutOfRange { index: usize, count: usize },
    #[error("Block {index}: sections ({id_size} + {value_size} bytes) exceed block size {block_size}")]
    SectionOutOfBounds { index: usize, id_size: u32, value_size: u32, block_size: u32 },

    // ── Encoding violations ──────────────────────────────────────────────
    #[error("Encoded {section} section is {actual} bytes, layout declared {declared}")]
    SectionSizeMismatch { section: &'static str, declared: usize, actual: usize },
    #[error("{section} section exhausted after {decoded} of {expected} values")]
    TruncatedSection { section: &'static str, decoded: usize, expected: usize },

    // ── I/O ──────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
