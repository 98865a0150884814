//! # vibecol — columnar storage for sorted (id, int64) pairs
//!
//! Format guarantees (frozen in v1):
//! - All numeric fields are little-endian; never negotiated
//! - The 64-byte file header at offset 0 is back-patched once, at finalize
//! - The first block starts at byte 64; every later block is 4096-aligned
//! - Block statistics (min/max/sum/count) are computed from original values
//!   and duplicated in the footer, so unfiltered aggregates read no blocks
//! - Signed statistics live in u64 slots via bit-pattern reinterpretation
//! - Section sizes in the block layout exactly match the bytes written
//! - The trailer at `file_size - 24` locates the footer and repeats the magic
//! - Checksum slots exist in block headers and the trailer but are zero in
//!   v1; readers treat zero as "not computed"
//! - Aggregation results are bit-identical for every worker count
//!
//! The identifier-set filters consumed and produced here are compressed
//! bitmaps from the `roaring` crate; their serialized form is treated as an
//! opaque, length-prefixed byte blob.

pub mod aggregate;
pub mod codec;
pub mod error;
pub mod format;
pub mod header;
pub mod reader;
pub mod sorter;
pub mod writer;

// Flat re-exports for the most common types.
pub use aggregate::{AggregateOptions, AggregateResult};
pub use error::{ColumnError, Result};
pub use format::{Encoding, DEFAULT_BLOCK_SIZE_TARGET, FILE_MAGIC, FORMAT_VERSION, PAGE_SIZE};
pub use header::FooterEntry;
pub use reader::ColumnReader;
pub use sorter::SortingWriter;
pub use writer::{ColumnWriter, WriterOptions};
