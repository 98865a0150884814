//! Column file writer — block assembly, statistics, finalization.
//!
//! # Writer
//! [`ColumnWriter`] owns its file descriptor exclusively for its lifetime.
//! `write_block` appends one encoded block per call: statistics are computed
//! from the original (un-encoded) inputs, ids are unioned into the global
//! bitmap, sections are encoded and size-checked against the layout, the
//! block is padded so the next block starts on a 4096-byte boundary, and the
//! file is synced. `finalize` emits the bitmap blob, back-patches the file
//! header, then writes the footer and trailer.
//!
//! # Block splitting
//! When a batch would exceed the target block size, the largest fitting
//! prefix is written as a complete block and
//! `ColumnError::BlockFull { items_written }` is returned. The prefix is
//! durable; the caller resubmits the tail. This is the only mechanism that
//! splits a batch across blocks — `write_block` never loops on its own.
//!
//! # Preconditions
//! Ids must be strictly ascending within a batch. Sorting is the high-level
//! writer's job ([`crate::sorter::SortingWriter`]); re-sorting here would
//! hide caller bugs and double memory for large batches, so mis-sorted
//! input is an error.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use roaring::RoaringTreemap;

use crate::codec;
use crate::error::{ColumnError, Result};
use crate::format::{
    padding_for, ColumnType, Compression, Encoding, BLOCK_HEADER_SIZE, BLOCK_LAYOUT_SIZE,
    DEFAULT_BLOCK_SIZE_TARGET, FORMAT_VERSION, PAGE_SIZE,
};
use crate::header::{BlockHeader, BlockLayout, FileHeader, FooterEntry, Trailer};

// ── Options ──────────────────────────────────────────────────────────────────

/// Configuration for [`ColumnWriter::create`].
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub encoding: Encoding,
    /// Target on-disk size of one block, header and layout included.
    pub block_size_target: u32,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self { encoding: Encoding::Raw, block_size_target: DEFAULT_BLOCK_SIZE_TARGET }
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct ColumnWriter {
    file: File,
    header: FileHeader,
    /// One entry per written block, in write order. Becomes the footer.
    blocks: Vec<FooterEntry>,
    /// Union of every id written to any block.
    global_ids: RoaringTreemap,
    /// Current write position; all writes are sequential except the header
    /// back-patch in `finalize`.
    position: u64,
    finalized: bool,
}

impl ColumnWriter {
    /// Create `path` and write the initial header (block count 0, no bitmap
    /// location yet — both back-patched at finalize).
    pub fn create<P: AsRef<Path>>(path: P, opts: WriterOptions) -> Result<Self> {
        let mut file = File::create(path)?;
        let header = FileHeader {
            version: FORMAT_VERSION,
            column_type: ColumnType::Int64,
            block_count: 0,
            block_size_target: opts.block_size_target,
            compression: Compression::None,
            encoding: opts.encoding,
            creation_time: chrono::Utc::now().timestamp() as u64,
            bitmap_offset: 0,
            bitmap_size: 0,
        };
        let bytes = header.to_bytes();
        file.write_all(&bytes)?;
        Ok(Self {
            file,
            header,
            blocks: Vec::new(),
            global_ids: RoaringTreemap::new(),
            position: bytes.len() as u64,
            finalized: false,
        })
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn encoding(&self) -> Encoding {
        self.header.encoding
    }

    #[inline]
    pub fn block_size_target(&self) -> u32 {
        self.header.block_size_target
    }

    /// Write one block of pre-sorted pairs.
    ///
    /// On `Err(BlockFull { items_written })` the first `items_written` pairs
    /// are on disk as a complete, padded, synced block; resubmit
    /// `ids[items_written..]` / `values[items_written..]`.
    pub fn write_block(&mut self, ids: &[u64], values: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Err(ColumnError::EmptyBlock);
        }
        if ids.len() != values.len() {
            return Err(ColumnError::LengthMismatch { ids: ids.len(), values: values.len() });
        }
        if let Some(i) = (1..ids.len()).find(|&i| ids[i] <= ids[i - 1]) {
            return Err(ColumnError::UnsortedIds { index: i });
        }

        let data_budget = (self.header.block_size_target as usize)
            .saturating_sub(BLOCK_HEADER_SIZE + BLOCK_LAYOUT_SIZE)
            .max(1);
        let n = codec::fitting_prefix(self.header.encoding, ids, values, data_budget);
        if n > u32::MAX as usize {
            return Err(ColumnError::CountOverflow(n));
        }

        self.emit_block(&ids[..n], &values[..n])?;

        if n < ids.len() {
            return Err(ColumnError::BlockFull { items_written: n });
        }
        Ok(())
    }

    /// Emit one block that is already known to fit the size target.
    fn emit_block(&mut self, ids: &[u64], values: &[i64]) -> Result<()> {
        let block_start = self.position;
        let encoding = self.header.encoding;

        // Statistics come from the original values — aggregation semantics
        // never see deltas.
        let mut min_value = values[0];
        let mut max_value = values[0];
        let mut sum = 0i64;
        for &v in values {
            min_value = min_value.min(v);
            max_value = max_value.max(v);
            sum = sum.wrapping_add(v);
        }

        for &id in ids {
            self.global_ids.insert(id);
        }

        let id_bytes = codec::encode_id_section(encoding, ids);
        let value_bytes = codec::encode_value_section(encoding, values);

        // Self-check: the layout must declare exactly the bytes we produce.
        let declared_id = codec::id_section_size(encoding, ids);
        if id_bytes.len() != declared_id {
            return Err(ColumnError::SectionSizeMismatch {
                section: "id",
                declared: declared_id,
                actual: id_bytes.len(),
            });
        }
        let declared_value = codec::value_section_size(encoding, values);
        if value_bytes.len() != declared_value {
            return Err(ColumnError::SectionSizeMismatch {
                section: "value",
                declared: declared_value,
                actual: value_bytes.len(),
            });
        }

        let data_size = (id_bytes.len() + value_bytes.len()) as u32;
        let header = BlockHeader {
            min_id: ids[0],
            max_id: ids[ids.len() - 1],
            min_value,
            max_value,
            sum,
            count: ids.len() as u32,
            encoding,
            compression: Compression::None,
            uncompressed_size: data_size,
            compressed_size: data_size,
        };
        let layout = BlockLayout {
            id_offset: 0,
            id_size: id_bytes.len() as u32,
            value_offset: id_bytes.len() as u32,
            value_size: value_bytes.len() as u32,
        };

        self.file.write_all(&header.to_bytes())?;
        self.file.write_all(&layout.to_bytes())?;
        self.file.write_all(&id_bytes)?;
        self.file.write_all(&value_bytes)?;
        self.position = block_start
            + (BLOCK_HEADER_SIZE + BLOCK_LAYOUT_SIZE) as u64
            + id_bytes.len() as u64
            + value_bytes.len() as u64;

        let block_size = (self.position - block_start) as u32;
        self.blocks.push(FooterEntry {
            block_offset: block_start,
            block_size,
            min_id: header.min_id,
            max_id: header.max_id,
            min_value,
            max_value,
            sum,
            count: header.count,
        });

        // Pad so the next block starts page-aligned. The first block itself
        // is the only unaligned one — it starts right after the file header.
        let pad = padding_for(self.position, PAGE_SIZE);
        if pad > 0 {
            self.file.write_all(&vec![0u8; pad as usize])?;
            self.position += pad;
        }

        self.file.sync_data()?;
        log::debug!(
            "block {} at offset {block_start}: {} items, {block_size} bytes ({})",
            self.blocks.len() - 1,
            header.count,
            encoding.name(),
        );
        Ok(())
    }

    /// Emit the bitmap blob, back-patch the header, write footer and
    /// trailer, and fsync. A second call is a no-op.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }

        // Global id bitmap: u32 blob size, then the opaque serialization.
        // Skipped entirely when no block was ever written.
        if !self.blocks.is_empty() {
            let mut blob = Vec::with_capacity(self.global_ids.serialized_size());
            self.global_ids.serialize_into(&mut blob)?;
            self.header.bitmap_offset = self.position;
            self.header.bitmap_size = 4 + blob.len() as u64;
            let mut prefixed = Vec::with_capacity(4 + blob.len());
            prefixed.write_u32::<LittleEndian>(blob.len() as u32).unwrap();
            prefixed.extend_from_slice(&blob);
            self.file.write_all(&prefixed)?;
            self.position += prefixed.len() as u64;
        }

        // Back-patch the header with the final block count and bitmap
        // location, then return to the end for the footer.
        self.header.block_count = self.blocks.len() as u64;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.header.to_bytes())?;
        self.file.seek(SeekFrom::Start(self.position))?;

        let footer_start = self.position;
        let mut footer = Vec::with_capacity(4 + self.blocks.len() * 56);
        footer.write_u32::<LittleEndian>(self.blocks.len() as u32).unwrap();
        for entry in &self.blocks {
            entry.write_into(&mut footer);
        }
        self.file.write_all(&footer)?;
        self.position += footer.len() as u64;

        let trailer = Trailer { footer_size: self.position - footer_start };
        self.file.write_all(&trailer.to_bytes())?;
        self.position += trailer.to_bytes().len() as u64;

        self.file.sync_all()?;
        self.finalized = true;
        log::debug!(
            "finalized: {} blocks, {} distinct ids, {} bytes",
            self.blocks.len(),
            self.global_ids.len(),
            self.position,
        );
        Ok(())
    }

    /// Release the file handle. The file is only valid if `finalize` ran.
    pub fn close(self) -> Result<()> {
        drop(self.file);
        Ok(())
    }

    pub fn finalize_and_close(mut self) -> Result<()> {
        self.finalize()?;
        self.close()
    }
}
