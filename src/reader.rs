//! Column file reader — open-time validation, positional block reads.
//!
//! # Open
//! `open` validates everything it can up front: file size, header magic and
//! version, trailer magic, footer geometry. The footer (u32 count plus all
//! 56-byte entries) is fetched in a single positional read and materialized
//! as the block index. After a successful open, `get_pairs` and `aggregate`
//! assume the index is consistent.
//!
//! # Concurrency
//! The reader owns a read-only handle and never mutates shared state after
//! open (the lazily-loaded global bitmap is set through a `OnceLock`).
//! Positional reads don't touch a shared seek offset, so any number of
//! threads may call block reads on one `ColumnReader` concurrently — the
//! parallel aggregator relies on exactly this.

use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::sync::OnceLock;

use byteorder::{LittleEndian, ReadBytesExt};
use roaring::RoaringTreemap;

use crate::codec;
use crate::error::{ColumnError, Result};
use crate::format::{
    Encoding, BLOCK_HEADER_SIZE, BLOCK_LAYOUT_SIZE, FILE_HEADER_SIZE, FOOTER_ENTRY_SIZE,
    TRAILER_SIZE,
};
use crate::header::{BlockHeader, BlockLayout, FileHeader, FooterEntry, Trailer};

// ── Positional reads ─────────────────────────────────────────────────────────

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut pos = 0usize;
    while pos < buf.len() {
        let n = file.seek_read(&mut buf[pos..], offset + pos as u64)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "failed to fill whole buffer",
            ));
        }
        pos += n;
    }
    Ok(())
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct ColumnReader {
    file: File,
    file_size: u64,
    header: FileHeader,
    footer: Vec<FooterEntry>,
    /// Lazily deserialized on first access, then shared read-only.
    bitmap: OnceLock<RoaringTreemap>,
}

impl ColumnReader {
    /// Open and validate a column file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < (FILE_HEADER_SIZE + TRAILER_SIZE) as u64 {
            return Err(ColumnError::FileTooSmall { size: file_size });
        }

        let mut header_buf = [0u8; FILE_HEADER_SIZE];
        read_exact_at(&file, &mut header_buf, 0)?;
        let header = FileHeader::parse(&header_buf)?;

        let mut trailer_buf = [0u8; TRAILER_SIZE];
        read_exact_at(&file, &mut trailer_buf, file_size - TRAILER_SIZE as u64)?;
        let trailer = Trailer::parse(&trailer_buf)?;

        // The footer must sit entirely between the header and the trailer.
        let footer_size = trailer.footer_size;
        if footer_size < 4
            || footer_size + (FILE_HEADER_SIZE + TRAILER_SIZE) as u64 > file_size
        {
            return Err(ColumnError::CorruptFooter { footer_size, file_size });
        }
        let footer_start = file_size - TRAILER_SIZE as u64 - footer_size;

        // One positional read covers the count and every entry.
        let mut footer_buf = vec![0u8; footer_size as usize];
        read_exact_at(&file, &mut footer_buf, footer_start)?;
        let mut cursor = Cursor::new(footer_buf.as_slice());
        let block_count = cursor.read_u32::<LittleEndian>()? as u64;
        if footer_size != 4 + block_count * FOOTER_ENTRY_SIZE as u64 {
            return Err(ColumnError::CorruptFooter { footer_size, file_size });
        }
        let mut footer = Vec::with_capacity(block_count as usize);
        for _ in 0..block_count {
            footer.push(FooterEntry::read_from(&mut cursor)?);
        }

        Ok(Self { file, file_size, header, footer, bitmap: OnceLock::new() })
    }

    // ── Header accessors ─────────────────────────────────────────────────

    #[inline]
    pub fn block_count(&self) -> usize {
        self.footer.len()
    }

    #[inline]
    pub fn version(&self) -> u32 {
        self.header.version
    }

    #[inline]
    pub fn encoding(&self) -> Encoding {
        self.header.encoding
    }

    #[inline]
    pub fn is_varint_encoded(&self) -> bool {
        self.header.encoding.is_varint()
    }

    #[inline]
    pub fn creation_time(&self) -> u64 {
        self.header.creation_time
    }

    #[inline]
    pub fn block_size_target(&self) -> u32 {
        self.header.block_size_target
    }

    #[inline]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// `(offset, size)` of the bitmap region; `(0, 0)` when absent.
    #[inline]
    pub fn bitmap_location(&self) -> (u64, u64) {
        (self.header.bitmap_offset, self.header.bitmap_size)
    }

    /// The materialized block index, in block order.
    #[inline]
    pub fn footer(&self) -> &[FooterEntry] {
        &self.footer
    }

    // ── Block reads ──────────────────────────────────────────────────────

    /// Decode block `index` and return its pairs plus the encoding the
    /// block header declared (which overrides the file-level mode).
    pub fn read_block(&self, index: usize) -> Result<(Vec<u64>, Vec<i64>, Encoding)> {
        let entry = self
            .footer
            .get(index)
            .ok_or(ColumnError::BlockIndexOutOfRange { index, count: self.footer.len() })?;

        // Block header and layout in one fetch.
        let mut head_buf = [0u8; BLOCK_HEADER_SIZE + BLOCK_LAYOUT_SIZE];
        read_exact_at(&self.file, &mut head_buf, entry.block_offset)?;
        let header = BlockHeader::parse(head_buf[..BLOCK_HEADER_SIZE].try_into().unwrap())?;
        let layout = BlockLayout::parse(head_buf[BLOCK_HEADER_SIZE..].try_into().unwrap());

        let data_used = (BLOCK_HEADER_SIZE + BLOCK_LAYOUT_SIZE) as u64
            + layout.id_size as u64
            + layout.value_size as u64;
        if data_used > entry.block_size as u64 {
            return Err(ColumnError::SectionOutOfBounds {
                index,
                id_size: layout.id_size,
                value_size: layout.value_size,
                block_size: entry.block_size,
            });
        }

        let data_start = entry.block_offset + (BLOCK_HEADER_SIZE + BLOCK_LAYOUT_SIZE) as u64;
        let mut id_bytes = vec![0u8; layout.id_size as usize];
        read_exact_at(&self.file, &mut id_bytes, data_start + layout.id_offset as u64)?;
        let mut value_bytes = vec![0u8; layout.value_size as usize];
        read_exact_at(&self.file, &mut value_bytes, data_start + layout.value_offset as u64)?;

        let (ids, values) =
            codec::decode_block_data(&id_bytes, &value_bytes, header.count as usize, header.encoding)?;
        Ok((ids, values, header.encoding))
    }

    /// Decode block `index` and return exactly the pairs that survive the
    /// allow/deny bitmaps: present in `filter` (or all, when absent) and
    /// not present in `deny`.
    pub fn read_block_filtered(
        &self,
        index: usize,
        filter: Option<&RoaringTreemap>,
        deny: Option<&RoaringTreemap>,
    ) -> Result<(Vec<u64>, Vec<i64>)> {
        let (ids, values, _) = self.read_block(index)?;
        let mut out_ids = Vec::new();
        let mut out_values = Vec::new();
        for (id, v) in ids.into_iter().zip(values) {
            if filter.map_or(true, |f| f.contains(id)) && deny.map_or(true, |d| !d.contains(id)) {
                out_ids.push(id);
                out_values.push(v);
            }
        }
        Ok((out_ids, out_values))
    }

    /// Pairs of block `index`, in the order the writer received them.
    pub fn get_pairs(&self, index: usize) -> Result<(Vec<u64>, Vec<i64>)> {
        let (ids, values, _) = self.read_block(index)?;
        Ok((ids, values))
    }

    // ── Global id bitmap ─────────────────────────────────────────────────

    /// The union of every id in the file, deserialized on first call and
    /// cached. Files written without blocks yield an empty bitmap.
    pub fn get_global_id_bitmap(&self) -> Result<&RoaringTreemap> {
        if self.bitmap.get().is_none() {
            let loaded = self.load_bitmap()?;
            // A racing thread may have set it first; either copy is
            // identical, so the loser is simply dropped.
            let _ = self.bitmap.set(loaded);
        }
        Ok(self.bitmap.get().unwrap())
    }

    fn load_bitmap(&self) -> Result<RoaringTreemap> {
        if self.header.bitmap_offset == 0 {
            return Ok(RoaringTreemap::new());
        }
        let mut size_buf = [0u8; 4];
        read_exact_at(&self.file, &mut size_buf, self.header.bitmap_offset)?;
        let blob_size = u32::from_le_bytes(size_buf) as usize;
        let mut blob = vec![0u8; blob_size];
        read_exact_at(&self.file, &mut blob, self.header.bitmap_offset + 4)?;
        Ok(RoaringTreemap::deserialize_from(blob.as_slice())?)
    }

    /// Release the file handle.
    pub fn close(self) -> Result<()> {
        drop(self.file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{ColumnWriter, WriterOptions};
    use std::io::Write;
    use tempfile::tempdir;

    fn write_small_file(path: &std::path::Path) {
        let mut w = ColumnWriter::create(path, WriterOptions::default()).unwrap();
        w.write_block(&[1, 2, 3], &[10, -20, 30]).unwrap();
        w.finalize_and_close().unwrap();
    }

    #[test]
    fn open_rejects_tiny_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiny.vcol");
        std::fs::File::create(&path).unwrap().write_all(&[0u8; 32]).unwrap();
        assert!(matches!(ColumnReader::open(&path), Err(ColumnError::FileTooSmall { size: 32 })));
    }

    #[test]
    fn open_rejects_corrupted_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("magic.vcol");
        write_small_file(&path);

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(ColumnReader::open(&path), Err(ColumnError::InvalidMagic { .. })));
    }

    #[test]
    fn open_rejects_corrupted_trailer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trailer.vcol");
        write_small_file(&path);

        let mut bytes = std::fs::read(&path).unwrap();
        let n = bytes.len();
        bytes[n - 1] ^= 0xff; // high byte of the trailer magic
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(ColumnReader::open(&path), Err(ColumnError::InvalidTrailerMagic { .. })));
    }

    #[test]
    fn open_rejects_oversized_footer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("footer.vcol");
        write_small_file(&path);

        let mut bytes = std::fs::read(&path).unwrap();
        let n = bytes.len();
        // footer_size is the first trailer field; make it larger than the file.
        bytes[n - 24..n - 16].copy_from_slice(&(1u64 << 40).to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(ColumnReader::open(&path), Err(ColumnError::CorruptFooter { .. })));
    }

    #[test]
    fn block_index_out_of_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("range.vcol");
        write_small_file(&path);
        let reader = ColumnReader::open(&path).unwrap();
        assert!(matches!(
            reader.get_pairs(1),
            Err(ColumnError::BlockIndexOutOfRange { index: 1, count: 1 })
        ));
    }

    #[test]
    fn empty_file_has_empty_bitmap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("none.vcol");
        let w = ColumnWriter::create(&path, WriterOptions::default()).unwrap();
        w.finalize_and_close().unwrap();

        let reader = ColumnReader::open(&path).unwrap();
        assert_eq!(reader.block_count(), 0);
        assert_eq!(reader.get_global_id_bitmap().unwrap().len(), 0);
    }
}
