//! On-disk records: file header, block header, block layout, footer entry,
//! trailer.
//!
//! # File header (64 bytes at offset 0)
//!
//! ```text
//! Offset  Size  Field
//!    0      8   magic              = FILE_MAGIC (LE u64)
//!    8      4   version            = 1
//!   12      4   column_type        = 0 (int64)
//!   16      8   block_count        0 on creation, back-patched at finalize
//!   24      4   block_size_target  default 16384
//!   28      4   compression_type   = 0
//!   32      4   encoding_type      0..7
//!   36      8   creation_time      seconds since Unix epoch
//!   44      8   bitmap_offset      0 if no bitmap; back-patched
//!   52      8   bitmap_size        0 if no bitmap; back-patched
//!   60      4   zero padding to 64
//! ```
//!
//! # Block header (64 bytes)
//!
//! ```text
//! Offset  Size  Field
//!    0      8   min_id
//!    8      8   max_id
//!   16      8   min_value      (i64 stored as its u64 bit pattern)
//!   24      8   max_value      (bit pattern)
//!   32      8   sum            (bit pattern)
//!   40      4   count
//!   44      4   encoding_type  authoritative for this block
//!   48      4   compression_type = 0
//!   52      4   uncompressed_size
//!   56      4   compressed_size  (== uncompressed while compression is 0)
//!   60      4   checksum       reserved, written 0
//! ```
//!
//! # Block layout (16 bytes, directly after the block header)
//!
//! Section offsets are relative to the start of the in-block data section
//! (i.e. `block_offset + 64 + 16`). Conventionally the id section starts at
//! 0 and the value section right after it.
//!
//! # Footer entry (56 bytes) and trailer (24 bytes)
//!
//! The footer duplicates each block's statistics and location so unfiltered
//! aggregates never touch block data. The trailer closes the file:
//! `u64 footer_size | u64 checksum (0) | u64 magic`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::{ColumnError, Result};
use crate::format::{
    i64_to_u64, u64_to_i64, ColumnType, Compression, Encoding, BLOCK_HEADER_SIZE,
    BLOCK_LAYOUT_SIZE, FILE_HEADER_SIZE, FILE_MAGIC, FORMAT_VERSION, TRAILER_SIZE,
};

// ── File header ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FileHeader {
    pub version: u32,
    pub column_type: ColumnType,
    pub block_count: u64,
    pub block_size_target: u32,
    pub compression: Compression,
    pub encoding: Encoding,
    pub creation_time: u64,
    pub bitmap_offset: u64,
    pub bitmap_size: u64,
}

impl FileHeader {
    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        buf[0..8].copy_from_slice(&FILE_MAGIC.to_le_bytes());
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf[12..16].copy_from_slice(&(self.column_type as u32).to_le_bytes());
        buf[16..24].copy_from_slice(&self.block_count.to_le_bytes());
        buf[24..28].copy_from_slice(&self.block_size_target.to_le_bytes());
        buf[28..32].copy_from_slice(&(self.compression as u32).to_le_bytes());
        buf[32..36].copy_from_slice(&(self.encoding as u32).to_le_bytes());
        buf[36..44].copy_from_slice(&self.creation_time.to_le_bytes());
        buf[44..52].copy_from_slice(&self.bitmap_offset.to_le_bytes());
        buf[52..60].copy_from_slice(&self.bitmap_size.to_le_bytes());
        // 60..64 zero padding
        buf
    }

    /// Parse and validate. Magic and version mismatches fail here so every
    /// later read can assume a well-formed header.
    pub fn parse(buf: &[u8; FILE_HEADER_SIZE]) -> Result<Self> {
        let magic = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        if magic != FILE_MAGIC {
            return Err(ColumnError::InvalidMagic { expected: FILE_MAGIC, found: magic });
        }
        let version = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(ColumnError::UnsupportedVersion(version));
        }
        let column_type_raw = u32::from_le_bytes(buf[12..16].try_into().unwrap());
        let column_type = ColumnType::from_u32(column_type_raw)
            .ok_or(ColumnError::UnknownColumnType(column_type_raw))?;
        let block_count = u64::from_le_bytes(buf[16..24].try_into().unwrap());
        let block_size_target = u32::from_le_bytes(buf[24..28].try_into().unwrap());
        let compression_raw = u32::from_le_bytes(buf[28..32].try_into().unwrap());
        let compression = Compression::from_u32(compression_raw)
            .ok_or(ColumnError::UnknownCompression(compression_raw))?;
        let encoding_raw = u32::from_le_bytes(buf[32..36].try_into().unwrap());
        let encoding =
            Encoding::from_u32(encoding_raw).ok_or(ColumnError::UnknownEncoding(encoding_raw))?;
        let creation_time = u64::from_le_bytes(buf[36..44].try_into().unwrap());
        let bitmap_offset = u64::from_le_bytes(buf[44..52].try_into().unwrap());
        let bitmap_size = u64::from_le_bytes(buf[52..60].try_into().unwrap());

        Ok(Self {
            version,
            column_type,
            block_count,
            block_size_target,
            compression,
            encoding,
            creation_time,
            bitmap_offset,
            bitmap_size,
        })
    }
}

// ── Block header ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub min_id: u64,
    pub max_id: u64,
    pub min_value: i64,
    pub max_value: i64,
    pub sum: i64,
    pub count: u32,
    pub encoding: Encoding,
    pub compression: Compression,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    // checksum is reserved: always written 0, never parsed into a field
}

impl BlockHeader {
    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut buf = [0u8; BLOCK_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.min_id.to_le_bytes());
        buf[8..16].copy_from_slice(&self.max_id.to_le_bytes());
        buf[16..24].copy_from_slice(&i64_to_u64(self.min_value).to_le_bytes());
        buf[24..32].copy_from_slice(&i64_to_u64(self.max_value).to_le_bytes());
        buf[32..40].copy_from_slice(&i64_to_u64(self.sum).to_le_bytes());
        buf[40..44].copy_from_slice(&self.count.to_le_bytes());
        buf[44..48].copy_from_slice(&(self.encoding as u32).to_le_bytes());
        buf[48..52].copy_from_slice(&(self.compression as u32).to_le_bytes());
        buf[52..56].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        buf[56..60].copy_from_slice(&self.compressed_size.to_le_bytes());
        // 60..64: reserved checksum, zero
        buf
    }

    pub fn parse(buf: &[u8; BLOCK_HEADER_SIZE]) -> Result<Self> {
        let encoding_raw = u32::from_le_bytes(buf[44..48].try_into().unwrap());
        let encoding =
            Encoding::from_u32(encoding_raw).ok_or(ColumnError::UnknownEncoding(encoding_raw))?;
        let compression_raw = u32::from_le_bytes(buf[48..52].try_into().unwrap());
        let compression = Compression::from_u32(compression_raw)
            .ok_or(ColumnError::UnknownCompression(compression_raw))?;

        Ok(Self {
            min_id: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            max_id: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            min_value: u64_to_i64(u64::from_le_bytes(buf[16..24].try_into().unwrap())),
            max_value: u64_to_i64(u64::from_le_bytes(buf[24..32].try_into().unwrap())),
            sum: u64_to_i64(u64::from_le_bytes(buf[32..40].try_into().unwrap())),
            count: u32::from_le_bytes(buf[40..44].try_into().unwrap()),
            encoding,
            compression,
            uncompressed_size: u32::from_le_bytes(buf[52..56].try_into().unwrap()),
            compressed_size: u32::from_le_bytes(buf[56..60].try_into().unwrap()),
        })
    }
}

// ── Block layout ─────────────────────────────────────────────────────────────

/// Section placement within the block's data region.
#[derive(Debug, Clone, Copy)]
pub struct BlockLayout {
    pub id_offset: u32,
    pub id_size: u32,
    pub value_offset: u32,
    pub value_size: u32,
}

impl BlockLayout {
    pub fn to_bytes(&self) -> [u8; BLOCK_LAYOUT_SIZE] {
        let mut buf = [0u8; BLOCK_LAYOUT_SIZE];
        buf[0..4].copy_from_slice(&self.id_offset.to_le_bytes());
        buf[4..8].copy_from_slice(&self.id_size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.value_offset.to_le_bytes());
        buf[12..16].copy_from_slice(&self.value_size.to_le_bytes());
        buf
    }

    pub fn parse(buf: &[u8; BLOCK_LAYOUT_SIZE]) -> Self {
        Self {
            id_offset: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            id_size: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            value_offset: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            value_size: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
        }
    }
}

// ── Footer entry ─────────────────────────────────────────────────────────────

/// One block's statistics and location, duplicated into the footer so
/// unfiltered aggregates and range skipping never read block data.
#[derive(Debug, Clone)]
pub struct FooterEntry {
    pub block_offset: u64,
    pub block_size: u32,
    pub min_id: u64,
    pub max_id: u64,
    pub min_value: i64,
    pub max_value: i64,
    pub sum: i64,
    pub count: u32,
}

impl FooterEntry {
    pub fn write_into(&self, out: &mut Vec<u8>) {
        // Infallible: Vec<u8> writes cannot fail.
        out.write_u64::<LittleEndian>(self.block_offset).unwrap();
        out.write_u32::<LittleEndian>(self.block_size).unwrap();
        out.write_u64::<LittleEndian>(self.min_id).unwrap();
        out.write_u64::<LittleEndian>(self.max_id).unwrap();
        out.write_u64::<LittleEndian>(i64_to_u64(self.min_value)).unwrap();
        out.write_u64::<LittleEndian>(i64_to_u64(self.max_value)).unwrap();
        out.write_u64::<LittleEndian>(i64_to_u64(self.sum)).unwrap();
        out.write_u32::<LittleEndian>(self.count).unwrap();
    }

    pub fn read_from(cursor: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        Ok(Self {
            block_offset: cursor.read_u64::<LittleEndian>()?,
            block_size: cursor.read_u32::<LittleEndian>()?,
            min_id: cursor.read_u64::<LittleEndian>()?,
            max_id: cursor.read_u64::<LittleEndian>()?,
            min_value: u64_to_i64(cursor.read_u64::<LittleEndian>()?),
            max_value: u64_to_i64(cursor.read_u64::<LittleEndian>()?),
            sum: u64_to_i64(cursor.read_u64::<LittleEndian>()?),
            count: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

// ── Trailer ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Trailer {
    pub footer_size: u64,
}

impl Trailer {
    pub fn to_bytes(&self) -> [u8; TRAILER_SIZE] {
        let mut buf = [0u8; TRAILER_SIZE];
        buf[0..8].copy_from_slice(&self.footer_size.to_le_bytes());
        // 8..16: reserved checksum, zero
        buf[16..24].copy_from_slice(&FILE_MAGIC.to_le_bytes());
        buf
    }

    pub fn parse(buf: &[u8; TRAILER_SIZE]) -> Result<Self> {
        let magic = u64::from_le_bytes(buf[16..24].try_into().unwrap());
        if magic != FILE_MAGIC {
            return Err(ColumnError::InvalidTrailerMagic { found: magic });
        }
        Ok(Self { footer_size: u64::from_le_bytes(buf[0..8].try_into().unwrap()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{DEFAULT_BLOCK_SIZE_TARGET, FOOTER_ENTRY_SIZE};

    #[test]
    fn file_header_roundtrip() {
        let h = FileHeader {
            version: FORMAT_VERSION,
            column_type: ColumnType::Int64,
            block_count: 17,
            block_size_target: DEFAULT_BLOCK_SIZE_TARGET,
            compression: Compression::None,
            encoding: Encoding::VarIntBoth,
            creation_time: 1_700_000_000,
            bitmap_offset: 123_456,
            bitmap_size: 789,
        };
        let parsed = FileHeader::parse(&h.to_bytes()).unwrap();
        assert_eq!(parsed.block_count, 17);
        assert_eq!(parsed.encoding, Encoding::VarIntBoth);
        assert_eq!(parsed.bitmap_offset, 123_456);
        assert_eq!(parsed.bitmap_size, 789);
        assert_eq!(parsed.creation_time, 1_700_000_000);
    }

    #[test]
    fn file_header_rejects_bad_magic() {
        let h = FileHeader {
            version: FORMAT_VERSION,
            column_type: ColumnType::Int64,
            block_count: 0,
            block_size_target: DEFAULT_BLOCK_SIZE_TARGET,
            compression: Compression::None,
            encoding: Encoding::Raw,
            creation_time: 0,
            bitmap_offset: 0,
            bitmap_size: 0,
        };
        let mut buf = h.to_bytes();
        buf[0] ^= 0xff;
        assert!(matches!(FileHeader::parse(&buf), Err(ColumnError::InvalidMagic { .. })));
        let mut buf = h.to_bytes();
        buf[8] = 99;
        assert!(matches!(FileHeader::parse(&buf), Err(ColumnError::UnsupportedVersion(99))));
    }

    #[test]
    fn block_header_preserves_negative_statistics() {
        let h = BlockHeader {
            min_id: 5,
            max_id: 500,
            min_value: i64::MIN,
            max_value: -1,
            sum: -12_345,
            count: 42,
            encoding: Encoding::DeltaBoth,
            compression: Compression::None,
            uncompressed_size: 672,
            compressed_size: 672,
        };
        let parsed = BlockHeader::parse(&h.to_bytes()).unwrap();
        assert_eq!(parsed.min_value, i64::MIN);
        assert_eq!(parsed.max_value, -1);
        assert_eq!(parsed.sum, -12_345);
        assert_eq!(parsed.count, 42);
        assert_eq!(parsed.encoding, Encoding::DeltaBoth);
    }

    #[test]
    fn footer_entry_is_56_bytes() {
        let e = FooterEntry {
            block_offset: 4096,
            block_size: 100,
            min_id: 1,
            max_id: 10,
            min_value: -5,
            max_value: 5,
            sum: 0,
            count: 10,
        };
        let mut buf = Vec::new();
        e.write_into(&mut buf);
        assert_eq!(buf.len(), FOOTER_ENTRY_SIZE);
        let mut cursor = Cursor::new(buf.as_slice());
        let parsed = FooterEntry::read_from(&mut cursor).unwrap();
        assert_eq!(parsed.block_offset, 4096);
        assert_eq!(parsed.min_value, -5);
        assert_eq!(parsed.count, 10);
    }

    #[test]
    fn trailer_roundtrip_and_magic_check() {
        let t = Trailer { footer_size: 4 + 3 * FOOTER_ENTRY_SIZE as u64 };
        let parsed = Trailer::parse(&t.to_bytes()).unwrap();
        assert_eq!(parsed.footer_size, t.footer_size);

        let mut buf = t.to_bytes();
        buf[20] ^= 0x01;
        assert!(matches!(Trailer::parse(&buf), Err(ColumnError::InvalidTrailerMagic { .. })));
    }
}
