//! Encoders and decoders for block id/value sections.
//!
//! Two encoding families, stackable per [`Encoding`] mode:
//!
//! - **Delta**: `d[0] = v[0]`, `d[i] = v[i] - v[i-1]`. Subtraction wraps
//!   (two's complement for the signed variant), so descending and
//!   underflowing sequences round-trip bit-exactly.
//! - **Varint**: 7 data bits per byte, least-significant group first, high
//!   bit set on every byte except the last. A 64-bit value needs at most 10
//!   bytes. Signed values are zig-zag mapped first so small magnitudes of
//!   either sign stay short.
//!
//! Section sizes are computed exactly before any byte is written; the block
//! writer records them in the layout and re-checks them after encoding.
//!
//! # Malformed input
//! [`take_uvarint`] never reads past the 10-byte cap: once the shifted bit
//! position reaches 70 with the continuation bit still set it returns the
//! partial value rather than an error. Truncated input (buffer ends on a
//! continuation byte) reports zero bytes consumed; section decoders turn
//! that into `ColumnError::TruncatedSection`.

use crate::error::{ColumnError, Result};
use crate::format::{u64_to_i64, Encoding};

/// Maximum encoded length of a 64-bit unsigned varint.
pub const MAX_UVARINT_LEN: usize = 10;

// ── Delta transforms ─────────────────────────────────────────────────────────

/// In-place delta encoding over unsigned words. Wrapping subtraction; empty
/// and single-element inputs are unchanged.
pub fn delta_encode_u64(vals: &mut [u64]) {
    for i in (1..vals.len()).rev() {
        vals[i] = vals[i].wrapping_sub(vals[i - 1]);
    }
}

/// Inverse of [`delta_encode_u64`]: wrapping prefix sum.
pub fn delta_decode_u64(vals: &mut [u64]) {
    for i in 1..vals.len() {
        vals[i] = vals[i].wrapping_add(vals[i - 1]);
    }
}

/// In-place delta encoding over signed words, modular over two's complement.
pub fn delta_encode_i64(vals: &mut [i64]) {
    for i in (1..vals.len()).rev() {
        vals[i] = vals[i].wrapping_sub(vals[i - 1]);
    }
}

/// Inverse of [`delta_encode_i64`].
pub fn delta_decode_i64(vals: &mut [i64]) {
    for i in 1..vals.len() {
        vals[i] = vals[i].wrapping_add(vals[i - 1]);
    }
}

// ── Varint primitives ────────────────────────────────────────────────────────

/// Exact encoded length of `v` as an unsigned varint: 1 byte for [0, 127],
/// 2 for [128, 16383], …, 10 for values with bit 63 set.
#[inline]
pub fn uvarint_len(v: u64) -> usize {
    let bits = 64 - v.leading_zeros().min(63);
    ((bits + 6) / 7) as usize
}

/// Append the unsigned varint encoding of `v` to `out`.
pub fn put_uvarint(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

/// Decode one unsigned varint from the front of `buf`.
///
/// Returns `(value, bytes_consumed)`. `bytes_consumed == 0` means the buffer
/// ended on a continuation byte (or was empty). If the shifted bit position
/// reaches 70 with the continuation bit still set, the partial value
/// accumulated so far is returned — malformed input is bounded, not fatal.
pub fn take_uvarint(buf: &[u8]) -> (u64, usize) {
    let mut x = 0u64;
    let mut shift = 0u32;
    for (i, &b) in buf.iter().enumerate() {
        if b < 0x80 {
            return (x | (u64::from(b) << shift), i + 1);
        }
        x |= u64::from(b & 0x7f) << shift;
        shift += 7;
        if shift >= 70 {
            return (x, i + 1);
        }
    }
    (0, 0)
}

/// Map a signed value onto the unsigned varint domain:
/// `(x << 1) XOR (x >> 63)` with an arithmetic right shift.
#[inline]
pub fn zigzag_encode(v: i64) -> u64 {
    ((v as u64) << 1) ^ ((v >> 63) as u64)
}

/// Inverse of [`zigzag_encode`]: `(z >> 1) XOR -(z AND 1)`.
#[inline]
pub fn zigzag_decode(z: u64) -> i64 {
    ((z >> 1) as i64) ^ -((z & 1) as i64)
}

// ── Section encoding ─────────────────────────────────────────────────────────

/// Exact byte size of the id section for `ids` under `encoding`.
pub fn id_section_size(encoding: Encoding, ids: &[u64]) -> usize {
    if !encoding.varint_ids() {
        return ids.len() * 8;
    }
    let mut size = 0;
    let mut prev = 0u64;
    for (i, &id) in ids.iter().enumerate() {
        let word = if encoding.delta_ids() && i > 0 { id.wrapping_sub(prev) } else { id };
        size += uvarint_len(word);
        prev = id;
    }
    size
}

/// Exact byte size of the value section for `values` under `encoding`.
pub fn value_section_size(encoding: Encoding, values: &[i64]) -> usize {
    if !encoding.varint_values() {
        return values.len() * 8;
    }
    let mut size = 0;
    let mut prev = 0i64;
    for (i, &v) in values.iter().enumerate() {
        let word = if encoding.delta_values() && i > 0 { v.wrapping_sub(prev) } else { v };
        size += uvarint_len(zigzag_encode(word));
        prev = v;
    }
    size
}

/// Encode the id section. The returned buffer's length always equals
/// [`id_section_size`] for the same inputs.
pub fn encode_id_section(encoding: Encoding, ids: &[u64]) -> Vec<u8> {
    let mut work = ids.to_vec();
    if encoding.delta_ids() {
        delta_encode_u64(&mut work);
    }
    if encoding.varint_ids() {
        let mut out = Vec::with_capacity(work.len() * 2);
        for w in work {
            put_uvarint(&mut out, w);
        }
        out
    } else {
        let mut out = Vec::with_capacity(work.len() * 8);
        for w in work {
            out.extend_from_slice(&w.to_le_bytes());
        }
        out
    }
}

/// Encode the value section. Zig-zag is applied after the delta pass so
/// small positive and negative deltas both stay short.
pub fn encode_value_section(encoding: Encoding, values: &[i64]) -> Vec<u8> {
    let mut work = values.to_vec();
    if encoding.delta_values() {
        delta_encode_i64(&mut work);
    }
    if encoding.varint_values() {
        let mut out = Vec::with_capacity(work.len() * 2);
        for w in work {
            put_uvarint(&mut out, zigzag_encode(w));
        }
        out
    } else {
        let mut out = Vec::with_capacity(work.len() * 8);
        for w in work {
            out.extend_from_slice(&(w as u64).to_le_bytes());
        }
        out
    }
}

/// Largest `n ≤ ids.len()` such that the encoded sections of the first `n`
/// pairs fit within `data_budget` bytes. Always at least 1 so a single
/// oversized pair still makes progress.
///
/// Delta encoding of a prefix is the prefix of the delta encoding, so the
/// per-item widths accumulated here match what [`encode_id_section`] /
/// [`encode_value_section`] later produce for the chosen prefix.
pub fn fitting_prefix(encoding: Encoding, ids: &[u64], values: &[i64], data_budget: usize) -> usize {
    debug_assert_eq!(ids.len(), values.len());
    let mut used = 0usize;
    let mut prev_id = 0u64;
    let mut prev_value = 0i64;
    for i in 0..ids.len() {
        let id_word = if encoding.delta_ids() && i > 0 { ids[i].wrapping_sub(prev_id) } else { ids[i] };
        let value_word = if encoding.delta_values() && i > 0 {
            values[i].wrapping_sub(prev_value)
        } else {
            values[i]
        };
        let id_width = if encoding.varint_ids() { uvarint_len(id_word) } else { 8 };
        let value_width = if encoding.varint_values() {
            uvarint_len(zigzag_encode(value_word))
        } else {
            8
        };
        if used + id_width + value_width > data_budget && i > 0 {
            return i;
        }
        used += id_width + value_width;
        prev_id = ids[i];
        prev_value = values[i];
    }
    ids.len()
}

// ── Section decoding ─────────────────────────────────────────────────────────

fn decode_u64_section(
    bytes: &[u8],
    count: usize,
    varint: bool,
    section: &'static str,
) -> Result<Vec<u64>> {
    let mut out = Vec::with_capacity(count);
    if varint {
        let mut pos = 0usize;
        for i in 0..count {
            let (v, n) = take_uvarint(&bytes[pos..]);
            if n == 0 {
                return Err(ColumnError::TruncatedSection { section, decoded: i, expected: count });
            }
            out.push(v);
            pos += n;
        }
    } else {
        if bytes.len() < count * 8 {
            return Err(ColumnError::TruncatedSection {
                section,
                decoded: bytes.len() / 8,
                expected: count,
            });
        }
        for chunk in bytes[..count * 8].chunks_exact(8) {
            out.push(u64::from_le_bytes(chunk.try_into().unwrap()));
        }
    }
    Ok(out)
}

/// Decode a block's id and value sections back into `(ids, values)`.
///
/// The inverse of the write path for every mode: varint or fixed-width
/// extraction first, then the delta pass undone in place.
pub fn decode_block_data(
    id_bytes: &[u8],
    value_bytes: &[u8],
    count: usize,
    encoding: Encoding,
) -> Result<(Vec<u64>, Vec<i64>)> {
    let mut ids = decode_u64_section(id_bytes, count, encoding.varint_ids(), "id")?;
    if encoding.delta_ids() {
        delta_decode_u64(&mut ids);
    }

    let raw = decode_u64_section(value_bytes, count, encoding.varint_values(), "value")?;
    let mut values: Vec<i64> = if encoding.varint_values() {
        raw.into_iter().map(zigzag_decode).collect()
    } else {
        raw.into_iter().map(u64_to_i64).collect()
    };
    if encoding.delta_values() {
        delta_decode_i64(&mut values);
    }

    Ok((ids, values))
}
