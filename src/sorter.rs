//! High-level writer accepting unsorted batches.
//!
//! [`SortingWriter`] buffers incoming (id, value) pairs, sorts them by id
//! when needed, and feeds [`ColumnWriter::write_block`] whenever the
//! estimated encoded size crosses the block target. `BlockFull` from the
//! low-level writer is interpreted here: the written prefix is dropped from
//! the pending queue and the tail is resubmitted.
//!
//! Size estimation is deliberately cheap: ~3 bytes per integer for varint
//! sections, 8 for fixed-width ones. The low-level writer enforces the real
//! budget, so the estimate only decides when to attempt a flush.

use std::path::Path;

use crate::error::{ColumnError, Result};
use crate::writer::{ColumnWriter, WriterOptions};

pub struct SortingWriter {
    writer: ColumnWriter,
    pending_ids: Vec<u64>,
    pending_values: Vec<i64>,
}

impl SortingWriter {
    pub fn create<P: AsRef<Path>>(path: P, opts: WriterOptions) -> Result<Self> {
        Ok(Self {
            writer: ColumnWriter::create(path, opts)?,
            pending_ids: Vec::new(),
            pending_values: Vec::new(),
        })
    }

    /// Number of buffered pairs not yet written to disk.
    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending_ids.len()
    }

    /// Estimated encoded bytes per (id, value) pair for the configured mode.
    fn pair_estimate(&self) -> usize {
        let enc = self.writer.encoding();
        let id_est = if enc.varint_ids() { 3 } else { 8 };
        let value_est = if enc.varint_values() { 3 } else { 8 };
        id_est + value_est
    }

    /// Buffer a batch, sorting it by id (values carried along) if the ids
    /// are not already ascending, then flush if the estimate says the
    /// pending data outgrew one block.
    pub fn write(&mut self, ids: &[u64], values: &[i64]) -> Result<()> {
        if ids.len() != values.len() {
            return Err(ColumnError::LengthMismatch { ids: ids.len(), values: values.len() });
        }
        if ids.is_empty() {
            return Ok(());
        }

        if ids.windows(2).all(|w| w[0] < w[1]) {
            self.pending_ids.extend_from_slice(ids);
            self.pending_values.extend_from_slice(values);
        } else {
            let mut pairs: Vec<(u64, i64)> =
                ids.iter().copied().zip(values.iter().copied()).collect();
            pairs.sort_by_key(|&(id, _)| id);
            self.pending_ids.extend(pairs.iter().map(|&(id, _)| id));
            self.pending_values.extend(pairs.iter().map(|&(_, v)| v));
        }

        self.flush_if_needed(false)
    }

    /// Drain the pending queue into blocks: fully when `force`, otherwise
    /// until the size estimate drops back under the block target.
    fn flush_if_needed(&mut self, force: bool) -> Result<()> {
        let target = self.estimate_threshold();
        loop {
            if self.pending_ids.is_empty() {
                return Ok(());
            }
            if !force && self.pending_ids.len() * self.pair_estimate() <= target {
                return Ok(());
            }

            // Batches arrive individually sorted but may interleave; the
            // block writer demands a globally ascending run.
            if !self.pending_ids.windows(2).all(|w| w[0] < w[1]) {
                let mut pairs: Vec<(u64, i64)> = self
                    .pending_ids
                    .iter()
                    .copied()
                    .zip(self.pending_values.iter().copied())
                    .collect();
                pairs.sort_by_key(|&(id, _)| id);
                self.pending_ids.clear();
                self.pending_values.clear();
                self.pending_ids.extend(pairs.iter().map(|&(id, _)| id));
                self.pending_values.extend(pairs.iter().map(|&(_, v)| v));
            }

            match self.writer.write_block(&self.pending_ids, &self.pending_values) {
                Ok(()) => {
                    self.pending_ids.clear();
                    self.pending_values.clear();
                }
                Err(ColumnError::BlockFull { items_written }) => {
                    log::debug!(
                        "block full after {items_written} items, {} pending",
                        self.pending_ids.len() - items_written,
                    );
                    self.pending_ids.drain(..items_written);
                    self.pending_values.drain(..items_written);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The flush trigger compares estimated data bytes against the whole
    /// block target; header and layout are noise at this granularity.
    fn estimate_threshold(&self) -> usize {
        self.writer.block_size_target() as usize
    }

    /// Force out everything pending, then finalize and close the file.
    pub fn close(mut self) -> Result<()> {
        self.flush_if_needed(true)?;
        self.writer.finalize_and_close()
    }
}
