//! Aggregation over a column file: count, min, max, sum, avg.
//!
//! # Paths
//! With no filters and `skip_pre_calculated` off, the result is computed
//! purely from footer statistics — no block is read. Otherwise candidate
//! blocks are selected by intersecting each block's `[min_id, max_id]` with
//! the allow filter's `[min, max]` and scanned: decode, apply allow/deny
//! membership per pair, accumulate.
//!
//! # Determinism
//! The result is bit-identical for every worker count:
//! - `sum` is two's-complement wrapping i64 addition (associative and
//!   commutative),
//! - `min`/`max` are associative and commutative,
//! - `avg` is derived once from the final sum and count, never accumulated
//!   in floating point.
//!
//! Workers get disjoint contiguous slices of the candidate list and their
//! partials are merged in slice order.
//!
//! # Failure
//! A block that fails to decode is skipped (debug-logged), keeping
//! aggregates best-effort under partial corruption. I/O errors reading the
//! footer were already fatal at open time.

use rayon::prelude::*;
use roaring::RoaringTreemap;
use serde::Serialize;

use crate::error::Result;
use crate::reader::ColumnReader;

// ── Options and result ───────────────────────────────────────────────────────

/// Configuration for [`ColumnReader::aggregate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateOptions<'a> {
    /// Ignore footer statistics and always scan block data.
    pub skip_pre_calculated: bool,
    /// Only pairs whose id is in this set contribute.
    pub filter: Option<&'a RoaringTreemap>,
    /// Pairs whose id is in this set never contribute, even when allowed.
    pub deny_filter: Option<&'a RoaringTreemap>,
    /// Worker count for the block scan; `<= 0` uses the process's available
    /// parallelism. Capped at the number of candidate blocks.
    pub parallel: i32,
}

/// When `count == 0` every other field is zero — a sentinel, not a value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregateResult {
    pub count: u64,
    pub min: i64,
    pub max: i64,
    pub sum: i64,
    pub avg: f64,
}

// ── Partial accumulation ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Partial {
    count: u64,
    min: i64,
    max: i64,
    sum: i64,
}

impl Partial {
    fn new() -> Self {
        Self { count: 0, min: i64::MAX, max: -i64::MAX, sum: 0 }
    }

    #[inline]
    fn add(&mut self, v: i64) {
        self.count += 1;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self.sum = self.sum.wrapping_add(v);
    }

    fn merge(&mut self, other: Partial) {
        if other.count > 0 {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
        self.count += other.count;
        self.sum = self.sum.wrapping_add(other.sum);
    }

    fn finish(self) -> AggregateResult {
        if self.count == 0 {
            return AggregateResult { count: 0, min: 0, max: 0, sum: 0, avg: 0.0 };
        }
        AggregateResult {
            count: self.count,
            min: self.min,
            max: self.max,
            sum: self.sum,
            avg: self.sum as f64 / self.count as f64,
        }
    }
}

// ── Aggregation ──────────────────────────────────────────────────────────────

impl ColumnReader {
    /// Aggregate the whole file, subject to `opts`. Stateless over the
    /// footer loaded at open; safe to call from many threads at once.
    pub fn aggregate(&self, opts: &AggregateOptions<'_>) -> Result<AggregateResult> {
        if !opts.skip_pre_calculated && opts.filter.is_none() && opts.deny_filter.is_none() {
            return Ok(self.aggregate_from_footer());
        }
        self.aggregate_scan(opts)
    }

    /// Footer-only fast path: every statistic is pre-computed per block.
    fn aggregate_from_footer(&self) -> AggregateResult {
        let mut acc = Partial::new();
        for entry in self.footer() {
            if entry.count > 0 {
                acc.min = acc.min.min(entry.min_value);
                acc.max = acc.max.max(entry.max_value);
            }
            acc.count += entry.count as u64;
            acc.sum = acc.sum.wrapping_add(entry.sum);
        }
        acc.finish()
    }

    fn aggregate_scan(&self, opts: &AggregateOptions<'_>) -> Result<AggregateResult> {
        let candidates = self.candidate_blocks(opts.filter);
        if candidates.is_empty() {
            return Ok(Partial::new().finish());
        }

        let workers = resolve_workers(opts.parallel, candidates.len());
        let acc = if workers <= 1 {
            self.scan_blocks(&candidates, opts.filter, opts.deny_filter)
        } else {
            let chunk = candidates.len().div_ceil(workers);
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            let partials: Vec<Partial> = pool.install(|| {
                candidates
                    .par_chunks(chunk)
                    .map(|slice| self.scan_blocks(slice, opts.filter, opts.deny_filter))
                    .collect()
            });
            let mut acc = Partial::new();
            for p in partials {
                acc.merge(p);
            }
            acc
        };
        Ok(acc.finish())
    }

    /// Blocks whose id range intersects the allow filter's range. With no
    /// allow filter every block is a candidate; an empty allow filter
    /// selects nothing.
    fn candidate_blocks(&self, filter: Option<&RoaringTreemap>) -> Vec<usize> {
        match filter {
            None => (0..self.block_count()).collect(),
            Some(f) => match (f.min(), f.max()) {
                (Some(lo), Some(hi)) => self
                    .footer()
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.min_id <= hi && e.max_id >= lo)
                    .map(|(i, _)| i)
                    .collect(),
                _ => Vec::new(),
            },
        }
    }

    /// Serial scan of a candidate slice. Each worker owns its own decode
    /// buffers for the lifetime of a block; a failed decode skips the block.
    fn scan_blocks(
        &self,
        indices: &[usize],
        filter: Option<&RoaringTreemap>,
        deny: Option<&RoaringTreemap>,
    ) -> Partial {
        let mut acc = Partial::new();
        for &index in indices {
            let (ids, values, _) = match self.read_block(index) {
                Ok(block) => block,
                Err(e) => {
                    log::debug!("skipping undecodable block {index}: {e}");
                    continue;
                }
            };
            for (id, v) in ids.into_iter().zip(values) {
                if filter.map_or(true, |f| f.contains(id))
                    && deny.map_or(true, |d| !d.contains(id))
                {
                    acc.add(v);
                }
            }
        }
        acc
    }
}

fn resolve_workers(parallel: i32, candidates: usize) -> usize {
    let requested = if parallel <= 0 {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    } else {
        parallel as usize
    };
    requested.min(candidates).max(1)
}
