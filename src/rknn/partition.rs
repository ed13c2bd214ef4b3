//! Partitioned parallel-for over disjoint row ranges
//!
//! Both outsourcing phases write one fixed-width row per object point. The
//! row range `[0, len)` is cut into `workers` contiguous chunks of equal
//! size with the remainder folded into the last chunk, and each chunk gets
//! exclusive access to its own slice of the output buffer. The call returns
//! only after every chunk has finished; chunk failures are collected and
//! reported together.

use std::ops::Range;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use super::error::{Result, RknnError};

/// Split `[0, len)` into `workers` contiguous ranges.
///
/// Every range but the last has `len / workers` rows; the last one also
/// takes the remainder. Empty ranges are dropped.
pub fn partition_ranges(len: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.max(1);
    let chunk = len / workers;

    (0..workers)
        .map(|t| {
            let start = t * chunk;
            let end = if t == workers - 1 { len } else { start + chunk };
            start..end
        })
        .filter(|r| !r.is_empty())
        .collect()
}

/// Run `work` over disjoint row ranges of `out` on a pool of `workers` threads.
///
/// `out` holds `row_width` values per row. `work` receives the global row
/// range and the matching mutable slice.
pub fn run_partitioned<F>(
    phase: &'static str,
    out: &mut [f64],
    row_width: usize,
    workers: usize,
    work: F,
) -> Result<()>
where
    F: Fn(Range<usize>, &mut [f64]) -> Result<()> + Sync,
{
    if row_width == 0 || out.len() % row_width != 0 {
        return Err(RknnError::precondition(format!(
            "{} output of {} values is not a whole number of {}-wide rows",
            phase,
            out.len(),
            row_width
        )));
    }
    let rows = out.len() / row_width;
    let ranges = partition_ranges(rows, workers);

    let mut chunks = Vec::with_capacity(ranges.len());
    let mut rest = out;
    for range in ranges {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(range.len() * row_width);
        chunks.push((range, head));
        rest = tail;
    }

    let pool = ThreadPoolBuilder::new().num_threads(workers.max(1)).build()?;
    let errors: Vec<RknnError> = pool.install(|| {
        chunks
            .into_par_iter()
            .map(|(range, slice)| work(range, slice))
            .filter_map(|r| r.err())
            .collect()
    });

    if errors.is_empty() {
        Ok(())
    } else {
        Err(RknnError::Phase { phase, errors })
    }
}
