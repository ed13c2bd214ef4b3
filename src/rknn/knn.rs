//! Neighbor-distance precomputation
//!
//! For every object point, the `k_max` smallest squared Euclidean distances
//! to the reference set, in ascending order (rank 0 is the nearest).

use std::collections::BinaryHeap;
use std::time::Instant;

use tracing::info;

use super::error::{Result, RknnError};
use super::partition::run_partitioned;
use crate::params::RknnParams;

/// Row-major table of `k_max` ascending squared distances per object point
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceTable {
    k_max: usize,
    values: Vec<f64>,
}

impl DistanceTable {
    /// Number of object points covered
    pub fn len(&self) -> usize {
        self.values.len() / self.k_max
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn k_max(&self) -> usize {
        self.k_max
    }

    /// Ascending distances for object point `i`
    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.k_max..(i + 1) * self.k_max]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks(self.k_max)
    }
}

/// Squared Euclidean distance between two points of equal dimension
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Total-ordered f64 for the bounded max-heap
#[derive(Clone, Copy, PartialEq)]
struct OrdF64(f64);

impl Eq for OrdF64 {}

impl PartialOrd for OrdF64 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrdF64 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Write the `out.len()` smallest squared distances from `point` to
/// `reference` into `out`, ascending.
///
/// Keeps a max-heap capped at `out.len()`: push while under capacity, then
/// replace the current maximum only when a smaller distance shows up.
pub fn nearest_distances(point: &[f64], reference: &[Vec<f64>], out: &mut [f64]) -> Result<()> {
    let k = out.len();
    if reference.len() < k {
        return Err(RknnError::precondition(format!(
            "reference set has {} points, need at least {}",
            reference.len(),
            k
        )));
    }
    if point.iter().any(|c| !c.is_finite()) {
        return Err(RknnError::input("object point has a non-finite coordinate"));
    }

    let mut heap: BinaryHeap<OrdF64> = BinaryHeap::with_capacity(k + 1);
    for candidate in reference {
        let dist = squared_distance(point, candidate);
        if !dist.is_finite() {
            return Err(RknnError::input("non-finite distance to a reference point"));
        }
        if heap.len() < k {
            heap.push(OrdF64(dist));
        } else if let Some(top) = heap.peek() {
            if dist < top.0 {
                heap.pop();
                heap.push(OrdF64(dist));
            }
        }
    }

    // Largest first out of the heap, so fill from the back.
    while let Some(OrdF64(dist)) = heap.pop() {
        out[heap.len()] = dist;
    }
    Ok(())
}

/// Compute the distance table for `objects` against `reference`.
///
/// Rows are filled in parallel over disjoint index ranges. Inputs must
/// already be checked for emptiness and matching dimensions.
pub fn precompute_distances(
    objects: &[Vec<f64>],
    reference: &[Vec<f64>],
    params: &RknnParams,
) -> Result<DistanceTable> {
    let k_max = params.k_max;
    if reference.len() < k_max {
        return Err(RknnError::precondition(format!(
            "reference set has {} points, need at least k_max = {}",
            reference.len(),
            k_max
        )));
    }

    let start = Instant::now();
    let mut values = vec![0.0; objects.len() * k_max];

    run_partitioned("distance", &mut values, k_max, params.worker_count(), |range, out| {
        for (i, row) in range.zip(out.chunks_mut(k_max)) {
            nearest_distances(&objects[i], reference, row)
                .map_err(|e| RknnError::input(format!("object row {}: {}", i, e)))?;
        }
        Ok(())
    })?;

    info!(
        "Distance precomputation: {} x {} points in {:.2?}",
        objects.len(),
        reference.len(),
        start.elapsed()
    );

    Ok(DistanceTable { k_max, values })
}
