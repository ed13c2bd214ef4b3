//! Object-side encryption transform
//!
//! Each object point x with squared norm S is lifted to an augmented vector
//! of dimension d + 5:
//!
//! ```text
//! [ (S - dist_k)·r11, -2·r11·x_1, ..., -2·r11·x_d, r11, r11·r12, -r11·r12, r13 ]
//! ```
//!
//! Only the leading slot depends on the neighbor rank k. The ciphertext for
//! rank k is `Mᵗ · t_k`.

use std::time::Instant;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{Result, RknnError};
use super::knn::DistanceTable;
use super::partition::run_partitioned;
use crate::math::{BlindingTriple, SecretMatrix};
use crate::params::RknnParams;

/// Ciphertext table: one `(d + 5)`-vector per object point and neighbor rank.
///
/// Stored row-major as `[object][rank][slot]`. The server holds this table
/// and only ever reads it. Deserialization goes through [`EncryptedTable::from_parts`],
/// so a payload that disagrees with its dimensions is rejected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct EncryptedTable {
    num_objects: usize,
    k_max: usize,
    dim: usize,
    data: Vec<f64>,
}

#[derive(Deserialize)]
struct RawTable {
    num_objects: usize,
    k_max: usize,
    dim: usize,
    data: Vec<f64>,
}

impl TryFrom<RawTable> for EncryptedTable {
    type Error = RknnError;

    fn try_from(raw: RawTable) -> Result<Self> {
        Self::from_parts(raw.num_objects, raw.k_max, raw.dim, raw.data)
    }
}

impl EncryptedTable {
    /// Assemble a table from raw parts, checking the payload length
    pub fn from_parts(num_objects: usize, k_max: usize, dim: usize, data: Vec<f64>) -> Result<Self> {
        let expected = num_objects
            .checked_mul(k_max)
            .and_then(|n| n.checked_mul(dim))
            .ok_or_else(|| RknnError::input("ciphertext table dimensions overflow"))?;
        if data.len() != expected {
            return Err(RknnError::input(format!(
                "ciphertext payload has {} values, expected {}",
                data.len(),
                expected
            )));
        }
        Ok(Self {
            num_objects,
            k_max,
            dim,
            data,
        })
    }

    /// Number of encrypted object points
    pub fn num_objects(&self) -> usize {
        self.num_objects
    }

    /// Neighbor ranks per object
    pub fn k_max(&self) -> usize {
        self.k_max
    }

    /// Ciphertext vector dimension (d + 5)
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Flattened ciphertext values
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Ciphertext of object `i` at neighbor rank `k`
    pub fn ciphertext(&self, i: usize, k: usize) -> &[f64] {
        let start = (i * self.k_max + k) * self.dim;
        &self.data[start..start + self.dim]
    }

    pub fn len(&self) -> usize {
        self.num_objects
    }

    pub fn is_empty(&self) -> bool {
        self.num_objects == 0
    }
}

/// Build the augmented vector for `point` with the leading slot left at zero.
///
/// This is the rank-independent part; callers set slot 0 per rank.
pub fn object_augmented_vector(point: &[f64], blinding: &BlindingTriple) -> DVector<f64> {
    let d = point.len();
    let r11 = blinding.r1;
    let mut t = DVector::zeros(RknnParams::augmented_dim(d));

    for (j, &x) in point.iter().enumerate() {
        t[j + 1] = -2.0 * r11 * x;
    }
    t[d + 1] = r11;
    t[d + 2] = r11 * blinding.r2;
    t[d + 3] = -r11 * blinding.r2;
    t[d + 4] = blinding.r3;
    t
}

/// Leading slot for rank k: `(S - dist_k)·r11`
pub fn leading_entry(squared_norm: f64, distance: f64, r11: f64) -> f64 {
    (squared_norm - distance) * r11
}

/// Encrypt one object point into `distances.len()` ciphertexts, written
/// consecutively into `out`.
pub fn encrypt_point_into(
    point: &[f64],
    distances: &[f64],
    secret: &SecretMatrix,
    blinding: &BlindingTriple,
    out: &mut [f64],
) -> Result<()> {
    let dim = RknnParams::augmented_dim(point.len());
    if secret.dim() != dim {
        return Err(RknnError::dimension_mismatch("secret matrix", dim, secret.dim()));
    }
    if out.len() != distances.len() * dim {
        return Err(RknnError::precondition("ciphertext output slice has the wrong length"));
    }
    if point.iter().any(|c| !c.is_finite()) {
        return Err(RknnError::input("object point has a non-finite coordinate"));
    }

    let squared_norm: f64 = point.iter().map(|x| x * x).sum();
    let mut t = object_augmented_vector(point, blinding);
    let m = secret.matrix();

    for (&distance, slot) in distances.iter().zip(out.chunks_mut(dim)) {
        t[0] = leading_entry(squared_norm, distance, blinding.r1);
        let c = m.tr_mul(&t);
        slot.copy_from_slice(c.as_slice());
    }
    Ok(())
}

/// Encrypt one object point, one ciphertext per neighbor rank
pub fn encrypt_point(
    point: &[f64],
    distances: &[f64],
    secret: &SecretMatrix,
    blinding: &BlindingTriple,
) -> Result<Vec<DVector<f64>>> {
    let dim = RknnParams::augmented_dim(point.len());
    let mut out = vec![0.0; distances.len() * dim];
    encrypt_point_into(point, distances, secret, blinding, &mut out)?;
    Ok(out
        .chunks(dim)
        .map(DVector::from_column_slice)
        .collect())
}

/// Encrypt every object point at every neighbor rank.
///
/// Runs in parallel over disjoint object ranges; the matrix and blinding
/// triple are shared read-only.
pub fn encrypt_table(
    objects: &[Vec<f64>],
    distances: &DistanceTable,
    secret: &SecretMatrix,
    blinding: &BlindingTriple,
    params: &RknnParams,
) -> Result<EncryptedTable> {
    if distances.len() != objects.len() {
        return Err(RknnError::dimension_mismatch(
            "distance table rows",
            objects.len(),
            distances.len(),
        ));
    }
    let point_dim = objects.first().map(|p| p.len()).unwrap_or(0);
    let dim = RknnParams::augmented_dim(point_dim);
    let k_max = distances.k_max();
    let row_width = k_max * dim;

    let start = Instant::now();
    let mut data = vec![0.0; objects.len() * row_width];

    run_partitioned("encrypt", &mut data, row_width, params.worker_count(), |range, out| {
        for (i, row) in range.zip(out.chunks_mut(row_width)) {
            encrypt_point_into(&objects[i], distances.row(i), secret, blinding, row)
                .map_err(|e| RknnError::input(format!("object row {}: {}", i, e)))?;
        }
        Ok(())
    })?;

    info!(
        "Encryption: {} points x {} ranks in {:.2?}",
        objects.len(),
        k_max,
        start.elapsed()
    );

    EncryptedTable::from_parts(objects.len(), k_max, dim, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{generate_invertible_matrix, ScalarSampler};
    use crate::rknn::knn::precompute_distances;

    fn blinding() -> BlindingTriple {
        BlindingTriple::new(3.0, 5.0, 2.0).unwrap()
    }

    #[test]
    fn test_augmented_layout() {
        let t = object_augmented_vector(&[1.0, -2.0], &blinding());
        assert_eq!(t.len(), 7);
        assert_eq!(t[0], 0.0);
        assert_eq!(t[1], -6.0);
        assert_eq!(t[2], 12.0);
        assert_eq!(t[3], 3.0);
        assert_eq!(t[4], 15.0);
        assert_eq!(t[5], -15.0);
        assert_eq!(t[6], 2.0);
        assert_eq!(leading_entry(5.0, 2.0, 3.0), 9.0);
    }

    #[test]
    fn test_only_leading_slot_varies_with_rank() {
        let mut sampler = ScalarSampler::with_seed(1.0, 16.0, 5).unwrap();
        let secret = generate_invertible_matrix(7, &mut sampler, 32, 1e-8).unwrap();
        let cts = encrypt_point(&[1.0, 2.0], &[0.5, 1.5, 4.0], &secret, &blinding()).unwrap();
        assert_eq!(cts.len(), 3);

        // Mᵗ⁻¹ recovers the augmented vectors; they differ only in slot 0.
        let recovered: Vec<DVector<f64>> =
            cts.iter().map(|c| secret.inverse().tr_mul(c)).collect();
        for r in &recovered[1..] {
            for j in 1..7 {
                assert!((r[j] - recovered[0][j]).abs() < 1e-7);
            }
        }
        // S = 5, r11 = 3
        assert!((recovered[0][0] - 13.5).abs() < 1e-7);
        assert!((recovered[2][0] - 3.0).abs() < 1e-7);
    }

    #[test]
    fn test_matrix_dimension_checked() {
        let mut sampler = ScalarSampler::with_seed(1.0, 16.0, 5).unwrap();
        let secret = generate_invertible_matrix(6, &mut sampler, 32, 1e-8).unwrap();
        let result = encrypt_point(&[1.0, 2.0], &[0.0], &secret, &blinding());
        assert!(matches!(result, Err(RknnError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_encrypt_table_shape_and_rows() {
        let objects: Vec<Vec<f64>> = (0..11).map(|i| vec![i as f64, 1.0 - i as f64]).collect();
        let reference: Vec<Vec<f64>> = (0..7).map(|i| vec![i as f64 * 0.5, 2.0]).collect();
        let params = RknnParams::with_parallelism(3);
        let distances = precompute_distances(&objects, &reference, &params).unwrap();

        let mut sampler = ScalarSampler::with_seed(1.0, 16.0, 9).unwrap();
        let secret = generate_invertible_matrix(7, &mut sampler, 32, 1e-8).unwrap();
        let table = encrypt_table(&objects, &distances, &secret, &blinding(), &params).unwrap();

        assert_eq!(table.len(), 11);
        assert_eq!(table.k_max(), params.k_max);
        assert_eq!(table.dim(), 7);

        let direct = encrypt_point(&objects[8], distances.row(8), &secret, &blinding()).unwrap();
        for (k, c) in direct.iter().enumerate() {
            assert_eq!(table.ciphertext(8, k), c.as_slice());
        }
    }

    #[test]
    fn test_from_parts_checks_length() {
        assert!(EncryptedTable::from_parts(2, 2, 3, vec![0.0; 12]).is_ok());
        assert!(EncryptedTable::from_parts(2, 2, 3, vec![0.0; 11]).is_err());
        assert!(EncryptedTable::from_parts(usize::MAX, 2, 3, Vec::new()).is_err());
    }

    #[test]
    fn test_deserialize_rejects_inconsistent_payload() {
        let table = EncryptedTable::from_parts(2, 1, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let json = serde_json::to_string(&table).unwrap();
        let restored: EncryptedTable = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, table);

        let bad = r#"{"num_objects":3,"k_max":1,"dim":2,"data":[1.0,2.0,3.0,4.0]}"#;
        assert!(serde_json::from_str::<EncryptedTable>(bad).is_err());
    }

    #[test]
    fn test_encrypt_phase_failure_returns_no_table() {
        let mut objects: Vec<Vec<f64>> = (0..12).map(|i| vec![i as f64, 1.0]).collect();
        let reference: Vec<Vec<f64>> = (0..6).map(|i| vec![0.0, i as f64]).collect();
        let params = RknnParams::with_parallelism(3);
        let distances = precompute_distances(&objects, &reference, &params).unwrap();

        // Distances are already computed, so only encryption sees the bad row.
        objects[7][0] = f64::NAN;
        let mut sampler = ScalarSampler::with_seed(1.0, 16.0, 17).unwrap();
        let secret = generate_invertible_matrix(7, &mut sampler, 32, 1e-8).unwrap();

        match encrypt_table(&objects, &distances, &secret, &blinding(), &params) {
            Err(RknnError::Phase { phase, errors }) => {
                assert_eq!(phase, "encrypt");
                assert_eq!(errors.len(), 1);
                assert!(errors[0].to_string().contains("row 7"));
            }
            other => panic!("expected encrypt phase error, got {:?}", other),
        }
    }
}
