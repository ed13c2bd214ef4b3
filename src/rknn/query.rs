//! Query transform
//!
//! A query point q with squared norm Sq is lifted to
//!
//! ```text
//! [ r21, r21·q_1, ..., r21·q_d, Sq·r21, r22·r21, r22·r21, -r23 ]
//! ```
//!
//! and encrypted as `M⁻¹ · u`. Against an object ciphertext `Mᵗ · t` the dot
//! product collapses to `t · u = r11·r21·(|q - x|² - dist_k) - r13·r23`,
//! independent of M.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::math::{BlindingTriple, ScalarSampler};
use crate::params::RknnParams;

use super::error::{Result, RknnError};
use super::setup::OwnerKey;

/// A plaintext query: 1-indexed neighbor rank `k` and the query point
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Requested rank, 1-indexed (k = 1 tests against the nearest neighbor)
    pub k: usize,
    /// Query point coordinates
    pub point: Vec<f64>,
}

impl QueryRequest {
    pub fn new(k: usize, point: Vec<f64>) -> Self {
        Self { k, point }
    }

    /// Zero-based rank index into the ciphertext table
    pub fn rank(&self, k_max: usize) -> Result<usize> {
        if self.k == 0 || self.k > k_max {
            return Err(RknnError::input(format!(
                "query rank k = {} is outside [1, {}]",
                self.k, k_max
            )));
        }
        Ok(self.k - 1)
    }
}

/// Encrypted query sent to the server
///
/// The blinding triple used to build it is dropped once this exists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncryptedQuery {
    /// Zero-based neighbor rank to test against
    pub rank: usize,
    /// `M⁻¹ · u`
    pub vector: Vec<f64>,
}

impl EncryptedQuery {
    /// Serialize for hand-off to the server
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Build the augmented query vector `u`
pub fn query_augmented_vector(point: &[f64], blinding: &BlindingTriple) -> DVector<f64> {
    let d = point.len();
    let r21 = blinding.r1;
    let squared_norm: f64 = point.iter().map(|x| x * x).sum();
    let mut u = DVector::zeros(RknnParams::augmented_dim(d));

    u[0] = r21;
    for (j, &x) in point.iter().enumerate() {
        u[j + 1] = r21 * x;
    }
    u[d + 1] = squared_norm * r21;
    u[d + 2] = blinding.r2 * r21;
    u[d + 3] = blinding.r2 * r21;
    u[d + 4] = -blinding.r3;
    u
}

/// Encrypt a query point under an explicit query-side blinding triple
pub fn encrypt_query(key: &OwnerKey, point: &[f64], blinding: &BlindingTriple) -> Result<DVector<f64>> {
    if point.len() != key.point_dim {
        return Err(RknnError::dimension_mismatch("query point", key.point_dim, point.len()));
    }
    if point.iter().any(|c| !c.is_finite()) {
        return Err(RknnError::input("query point has a non-finite coordinate"));
    }
    let u = query_augmented_vector(point, blinding);
    Ok(key.secret.inverse() * u)
}

/// Query(key, request) → encrypted query
///
/// Draws a fresh query-side blinding triple from `sampler` for this call
/// only.
pub fn query(key: &OwnerKey, request: &QueryRequest, sampler: &mut ScalarSampler) -> Result<EncryptedQuery> {
    let blinding = sampler.blinding_triple();
    query_with_blinding(key, request, &blinding)
}

/// Deterministic variant of [`query`]
pub fn query_with_blinding(
    key: &OwnerKey,
    request: &QueryRequest,
    blinding: &BlindingTriple,
) -> Result<EncryptedQuery> {
    let rank = request.rank(key.k_max)?;
    let vector = encrypt_query(key, &request.point, blinding)?;
    Ok(EncryptedQuery {
        rank,
        vector: vector.as_slice().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::generate_invertible_matrix;
    use crate::rknn::encode::{leading_entry, object_augmented_vector};

    fn key(point_dim: usize, seed: u64) -> OwnerKey {
        let mut sampler = ScalarSampler::with_seed(1.0, 16.0, seed).unwrap();
        OwnerKey {
            secret: generate_invertible_matrix(point_dim + 5, &mut sampler, 32, 1e-8).unwrap(),
            r11: 3.0,
            point_dim,
            k_max: 5,
        }
    }

    #[test]
    fn test_query_layout() {
        let b = BlindingTriple::new(2.0, 7.0, 1.5).unwrap();
        let u = query_augmented_vector(&[1.0, 3.0], &b);
        assert_eq!(u.as_slice(), &[2.0, 2.0, 6.0, 20.0, 14.0, 14.0, -1.5]);
    }

    #[test]
    fn test_padding_slots_cancel() {
        // Only the r12/r22 padding differs between the two pairs of vectors.
        let x = [2.0, -1.0, 0.5];
        let q = [0.25, 4.0, -3.0];
        for (r12, r22) in [(1.0, 1.0), (3.5, 11.0), (15.9, 2.2)] {
            let obj = BlindingTriple::new(6.0, r12, 2.0).unwrap();
            let qry = BlindingTriple::new(5.0, r22, 1.0).unwrap();
            let t = object_augmented_vector(&x, &obj);
            let u = query_augmented_vector(&q, &qry);
            let padding = t[5] * u[5] + t[6] * u[6];
            assert_eq!(padding, 0.0);
        }
    }

    #[test]
    fn test_plaintext_identity() {
        let x = [1.0, 2.0];
        let q = [0.5, -1.0];
        let dist_k = 3.0;
        let obj = BlindingTriple::new(3.0, 4.0, 2.0).unwrap();
        let qry = BlindingTriple::new(5.0, 9.0, 1.5).unwrap();

        let mut t = object_augmented_vector(&x, &obj);
        t[0] = leading_entry(5.0, dist_k, obj.r1);
        let u = query_augmented_vector(&q, &qry);

        // |q - x|² = 0.25 + 9 = 9.25
        let expected = obj.r1 * qry.r1 * (9.25 - dist_k) - obj.r3 * qry.r3;
        assert!((t.dot(&u) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_rank_bounds() {
        assert_eq!(QueryRequest::new(1, vec![0.0]).rank(5).unwrap(), 0);
        assert_eq!(QueryRequest::new(5, vec![0.0]).rank(5).unwrap(), 4);
        assert!(QueryRequest::new(0, vec![0.0]).rank(5).is_err());
        assert!(QueryRequest::new(6, vec![0.0]).rank(5).is_err());
    }

    #[test]
    fn test_query_dimension_checked() {
        let key = key(2, 8);
        let mut sampler = ScalarSampler::with_seed(1.0, 16.0, 8).unwrap();
        let request = QueryRequest::new(1, vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            query(&key, &request, &mut sampler),
            Err(RknnError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_fresh_blinding_per_query() {
        let key = key(2, 4);
        let mut sampler = ScalarSampler::with_seed(1.0, 16.0, 4).unwrap();
        let request = QueryRequest::new(2, vec![1.0, 1.0]);
        let a = query(&key, &request, &mut sampler).unwrap();
        let b = query(&key, &request, &mut sampler).unwrap();
        assert_eq!(a.rank, 1);
        assert_eq!(a.vector.len(), 7);
        assert_ne!(a.vector, b.vector);
    }

    #[test]
    fn test_encrypted_query_bytes() {
        let key = key(3, 10);
        let b = BlindingTriple::new(2.0, 3.0, 1.0).unwrap();
        let q = query_with_blinding(&key, &QueryRequest::new(3, vec![1.0, 2.0, 3.0]), &b).unwrap();
        let bytes = q.to_bytes().unwrap();
        assert_eq!(EncryptedQuery::from_bytes(&bytes).unwrap(), q);
    }
}
