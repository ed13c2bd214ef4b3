//! Outsourcing: distance precomputation, key generation and encryption
//!
//! Implements Outsource(X, Y) → (key, table). The owner keeps the key; the
//! table goes to the server. Either the whole table is produced or an error
//! is returned, never a partially filled table.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::math::{generate_invertible_matrix, BlindingTriple, ScalarSampler, SecretMatrix};
use crate::params::RknnParams;

use super::encode::{encrypt_table, EncryptedTable};
use super::error::{Result, RknnError};
use super::knn::precompute_distances;

/// Owner-side secret material
///
/// Holds M, M⁻¹ and the object-side scale r11. Never shipped to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OwnerKey {
    /// Secret matrix and its inverse
    pub secret: SecretMatrix,
    /// Object-side scale r11, needed to undo the coordinate encoding
    pub r11: f64,
    /// Coordinate count d of the outsourced points
    pub point_dim: usize,
    /// Neighbor ranks encrypted per point
    pub k_max: usize,
}

impl OwnerKey {
    /// Ciphertext / augmented vector dimension
    pub fn augmented_dim(&self) -> usize {
        RknnParams::augmented_dim(self.point_dim)
    }
}

/// Check the outsourcing preconditions and return the shared point dimension.
///
/// Runs before any transform touches the data.
pub fn validate_dataset(objects: &[Vec<f64>], reference: &[Vec<f64>], k_max: usize) -> Result<usize> {
    if objects.is_empty() {
        return Err(RknnError::input("object set is empty"));
    }
    if reference.is_empty() {
        return Err(RknnError::input("reference set is empty"));
    }

    let d = objects[0].len();
    if d == 0 {
        return Err(RknnError::input("object points have no coordinates"));
    }

    for (i, p) in objects.iter().enumerate() {
        if p.len() != d {
            return Err(RknnError::dimension_mismatch(format!("object row {}", i), d, p.len()));
        }
    }
    for (j, p) in reference.iter().enumerate() {
        if p.len() != d {
            return Err(RknnError::dimension_mismatch(format!("reference row {}", j), d, p.len()));
        }
    }

    if reference.len() < k_max {
        return Err(RknnError::precondition(format!(
            "reference set has {} points, need at least k_max = {}",
            reference.len(),
            k_max
        )));
    }

    Ok(d)
}

/// Outsource(X, Y) → (key, table)
///
/// Draws the secret matrix and the object-side blinding triple from
/// `sampler`, then encrypts every object point at every rank.
///
/// # Arguments
/// * `objects` - Object set X, encrypted and handed to the server
/// * `reference` - Reference set Y, used only for neighbor distances
/// * `params` - System parameters
/// * `sampler` - Source of blinding scalars and matrix entries
pub fn outsource(
    objects: &[Vec<f64>],
    reference: &[Vec<f64>],
    params: &RknnParams,
    sampler: &mut ScalarSampler,
) -> Result<(OwnerKey, EncryptedTable)> {
    params.validate().map_err(RknnError::precondition)?;
    let d = validate_dataset(objects, reference, params.k_max)?;

    let distances = precompute_distances(objects, reference, params)?;

    let keygen_start = Instant::now();
    let secret = generate_invertible_matrix(
        RknnParams::augmented_dim(d),
        sampler,
        params.max_matrix_attempts,
        params.inverse_tolerance,
    )?;
    let blinding = sampler.blinding_triple();
    info!("Key generation: {:.2?}", keygen_start.elapsed());

    let table = encrypt_table(objects, &distances, &secret, &blinding, params)?;

    let key = OwnerKey {
        secret,
        r11: blinding.r1,
        point_dim: d,
        k_max: params.k_max,
    };
    Ok((key, table))
}

/// Outsource with caller-supplied secret matrix and blinding triple
///
/// Deterministic variant of [`outsource`].
pub fn outsource_with_blinding(
    objects: &[Vec<f64>],
    reference: &[Vec<f64>],
    params: &RknnParams,
    secret: SecretMatrix,
    blinding: BlindingTriple,
) -> Result<(OwnerKey, EncryptedTable)> {
    params.validate().map_err(RknnError::precondition)?;
    let d = validate_dataset(objects, reference, params.k_max)?;

    let expected = RknnParams::augmented_dim(d);
    if secret.dim() != expected {
        return Err(RknnError::dimension_mismatch("secret matrix", expected, secret.dim()));
    }

    let distances = precompute_distances(objects, reference, params)?;
    let table = encrypt_table(objects, &distances, &secret, &blinding, params)?;

    let key = OwnerKey {
        secret,
        r11: blinding.r1,
        point_dim: d,
        k_max: params.k_max,
    };
    Ok((key, table))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<Vec<f64>> {
        (0..n).map(|i| vec![(i % 4) as f64, (i / 4) as f64]).collect()
    }

    #[test]
    fn test_outsource_shapes() {
        let params = RknnParams::with_parallelism(2);
        let mut sampler = ScalarSampler::with_seed(params.scalar_min, params.scalar_max, 42).unwrap();
        let (key, table) = outsource(&grid(10), &grid(8), &params, &mut sampler).unwrap();

        assert_eq!(key.point_dim, 2);
        assert_eq!(key.augmented_dim(), 7);
        assert_eq!(key.secret.dim(), 7);
        assert!(key.r11 >= params.scalar_min && key.r11 < params.scalar_max);
        assert_eq!(table.len(), 10);
        assert_eq!(table.k_max(), params.k_max);
        assert_eq!(table.dim(), 7);
    }

    #[test]
    fn test_empty_sets_rejected() {
        let params = RknnParams::default();
        let mut sampler = ScalarSampler::with_seed(1.0, 16.0, 1).unwrap();
        assert!(matches!(
            outsource(&[], &grid(8), &params, &mut sampler),
            Err(RknnError::Input(_))
        ));
        assert!(matches!(
            outsource(&grid(3), &[], &params, &mut sampler),
            Err(RknnError::Input(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch_detected_up_front() {
        let mut reference = grid(8);
        reference[5] = vec![1.0, 2.0, 3.0];
        let err = validate_dataset(&grid(4), &reference, 5).unwrap_err();
        match err {
            RknnError::DimensionMismatch { context, expected, found } => {
                assert_eq!(context, "reference row 5");
                assert_eq!(expected, 2);
                assert_eq!(found, 3);
            }
            other => panic!("unexpected error {:?}", other),
        }

        let mut objects = grid(4);
        objects[2] = vec![1.0];
        assert!(matches!(
            validate_dataset(&objects, &grid(8), 5),
            Err(RknnError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_small_reference_set_is_precondition_error() {
        assert!(matches!(
            validate_dataset(&grid(4), &grid(4), 5),
            Err(RknnError::Precondition(_))
        ));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut params = RknnParams::default();
        params.k_max = 0;
        let mut sampler = ScalarSampler::with_seed(1.0, 16.0, 1).unwrap();
        assert!(matches!(
            outsource(&grid(4), &grid(8), &params, &mut sampler),
            Err(RknnError::Precondition(_))
        ));
    }

    #[test]
    fn test_outsource_with_blinding_checks_matrix_dim() {
        let params = RknnParams::default();
        let mut sampler = ScalarSampler::with_seed(1.0, 16.0, 3).unwrap();
        let secret = generate_invertible_matrix(6, &mut sampler, 32, 1e-8).unwrap();
        let blinding = BlindingTriple::new(4.0, 2.0, 1.0).unwrap();
        assert!(matches!(
            outsource_with_blinding(&grid(4), &grid(8), &params, secret, blinding),
            Err(RknnError::DimensionMismatch { .. })
        ));
    }
}
