//! Owner-side decryption of matched rows
//!
//! Implements Extract(key, response) → points
//!
//! A ciphertext is `c = Mᵗ · t`, so the augmented vector comes back as
//! `t = (M⁻¹)ᵗ · c` (equivalently the row vector `cᵗ · M⁻¹`). Slots
//! `1..=d` hold `-2·r11·x_j`; the leading and four trailing slots are
//! dropped.

use nalgebra::DVectorView;

use super::error::{Result, RknnError};
use super::respond::ServerResponse;
use super::setup::OwnerKey;

/// Recover plaintext coordinates from a rank-0 (or any rank) ciphertext
pub fn decrypt_point(key: &OwnerKey, ciphertext: &[f64]) -> Result<Vec<f64>> {
    let dim = key.augmented_dim();
    if ciphertext.len() != dim {
        return Err(RknnError::dimension_mismatch("ciphertext", dim, ciphertext.len()));
    }

    let c = DVectorView::from_slice(ciphertext, dim);
    let t = key.secret.inverse().tr_mul(&c);
    let scale = -2.0 * key.r11;

    Ok((1..=key.point_dim).map(|j| t[j] / scale).collect())
}

/// Extract(key, response) → points
///
/// Decrypts every returned row, keeping the server's ascending index order.
pub fn extract(key: &OwnerKey, response: &ServerResponse) -> Result<Vec<Vec<f64>>> {
    if response.indices.len() != response.ciphertexts.len() {
        return Err(RknnError::input(format!(
            "response has {} indices but {} ciphertexts",
            response.indices.len(),
            response.ciphertexts.len()
        )));
    }
    response
        .ciphertexts
        .iter()
        .map(|c| decrypt_point(key, c))
        .collect()
}
