//! Server-side RkNN evaluation
//!
//! Implements Respond(table, query) → response
//!
//! For every stored object i the server computes `c[i][k] · e` where e is
//! the encrypted query. The product equals
//! `r11·r21·(|q - x_i|² - dist_k(i)) - r13·r23`, so a non-positive value
//! means q falls within object i's k-th neighbor distance (with a small
//! bias toward inclusion from the `-r13·r23` offset). Nothing but the sign
//! is ever looked at.

use nalgebra::DVectorView;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::encode::EncryptedTable;
use super::error::{Result, RknnError};
use super::query::EncryptedQuery;

/// Server response: matching object indices and their rank-0 ciphertexts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerResponse {
    /// Matching object indices, ascending
    pub indices: Vec<usize>,
    /// Rank-0 ciphertext of each match, same order as `indices`
    pub ciphertexts: Vec<Vec<f64>>,
}

impl ServerResponse {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Serialize for hand-off back to the owner
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Dot product of a stored ciphertext with the encrypted query vector
pub fn ciphertext_dot(ciphertext: &[f64], query: &[f64]) -> f64 {
    let c = DVectorView::from_slice(ciphertext, ciphertext.len());
    let e = DVectorView::from_slice(query, query.len());
    c.dot(&e)
}

pub(crate) fn check_query_shape(dim: usize, k_max: usize, query: &EncryptedQuery) -> Result<()> {
    if query.vector.len() != dim {
        return Err(RknnError::dimension_mismatch(
            "encrypted query",
            dim,
            query.vector.len(),
        ));
    }
    if query.rank >= k_max {
        return Err(RknnError::input(format!(
            "rank index {} is outside [0, {})",
            query.rank, k_max
        )));
    }
    Ok(())
}

/// Indices i with `c[i][rank] · query ≤ 0`, ascending (parallel scan)
pub fn evaluate(table: &EncryptedTable, query: &EncryptedQuery) -> Result<Vec<usize>> {
    check_query_shape(table.dim(), table.k_max(), query)?;

    Ok((0..table.num_objects())
        .into_par_iter()
        .filter(|&i| ciphertext_dot(table.ciphertext(i, query.rank), &query.vector) <= 0.0)
        .collect())
}

/// Sequential variant of [`evaluate`]
pub fn evaluate_sequential(table: &EncryptedTable, query: &EncryptedQuery) -> Result<Vec<usize>> {
    check_query_shape(table.dim(), table.k_max(), query)?;

    Ok((0..table.num_objects())
        .filter(|&i| ciphertext_dot(table.ciphertext(i, query.rank), &query.vector) <= 0.0)
        .collect())
}

fn collect_response(table: &EncryptedTable, indices: Vec<usize>) -> ServerResponse {
    let ciphertexts = indices
        .iter()
        .map(|&i| table.ciphertext(i, 0).to_vec())
        .collect();
    ServerResponse {
        indices,
        ciphertexts,
    }
}

/// Respond(table, query) → response
///
/// Scans the whole table in parallel and returns the rank-0 ciphertext of
/// every match. Read-only on the table, so independent queries may run
/// concurrently.
pub fn respond(table: &EncryptedTable, query: &EncryptedQuery) -> Result<ServerResponse> {
    let indices = evaluate(table, query)?;
    Ok(collect_response(table, indices))
}

/// Sequential respond
///
/// Same as `respond` but scans on the calling thread.
pub fn respond_sequential(table: &EncryptedTable, query: &EncryptedQuery) -> Result<ServerResponse> {
    let indices = evaluate_sequential(table, query)?;
    Ok(collect_response(table, indices))
}
