//! Secret invertible matrix generation and inversion
//!
//! The owner draws one square matrix M of dimension `d + 5` per dataset and
//! keeps M⁻¹ next to it. Regenerating M invalidates every ciphertext built
//! under the previous pair.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::sampler::ScalarSampler;
use crate::rknn::error::{Result, RknnError};

/// Secret matrix M together with its inverse
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SecretMatrix {
    matrix: DMatrix<f64>,
    inverse: DMatrix<f64>,
}

impl SecretMatrix {
    /// Pair an existing matrix with its freshly computed inverse
    pub fn from_matrix(matrix: DMatrix<f64>) -> Result<Self> {
        let inverse = invert(&matrix)?;
        Ok(Self { matrix, inverse })
    }

    /// Side length of the square matrix
    pub fn dim(&self) -> usize {
        self.matrix.nrows()
    }

    /// The encryption matrix M
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// The inverse M⁻¹ used for query encryption and decryption
    pub fn inverse(&self) -> &DMatrix<f64> {
        &self.inverse
    }
}

/// Invert a square matrix, failing with a numerical error when singular
pub fn invert(matrix: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if !matrix.is_square() {
        return Err(RknnError::numerical(format!(
            "cannot invert a {}x{} matrix",
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    matrix
        .clone()
        .try_inverse()
        .ok_or_else(|| RknnError::numerical("matrix is singular"))
}

/// Largest absolute entry of `M·M⁻¹ − I`
pub fn inverse_residual(matrix: &DMatrix<f64>, inverse: &DMatrix<f64>) -> f64 {
    let n = matrix.nrows();
    let product = matrix * inverse;
    (product - DMatrix::<f64>::identity(n, n)).amax()
}

/// Draw a random invertible `n x n` matrix.
///
/// Entries are drawn symmetric around zero. A candidate is accepted only if
/// it inverts and its inverse residual stays within `tolerance`; otherwise it
/// is redrawn, up to `max_attempts` times.
pub fn generate_invertible_matrix(
    n: usize,
    sampler: &mut ScalarSampler,
    max_attempts: usize,
    tolerance: f64,
) -> Result<SecretMatrix> {
    if n == 0 {
        return Err(RknnError::precondition("matrix dimension must be positive"));
    }

    for attempt in 1..=max_attempts {
        let candidate = DMatrix::from_fn(n, n, |_, _| sampler.draw_signed());
        let Some(inverse) = candidate.clone().try_inverse() else {
            debug!(attempt, "candidate matrix is singular, redrawing");
            continue;
        };
        let residual = inverse_residual(&candidate, &inverse);
        if residual.is_finite() && residual <= tolerance {
            return Ok(SecretMatrix {
                matrix: candidate,
                inverse,
            });
        }
        debug!(attempt, residual, "candidate matrix is ill-conditioned, redrawing");
    }

    Err(RknnError::numerical(format!(
        "no invertible {}x{} matrix found after {} attempts",
        n, n, max_attempts
    )))
}
