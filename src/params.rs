//! Parameter sets for ASPE-encrypted RkNN outsourcing
//!
//! The augmented vector carries the point coordinates plus five auxiliary
//! slots, so every secret matrix is square of dimension `d + AUX_SLOTS`.

use serde::{Deserialize, Serialize};

/// Number of neighbor ranks precomputed and encrypted per stored point
pub const K_MAX: usize = 5;

/// Auxiliary slots appended to the coordinates of an augmented vector:
/// the leading distance slot plus four trailing blinding slots.
pub const AUX_SLOTS: usize = 5;

/// Core parameters for outsourcing and querying
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RknnParams {
    /// Neighbor ranks kept per object point (distance table width)
    pub k_max: usize,

    /// Worker threads for the parallel phases.
    /// `None` sizes the pool from available hardware parallelism.
    pub parallelism: Option<usize>,

    /// Lower bound (inclusive) for uniformly drawn blinding scalars
    pub scalar_min: f64,

    /// Upper bound (exclusive) for uniformly drawn blinding scalars
    pub scalar_max: f64,

    /// Attempts before giving up on drawing an invertible secret matrix
    pub max_matrix_attempts: usize,

    /// Largest accepted entry of |M·M⁻¹ − I| for a freshly drawn matrix
    pub inverse_tolerance: f64,
}

impl RknnParams {
    /// Parameters with an explicit worker count, useful for reproducible timing
    pub fn with_parallelism(workers: usize) -> Self {
        Self {
            parallelism: Some(workers),
            ..Self::default()
        }
    }

    /// Dimension of the augmented vector (and of the secret matrix) for
    /// points with `point_dim` coordinates
    pub fn augmented_dim(point_dim: usize) -> usize {
        point_dim + AUX_SLOTS
    }

    /// Resolve the configured worker count
    pub fn worker_count(&self) -> usize {
        self.parallelism.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Check if parameters are valid
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.k_max == 0 {
            return Err("k_max must be at least 1");
        }

        if self.parallelism == Some(0) {
            return Err("parallelism must be at least 1 when set");
        }

        if !(self.scalar_min > 0.0) || !self.scalar_min.is_finite() {
            return Err("scalar_min must be a positive finite number");
        }

        if !(self.scalar_max > self.scalar_min) || !self.scalar_max.is_finite() {
            return Err("scalar_max must be finite and greater than scalar_min");
        }

        if self.max_matrix_attempts == 0 {
            return Err("max_matrix_attempts must be at least 1");
        }

        if !(self.inverse_tolerance > 0.0) {
            return Err("inverse_tolerance must be positive");
        }

        Ok(())
    }
}

impl Default for RknnParams {
    fn default() -> Self {
        Self {
            k_max: K_MAX,
            parallelism: None,
            scalar_min: 1.0,
            scalar_max: 16.0,
            max_matrix_attempts: 32,
            inverse_tolerance: 1e-8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_valid() {
        let params = RknnParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.k_max, K_MAX);
        assert!(params.worker_count() >= 1);
    }

    #[test]
    fn test_augmented_dim() {
        assert_eq!(RknnParams::augmented_dim(2), 7);
        assert_eq!(RknnParams::augmented_dim(0), AUX_SLOTS);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut params = RknnParams::default();
        params.k_max = 0;
        assert!(params.validate().is_err());

        let params = RknnParams::with_parallelism(0);
        assert!(params.validate().is_err());

        let mut params = RknnParams::default();
        params.scalar_min = 0.0;
        assert!(params.validate().is_err());

        let mut params = RknnParams::default();
        params.scalar_max = params.scalar_min;
        assert!(params.validate().is_err());

        let mut params = RknnParams::default();
        params.max_matrix_attempts = 0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_explicit_parallelism() {
        let params = RknnParams::with_parallelism(3);
        assert_eq!(params.worker_count(), 3);
        assert!(params.validate().is_ok());
    }
}
