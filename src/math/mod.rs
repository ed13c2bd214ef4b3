//! Numeric primitives for the ASPE transform.
//!
//! - **Uniform sampling** of blinding scalars and matrix entries
//! - **Secret matrix** generation, inversion and inverse-residual checks
//!
//! Dense linear algebra (products, transposes, inversion) is delegated to
//! `nalgebra`.
//!
//! # Example
//!
//! ```
//! use aspe_rknn::math::{generate_invertible_matrix, inverse_residual, ScalarSampler};
//!
//! let mut sampler = ScalarSampler::with_seed(1.0, 16.0, 42).unwrap();
//! let secret = generate_invertible_matrix(7, &mut sampler, 32, 1e-8).unwrap();
//! assert!(inverse_residual(secret.matrix(), secret.inverse()) < 1e-8);
//! ```

pub mod matrix;
pub mod sampler;

pub use matrix::{generate_invertible_matrix, inverse_residual, invert, SecretMatrix};
pub use sampler::{BlindingTriple, ScalarSampler};
