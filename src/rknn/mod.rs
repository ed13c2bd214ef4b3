//! ASPE-encrypted reverse k-nearest-neighbor protocol
//!
//! # Protocol Overview
//!
//! 1. **Outsource** (owner): precompute each object's `k_max` nearest
//!    reference distances, draw a secret invertible matrix M and a blinding
//!    triple, and encrypt every object at every neighbor rank.
//! 2. **Query** (owner): lift the query point with a fresh blinding triple
//!    and encrypt it under M⁻¹.
//! 3. **Respond** (server): flag every object whose ciphertext has a
//!    non-positive dot product with the encrypted query at the chosen rank.
//! 4. **Extract** (owner): decrypt the returned rank-0 ciphertexts back to
//!    coordinates.
//!
//! # Example
//!
//! ```
//! use aspe_rknn::math::ScalarSampler;
//! use aspe_rknn::params::RknnParams;
//! use aspe_rknn::rknn::{extract, outsource, query, respond, QueryRequest};
//!
//! let params = RknnParams { k_max: 2, ..RknnParams::default() };
//! let mut sampler = ScalarSampler::with_seed(params.scalar_min, params.scalar_max, 7)?;
//!
//! let objects = vec![vec![0.0, 0.0], vec![10.0, 10.0], vec![1.0, 1.0]];
//! let reference = vec![
//!     vec![0.0, 0.0], vec![1.0, 1.0], vec![10.0, 10.0], vec![5.0, 5.0], vec![2.0, 2.0],
//! ];
//!
//! let (key, table) = outsource(&objects, &reference, &params, &mut sampler)?;
//! let encrypted = query(&key, &QueryRequest::new(2, vec![0.5, 0.5]), &mut sampler)?;
//! let response = respond(&table, &encrypted)?;
//! let points = extract(&key, &response)?;
//!
//! assert_eq!(response.indices, vec![0, 2]);
//! assert_eq!(points.len(), 2);
//! # Ok::<(), aspe_rknn::rknn::RknnError>(())
//! ```

pub mod encode;
pub mod error;
mod extract;
pub mod knn;
mod owner;
pub mod partition;
mod query;
mod respond;
mod setup;
pub mod storage;

pub use encode::{encrypt_point, encrypt_table, object_augmented_vector, EncryptedTable};
pub use error::{Result, RknnError};
pub use extract::{decrypt_point, extract};
pub use knn::{nearest_distances, precompute_distances, squared_distance, DistanceTable};
pub use owner::{DataOwner, Match};
pub use query::{
    encrypt_query, query, query_augmented_vector, query_with_blinding, EncryptedQuery, QueryRequest,
};
pub use respond::{
    ciphertext_dot, evaluate, evaluate_sequential, respond, respond_sequential, ServerResponse,
};
pub use setup::{outsource, outsource_with_blinding, validate_dataset, OwnerKey};
pub use storage::{
    load_metadata, load_table_binary, respond_mmap, save_metadata, save_table_binary, MmapTable,
    RunMetadata,
};
