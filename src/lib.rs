//! aspe-rknn: Reverse k-nearest-neighbor queries over encrypted spatial data
//!
//! A data owner encrypts a point set with a secret, sign-preserving linear
//! transform (ASPE) and hands the ciphertext to an untrusted server. The
//! server can then answer "which stored points would count this query
//! among their k nearest neighbors?" by testing the sign of encrypted inner
//! products, without ever seeing coordinates or distances.
//!
//! Key components:
//! - Bounded k-nearest-neighbor distance precomputation per stored point
//! - Augmented-vector encoding turning a squared-distance inequality into a
//!   dot-product sign test
//! - Matrix-based encryption, query encryption and decryption
//! - Parallel outsourcing over disjoint row ranges

pub mod dataset;
pub mod math;
pub mod params;
pub mod rknn;

pub use rknn::{
    decrypt_point, encrypt_query, evaluate, extract, outsource, outsource_with_blinding,
    precompute_distances, query, query_with_blinding, respond, respond_mmap, respond_sequential,
    DataOwner, DistanceTable, EncryptedQuery, EncryptedTable, MmapTable, OwnerKey, QueryRequest,
    RknnError, ServerResponse,
};

pub use params::{RknnParams, AUX_SLOTS, K_MAX};
