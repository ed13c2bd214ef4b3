//! Owner-side context tying the protocol steps together
//!
//! `DataOwner` holds the parameters, the randomness source and, once a
//! dataset has been outsourced, the key and ciphertext table. A failed
//! outsourcing leaves any previously installed state untouched.

use std::path::Path;
use std::time::Instant;

use tracing::{info, warn};

use crate::dataset::{read_points, read_query, write_points};
use crate::math::ScalarSampler;
use crate::params::RknnParams;

use super::encode::EncryptedTable;
use super::error::{Result, RknnError};
use super::extract::extract;
use super::query::{query, QueryRequest};
use super::respond::respond;
use super::setup::{outsource, OwnerKey};

/// A decrypted match: object index and recovered coordinates
pub type Match = (usize, Vec<f64>);

pub struct DataOwner {
    params: RknnParams,
    sampler: ScalarSampler,
    outsourced: Option<(OwnerKey, EncryptedTable)>,
}

impl DataOwner {
    /// Validate `params` and seed the sampler from OS entropy
    pub fn new(params: RknnParams) -> Result<Self> {
        params.validate().map_err(RknnError::precondition)?;
        let sampler = ScalarSampler::new(params.scalar_min, params.scalar_max)?;
        Ok(Self::with_sampler(params, sampler))
    }

    pub fn with_sampler(params: RknnParams, sampler: ScalarSampler) -> Self {
        Self {
            params,
            sampler,
            outsourced: None,
        }
    }

    pub fn params(&self) -> &RknnParams {
        &self.params
    }

    pub fn key(&self) -> Option<&OwnerKey> {
        self.outsourced.as_ref().map(|(key, _)| key)
    }

    pub fn table(&self) -> Option<&EncryptedTable> {
        self.outsourced.as_ref().map(|(_, table)| table)
    }

    /// Outsource in-memory point sets, replacing any previous table
    pub fn outsource_points(&mut self, objects: &[Vec<f64>], reference: &[Vec<f64>]) -> Result<()> {
        let result = outsource(objects, reference, &self.params, &mut self.sampler)?;
        self.outsourced = Some(result);
        Ok(())
    }

    /// Load X and Y from point files and outsource them.
    ///
    /// On any failure the previous key and table (if any) stay in place.
    pub fn deal_data(&mut self, objects_path: &Path, reference_path: &Path) -> Result<()> {
        let start = Instant::now();
        let objects = read_points(objects_path)?;
        let reference = read_points(reference_path)?;
        info!(
            "Loaded {} object and {} reference points in {:.2?}",
            objects.len(),
            reference.len(),
            start.elapsed()
        );

        if objects.is_empty() || reference.is_empty() {
            warn!("Refusing to outsource an empty point set");
            return Err(RknnError::input("object or reference set is empty"));
        }

        self.outsource_points(&objects, &reference)?;
        info!("Outsourcing complete in {:.2?}", start.elapsed());
        Ok(())
    }

    /// Run one query end to end: encrypt, evaluate, decrypt
    pub fn search(&mut self, request: &QueryRequest) -> Result<Vec<Match>> {
        let (key, table) = self
            .outsourced
            .as_ref()
            .ok_or_else(|| RknnError::precondition("no dataset has been outsourced"))?;

        let encrypted = query(key, request, &mut self.sampler)?;
        let response = respond(table, &encrypted)?;
        let points = extract(key, &response)?;

        Ok(response.indices.into_iter().zip(points).collect())
    }

    /// Read a query file, run it, and write the decrypted matches.
    ///
    /// Returns the matching object indices.
    pub fn range_query(&mut self, query_path: &Path, result_path: &Path) -> Result<Vec<usize>> {
        let start = Instant::now();
        let request = read_query(query_path)?;
        let matches = self.search(&request)?;

        let (indices, points): (Vec<usize>, Vec<Vec<f64>>) = matches.into_iter().unzip();
        write_points(result_path, &points)?;

        info!(
            "Query k={} matched {} objects in {:.2?}",
            request.k,
            indices.len(),
            start.elapsed()
        );
        Ok(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::read_points;
    use tempfile::tempdir;

    fn owner() -> DataOwner {
        let params = RknnParams {
            k_max: 2,
            ..RknnParams::with_parallelism(2)
        };
        let sampler = ScalarSampler::with_seed(params.scalar_min, params.scalar_max, 99).unwrap();
        DataOwner::with_sampler(params, sampler)
    }

    #[test]
    fn test_search_before_outsourcing_fails() {
        let mut owner = owner();
        let request = QueryRequest::new(1, vec![0.0, 0.0]);
        assert!(matches!(owner.search(&request), Err(RknnError::Precondition(_))));
    }

    #[test]
    fn test_empty_file_leaves_table_untouched() {
        let dir = tempdir().unwrap();
        let x = dir.path().join("x.txt");
        let y = dir.path().join("y.txt");
        let empty = dir.path().join("empty.txt");
        std::fs::write(&x, "0 0\n10 10\n1 1\n").unwrap();
        std::fs::write(&y, "0 0\n1 1\n10 10\n5 5\n2 2\n").unwrap();
        std::fs::write(&empty, "").unwrap();

        let mut owner = owner();
        assert!(owner.deal_data(&empty, &y).is_err());
        assert!(owner.table().is_none());

        owner.deal_data(&x, &y).unwrap();
        let before = owner.table().cloned().unwrap();

        assert!(owner.deal_data(&x, &empty).is_err());
        assert_eq!(owner.table(), Some(&before));
    }

    #[test]
    fn test_range_query_writes_results() {
        let dir = tempdir().unwrap();
        let x = dir.path().join("x.txt");
        let y = dir.path().join("y.txt");
        let q = dir.path().join("q.txt");
        let out = dir.path().join("result.txt");
        std::fs::write(&x, "0 0\n10 10\n1 1\n").unwrap();
        std::fs::write(&y, "0 0\n1 1\n10 10\n5 5\n2 2\n").unwrap();
        // k = 2: rank 1, neighbor distance 2 for objects 0 and 2
        std::fs::write(&q, "2\n0.5 0.5\n").unwrap();

        let mut owner = owner();
        owner.deal_data(&x, &y).unwrap();
        let indices = owner.range_query(&q, &out).unwrap();
        assert_eq!(indices, vec![0, 2]);

        let points = read_points(&out).unwrap();
        assert_eq!(points.len(), 2);
        for (p, expected) in points.iter().zip([[0.0, 0.0], [1.0, 1.0]]) {
            assert!((p[0] - expected[0]).abs() < 1e-6);
            assert!((p[1] - expected[1]).abs() < 1e-6);
        }
    }
}
