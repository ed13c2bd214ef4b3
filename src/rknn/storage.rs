//! Binary ciphertext table storage and memory-mapped evaluation
//!
//! Layout (little-endian):
//!
//! ```text
//! u64 num_objects | u32 k_max | u32 dim | f64 × (num_objects · k_max · dim)
//! ```
//!
//! The payload is row-major `[object][rank][slot]`, same as [`EncryptedTable`].
//!
//! Run metadata (dimensions plus the [`RknnParams`] used at setup) is kept
//! next to the table as JSON so later queries draw blinding scalars from the
//! same range.

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::params::RknnParams;

use super::encode::EncryptedTable;
use super::error::{Result, RknnError};
use super::query::EncryptedQuery;
use super::respond::{check_query_shape, ServerResponse};

const HEADER_LEN: usize = 16;

/// Setup-time description of an outsourced dataset
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub version: String,
    pub num_objects: usize,
    pub point_dim: usize,
    pub ciphertext_dim: usize,
    pub k_max: usize,
    pub params: RknnParams,
}

impl RunMetadata {
    pub fn new(params: &RknnParams, point_dim: usize, table: &EncryptedTable) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            num_objects: table.num_objects(),
            point_dim,
            ciphertext_dim: table.dim(),
            k_max: table.k_max(),
            params: params.clone(),
        }
    }
}

/// Write run metadata as pretty-printed JSON
pub fn save_metadata(metadata: &RunMetadata, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, metadata)?;
    writer.flush()?;
    info!("Metadata saved to {}", path.display());
    Ok(())
}

/// Read run metadata, rejecting parameters that would not pass validation
pub fn load_metadata(path: &Path) -> Result<RunMetadata> {
    let file = File::open(path)?;
    let metadata: RunMetadata = serde_json::from_reader(BufReader::new(file))?;
    metadata.params.validate().map_err(RknnError::precondition)?;
    Ok(metadata)
}

/// Save a ciphertext table to a binary file
pub fn save_table_binary(table: &EncryptedTable, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_u64::<LittleEndian>(table.num_objects() as u64)?;
    writer.write_u32::<LittleEndian>(table.k_max() as u32)?;
    writer.write_u32::<LittleEndian>(table.dim() as u32)?;

    for &value in table.data() {
        writer.write_f64::<LittleEndian>(value)?;
    }

    writer.flush()?;
    Ok(())
}

fn read_header(bytes: &[u8]) -> Result<(usize, usize, usize)> {
    if bytes.len() < HEADER_LEN {
        return Err(RknnError::input("table file is shorter than its header"));
    }
    let mut cursor = Cursor::new(bytes);
    let num_objects = cursor.read_u64::<LittleEndian>()? as usize;
    let k_max = cursor.read_u32::<LittleEndian>()? as usize;
    let dim = cursor.read_u32::<LittleEndian>()? as usize;

    let expected = num_objects
        .checked_mul(k_max)
        .and_then(|n| n.checked_mul(dim))
        .and_then(|n| n.checked_mul(8))
        .and_then(|n| n.checked_add(HEADER_LEN))
        .ok_or_else(|| RknnError::input("table header overflows"))?;
    if bytes.len() != expected {
        return Err(RknnError::input(format!(
            "table file has {} bytes, header implies {}",
            bytes.len(),
            expected
        )));
    }
    Ok((num_objects, k_max, dim))
}

/// Load a whole ciphertext table into memory
pub fn load_table_binary(path: &Path) -> Result<EncryptedTable> {
    let file = File::open(path)?;
    // SAFETY: File is opened read-only and not modified during the mmap lifetime.
    // The mmap is used only within this function scope for reading.
    let mmap = unsafe { Mmap::map(&file)? };
    let (num_objects, k_max, dim) = read_header(&mmap)?;

    let mut data = vec![0.0; num_objects * k_max * dim];
    LittleEndian::read_f64_into(&mmap[HEADER_LEN..], &mut data);

    EncryptedTable::from_parts(num_objects, k_max, dim, data)
}

/// Memory-mapped ciphertext table, decoded on demand
pub struct MmapTable {
    mmap: Mmap,
    num_objects: usize,
    k_max: usize,
    dim: usize,
}

impl MmapTable {
    /// Map a table file written by [`save_table_binary`]
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the table file is treated as immutable once written; it is
        // only replaced wholesale when the dataset is re-outsourced.
        let mmap = unsafe { Mmap::map(&file)? };
        let (num_objects, k_max, dim) = read_header(&mmap)?;
        Ok(Self {
            mmap,
            num_objects,
            k_max,
            dim,
        })
    }

    fn slot_bytes(&self, i: usize, k: usize) -> &[u8] {
        let start = HEADER_LEN + (i * self.k_max + k) * self.dim * 8;
        &self.mmap[start..start + self.dim * 8]
    }

    /// Ciphertext of object `i` at rank `k`
    pub fn ciphertext(&self, i: usize, k: usize) -> Vec<f64> {
        let mut out = vec![0.0; self.dim];
        LittleEndian::read_f64_into(self.slot_bytes(i, k), &mut out);
        out
    }

    /// Dot product with the query without materializing the ciphertext
    fn dot(&self, i: usize, k: usize, query: &[f64]) -> f64 {
        self.slot_bytes(i, k)
            .chunks_exact(8)
            .zip(query)
            .map(|(bytes, q)| LittleEndian::read_f64(bytes) * q)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.num_objects
    }

    pub fn is_empty(&self) -> bool {
        self.num_objects == 0
    }

    pub fn num_objects(&self) -> usize {
        self.num_objects
    }

    pub fn k_max(&self) -> usize {
        self.k_max
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

/// Respond against a memory-mapped table
pub fn respond_mmap(table: &MmapTable, query: &EncryptedQuery) -> Result<ServerResponse> {
    check_query_shape(table.dim(), table.k_max(), query)?;

    let indices: Vec<usize> = (0..table.num_objects())
        .into_par_iter()
        .filter(|&i| table.dot(i, query.rank, &query.vector) <= 0.0)
        .collect();
    let ciphertexts = indices.iter().map(|&i| table.ciphertext(i, 0)).collect();

    Ok(ServerResponse {
        indices,
        ciphertexts,
    })
}
