//! Line-oriented numeric files
//!
//! Point sets are one point per line, coordinates separated by whitespace.
//! Query files hold two lines: the 1-indexed rank k, then the query point.
//! Result files hold one decrypted point per line, space-separated.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::error;

use crate::rknn::error::{Result, RknnError};
use crate::rknn::QueryRequest;

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|e| {
        error!("Failed to open {}: {}", path.display(), e);
        RknnError::input(format!("cannot open {}: {}", path.display(), e))
    })
}

fn parse_line(line: &str, path: &Path, line_number: usize) -> Result<Vec<f64>> {
    line.split_whitespace()
        .map(|token| {
            token.parse::<f64>().map_err(|_| {
                error!("Malformed number {:?} at {}:{}", token, path.display(), line_number);
                RknnError::input(format!(
                    "malformed number {:?} at {}:{}",
                    token,
                    path.display(),
                    line_number
                ))
            })
        })
        .collect()
}

/// Read every non-blank line of `path` as a point
pub fn read_points(path: &Path) -> Result<Vec<Vec<f64>>> {
    let reader = open(path)?;
    let mut points = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        points.push(parse_line(&line, path, idx + 1)?);
    }

    Ok(points)
}

/// Read a single line (1-indexed) as a row of numbers.
///
/// A missing line yields an empty row.
pub fn read_line(path: &Path, line_number: usize) -> Result<Vec<f64>> {
    if line_number == 0 {
        return Err(RknnError::input("line numbers start at 1"));
    }
    let reader = open(path)?;
    match reader.lines().nth(line_number - 1) {
        Some(line) => parse_line(&line?, path, line_number),
        None => Ok(Vec::new()),
    }
}

/// Read a two-line query file: `k` on line 1, the point on line 2
pub fn read_query(path: &Path) -> Result<QueryRequest> {
    let header = read_line(path, 1)?;
    let point = read_line(path, 2)?;

    if header.is_empty() || point.is_empty() {
        error!("Query file {} is missing its rank or point line", path.display());
        return Err(RknnError::input(format!(
            "query file {} must hold a rank line and a point line",
            path.display()
        )));
    }

    let k = header[0];
    if k.fract() != 0.0 || k < 1.0 {
        return Err(RknnError::input(format!("query rank {} is not a positive integer", k)));
    }

    Ok(QueryRequest::new(k as usize, point))
}

/// Write one point per line, coordinates separated by spaces
pub fn write_points(path: &Path, points: &[Vec<f64>]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    for point in points {
        for value in point {
            write!(writer, "{} ", value)?;
        }
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(())
}
