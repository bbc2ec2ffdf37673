use csv::ReaderBuilder;
use ndarray::Array2;
use rand::prelude::*;
use rand_distr::{Normal, Uniform};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{ClusterError, Result};

/// A numerical dataset loaded from a delimited text file
#[derive(Debug, Clone)]
pub struct DataSet {
    pub data: Array2<f64>,
    pub headers: Option<Vec<String>>,
}

impl DataSet {
    /// Read a headered TSV file into a DataSet
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_delimited(path, b'\t')
    }

    /// Read a headered file with any single-byte delimiter.
    /// Every cell must parse as a number and every row must have the same width.
    pub fn from_delimited<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        let mut rdr = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .from_reader(file);

        let headers = rdr
            .headers()
            .ok()
            .map(|h| h.iter().map(|s| s.to_string()).collect::<Vec<_>>());

        let mut records: Vec<Vec<f64>> = Vec::new();

        for (i, result) in rdr.records().enumerate() {
            let record = result?;
            let row = record
                .iter()
                .enumerate()
                .map(|(col, x)| {
                    x.trim().parse::<f64>().map_err(|_| {
                        ClusterError::config(format!(
                            "{}: record {} column {}: '{}' is not a number",
                            path.display(),
                            i + 1,
                            col + 1,
                            x
                        ))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            records.push(row);
        }

        if records.is_empty() {
            return Err(ClusterError::config(format!(
                "no data lines found in {}",
                path.display()
            )));
        }

        let data = rows_to_matrix(records)?;
        Ok(Self { data, headers })
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }
}

/// Stack equally long rows into a matrix.
pub fn rows_to_matrix(rows: Vec<Vec<f64>>) -> Result<Array2<f64>> {
    let nrows = rows.len();
    let ncols = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().position(|r| r.len() != ncols) {
        return Err(ClusterError::config(format!(
            "row {bad} has {} values, expected {ncols}",
            rows[bad].len()
        )));
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((nrows, ncols), flat)
        .map_err(|e| ClusterError::config(format!("cannot shape data: {e}")))
}

/// Write one cluster label per line.
pub fn write_labels<P: AsRef<Path>>(path: P, labels: &[usize]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for label in labels {
        writeln!(out, "{label}")?;
    }
    out.flush()?;
    Ok(())
}

/// `n` 2-D points drawn uniformly from `[low, high)²`.
pub fn uniform_points<R: Rng + ?Sized>(
    n: usize,
    low: f64,
    high: f64,
    rng: &mut R,
) -> Result<Array2<f64>> {
    if !(low.is_finite() && high.is_finite() && low < high) {
        return Err(ClusterError::config(format!(
            "invalid range [{low}, {high})"
        )));
    }
    let dist = Uniform::new(low, high);
    Ok(Array2::from_shape_simple_fn((n, 2), || dist.sample(rng)))
}

/// `per_blob` points around each center with independent normal noise per coordinate.
pub fn gaussian_blobs<const D: usize, R: Rng + ?Sized>(
    centers: &[[f64; D]],
    per_blob: usize,
    std_dev: f64,
    rng: &mut R,
) -> Result<Array2<f64>> {
    let noise = Normal::new(0.0, std_dev)
        .map_err(|e| ClusterError::config(format!("invalid blob deviation {std_dev}: {e}")))?;
    let mut data = Array2::<f64>::zeros((centers.len() * per_blob, D));
    for (b, center) in centers.iter().enumerate() {
        for i in 0..per_blob {
            let mut row = data.row_mut(b * per_blob + i);
            for (value, c) in row.iter_mut().zip(center) {
                *value = c + noise.sample(rng);
            }
        }
    }
    Ok(data)
}
