//! CSV persistence for fiber sets and run artifacts.
//!
//! One fiber per record, the x,y,z of its points flattened in order; matrices
//! as one record per row; the eigenbasis as the two named arrays `eigval` and
//! `eigvec`. The clustering core never touches these, it only sees in-memory
//! arrays and the [MatrixSink](crate::cluster::MatrixSink) trait.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ndarray::{Array1, Array2, Array3, ArrayView2, s};

use crate::cluster::MatrixSink;
use crate::fibers::FiberSet;
use crate::laplace::Eigenbasis;

/// Read a fiber set: each record holds 3·pts_per_fiber floats, x,y,z per point.
pub fn read_fibers_csv<P: AsRef<Path>>(path: P) -> Result<Array3<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path.as_ref())
        .with_context(|| format!("cannot open fiber file {:?}", path.as_ref()))?;
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Vec<f64> = record
            .iter()
            .map(|field| field.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .with_context(|| format!("bad float in fiber record {}", rows.len()))?;
        if row.len() % 3 != 0 {
            return Err(anyhow!(
                "fiber record {} holds {} values, not a multiple of 3",
                rows.len(),
                row.len()
            ));
        }
        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                return Err(anyhow!(
                    "fiber record {} holds {} values, expected {}",
                    rows.len(),
                    row.len(),
                    first.len()
                ));
            }
        }
        rows.push(row);
    }
    let nb_fibers = rows.len();
    let nb_pts = if nb_fibers > 0 { rows[0].len() / 3 } else { 0 };
    let mut points = Array3::<f64>::zeros((nb_fibers, nb_pts, 3));
    for (f, row) in rows.iter().enumerate() {
        for p in 0..nb_pts {
            for c in 0..3 {
                points[[f, p, c]] = row[3 * p + c];
            }
        }
    }
    Ok(points)
} // end of read_fibers_csv

/// Write a fiber set in the layout [read_fibers_csv] expects.
pub fn write_fibers_csv<P: AsRef<Path>>(path: P, fibers: &FiberSet) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for fiber in fibers.iter_fibers() {
        let record: Vec<String> = fiber.iter().map(|v| format!("{:.17e}", v)).collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a scalar channel: one record per fiber, pts_per_fiber floats each.
pub fn read_scalar_csv<P: AsRef<Path>>(path: P) -> Result<Array2<f64>> {
    read_matrix_csv(path)
}

/// One record per matrix row.
pub fn write_matrix_csv<P: AsRef<Path>>(path: P, matrix: ArrayView2<'_, f64>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for row in matrix.rows() {
        let record: Vec<String> = row.iter().map(|v| format!("{:.17e}", v)).collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
} // end of write_matrix_csv

pub fn read_matrix_csv<P: AsRef<Path>>(path: P) -> Result<Array2<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path.as_ref())
        .with_context(|| format!("cannot open matrix file {:?}", path.as_ref()))?;
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Vec<f64> = record
            .iter()
            .map(|field| field.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .with_context(|| format!("bad float in matrix record {}", rows.len()))?;
        rows.push(row);
    }
    let nb_rows = rows.len();
    let nb_cols = rows.first().map_or(0, |r| r.len());
    if rows.iter().any(|r| r.len() != nb_cols) {
        return Err(anyhow!("matrix records have uneven lengths"));
    }
    let mut matrix = Array2::<f64>::zeros((nb_rows, nb_cols));
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            matrix[[i, j]] = v;
        }
    }
    Ok(matrix)
} // end of read_matrix_csv

/// Persist the eigenbasis as `eigval.csv` / `eigvec.csv` under `dir`.
pub fn write_eigenbasis<P: AsRef<Path>>(dir: P, basis: &Eigenbasis) -> Result<()> {
    let dir = dir.as_ref();
    let eigval = basis.eigenvalues.view().insert_axis(ndarray::Axis(1));
    write_matrix_csv(dir.join("eigval.csv"), eigval)?;
    write_matrix_csv(dir.join("eigvec.csv"), basis.eigenvectors.view())?;
    Ok(())
}

pub fn read_eigenbasis<P: AsRef<Path>>(dir: P) -> Result<Eigenbasis> {
    let dir = dir.as_ref();
    let eigval = read_matrix_csv(dir.join("eigval.csv"))
        .context("eigenvalue file missing or unreadable")?;
    if eigval.ncols() == 0 {
        return Err(anyhow!("eigenvalue file {:?} holds no values", dir.join("eigval.csv")));
    }
    let eigvec = read_matrix_csv(dir.join("eigvec.csv"))
        .context("eigenvector file missing or unreadable")?;
    let eigenvalues: Array1<f64> = eigval.slice(s![.., 0]).to_owned();
    Ok(Eigenbasis {
        eigenvalues,
        eigenvectors: eigvec,
    })
} // end of read_eigenbasis

/// One record per retained fiber: original index, label, cluster RGB.
pub fn write_labels_csv<P: AsRef<Path>>(
    path: P,
    retained: &[usize],
    labels: &[usize],
    colors: &Array2<u8>,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    writer.write_record(["fiber", "label", "r", "g", "b"])?;
    for (&fidx, &label) in retained.iter().zip(labels.iter()) {
        writer.write_record([
            fidx.to_string(),
            label.to_string(),
            colors[[label, 0]].to_string(),
            colors[[label, 1]].to_string(),
            colors[[label, 2]].to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
} // end of write_labels_csv

pub fn write_rejected_csv<P: AsRef<Path>>(path: P, rejected: &[usize]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for &fidx in rejected {
        writer.write_record([fidx.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Sink writing every requested matrix as `<name>.csv` under one directory.
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(CsvSink {
            dir: dir.as_ref().to_path_buf(),
        })
    }
}

impl MatrixSink for CsvSink {
    fn save_matrix(&mut self, name: &str, matrix: ArrayView2<'_, f64>) -> Result<()> {
        let path = self.dir.join(format!("{}.csv", name));
        log::debug!("saving {} matrix to {:?}", name, path);
        write_matrix_csv(path, matrix)
    }
}

//=======================================================================

// end of mod tests
