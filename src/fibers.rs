//! In-memory fiber collection.
//!
//! A fiber is an ordered run of `pts_per_fiber` 3D points, assumed pre-sampled
//! at uniform arc length by the input provider. A [FiberSet] owns all fibers of
//! a run plus any named per-point scalar channels (FA, T1, ...), each channel
//! sampled at the same points as the geometry. The collection is immutable once
//! the pipeline starts; its lifetime spans a single clustering run.

use std::collections::BTreeMap;

use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, Axis};

use crate::error::ClusterError;

/// A finite, indexable collection of fibers with optional scalar channels.
pub struct FiberSet {
    /// fiber points, shape (nb_fibers, pts_per_fiber, 3)
    points: Array3<f64>,
    /// per-point scalar channels, each of shape (nb_fibers, pts_per_fiber)
    scalars: BTreeMap<String, Array2<f64>>,
}

impl FiberSet {
    /// Build a set from a (nb_fibers, pts_per_fiber, 3) point array.
    pub fn new(points: Array3<f64>) -> Result<Self, ClusterError> {
        let shape = points.shape();
        if shape[2] != 3 {
            return Err(ClusterError::InvariantViolation(format!(
                "fiber points must have 3 coordinates, got {}",
                shape[2]
            )));
        }
        if shape[0] > 0 && shape[1] == 0 {
            return Err(ClusterError::InvariantViolation(
                "fibers must carry at least one point".to_string(),
            ));
        }
        Ok(FiberSet {
            points,
            scalars: BTreeMap::new(),
        })
    } // end of new

    /// Attach a named scalar channel, shape (nb_fibers, pts_per_fiber).
    /// Channel sets must be uniform across fibers, so the whole channel is
    /// supplied at once.
    pub fn add_scalar(&mut self, name: &str, values: Array2<f64>) -> Result<(), ClusterError> {
        let expected = (self.get_nb_fibers(), self.get_pts_per_fiber());
        if values.dim() != expected {
            return Err(ClusterError::InvariantViolation(format!(
                "scalar channel {} has shape {:?}, expected {:?}",
                name,
                values.dim(),
                expected
            )));
        }
        self.scalars.insert(name.to_string(), values);
        Ok(())
    } // end of add_scalar

    pub fn get_nb_fibers(&self) -> usize {
        self.points.shape()[0]
    }

    pub fn get_pts_per_fiber(&self) -> usize {
        self.points.shape()[1]
    }

    /// names of the attached scalar channels, in lexicographic order
    pub fn get_scalar_names(&self) -> Vec<&str> {
        self.scalars.keys().map(|s| s.as_str()).collect()
    }

    /// one fiber as a (pts_per_fiber, 3) view
    pub fn get_fiber(&self, fidx: usize) -> ArrayView2<'_, f64> {
        self.points.slice(s![fidx, .., ..])
    }

    /// gather the listed fibers into a (|indices|, pts_per_fiber, 3) array
    pub fn get_fibers(&self, indices: &[usize]) -> Array3<f64> {
        let mut gathered = Array3::<f64>::zeros((indices.len(), self.get_pts_per_fiber(), 3));
        for (row, &fidx) in indices.iter().enumerate() {
            gathered.slice_mut(s![row, .., ..]).assign(&self.get_fiber(fidx));
        }
        gathered
    }

    /// full channel array, shape (nb_fibers, pts_per_fiber)
    pub(crate) fn get_channel(&self, name: &str) -> Result<&Array2<f64>, ClusterError> {
        self.scalars.get(name).ok_or_else(|| {
            ClusterError::InvariantViolation(format!("scalar channel {} not present", name))
        })
    }

    /// one fiber's profile in the named channel
    pub fn get_scalar(&self, fidx: usize, name: &str) -> Result<ArrayView1<'_, f64>, ClusterError> {
        Ok(self.get_channel(name)?.row(fidx))
    }

    /// gather the listed fibers' profiles in the named channel
    pub fn get_scalars(&self, indices: &[usize], name: &str) -> Result<Array2<f64>, ClusterError> {
        let channel = self.get_channel(name)?;
        let mut gathered = Array2::<f64>::zeros((indices.len(), self.get_pts_per_fiber()));
        for (row, &fidx) in indices.iter().enumerate() {
            gathered.row_mut(row).assign(&channel.row(fidx));
        }
        Ok(gathered)
    }

    /// Extract a sub-collection, carrying every scalar channel along.
    /// Used to build the prior set for an extension run from the fibers a
    /// training run retained.
    pub fn subset(&self, indices: &[usize]) -> FiberSet {
        let points = self.get_fibers(indices);
        let mut scalars = BTreeMap::new();
        for (name, channel) in &self.scalars {
            let mut gathered = Array2::<f64>::zeros((indices.len(), self.get_pts_per_fiber()));
            for (row, &fidx) in indices.iter().enumerate() {
                gathered.row_mut(row).assign(&channel.row(fidx));
            }
            scalars.insert(name.clone(), gathered);
        }
        FiberSet { points, scalars }
    } // end of subset

    /// iterate fibers in index order
    pub fn iter_fibers(&self) -> impl Iterator<Item = ArrayView2<'_, f64>> {
        self.points.axis_iter(Axis(0))
    }
}

//=======================================================================

// end of mod tests
