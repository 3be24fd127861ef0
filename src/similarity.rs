//! Pairwise similarity matrix assembly.
//!
//! Row construction is embarrassingly parallel over the outer fiber index:
//! each worker fills one upper-triangle row (square mode) or one full row
//! (rectangular mode) of the distance matrix, so no locks are needed and the
//! result is deterministic for a given input whatever the worker count.
//! Distances are then min-max normalized per column as the similarity kernel
//! expects its input in [0,1], and pushed through the Gaussian kernel.
//!
//! Memory is O(N²) for square mode; N up to about 10^4 is the practical
//! ceiling on commodity hardware.

use ndarray::Array2;
use rayon::prelude::*;

use crate::dist::{fiber_distance, gaussian_kernel, scalar_distance};
use crate::error::ClusterError;
use crate::fibers::FiberSet;

/// tolerance on the distance / similarity diagonal invariants
pub(crate) const DIAG_TOL: f64 = 1.0e-12;

/// Builds geometric and scalar similarity matrices from fiber sets.
pub struct SimilarityBuilder {
    sigma: f64,
    pool: rayon::ThreadPool,
}

impl SimilarityBuilder {
    /// `sigma` is the Gaussian kernel bandwidth; `workers` the number of row
    /// construction threads, 0 meaning one per core.
    pub fn new(sigma: f64, workers: usize) -> Result<Self, ClusterError> {
        if sigma <= 0. {
            return Err(ClusterError::Numeric(format!(
                "kernel bandwidth must be positive, got {:.3e}",
                sigma
            )));
        }
        let nb_threads = if workers == 0 { num_cpus::get() } else { workers };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(nb_threads)
            .build()
            .map_err(|e| ClusterError::Numeric(format!("worker pool construction failed : {}", e)))?;
        log::debug!("similarity builder with {} workers, sigma {:.2e}", nb_threads, sigma);
        Ok(SimilarityBuilder { sigma, pool })
    } // end of new

    /// N×N geometry similarity of a fiber set.
    pub fn geometry(&self, fibers: &FiberSet) -> Result<Array2<f64>, ClusterError> {
        let distances =
            self.square_distances(fibers.get_nb_fibers(), |i, j| {
                fiber_distance(fibers.get_fiber(i), fibers.get_fiber(j))
            })?;
        self.to_similarity(distances)
    }

    /// N×N similarity of one scalar channel.
    pub fn scalar(&self, fibers: &FiberSet, channel: &str) -> Result<Array2<f64>, ClusterError> {
        let values = fibers.get_channel(channel)?;
        let distances = self.square_distances(fibers.get_nb_fibers(), |i, j| {
            scalar_distance(values.row(i), values.row(j))
        })?;
        self.to_similarity(distances)
    }

    /// N_new × N_prior geometry similarity against a prior fiber set. No
    /// diagonal invariants hold here.
    pub fn geometry_rect(
        &self,
        fibers: &FiberSet,
        prior: &FiberSet,
    ) -> Result<Array2<f64>, ClusterError> {
        let distances = self.rect_distances(fibers.get_nb_fibers(), prior.get_nb_fibers(), |i, j| {
            fiber_distance(fibers.get_fiber(i), prior.get_fiber(j))
        });
        Ok(gaussian_kernel(&distances, self.sigma))
    }

    /// N_new × N_prior similarity of one scalar channel against a prior set.
    pub fn scalar_rect(
        &self,
        fibers: &FiberSet,
        prior: &FiberSet,
        channel: &str,
    ) -> Result<Array2<f64>, ClusterError> {
        let values = fibers.get_channel(channel)?;
        let prior_values = prior.get_channel(channel)?;
        let distances = self.rect_distances(fibers.get_nb_fibers(), prior.get_nb_fibers(), |i, j| {
            scalar_distance(values.row(i), prior_values.row(j))
        });
        Ok(gaussian_kernel(&distances, self.sigma))
    }

    // Assemble a symmetric distance matrix. Workers each produce the row
    // d[i][i..n]; the mirror pass below is sequential. Each row is reduced by
    // a single worker so the result does not depend on dispatch order.
    fn square_distances<D>(&self, nb_fibers: usize, dist: D) -> Result<Array2<f64>, ClusterError>
    where
        D: Fn(usize, usize) -> f64 + Sync,
    {
        let upper: Vec<Vec<f64>> = self.pool.install(|| {
            (0..nb_fibers)
                .into_par_iter()
                .map(|i| (i..nb_fibers).map(|j| dist(i, j)).collect())
                .collect()
        });
        let mut distances = Array2::<f64>::zeros((nb_fibers, nb_fibers));
        for (i, row) in upper.iter().enumerate() {
            for (offset, &d) in row.iter().enumerate() {
                let j = i + offset;
                distances[[i, j]] = d;
                distances[[j, i]] = d;
            }
        }
        minmax_normalize_columns(&mut distances);
        check_zero_diagonal(&distances)?;
        Ok(distances)
    } // end of square_distances

    fn rect_distances<D>(&self, nb_fibers: usize, nb_prior: usize, dist: D) -> Array2<f64>
    where
        D: Fn(usize, usize) -> f64 + Sync,
    {
        let rows: Vec<Vec<f64>> = self.pool.install(|| {
            (0..nb_fibers)
                .into_par_iter()
                .map(|i| (0..nb_prior).map(|j| dist(i, j)).collect())
                .collect()
        });
        let mut distances = Array2::<f64>::zeros((nb_fibers, nb_prior));
        for (i, row) in rows.iter().enumerate() {
            for (j, &d) in row.iter().enumerate() {
                distances[[i, j]] = d;
            }
        }
        minmax_normalize_columns(&mut distances);
        distances
    } // end of rect_distances

    fn to_similarity(&self, distances: Array2<f64>) -> Result<Array2<f64>, ClusterError> {
        let similarity = gaussian_kernel(&distances, self.sigma);
        check_unit_diagonal(&similarity, DIAG_TOL)?;
        Ok(similarity)
    }
} // end of impl SimilarityBuilder

/// Feature-wise scaling of each column to [0,1]. A constant column maps to 0.
/// On a symmetric distance matrix the column minimum is the zero diagonal, so
/// the diagonal survives normalization unchanged.
pub(crate) fn minmax_normalize_columns(distances: &mut Array2<f64>) {
    for mut column in distances.columns_mut() {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &d in column.iter() {
            min = min.min(d);
            max = max.max(d);
        }
        let range = max - min;
        if range > 0. {
            for d in column.iter_mut() {
                *d = (*d - min) / range;
            }
        } else {
            column.fill(0.);
        }
    }
} // end of minmax_normalize_columns

fn check_zero_diagonal(distances: &Array2<f64>) -> Result<(), ClusterError> {
    for i in 0..distances.nrows() {
        if distances[[i, i]].abs() > DIAG_TOL {
            return Err(ClusterError::InvariantViolation(format!(
                "distance diagonal at {} is {:.3e}, expected 0",
                i,
                distances[[i, i]]
            )));
        }
    }
    Ok(())
}

pub(crate) fn check_unit_diagonal(similarity: &Array2<f64>, tol: f64) -> Result<(), ClusterError> {
    for i in 0..similarity.nrows() {
        if (similarity[[i, i]] - 1.).abs() > tol {
            return Err(ClusterError::InvariantViolation(format!(
                "similarity diagonal at {} is {:.3e}, expected 1",
                i,
                similarity[[i, i]]
            )));
        }
    }
    Ok(())
}

//=======================================================================

#[cfg(test)]
mod tests {

    use super::*;
    use ndarray::{s, Array2, Array3};

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    // nb_fibers straight fibers along x, fiber f lifted by f along y
    fn ladder_set(nb_fibers: usize, nb_pts: usize) -> FiberSet {
        let mut points = Array3::<f64>::zeros((nb_fibers, nb_pts, 3));
        for f in 0..nb_fibers {
            for p in 0..nb_pts {
                points[[f, p, 0]] = p as f64;
                points[[f, p, 1]] = f as f64;
            }
        }
        FiberSet::new(points).unwrap()
    }

    #[test]
    fn square_invariants() {
        log_init_test();
        //
        let fibers = ladder_set(6, 5);
        let builder = SimilarityBuilder::new(0.2, 1).unwrap();
        let similarity = builder.geometry(&fibers).unwrap();
        assert_eq!(similarity.dim(), (6, 6));
        for i in 0..6 {
            assert!((similarity[[i, i]] - 1.).abs() < DIAG_TOL);
            for j in 0..6 {
                assert!(similarity[[i, j]] >= 0. && similarity[[i, j]] <= 1.);
            }
        }
        // fibers further apart are less similar
        assert!(similarity[[0, 1]] > similarity[[0, 5]]);
    }

    #[test]
    fn symmetric_when_column_ranges_match() {
        log_init_test();
        //
        // two pairs of coincident fibers: every column spans the same range,
        // so the per-column feature scaling keeps the matrix symmetric.
        // with uneven column ranges symmetry only holds before normalization.
        let mut points = Array3::<f64>::zeros((4, 5, 3));
        for f in 0..4 {
            for p in 0..5 {
                points[[f, p, 0]] = p as f64;
                points[[f, p, 1]] = if f < 2 { 0. } else { 5. };
            }
        }
        let fibers = FiberSet::new(points).unwrap();
        let builder = SimilarityBuilder::new(0.2, 1).unwrap();
        let similarity = builder.geometry(&fibers).unwrap();
        for i in 0..4 {
            for j in 0..4 {
                assert!((similarity[[i, j]] - similarity[[j, i]]).abs() < 1e-12);
            }
        }
        assert_eq!(similarity[[0, 1]], 1.);
        assert!(similarity[[0, 2]] < 1e-6);
    }

    #[test]
    fn worker_count_does_not_change_result() {
        log_init_test();
        //
        let fibers = ladder_set(9, 4);
        let serial = SimilarityBuilder::new(0.2, 1)
            .unwrap()
            .geometry(&fibers)
            .unwrap();
        let parallel = SimilarityBuilder::new(0.2, 4)
            .unwrap()
            .geometry(&fibers)
            .unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn rectangular_shape_and_range() {
        log_init_test();
        //
        let fibers = ladder_set(4, 5);
        let prior = ladder_set(7, 5);
        let builder = SimilarityBuilder::new(0.4, 2).unwrap();
        let similarity = builder.geometry_rect(&fibers, &prior).unwrap();
        assert_eq!(similarity.dim(), (4, 7));
        for s in similarity.iter() {
            assert!(*s >= 0. && *s <= 1.);
        }
    }

    #[test]
    fn scalar_similarity_diagonal() {
        log_init_test();
        //
        let mut fibers = ladder_set(5, 4);
        let mut values = Array2::<f64>::zeros((5, 4));
        for f in 0..5 {
            for p in 0..4 {
                values[[f, p]] = f as f64 * 0.1 + p as f64;
            }
        }
        fibers.add_scalar("FA", values).unwrap();
        let builder = SimilarityBuilder::new(0.2, 1).unwrap();
        let similarity = builder.scalar(&fibers, "FA").unwrap();
        for i in 0..5 {
            assert!((similarity[[i, i]] - 1.).abs() < DIAG_TOL);
        }
    }

    #[test]
    fn constant_column_normalizes_to_zero() {
        let mut d = Array2::<f64>::from_elem((3, 2), 2.5);
        d.slice_mut(s![.., 1]).assign(&ndarray::arr1(&[0., 1., 2.]));
        minmax_normalize_columns(&mut d);
        assert_eq!(d[[0, 0]], 0.);
        assert_eq!(d[[2, 0]], 0.);
        assert_eq!(d[[2, 1]], 1.);
    }
} // end of mod tests
