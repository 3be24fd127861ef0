//! Outlier rejection policies.
//!
//! Training rejects fibers whose affinity row sum falls more than two standard
//! deviations below the mean (weakly connected fibers). Extension rejects
//! fibers whose embedding sits more than two standard deviations above the
//! mean distance to their assigned centroid. Rejected index lists are sorted
//! ascending and always refer to the caller's original fiber indices.

use ndarray::{Array2, Axis};

use crate::error::ClusterError;

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let nb = values.len() as f64;
    let mean = values.iter().sum::<f64>() / nb;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / nb;
    (mean, var.sqrt())
} // end of mean_and_std

/// Indices whose affinity row sum is below mean − 2·std.
pub fn rowsum_outliers(affinity: &Array2<f64>) -> Vec<usize> {
    let row_sums: Vec<f64> = affinity.sum_axis(Axis(1)).to_vec();
    let (mean, std) = mean_and_std(&row_sums);
    let threshold = mean - 2. * std;
    let rejected: Vec<usize> = row_sums
        .iter()
        .enumerate()
        .filter(|&(_, &r)| r < threshold)
        .map(|(i, _)| i)
        .collect();
    log::info!(
        "row-sum rejection : mean {:.2e} std {:.2e}, {} fiber(s) rejected",
        mean,
        std,
        rejected.len()
    );
    rejected
} // end of rowsum_outliers

/// Indices whose centroid distance exceeds mean + 2·std.
pub fn centroid_distance_outliers(distances: &[f64]) -> Vec<usize> {
    let (mean, std) = mean_and_std(distances);
    let threshold = mean + 2. * std;
    let rejected: Vec<usize> = distances
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d > threshold)
        .map(|(i, _)| i)
        .collect();
    log::info!(
        "centroid-distance rejection : mean {:.2e} std {:.2e}, {} fiber(s) rejected",
        mean,
        std,
        rejected.len()
    );
    rejected
} // end of centroid_distance_outliers

/// Delete the listed rows and columns of a square affinity. `rejected` must be
/// sorted ascending.
pub fn remove_rows_and_cols(
    affinity: &Array2<f64>,
    rejected: &[usize],
) -> Result<Array2<f64>, ClusterError> {
    let retained = retained_indices(affinity.nrows(), rejected)?;
    let nb = retained.len();
    let mut reduced = Array2::<f64>::zeros((nb, nb));
    for (ri, &i) in retained.iter().enumerate() {
        for (rj, &j) in retained.iter().enumerate() {
            reduced[[ri, rj]] = affinity[[i, j]];
        }
    }
    Ok(reduced)
} // end of remove_rows_and_cols

/// Delete the listed rows of a rectangular matrix. `rejected` must be sorted
/// ascending.
pub fn remove_rows(
    matrix: &Array2<f64>,
    rejected: &[usize],
) -> Result<Array2<f64>, ClusterError> {
    let retained = retained_indices(matrix.nrows(), rejected)?;
    let mut reduced = Array2::<f64>::zeros((retained.len(), matrix.ncols()));
    for (ri, &i) in retained.iter().enumerate() {
        reduced.row_mut(ri).assign(&matrix.row(i));
    }
    Ok(reduced)
}

/// Complement of the rejected set in [0, nb): the retained fibers, in order.
pub fn retained_indices(nb: usize, rejected: &[usize]) -> Result<Vec<usize>, ClusterError> {
    if let Some(&out) = rejected.iter().find(|&&i| i >= nb) {
        return Err(ClusterError::InvariantViolation(format!(
            "rejected index {} out of range for {} fibers",
            out, nb
        )));
    }
    let mut is_rejected = vec![false; nb];
    for &i in rejected {
        is_rejected[i] = true;
    }
    Ok((0..nb).filter(|&i| !is_rejected[i]).collect())
} // end of retained_indices

//=======================================================================

#[cfg(test)]
mod tests {

    use super::*;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn weak_row_is_rejected() {
        log_init_test();
        //
        // 9 strongly connected fibers and one near-isolated
        let nb = 10;
        let mut w = Array2::<f64>::from_elem((nb, nb), 0.9);
        for i in 0..nb {
            w[[i, i]] = 1.;
            w[[i, nb - 1]] = 0.01;
            w[[nb - 1, i]] = 0.01;
        }
        w[[nb - 1, nb - 1]] = 1.;
        let rejected = rowsum_outliers(&w);
        assert_eq!(rejected, vec![nb - 1]);
        //
        let reduced = remove_rows_and_cols(&w, &rejected).unwrap();
        assert_eq!(reduced.dim(), (9, 9));
        assert_eq!(reduced[[0, 0]], 1.);
        assert_eq!(reduced[[0, 8]], 0.9);
    }

    #[test]
    fn nothing_rejected_on_uniform_rows() {
        let w = Array2::<f64>::from_elem((5, 5), 0.5);
        assert!(rowsum_outliers(&w).is_empty());
    }

    #[test]
    fn far_centroid_distance_is_rejected() {
        log_init_test();
        //
        let mut distances = vec![0.1; 20];
        distances[7] = 25.;
        let rejected = centroid_distance_outliers(&distances);
        assert_eq!(rejected, vec![7]);
    }

    #[test]
    fn retained_is_complement() {
        let retained = retained_indices(6, &[1, 4]).unwrap();
        assert_eq!(retained, vec![0, 2, 3, 5]);
        assert!(retained_indices(3, &[5]).is_err());
    }
} // end of mod tests
