//! Nyström-style projection of new fibers onto a stored eigenbasis.
//!
//! Bibliography
//!   - *Spectral grouping using the Nystrom method*. Fowlkes Belongie Chung Malik. IEEE PAMI 26 (2004)
//!
//! Given the rectangular affinity W between a new fiber set and the set a
//! prior training run retained, the new feature-space coordinates are
//! `W · U · Λ⁻¹`. The first column is dropped and the next `k` taken with the
//! same bound logic as the training embedding; the prior centroids are reused
//! as-is, no retraining happens here.

use ndarray::Array2;

use crate::error::ClusterError;
use crate::laplace::Eigenbasis;

/// Project a rectangular affinity onto the prior eigenbasis and return the
/// (nb_new, k) embedding used for fixed-centroid assignment.
pub fn project(
    affinity: &Array2<f64>,
    basis: &Eigenbasis,
    k_clusters: usize,
) -> Result<Array2<f64>, ClusterError> {
    if basis.is_empty() {
        return Err(ClusterError::MissingEigenbasis);
    }
    if affinity.ncols() != basis.get_nb_rows() {
        return Err(ClusterError::InvariantViolation(format!(
            "affinity has {} prior columns but the eigenbasis holds {} rows",
            affinity.ncols(),
            basis.get_nb_rows()
        )));
    }
    //
    let projected = affinity.dot(&basis.eigenvectors);
    let nb_cols = projected.ncols();
    let end = if k_clusters + 1 > nb_cols {
        log::warn!(
            "asked for {} clusters but only {} eigenvectors stored, projecting onto the maximum",
            k_clusters,
            nb_cols.saturating_sub(1)
        );
        nb_cols
    } else {
        k_clusters + 1
    };
    if end < 3 {
        return Err(ClusterError::DegenerateClustering(format!(
            "projection has {} usable column(s), need at least 2",
            end.saturating_sub(1)
        )));
    }
    //
    // scale the kept columns by 1/lambda; the dropped first column never gets
    // divided so a (theoretically) zero leading eigenvalue cannot poison it
    let nb_new = projected.nrows();
    let mut embedding = Array2::<f64>::zeros((nb_new, end - 1));
    for j in 1..end {
        let lambda = basis.eigenvalues[j];
        if lambda == 0. {
            return Err(ClusterError::Numeric(format!(
                "eigenvalue {} is exactly 0, cannot project onto its eigenvector",
                j
            )));
        }
        let inv = 1. / lambda;
        for i in 0..nb_new {
            embedding[[i, j - 1]] = projected[[i, j]] * inv;
        }
    }
    Ok(embedding)
} // end of project

//=======================================================================

#[cfg(test)]
mod tests {

    use super::*;
    use ndarray::{arr1, arr2, Array2};

    #[test]
    fn empty_basis_is_missing() {
        let basis = Eigenbasis {
            eigenvalues: arr1(&[]),
            eigenvectors: Array2::<f64>::zeros((0, 0)),
        };
        let w = Array2::<f64>::zeros((2, 0));
        assert!(matches!(
            project(&w, &basis, 2),
            Err(ClusterError::MissingEigenbasis)
        ));
    }

    #[test]
    fn shape_mismatch_rejected() {
        let basis = Eigenbasis {
            eigenvalues: arr1(&[0., 0.5, 1.]),
            eigenvectors: Array2::<f64>::eye(3),
        };
        let w = Array2::<f64>::zeros((2, 4));
        assert!(matches!(
            project(&w, &basis, 2),
            Err(ClusterError::InvariantViolation(_))
        ));
    }

    #[test]
    fn projection_scales_by_inverse_eigenvalue() {
        // identity eigenvectors make the projection w scaled column-wise
        let basis = Eigenbasis {
            eigenvalues: arr1(&[1e-6, 0.5, 2.]),
            eigenvectors: Array2::<f64>::eye(3),
        };
        let w = arr2(&[[1., 2., 3.], [4., 5., 6.]]);
        let embedding = project(&w, &basis, 2).unwrap();
        assert_eq!(embedding.dim(), (2, 2));
        assert!((embedding[[0, 0]] - 2. / 0.5).abs() < 1e-12);
        assert!((embedding[[1, 1]] - 6. / 2.).abs() < 1e-12);
    }
} // end of mod tests
