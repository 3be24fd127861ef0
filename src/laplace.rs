//! Random-walk Laplacian spectral embedding.
//!
//! Bibliography
//!   - *A tutorial on spectral clustering*. von Luxburg. Statistics and Computing 17 (2007)
//!   - *Diffusion Maps*. Coifman Lafon Appl. Comput. Harmon. Anal. 21 (2006) 5–30
//!
//! The random-walk operator D⁻¹(D − W) is not symmetric, so instead of feeding
//! it to a symmetric solver we decompose the equivalent symmetric form
//! I − D^{-1/2} W D^{-1/2} and map eigenvectors back through D^{-1/2}. Same
//! spectrum as the generalized problem (D − W) v = λ D v, and the dense
//! symmetric solver stays numerically well behaved.

use nalgebra::linalg::SymmetricEigen;
use nalgebra::DMatrix;
use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::ClusterError;

/// sweep bound for the tridiagonal QR iteration
const EIGH_MAX_SWEEPS: usize = 1000;

/// Eigenvalues (ascending) and the matching random-walk eigenvectors, one per
/// column. Persisted by the caller between a training run and later
/// extension runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Eigenbasis {
    pub eigenvalues: Array1<f64>,
    /// shape (nb_fibers, nb_eigenvectors), column j pairs with eigenvalues[j]
    pub eigenvectors: Array2<f64>,
}

impl Eigenbasis {
    pub fn get_nb_rows(&self) -> usize {
        self.eigenvectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.eigenvalues.is_empty() || self.eigenvectors.is_empty()
    }
}

/// Degree vector d_i = Σ_j W[i][j].
pub fn degree_vector(affinity: &Array2<f64>) -> Array1<f64> {
    affinity.sum_axis(Axis(1))
}

/// Decompose the random-walk Laplacian of a square symmetric affinity and
/// return the full eigenbasis plus the embedding columns used for k-means.
///
/// The embedding drops the first (constant) eigenvector and takes the next
/// `k_clusters` columns; if fewer are available all remaining columns are
/// taken and a warning is logged.
pub fn spectral_embedding(
    affinity: &Array2<f64>,
    k_clusters: usize,
) -> Result<(Eigenbasis, Array2<f64>), ClusterError> {
    let nb_fibers = affinity.nrows();
    if nb_fibers == 0 {
        return Err(ClusterError::EmptyInput);
    }
    let degrees = degree_vector(affinity);
    for (i, d) in degrees.iter().enumerate() {
        if *d <= 0. {
            return Err(ClusterError::Numeric(format!(
                "fiber {} has non-positive degree {:.3e}",
                i, d
            )));
        }
    }
    //
    // symmetric normalized laplacian, delta_ij - w_ij / sqrt(d_i d_j)
    let inv_sqrt: Array1<f64> = degrees.mapv(|d| 1. / d.sqrt());
    let mut laplacian = Array2::<f64>::zeros((nb_fibers, nb_fibers));
    for i in 0..nb_fibers {
        for j in 0..nb_fibers {
            let off = -affinity[[i, j]] * inv_sqrt[i] * inv_sqrt[j];
            laplacian[[i, j]] = if i == j { 1. + off } else { off };
        }
    }
    //
    let (eigenvalues, symmetric_vectors) = symmetric_eigh(&laplacian)?;
    log::info!(
        "laplacian spectrum, first eigenvalues {:.2e} {:.2e}, last {:.2e}",
        eigenvalues[0],
        eigenvalues[(nb_fibers - 1).min(1)],
        eigenvalues[nb_fibers - 1]
    );
    //
    // back to random-walk eigenvectors, u = D^{-1/2} y, columns renormalized
    let mut eigenvectors = symmetric_vectors;
    for i in 0..nb_fibers {
        for j in 0..nb_fibers {
            eigenvectors[[i, j]] *= inv_sqrt[i];
        }
    }
    for mut column in eigenvectors.columns_mut() {
        let norm = column.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0. {
            column.mapv_inplace(|v| v / norm);
        }
    }
    //
    let basis = Eigenbasis {
        eigenvalues,
        eigenvectors,
    };
    let embedding = select_embedding_columns(&basis.eigenvectors, k_clusters)?;
    Ok((basis, embedding))
} // end of spectral_embedding

/// Drop the first column and take the next `k_clusters` ones, clamped to what
/// the matrix holds. Fails when fewer than 2 usable columns remain.
pub(crate) fn select_embedding_columns(
    eigenvectors: &Array2<f64>,
    k_clusters: usize,
) -> Result<Array2<f64>, ClusterError> {
    let nb_cols = eigenvectors.ncols();
    let end = if k_clusters + 1 > nb_cols {
        log::warn!(
            "asked for {} clusters but only {} eigenvectors available, clustering with the maximum",
            k_clusters,
            nb_cols.saturating_sub(1)
        );
        nb_cols
    } else {
        k_clusters + 1
    };
    if end < 3 {
        return Err(ClusterError::DegenerateClustering(format!(
            "embedding has {} usable column(s), need at least 2",
            end.saturating_sub(1)
        )));
    }
    Ok(eigenvectors.slice(s![.., 1..end]).to_owned())
} // end of select_embedding_columns

/// Dense symmetric eigendecomposition, eigenvalues ascending and eigenvectors
/// reordered to match (the solver returns an unordered spectrum).
pub(crate) fn symmetric_eigh(
    matrix: &Array2<f64>,
) -> Result<(Array1<f64>, Array2<f64>), ClusterError> {
    let nb_rows = matrix.nrows();
    // ndarray iterates row major and DMatrix fills column major; the matrix is
    // symmetric so both describe the same operator
    let dense = DMatrix::from_iterator(nb_rows, nb_rows, matrix.iter().cloned());
    let eigen = SymmetricEigen::try_new(dense, f64::EPSILON, EIGH_MAX_SWEEPS)
        .ok_or_else(|| ClusterError::Numeric("symmetric eigensolver did not converge".to_string()))?;
    //
    let mut order: Vec<usize> = (0..nb_rows).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
    let mut eigenvalues = Array1::<f64>::zeros(nb_rows);
    let mut eigenvectors = Array2::<f64>::zeros((nb_rows, nb_rows));
    for (dst, &src) in order.iter().enumerate() {
        eigenvalues[dst] = eigen.eigenvalues[src];
        for i in 0..nb_rows {
            eigenvectors[[i, dst]] = eigen.eigenvectors[(i, src)];
        }
    }
    Ok((eigenvalues, eigenvectors))
} // end of symmetric_eigh

//=======================================================================

#[cfg(test)]
mod tests {

    use super::*;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    // block affinity : two groups of 3, strong inside, weak across
    fn two_block_affinity() -> Array2<f64> {
        let nb = 6;
        let mut w = Array2::<f64>::from_elem((nb, nb), 0.01);
        for i in 0..nb {
            for j in 0..nb {
                if (i < 3) == (j < 3) {
                    w[[i, j]] = 0.9;
                }
            }
            w[[i, i]] = 1.;
        }
        w
    }

    #[test]
    fn eigenvalues_sorted_ascending() {
        log_init_test();
        //
        let w = two_block_affinity();
        let (basis, _) = spectral_embedding(&w, 2).unwrap();
        for j in 1..basis.eigenvalues.len() {
            assert!(basis.eigenvalues[j] >= basis.eigenvalues[j - 1]);
        }
        // connected graph, smallest eigenvalue of the walk laplacian is 0
        assert!(basis.eigenvalues[0].abs() < 1e-10);
    }

    #[test]
    fn second_eigenvector_separates_blocks() {
        log_init_test();
        //
        let w = two_block_affinity();
        let (basis, embedding) = spectral_embedding(&w, 2).unwrap();
        assert_eq!(embedding.dim(), (6, 2));
        assert_eq!(basis.get_nb_rows(), 6);
        // the first embedding column (Fiedler vector) splits the two blocks by sign
        let fiedler = embedding.column(0);
        let first_sign = fiedler[0].signum();
        for i in 0..3 {
            assert_eq!(fiedler[i].signum(), first_sign);
        }
        for i in 3..6 {
            assert_eq!(fiedler[i].signum(), -first_sign);
        }
    }

    #[test]
    fn too_few_columns_is_degenerate() {
        let u = Array2::<f64>::eye(2);
        assert!(matches!(
            select_embedding_columns(&u, 5),
            Err(ClusterError::DegenerateClustering(_))
        ));
    }

    #[test]
    fn column_bound_warns_and_clamps() {
        log_init_test();
        //
        let w = two_block_affinity();
        // ask for more clusters than eigenvectors, embedding gets all 5 remaining
        let (_, embedding) = spectral_embedding(&w, 40).unwrap();
        assert_eq!(embedding.ncols(), 5);
    }
} // end of mod tests
