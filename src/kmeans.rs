//! Lloyd k-means over the spectral embedding, label canonicalization and
//! cluster colors.
//!
//! Initial centers are `k` distinct rows drawn uniformly without replacement
//! from the embedding, so a run is fully reproducible from the seed threaded
//! in by the orchestrator. After convergence labels are renumbered so that
//! label 0 is the largest cluster, ties broken by the original label order.

use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::Rng;

use crate::error::ClusterError;

/// Lloyd update rounds before giving up on a stable assignment.
const MAX_ITERATIONS: usize = 50;

#[inline]
fn sq_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
}

/// k-means over the rows of `points`. Returns (centroids, labels), centroids
/// of shape (k, dim), labels in [0, k).
pub fn lloyd_kmeans<R: Rng + ?Sized>(
    points: &Array2<f64>,
    k: usize,
    rng: &mut R,
) -> Result<(Array2<f64>, Vec<usize>), ClusterError> {
    let nb_points = points.nrows();
    let dim = points.ncols();
    if k > nb_points {
        return Err(ClusterError::DegenerateClustering(format!(
            "{} clusters asked from {} points",
            k, nb_points
        )));
    }
    //
    // seed centers with k distinct rows
    let picked = rand::seq::index::sample(rng, nb_points, k).into_vec();
    let mut centroids = Array2::<f64>::zeros((k, dim));
    for (c, &row) in picked.iter().enumerate() {
        centroids.row_mut(c).assign(&points.row(row));
    }
    //
    let mut labels = vec![0usize; nb_points];
    for iteration in 0..MAX_ITERATIONS {
        let (new_labels, _) = assign_to_centroids(&points.view(), &centroids.view());
        let stable = new_labels == labels;
        labels = new_labels;
        // recompute centers; an emptied cluster keeps its previous center
        let mut sums = Array2::<f64>::zeros((k, dim));
        let mut counts = vec![0usize; k];
        for (i, &label) in labels.iter().enumerate() {
            counts[label] += 1;
            let mut sum = sums.row_mut(label);
            sum += &points.row(i);
        }
        for c in 0..k {
            if counts[c] > 0 {
                let inv = 1. / counts[c] as f64;
                for d in 0..dim {
                    centroids[[c, d]] = sums[[c, d]] * inv;
                }
            }
        }
        if stable {
            log::debug!("k-means converged after {} iterations", iteration);
            break;
        }
    }
    // final assignment against the last centers
    let (labels, _) = assign_to_centroids(&points.view(), &centroids.view());
    Ok((centroids, labels))
} // end of lloyd_kmeans

/// Nearest-centroid assignment. Returns a label and the Euclidean distance to
/// the assigned center for every row of `points`.
pub fn assign_to_centroids(
    points: &ArrayView2<'_, f64>,
    centroids: &ArrayView2<'_, f64>,
) -> (Vec<usize>, Vec<f64>) {
    let nb_points = points.nrows();
    let mut labels = Vec::<usize>::with_capacity(nb_points);
    let mut distances = Vec::<f64>::with_capacity(nb_points);
    for i in 0..nb_points {
        let row = points.row(i);
        let mut best = 0usize;
        let mut best_d = f64::INFINITY;
        for (c, centroid) in centroids.rows().into_iter().enumerate() {
            let d = sq_distance(row, centroid);
            if d < best_d {
                best_d = d;
                best = c;
            }
        }
        labels.push(best);
        distances.push(best_d.sqrt());
    }
    (labels, distances)
} // end of assign_to_centroids

/// Renumber clusters by decreasing fiber count (stable on ties) and reorder
/// the centroid rows to match.
pub fn sort_labels_by_size(
    centroids: Array2<f64>,
    labels: Vec<usize>,
) -> (Array2<f64>, Vec<usize>) {
    let k = centroids.nrows();
    let mut counts = vec![0usize; k];
    for &label in &labels {
        counts[label] += 1;
    }
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| counts[b].cmp(&counts[a]).then(a.cmp(&b)));
    // rank[old label] = new label
    let mut rank = vec![0usize; k];
    for (new, &old) in order.iter().enumerate() {
        rank[old] = new;
    }
    let relabeled: Vec<usize> = labels.iter().map(|&l| rank[l]).collect();
    let mut sorted_centroids = Array2::<f64>::zeros(centroids.dim());
    for (new, &old) in order.iter().enumerate() {
        sorted_centroids.row_mut(new).assign(&centroids.row(old));
    }
    (sorted_centroids, relabeled)
} // end of sort_labels_by_size

/// Map each row's first three components to an RGB triple: unit-normalize,
/// then 127.5 + 127.5·v truncated into [0,255]. Rows with fewer than three
/// components are zero-padded, a zero row maps to mid-gray.
pub fn rgb_from_components(rows: ArrayView2<'_, f64>) -> Array2<u8> {
    let nb = rows.nrows();
    let nb_comps = rows.ncols().min(3);
    let mut colors = Array2::<u8>::zeros((nb, 3));
    for i in 0..nb {
        let mut triple = [0.0f64; 3];
        for ch in 0..nb_comps {
            triple[ch] = rows[[i, ch]];
        }
        let norm = triple.iter().map(|v| v * v).sum::<f64>().sqrt();
        for ch in 0..3 {
            let v = if norm > 0. { triple[ch] / norm } else { 0. };
            colors[[i, ch]] = (127.5 + 127.5 * v).clamp(0., 255.) as u8;
        }
    }
    colors
} // end of rgb_from_components

//=======================================================================

// end of mod tests
