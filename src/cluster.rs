//! Training and extension pipelines.
//!
//! [train] runs the full spectral clustering chain on one fiber set: weighted
//! similarity, row-sum outlier rejection, random-walk Laplacian embedding,
//! k-means, label canonicalization. [extend] projects a fresh fiber set onto
//! the eigenbasis a previous training run produced and assigns the stored
//! centroids without retraining.
//!
//! The orchestrator owns every temporary matrix for the duration of a run; the
//! caller keeps ownership of the fiber sets and receives ownership of the
//! labels, colors, centroids and eigenbasis. Matrices requested for
//! persistence go through the injected [MatrixSink] collaborator, the core
//! itself never touches the filesystem.

use ndarray::{s, Array2, ArrayView2};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::affinity::{combine, validate_weights};
use crate::error::ClusterError;
use crate::fibers::FiberSet;
use crate::kmeans::{assign_to_centroids, lloyd_kmeans, rgb_from_components, sort_labels_by_size};
use crate::laplace::{spectral_embedding, Eigenbasis};
use crate::nystrom;
use crate::outlier::{
    centroid_distance_outliers, remove_rows, remove_rows_and_cols, retained_indices,
    rowsum_outliers,
};
use crate::similarity::{check_unit_diagonal, SimilarityBuilder, DIAG_TOL};

/// Run parameters recognized by the orchestrator. The option set is closed:
/// anything not representable here is not an option of this pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterParams {
    /// number of samples along each fiber; must match the fiber sets
    pub pts_per_fiber: usize,
    /// requested cluster count, must exceed 1
    pub k_clusters: usize,
    /// Gaussian kernel bandwidth
    pub sigma: f64,
    /// names of the scalar channels taking part in the affinity
    pub scalar_types: Vec<String>,
    /// geometry weight followed by one weight per scalar channel, summing to 1;
    /// empty when clustering on geometry alone
    pub scalar_weights: Vec<f64>,
    /// tolerance on the weight sum check
    pub weight_tolerance: f64,
    /// hand every per-channel similarity matrix to the sink
    pub save_all_similarity: bool,
    /// hand the combined affinity (after outlier removal) to the sink
    pub save_weighted_similarity: bool,
    /// row construction threads, 0 meaning one per core
    pub workers: usize,
    /// k-means seed; None draws one from the OS and logs it
    pub seed: Option<u64>,
}

impl ClusterParams {
    /// defaults of the training path
    pub fn training() -> Self {
        ClusterParams {
            pts_per_fiber: 20,
            k_clusters: 50,
            sigma: 0.2,
            scalar_types: Vec::new(),
            scalar_weights: Vec::new(),
            weight_tolerance: 1.0e-9,
            save_all_similarity: false,
            save_weighted_similarity: false,
            workers: 1,
            seed: None,
        }
    }

    /// defaults of the extension path (wider kernel)
    pub fn extension() -> Self {
        ClusterParams {
            sigma: 0.4,
            ..ClusterParams::training()
        }
    }
} // end of impl ClusterParams

/// Injected persistence collaborator. The core hands over matrix views under
/// stable names and never decides the storage format itself.
pub trait MatrixSink {
    fn save_matrix(&mut self, name: &str, matrix: ArrayView2<'_, f64>) -> anyhow::Result<()>;
}

/// Sink discarding everything, for callers that persist nothing.
pub struct NoopSink;

impl MatrixSink for NoopSink {
    fn save_matrix(&mut self, _name: &str, _matrix: ArrayView2<'_, f64>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// What a training run hands back to the caller.
#[derive(Clone, Debug)]
pub struct TrainOutput {
    /// one label in [0, k) per retained fiber, in original fiber order;
    /// label 0 is the largest cluster
    pub labels: Vec<usize>,
    /// original indices of the fibers removed by row-sum rejection, ascending
    pub rejected: Vec<usize>,
    /// k-means centers in embedding space, rows in canonical label order
    pub centroids: Array2<f64>,
    /// one RGB row per cluster
    pub colors: Array2<u8>,
    /// eigenbasis to persist for later extension runs
    pub eigenbasis: Eigenbasis,
}

/// What an extension run hands back to the caller.
#[derive(Clone, Debug)]
pub struct ExtendOutput {
    /// one prior-cluster label per retained fiber, in original fiber order
    pub labels: Vec<usize>,
    /// original indices of the fibers removed by centroid-distance rejection
    pub rejected: Vec<usize>,
    /// one RGB row per prior cluster
    pub colors: Array2<u8>,
}

/// Cluster a fiber set from scratch.
pub fn train(
    fibers: &FiberSet,
    params: &ClusterParams,
    sink: &mut dyn MatrixSink,
) -> Result<TrainOutput, ClusterError> {
    let nb_fibers = fibers.get_nb_fibers();
    if nb_fibers == 0 {
        return Err(ClusterError::EmptyInput);
    }
    check_sampling(fibers, params)?;
    if params.k_clusters <= 1 {
        return Err(ClusterError::DegenerateClustering(format!(
            "k_clusters is {}, need at least 2",
            params.k_clusters
        )));
    }
    validate_weights(
        &params.scalar_weights,
        &params.scalar_types,
        params.weight_tolerance,
    )?;
    log::info!(
        "training : {} fibers, {} clusters, sigma {:.2e}, {} scalar channel(s)",
        nb_fibers,
        params.k_clusters,
        params.sigma,
        params.scalar_types.len()
    );
    //
    let builder = SimilarityBuilder::new(params.sigma, params.workers)?;
    let affinity = weighted_similarity(&builder, fibers, None, params, sink)?;
    // each per-channel diagonal is exactly 1 by construction, so the combined
    // diagonal equals the weight sum and can only drift within the weight
    // tolerance the run just accepted
    check_unit_diagonal(&affinity, DIAG_TOL.max(params.weight_tolerance))?;
    //
    let rejected = rowsum_outliers(&affinity);
    let affinity = remove_rows_and_cols(&affinity, &rejected)?;
    if params.save_weighted_similarity {
        sink.save_matrix("weighted", affinity.view())
            .map_err(ClusterError::Persist)?;
    }
    //
    let (eigenbasis, embedding) = spectral_embedding(&affinity, params.k_clusters)?;
    //
    let seed = resolve_seed(params);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let (centroids, labels) = lloyd_kmeans(&embedding, params.k_clusters, &mut rng)?;
    let (centroids, labels) = sort_labels_by_size(centroids, labels);
    let colors = cluster_colors(&centroids, &eigenbasis, params.k_clusters);
    log::info!(
        "training done : {} fiber(s) rejected, largest cluster holds {}",
        rejected.len(),
        labels.iter().filter(|&&l| l == 0).count()
    );
    //
    Ok(TrainOutput {
        labels,
        rejected,
        centroids,
        colors,
        eigenbasis,
    })
} // end of train

/// Classify a fresh fiber set against a prior run. `prior` must be the fiber
/// set the training run retained (outliers already removed), `eigenbasis` and
/// `centroids` the artifacts that run produced.
pub fn extend(
    fibers: &FiberSet,
    prior: &FiberSet,
    eigenbasis: &Eigenbasis,
    centroids: &Array2<f64>,
    params: &ClusterParams,
    sink: &mut dyn MatrixSink,
) -> Result<ExtendOutput, ClusterError> {
    let nb_fibers = fibers.get_nb_fibers();
    if nb_fibers == 0 || prior.get_nb_fibers() == 0 {
        return Err(ClusterError::EmptyInput);
    }
    if eigenbasis.is_empty() {
        return Err(ClusterError::MissingEigenbasis);
    }
    if eigenbasis.get_nb_rows() != prior.get_nb_fibers() {
        return Err(ClusterError::InvariantViolation(format!(
            "eigenbasis holds {} rows but the prior set has {} fibers",
            eigenbasis.get_nb_rows(),
            prior.get_nb_fibers()
        )));
    }
    if fibers.get_pts_per_fiber() != prior.get_pts_per_fiber() {
        return Err(ClusterError::InvariantViolation(format!(
            "new fibers sampled at {} points, prior at {}",
            fibers.get_pts_per_fiber(),
            prior.get_pts_per_fiber()
        )));
    }
    check_sampling(fibers, params)?;
    let k_clusters = centroids.nrows();
    if k_clusters <= 1 {
        return Err(ClusterError::DegenerateClustering(format!(
            "prior run holds {} centroid(s), need at least 2",
            k_clusters
        )));
    }
    validate_weights(
        &params.scalar_weights,
        &params.scalar_types,
        params.weight_tolerance,
    )?;
    log::info!(
        "extension : {} fibers against {} prior fibers, {} clusters, sigma {:.2e}",
        nb_fibers,
        prior.get_nb_fibers(),
        k_clusters,
        params.sigma
    );
    //
    let builder = SimilarityBuilder::new(params.sigma, params.workers)?;
    let affinity = weighted_similarity(&builder, fibers, Some(prior), params, sink)?;
    let embedding = nystrom::project(&affinity, eigenbasis, k_clusters)?;
    if embedding.ncols() != centroids.ncols() {
        return Err(ClusterError::InvariantViolation(format!(
            "projection width {} does not match centroid width {}",
            embedding.ncols(),
            centroids.ncols()
        )));
    }
    //
    let (labels, distances) = assign_to_centroids(&embedding.view(), &centroids.view());
    let rejected = centroid_distance_outliers(&distances);
    let retained = retained_indices(nb_fibers, &rejected)?;
    let labels: Vec<usize> = retained.iter().map(|&i| labels[i]).collect();
    if params.save_weighted_similarity {
        let reduced = remove_rows(&affinity, &rejected)?;
        sink.save_matrix("weighted", reduced.view())
            .map_err(ClusterError::Persist)?;
    }
    let colors = cluster_colors(centroids, eigenbasis, k_clusters);
    log::info!("extension done : {} fiber(s) rejected", rejected.len());
    //
    Ok(ExtendOutput {
        labels,
        rejected,
        colors,
    })
} // end of extend

// Geometry similarity plus weighted scalar similarities, square against the
// set itself or rectangular against a prior set.
fn weighted_similarity(
    builder: &SimilarityBuilder,
    fibers: &FiberSet,
    prior: Option<&FiberSet>,
    params: &ClusterParams,
    sink: &mut dyn MatrixSink,
) -> Result<Array2<f64>, ClusterError> {
    let geometry = match prior {
        None => builder.geometry(fibers)?,
        Some(p) => builder.geometry_rect(fibers, p)?,
    };
    if params.save_all_similarity {
        sink.save_matrix("geometry", geometry.view())
            .map_err(ClusterError::Persist)?;
    }
    if params.scalar_types.is_empty() {
        log::debug!("clustering on geometry alone");
        return Ok(geometry);
    }
    let mut scalars = Vec::<Array2<f64>>::with_capacity(params.scalar_types.len());
    for name in &params.scalar_types {
        let similarity = match prior {
            None => builder.scalar(fibers, name)?,
            Some(p) => builder.scalar_rect(fibers, p, name)?,
        };
        if params.save_all_similarity {
            sink.save_matrix(name, similarity.view())
                .map_err(ClusterError::Persist)?;
        }
        scalars.push(similarity);
    }
    Ok(combine(geometry, scalars, &params.scalar_weights))
} // end of weighted_similarity

fn check_sampling(fibers: &FiberSet, params: &ClusterParams) -> Result<(), ClusterError> {
    if fibers.get_pts_per_fiber() != params.pts_per_fiber {
        return Err(ClusterError::InvariantViolation(format!(
            "fiber set sampled at {} points but pts_per_fiber is {}",
            fibers.get_pts_per_fiber(),
            params.pts_per_fiber
        )));
    }
    Ok(())
}

fn resolve_seed(params: &ClusterParams) -> u64 {
    match params.seed {
        Some(seed) => seed,
        None => {
            let seed = rand::random::<u64>();
            log::info!("k-means seed drawn : {}", seed);
            seed
        }
    }
}

// With two clusters the centroid rows have too few components for a color, so
// the leading eigenvector triple stands in, one row per cluster.
fn cluster_colors(centroids: &Array2<f64>, basis: &Eigenbasis, k_clusters: usize) -> Array2<u8> {
    if k_clusters >= 3 {
        rgb_from_components(centroids.view())
    } else {
        rgb_from_components(basis.eigenvectors.slice(s![0..k_clusters, ..]))
    }
}

//=======================================================================

// end of mod tests
