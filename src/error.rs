//! Error kinds surfaced by the clustering pipelines.
//!
//! Nothing is recovered locally: every failure propagates to the caller of the
//! orchestrator, keeping the numeric stages free of fallback paths.

use thiserror::Error;

/// All failure modes of the training and extension pipelines.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// An input fiber set has no fibers.
    #[error("input fiber set has 0 fibers")]
    EmptyInput,

    /// Scalar weights and scalar channel names disagree (one list empty while
    /// the other is not, or the weight list has the wrong length).
    #[error("scalar weight specification invalid: {0}")]
    WeightSpec(String),

    /// Scalar weights do not sum to 1 within the configured tolerance.
    #[error("scalar weights sum to {sum:.6e}, expected 1 within {tol:.1e}")]
    WeightSum { sum: f64, tol: f64 },

    /// Fewer than 2 clusters requested, or the embedding lost too many columns
    /// to be clustered at all.
    #[error("degenerate clustering request: {0}")]
    DegenerateClustering(String),

    /// Extension was asked for without a stored eigenbasis.
    #[error("extension requires a stored eigenbasis from a prior training run")]
    MissingEigenbasis,

    /// A constructed matrix broke one of its post-conditions. This indicates a
    /// bug or pathological input, not a recoverable condition.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The eigensolver or k-means failed to converge, or an auxiliary numeric
    /// resource could not be set up.
    #[error("numerical failure: {0}")]
    Numeric(String),

    /// The injected persistence collaborator failed.
    #[error("persistence collaborator failed: {0}")]
    Persist(anyhow::Error),
}
