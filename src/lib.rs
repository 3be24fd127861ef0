//! Spectral clustering of 3D fiber polylines.
//!
//! Fibers (tractography streamlines sampled at a fixed number of points) are
//! grouped by geometric shape and optional per-point scalar measurements. A
//! weighted similarity graph is built from orientation-invariant mean
//! closest-point distances pushed through a Gaussian kernel, the random-walk
//! Laplacian of that graph is decomposed, and k-means partitions the low
//! eigenvector embedding. A stored eigenbasis lets later runs classify fresh
//! fibers against the trained clusters without retraining (Nyström
//! extension). Weakly connected fibers are rejected at training time,
//! centroid-distant ones at extension time.
//!
//! Bibliography
//!   - *A tutorial on spectral clustering*. von Luxburg. Statistics and Computing 17 (2007)
//!   - *Spectral grouping using the Nystrom method*. Fowlkes Belongie Chung Malik. IEEE PAMI 26 (2004)
//!   - *Diffusion Maps*. Coifman Lafon. Appl. Comput. Harmon. Anal. 21 (2006) 5–30
//!
//! Everything is dense: training keeps the full N×N affinity in memory, which
//! caps N at roughly 10^4 on commodity hardware.

pub mod affinity;
pub mod cluster;
pub mod dist;
pub mod error;
pub mod fibers;
pub mod kmeans;
pub mod laplace;
pub mod nystrom;
pub mod outlier;
pub mod similarity;
pub mod tools;

pub use cluster::{extend, train, ClusterParams, ExtendOutput, MatrixSink, NoopSink, TrainOutput};
pub use error::ClusterError;
pub use fibers::FiberSet;
pub use laplace::Eigenbasis;
