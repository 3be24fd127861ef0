//! Command line driver for the fiber clustering pipelines.
//!
//! `fiberclust train` clusters a fiber set read from CSV and drops every run
//! artifact (labels, rejected indices, centroids, eigenbasis, retained fibers)
//! under the output directory; `fiberclust extend` reloads those artifacts and
//! classifies a fresh fiber set against them.

use std::path::PathBuf;
use std::time::SystemTime;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use cpu_time::ProcessTime;

use fiberclust::outlier::retained_indices;
use fiberclust::tools::io;
use fiberclust::{extend, train, ClusterParams, FiberSet};

#[derive(Parser)]
#[command(name = "fiberclust", version, about = "spectral clustering of 3D fiber polylines")]
struct Cli {
    /// -v info, -vv debug, -vvv trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// cluster a fiber set from scratch
    Train(TrainArgs),
    /// classify a fiber set against a previous training run
    Extend(ExtendArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// fiber polylines, one record of 3*pts_per_fiber floats per fiber
    #[arg(long)]
    fibers: PathBuf,
    /// scalar channel as NAME=path, one record of pts_per_fiber floats per fiber; repeatable
    #[arg(long = "scalar", value_parser = parse_scalar)]
    scalars: Vec<(String, PathBuf)>,
    /// geometry weight followed by one weight per scalar channel, summing to 1
    #[arg(long, value_delimiter = ',')]
    weights: Vec<f64>,
    /// Gaussian kernel bandwidth; defaults 0.2 for train, 0.4 for extend
    #[arg(long)]
    sigma: Option<f64>,
    #[arg(long, default_value_t = 20)]
    pts_per_fiber: usize,
    /// row construction threads, 0 meaning one per core
    #[arg(long, default_value_t = 1)]
    workers: usize,
    /// k-means seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
    /// directory receiving run artifacts
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
    /// also persist each per-channel similarity matrix
    #[arg(long)]
    save_all_similarity: bool,
    /// also persist the combined affinity matrix
    #[arg(long)]
    save_weighted_similarity: bool,
}

#[derive(Args)]
struct TrainArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// number of clusters
    #[arg(short, long, default_value_t = 50)]
    k_clusters: usize,
}

#[derive(Args)]
struct ExtendArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// directory holding the training artifacts (eigval.csv, eigvec.csv,
    /// centroids.csv, prior_fibers.csv)
    #[arg(long)]
    prior_dir: PathBuf,
}

fn parse_scalar(spec: &str) -> Result<(String, PathBuf), String> {
    match spec.split_once('=') {
        Some((name, path)) if !name.is_empty() => Ok((name.to_string(), PathBuf::from(path))),
        _ => Err(format!("expected NAME=path, got {}", spec)),
    }
}

fn load_fiber_set(fibers: &PathBuf, scalars: &[(String, PathBuf)]) -> Result<FiberSet> {
    let points = io::read_fibers_csv(fibers)?;
    let mut set = FiberSet::new(points)?;
    for (name, path) in scalars {
        let values = io::read_scalar_csv(path)
            .with_context(|| format!("cannot read scalar channel {}", name))?;
        set.add_scalar(name, values)?;
    }
    Ok(set)
}

fn build_params(common: &CommonArgs, k_clusters: usize, training: bool) -> ClusterParams {
    let mut params = if training {
        ClusterParams::training()
    } else {
        ClusterParams::extension()
    };
    params.pts_per_fiber = common.pts_per_fiber;
    params.k_clusters = k_clusters;
    if let Some(sigma) = common.sigma {
        params.sigma = sigma;
    }
    params.scalar_types = common.scalars.iter().map(|(name, _)| name.clone()).collect();
    params.scalar_weights = common.weights.clone();
    params.save_all_similarity = common.save_all_similarity;
    params.save_weighted_similarity = common.save_weighted_similarity;
    params.workers = common.workers;
    params.seed = common.seed;
    params
}

fn run_train(args: &TrainArgs) -> Result<()> {
    let common = &args.common;
    let fibers = load_fiber_set(&common.fibers, &common.scalars)?;
    let params = build_params(common, args.k_clusters, true);
    let mut sink = io::CsvSink::new(&common.output_dir)?;
    //
    let cpu_start = ProcessTime::now();
    let sys_now = SystemTime::now();
    let out = train(&fibers, &params, &mut sink)?;
    println!(
        " train time {:.2e} s, cpu time : {}",
        sys_now.elapsed().unwrap().as_secs(),
        cpu_start.elapsed().as_secs()
    );
    //
    let retained = retained_indices(fibers.get_nb_fibers(), &out.rejected)?;
    let dir = &common.output_dir;
    io::write_labels_csv(dir.join("labels.csv"), &retained, &out.labels, &out.colors)?;
    io::write_rejected_csv(dir.join("rejected.csv"), &out.rejected)?;
    io::write_matrix_csv(dir.join("centroids.csv"), out.centroids.view())?;
    io::write_eigenbasis(dir, &out.eigenbasis)?;
    // the retained fibers become the prior set of later extension runs
    let prior = fibers.subset(&retained);
    io::write_fibers_csv(dir.join("prior_fibers.csv"), &prior)?;
    for (name, _) in &common.scalars {
        let values = prior.get_scalars(&(0..prior.get_nb_fibers()).collect::<Vec<_>>(), name)?;
        io::write_matrix_csv(dir.join(format!("prior_{}.csv", name)), values.view())?;
    }
    println!(
        "clustered {} fibers into {} clusters, {} rejected, artifacts in {:?}",
        fibers.get_nb_fibers(),
        out.centroids.nrows(),
        out.rejected.len(),
        dir
    );
    Ok(())
} // end of run_train

fn run_extend(args: &ExtendArgs) -> Result<()> {
    let common = &args.common;
    let fibers = load_fiber_set(&common.fibers, &common.scalars)?;
    //
    let prior_dir = &args.prior_dir;
    let prior_points = io::read_fibers_csv(prior_dir.join("prior_fibers.csv"))
        .context("prior fiber file missing; run train first")?;
    let mut prior = FiberSet::new(prior_points)?;
    for (name, _) in &common.scalars {
        let values = io::read_scalar_csv(prior_dir.join(format!("prior_{}.csv", name)))
            .with_context(|| format!("prior scalar channel {} missing", name))?;
        prior.add_scalar(name, values)?;
    }
    let basis = io::read_eigenbasis(prior_dir)?;
    let centroids = io::read_matrix_csv(prior_dir.join("centroids.csv"))
        .context("centroid file missing; run train first")?;
    if centroids.nrows() == 0 {
        return Err(anyhow!("prior centroid file is empty"));
    }
    //
    let params = build_params(common, centroids.nrows(), false);
    let mut sink = io::CsvSink::new(&common.output_dir)?;
    let cpu_start = ProcessTime::now();
    let sys_now = SystemTime::now();
    let out = extend(&fibers, &prior, &basis, &centroids, &params, &mut sink)?;
    println!(
        " extend time {:.2e} s, cpu time : {}",
        sys_now.elapsed().unwrap().as_secs(),
        cpu_start.elapsed().as_secs()
    );
    //
    let retained = retained_indices(fibers.get_nb_fibers(), &out.rejected)?;
    let dir = &common.output_dir;
    io::write_labels_csv(dir.join("labels.csv"), &retained, &out.labels, &out.colors)?;
    io::write_rejected_csv(dir.join("rejected.csv"), &out.rejected)?;
    println!(
        "classified {} fibers against {} prior clusters, {} rejected, artifacts in {:?}",
        fibers.get_nb_fibers(),
        centroids.nrows(),
        out.rejected.len(),
        dir
    );
    Ok(())
} // end of run_extend

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    //
    match &cli.command {
        Command::Train(args) => run_train(args),
        Command::Extend(args) => run_extend(args),
    }
}
