//main.rs
use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use kmeans_engine::dataset::{uniform_points, write_labels};
use kmeans_engine::request::{self, vectors};
use kmeans_engine::{ClusterRequest, Coord, DataSet, DEFAULT_MAX_ITERS};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::io::Read;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, author = "Stefan L. <stefan.lang@med.lu.se>")]
#[command(about = "Steppable K-means clustering")]
struct Opts {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Cluster the numeric columns of a headered TSV file
    Cluster {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short)]
        k: usize,

        /// random, farthest, kmeans++ or manual
        #[arg(short, long, default_value = "random")]
        init: String,

        /// Headered file with the starting centroids for `--init manual`
        #[arg(short, long)]
        centroids: Option<PathBuf>,

        #[arg(short, long)]
        seed: Option<u64>,

        #[arg(short, long, default_value_t = DEFAULT_MAX_ITERS)]
        max_iters: usize,

        #[arg(short, long, default_value_t = 0.0)]
        tolerance: f64,

        /// Column delimiter of the input files
        #[arg(short, long, default_value_t = '\t')]
        delimiter: char,

        /// Include one snapshot per iteration in the output
        #[arg(long)]
        trace: bool,

        /// Also write one cluster label per line to this file
        #[arg(short, long)]
        outfile: Option<PathBuf>,
    },
    /// Answer one JSON cluster request (stdin by default) with a JSON response
    Request {
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Print a random 2-D demo dataset as JSON
    Generate {
        #[arg(short, default_value_t = 100)]
        n: usize,

        #[arg(long, default_value_t = 0.0)]
        low: f64,

        #[arg(long, default_value_t = 100.0)]
        high: f64,

        #[arg(short, long)]
        seed: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let opts = Opts::parse();

    match opts.command {
        Command::Cluster {
            file,
            k,
            init,
            centroids,
            seed,
            max_iters,
            tolerance,
            delimiter,
            trace,
            outfile,
        } => {
            if !delimiter.is_ascii() {
                bail!("delimiter must be a single ASCII character, got {delimiter:?}");
            }
            let delimiter = delimiter as u8;

            let ds = DataSet::from_delimited(&file, delimiter)
                .with_context(|| format!("reading {}", file.display()))?;
            info!(rows = ds.nrows(), cols = ds.ncols(), "loaded dataset");

            let manual_centroids = match centroids {
                Some(path) => Some(vectors(
                    &DataSet::from_delimited(&path, delimiter)
                        .with_context(|| format!("reading {}", path.display()))?
                        .data,
                )),
                None if init.trim().eq_ignore_ascii_case("manual") => {
                    return Err(anyhow!("--init manual needs --centroids"));
                }
                None => None,
            };

            let request = ClusterRequest {
                data: vectors(&ds.data),
                k,
                init_method: init,
                manual_centroids,
                seed,
                max_iters: Some(max_iters),
                tolerance: Some(tolerance),
                trace,
            };
            let response = request::handle(&request)?;
            info!(
                points = response.clusters.len(),
                k,
                converged = response.converged,
                "assigned points"
            );

            if let Some(outfile) = outfile {
                write_labels(&outfile, &response.clusters)?;
            }
            println!("{}", serde_json::to_string(&response)?);
        }
        Command::Request { input } => {
            let mut body = String::new();
            match input {
                Some(path) => {
                    body = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?
                }
                None => {
                    std::io::stdin().read_to_string(&mut body)?;
                }
            }

            let (status, reply) = request::respond(&body);
            println!("{reply}");
            match status {
                200 => {}
                400..=499 => std::process::exit(1),
                _ => std::process::exit(2),
            }
        }
        Command::Generate { n, low, high, seed } => {
            let mut rng = match seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };
            let points: Vec<Coord> = uniform_points(n, low, high, &mut rng)?
                .outer_iter()
                .map(|p| Coord::xy(p[0], p[1]))
                .collect();
            println!("{}", serde_json::to_string(&points)?);
        }
    }

    Ok(())
}
