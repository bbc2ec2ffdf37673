use ndarray::{Array2, ArrayView1};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, InitMethod};
use crate::error::{ClusterError, Result};

/// Lifecycle of one clustering run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initialized,
    Stepping,
    Converged,
}

/// Result of a single [`ClusterEngine::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Centroids after the update.
    pub centroids: Array2<f64>,
    /// Labels of this step, computed against the pre-update centroids.
    pub labels: Vec<usize>,
    pub converged: bool,
}

/// Intermediate state recorded by [`ClusterEngine::run_traced`].
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub centroids: Array2<f64>,
    pub labels: Vec<usize>,
}

/// Final state of [`ClusterEngine::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub centroids: Array2<f64>,
    pub labels: Vec<usize>,
    pub converged: bool,
    /// Steps executed since the last `initialize()`.
    pub iterations: usize,
    /// One snapshot per step of this call; only filled by `run_traced`.
    pub steps: Option<Vec<Snapshot>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotPoint {
    pub x: f64,
    pub y: f64,
    pub cluster: usize,
}

/// Everything a 2-D scatter plot needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotData {
    pub points: Vec<PlotPoint>,
    pub centroids: Vec<[f64; 2]>,
}

/// Steppable K-means over one immutable dataset.
///
/// Call [`initialize`](Self::initialize) first, then either [`step`](Self::step)
/// repeatedly or [`run`](Self::run). Once a step reports convergence the
/// engine parks in [`Phase::Converged`]: further `step()` calls are no-ops
/// that return the same centroids and labels.
///
/// Empty clusters keep their previous centroid. Each engine owns its own
/// seedable generator, so independent engines never share random state.
#[derive(Debug, Clone)]
pub struct ClusterEngine {
    data: Array2<f64>,
    k: usize,
    init: InitMethod,
    tolerance: f64,
    rng: ChaCha8Rng,
    centroids: Option<Array2<f64>>,
    labels: Option<Vec<usize>>,
    converged: bool,
    iterations: usize,
}

impl ClusterEngine {
    /// Validate the dataset and configuration and build an uninitialized engine.
    pub fn new(data: Array2<f64>, config: EngineConfig) -> Result<Self> {
        if data.nrows() == 0 {
            return Err(ClusterError::config("dataset is empty"));
        }
        if data.ncols() == 0 {
            return Err(ClusterError::config("points need at least one dimension"));
        }
        if let Some(row) = data
            .outer_iter()
            .position(|p| p.iter().any(|v| !v.is_finite()))
        {
            return Err(ClusterError::config(format!(
                "point {row} has a non-finite coordinate"
            )));
        }
        config.validate(data.nrows(), data.ncols())?;
        match &config.init {
            InitMethod::Manual(centroids) => check_range(&data, Some(centroids))?,
            _ => check_range(&data, None)?,
        }

        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        debug!(
            n = data.nrows(),
            dim = data.ncols(),
            k = config.k,
            init = %config.init,
            "engine constructed"
        );

        Ok(Self {
            data,
            k: config.k,
            init: config.init,
            tolerance: config.tolerance,
            rng,
            centroids: None,
            labels: None,
            converged: false,
            iterations: 0,
        })
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn init_method(&self) -> &InitMethod {
        &self.init
    }

    pub fn centroids(&self) -> Option<&Array2<f64>> {
        self.centroids.as_ref()
    }

    pub fn labels(&self) -> Option<&[usize]> {
        self.labels.as_deref()
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn phase(&self) -> Phase {
        match (&self.centroids, self.converged, self.iterations) {
            (None, _, _) => Phase::Uninitialized,
            (Some(_), true, _) => Phase::Converged,
            (Some(_), false, 0) => Phase::Initialized,
            (Some(_), false, _) => Phase::Stepping,
        }
    }

    /// Seed the starting centroids with the configured strategy.
    ///
    /// Labels are not computed here. Calling this again starts a fresh run:
    /// labels, convergence and the iteration counter are reset.
    pub fn initialize(&mut self) -> Result<&Array2<f64>> {
        let n = self.data.nrows();
        if self.k > n {
            return Err(ClusterError::config(format!(
                "k ({}) exceeds the number of points ({n})",
                self.k
            )));
        }

        let centroids = match &self.init {
            InitMethod::Random => random_init(&self.data, self.k, &mut self.rng),
            InitMethod::Farthest => farthest_init(&self.data, self.k, &mut self.rng),
            InitMethod::KMeansPlusPlus => kmeans_pp_init(&self.data, self.k, &mut self.rng),
            InitMethod::Manual(centroids) => centroids.clone(),
        };

        self.labels = None;
        self.converged = false;
        self.iterations = 0;
        debug!(init = %self.init, k = self.k, "centroids initialized");
        Ok(&*self.centroids.insert(centroids))
    }

    /// Label every point with its nearest centroid (lowest index on ties).
    pub fn assign_labels(&mut self) -> Result<&[usize]> {
        let labels = assign(&self.data, self.current_centroids()?);
        Ok(self.labels.insert(labels).as_slice())
    }

    /// Candidate centroids from the current labels, without committing them.
    /// A cluster that lost all its points keeps its previous centroid.
    pub fn update_centroids(&self) -> Result<Array2<f64>> {
        let current = self.current_centroids()?;
        let labels = self.labels.as_deref().ok_or_else(|| {
            ClusterError::state("update_centroids() called before labels were assigned")
        })?;
        let (candidate, empty) = recompute(&self.data, labels, current);
        for cluster in empty {
            warn!(cluster, "empty cluster keeps its previous centroid");
        }
        Ok(candidate)
    }

    /// One assignment + update iteration.
    pub fn step(&mut self) -> Result<StepOutcome> {
        self.current_centroids()?;
        if self.converged {
            return self.current_outcome();
        }

        self.assign_labels()?;
        let candidate = self.update_centroids()?;
        let previous = self.current_centroids()?;
        let converged = has_converged(previous, &candidate, self.tolerance);
        let shift = max_shift(previous, &candidate);

        self.centroids = Some(candidate);
        self.converged = converged;
        self.iterations += 1;
        debug!(iteration = self.iterations, shift, converged, "step complete");

        self.current_outcome()
    }

    /// Step until converged or `max_iters` steps have run in this call.
    /// Hitting the cap is a normal outcome, reported via `converged = false`.
    pub fn run(&mut self, max_iters: usize) -> Result<RunOutcome> {
        self.run_inner(max_iters, false)
    }

    /// Like [`run`](Self::run), also recording one snapshot per step.
    pub fn run_traced(&mut self, max_iters: usize) -> Result<RunOutcome> {
        self.run_inner(max_iters, true)
    }

    /// Sum of squared distances from every point to its nearest current
    /// centroid. `None` before the first step.
    ///
    /// Stored labels belong to the pre-update centroids, so they are not used
    /// here; after a capped, unconverged run this is the objective of the
    /// returned centroids.
    pub fn inertia(&self) -> Option<f64> {
        let centroids = self.centroids.as_ref()?;
        self.labels.as_ref()?;
        Some(
            self.data
                .outer_iter()
                .map(|p| {
                    centroids
                        .outer_iter()
                        .map(|c| squared_distance(p, c))
                        .fold(f64::INFINITY, f64::min)
                })
                .sum(),
        )
    }

    /// Points, labels and centroids for a scatter plot. Only for 2-D data.
    pub fn plot_points(&self) -> Result<PlotData> {
        if self.data.ncols() != 2 {
            return Err(ClusterError::config(format!(
                "plotting needs 2-dimensional data, got {} dimensions",
                self.data.ncols()
            )));
        }
        let centroids = self.current_centroids()?;
        let labels = self
            .labels
            .as_ref()
            .ok_or_else(|| ClusterError::state("nothing to plot before the first step"))?;

        let points = self
            .data
            .outer_iter()
            .zip(labels)
            .map(|(p, &cluster)| PlotPoint { x: p[0], y: p[1], cluster })
            .collect();
        let centroids = centroids.outer_iter().map(|c| [c[0], c[1]]).collect();
        Ok(PlotData { points, centroids })
    }

    fn current_centroids(&self) -> Result<&Array2<f64>> {
        self.centroids
            .as_ref()
            .ok_or_else(|| ClusterError::state("engine is not initialized; call initialize() first"))
    }

    fn current_outcome(&self) -> Result<StepOutcome> {
        Ok(StepOutcome {
            centroids: self.current_centroids()?.clone(),
            labels: self.labels.clone().unwrap_or_default(),
            converged: self.converged,
        })
    }

    fn run_inner(&mut self, max_iters: usize, trace: bool) -> Result<RunOutcome> {
        if max_iters < 1 {
            return Err(ClusterError::config("max_iters must be at least 1"));
        }
        self.current_centroids()?;

        let mut steps = trace.then(Vec::new);
        let mut executed = 0;
        while !self.converged && executed < max_iters {
            let outcome = self.step()?;
            executed += 1;
            if let Some(steps) = steps.as_mut() {
                steps.push(Snapshot {
                    centroids: outcome.centroids,
                    labels: outcome.labels,
                });
            }
        }

        if self.converged {
            info!(iterations = self.iterations, "k-means converged");
        } else {
            info!(max_iters, "k-means stopped at the iteration cap without converging");
        }

        let last = self.current_outcome()?;
        Ok(RunOutcome {
            centroids: last.centroids,
            labels: last.labels,
            converged: last.converged,
            iterations: self.iterations,
            steps,
        })
    }
}

#[inline]
fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Euclidean distance between two points of equal dimension.
#[inline]
pub fn euclidean_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    squared_distance(a, b).sqrt()
}

/// Rejects inputs whose squared distances or coordinate sums would overflow.
/// Every weight, mean and distance computed later stays finite.
fn check_range(data: &Array2<f64>, extra: Option<&Array2<f64>>) -> Result<()> {
    let rows = data.nrows() + extra.map_or(0, |e| e.nrows());
    let mut extent_sq = 0.0;
    let mut magnitude: f64 = 0.0;
    for d in 0..data.ncols() {
        let (lo, hi) = data
            .column(d)
            .into_iter()
            .chain(extra.into_iter().flat_map(|e| e.column(d).into_iter()))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        extent_sq += (hi - lo) * (hi - lo);
        magnitude = magnitude.max(lo.abs()).max(hi.abs());
    }
    let n = rows as f64;
    if !(extent_sq * n).is_finite() || !(magnitude * n).is_finite() {
        return Err(ClusterError::config(
            "coordinates are too large: squared distances between points overflow",
        ));
    }
    Ok(())
}

fn gather_rows(data: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros((indices.len(), data.ncols()));
    for (ci, &idx) in indices.iter().enumerate() {
        out.row_mut(ci).assign(&data.row(idx));
    }
    out
}

fn random_init(data: &Array2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
    let picks = sample(rng, data.nrows(), k).into_vec();
    gather_rows(data, &picks)
}

/// Shared bookkeeping for the two sequential seeding strategies: the chosen
/// indices and each point's squared distance to its nearest chosen centroid.
struct Seeding {
    chosen: Vec<usize>,
    selected: Vec<bool>,
    nearest: Vec<f64>,
}

impl Seeding {
    fn start(data: &Array2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Self {
        let first = rng.gen_range(0..data.nrows());
        let mut seeding = Self {
            chosen: Vec::with_capacity(k),
            selected: vec![false; data.nrows()],
            nearest: vec![f64::INFINITY; data.nrows()],
        };
        seeding.push(data, first);
        seeding
    }

    fn push(&mut self, data: &Array2<f64>, idx: usize) {
        self.chosen.push(idx);
        self.selected[idx] = true;
        let centroid = data.row(idx);
        for (d, p) in self.nearest.iter_mut().zip(data.outer_iter()) {
            *d = d.min(squared_distance(p, centroid));
        }
    }

    // k <= n keeps at least one index unselected while seeding.
    fn first_unselected(&self) -> usize {
        self.selected.iter().position(|s| !s).unwrap_or(0)
    }
}

fn farthest_init(data: &Array2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
    let mut seeding = Seeding::start(data, k, rng);
    while seeding.chosen.len() < k {
        let mut best = seeding.first_unselected();
        let mut best_dist = f64::NEG_INFINITY;
        for (i, &d) in seeding.nearest.iter().enumerate() {
            if !seeding.selected[i] && d > best_dist {
                best = i;
                best_dist = d;
            }
        }
        seeding.push(data, best);
    }
    gather_rows(data, &seeding.chosen)
}

fn kmeans_pp_init(data: &Array2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
    let mut seeding = Seeding::start(data, k, rng);
    while seeding.chosen.len() < k {
        let total: f64 = seeding.nearest.iter().sum();
        let weights = if total.is_finite() && total > 0.0 {
            WeightedIndex::new(&seeding.nearest).ok()
        } else {
            None
        };
        let next = match weights {
            Some(weights) => weights.sample(rng),
            None => {
                let fallback = seeding.first_unselected();
                debug!(total, fallback, "k-means++ weights degenerate, taking first unselected point");
                fallback
            }
        };
        seeding.push(data, next);
    }
    gather_rows(data, &seeding.chosen)
}

fn assign(data: &Array2<f64>, centroids: &Array2<f64>) -> Vec<usize> {
    data.outer_iter()
        .map(|p| {
            let mut best_cluster = 0;
            let mut best_dist = f64::INFINITY;
            for (ci, c) in centroids.outer_iter().enumerate() {
                let dist = squared_distance(p, c);
                if dist < best_dist {
                    best_dist = dist;
                    best_cluster = ci;
                }
            }
            best_cluster
        })
        .collect()
}

/// Cluster means; clusters without members copy their row from `previous`.
/// Returns the new centroids and the indices of the empty clusters.
fn recompute(
    data: &Array2<f64>,
    labels: &[usize],
    previous: &Array2<f64>,
) -> (Array2<f64>, Vec<usize>) {
    let k = previous.nrows();
    let mut sums = Array2::<f64>::zeros((k, data.ncols()));
    let mut counts = vec![0usize; k];

    for (row, &c) in data.outer_iter().zip(labels) {
        let mut acc = sums.row_mut(c);
        acc += &row;
        counts[c] += 1;
    }

    let mut empty = Vec::new();
    for (ci, &count) in counts.iter().enumerate() {
        if count > 0 {
            sums.row_mut(ci).mapv_inplace(|x| x / count as f64);
        } else {
            sums.row_mut(ci).assign(&previous.row(ci));
            empty.push(ci);
        }
    }
    (sums, empty)
}

// With tolerance 0 this is exact equality.
fn has_converged(old: &Array2<f64>, new: &Array2<f64>, tolerance: f64) -> bool {
    old.iter().zip(new.iter()).all(|(a, b)| (a - b).abs() <= tolerance)
}

fn max_shift(old: &Array2<f64>, new: &Array2<f64>) -> f64 {
    old.outer_iter()
        .zip(new.outer_iter())
        .map(|(a, b)| euclidean_distance(a, b))
        .fold(0.0, f64::max)
}
