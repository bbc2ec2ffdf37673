//! JSON request/response contract for callers that drive the engine from
//! outside the process (a web front end, a pipe, a script).
//!
//! A request carries the points, `k`, the seeding method and, for manual
//! seeding, the starting centroids:
//!
//! ```json
//! { "data": [{"x": 0, "y": 0}, {"x": 10, "y": 1}], "k": 2, "initMethod": "kmeans++" }
//! ```
//!
//! Points are either `{x, y}` objects or plain arrays of any length. The
//! response answers in the same style.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::{EngineConfig, InitMethod, DEFAULT_MAX_ITERS};
use crate::engine::{ClusterEngine, Snapshot};
use crate::error::{ClusterError, Result};

/// A 2-D point written as `{x, y}`. Any other key is rejected so a
/// higher-dimensional object can't be read as a 2-D point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct XyPoint {
    pub x: f64,
    pub y: f64,
}

/// One point on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coord {
    Xy(XyPoint),
    Vector(Vec<f64>),
}

impl Coord {
    pub fn xy(x: f64, y: f64) -> Self {
        Self::Xy(XyPoint { x, y })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoordStyle {
    Xy,
    Vector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRequest {
    pub data: Vec<Coord>,
    pub k: usize,
    /// `random`, `farthest`, `kmeans++` or `manual`.
    pub init_method: String,
    #[serde(default, alias = "centroids", skip_serializing_if = "Option::is_none")]
    pub manual_centroids: Option<Vec<Coord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iters: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    /// Return one snapshot per iteration in `steps`.
    #[serde(default)]
    pub trace: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub centroids: Vec<Coord>,
    pub clusters: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResponse {
    pub centroids: Vec<Coord>,
    /// Cluster index per input point, in input order.
    pub clusters: Vec<usize>,
    pub converged: bool,
    pub iterations: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inertia: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<StepSnapshot>>,
}

/// Body sent back instead of a [`ClusterResponse`] when a request fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub error: String,
}

impl From<&ClusterError> for ErrorResponse {
    fn from(err: &ClusterError) -> Self {
        Self {
            status: err.status_code(),
            error: err.to_string(),
        }
    }
}

fn coords_to_matrix(coords: &[Coord], field: &str) -> Result<(Array2<f64>, CoordStyle)> {
    let first = coords
        .first()
        .ok_or_else(|| ClusterError::config(format!("'{field}' must not be empty")))?;
    let style = match first {
        Coord::Xy(_) => CoordStyle::Xy,
        Coord::Vector(_) => CoordStyle::Vector,
    };
    let dim = match first {
        Coord::Xy(_) => 2,
        Coord::Vector(v) => v.len(),
    };

    let mut flat = Vec::with_capacity(coords.len() * dim);
    for (i, coord) in coords.iter().enumerate() {
        match (style, coord) {
            (CoordStyle::Xy, Coord::Xy(p)) => flat.extend([p.x, p.y]),
            (CoordStyle::Vector, Coord::Vector(v)) if v.len() == dim => flat.extend(v),
            (CoordStyle::Vector, Coord::Vector(v)) => {
                return Err(ClusterError::config(format!(
                    "'{field}'[{i}] has {} dimensions, expected {dim}",
                    v.len()
                )))
            }
            _ => {
                return Err(ClusterError::config(format!(
                    "'{field}'[{i}] mixes {{x, y}} objects with coordinate arrays"
                )))
            }
        }
    }
    let matrix = Array2::from_shape_vec((coords.len(), dim), flat)
        .map_err(|e| ClusterError::config(format!("cannot shape '{field}': {e}")))?;
    Ok((matrix, style))
}

fn matrix_to_coords(matrix: &Array2<f64>, style: CoordStyle) -> Vec<Coord> {
    matrix
        .outer_iter()
        .map(|row| match style {
            CoordStyle::Xy => Coord::xy(row[0], row[1]),
            CoordStyle::Vector => Coord::Vector(row.to_vec()),
        })
        .collect()
}

/// Rows of `matrix` as coordinate arrays.
pub fn vectors(matrix: &Array2<f64>) -> Vec<Coord> {
    matrix_to_coords(matrix, CoordStyle::Vector)
}

fn snapshot_to_wire(snapshot: Snapshot, style: CoordStyle) -> StepSnapshot {
    StepSnapshot {
        centroids: matrix_to_coords(&snapshot.centroids, style),
        clusters: snapshot.labels,
    }
}

/// Build an engine for the request, seed it, run it and report the result.
#[instrument(skip(request), fields(n = request.data.len(), k = request.k, init = %request.init_method))]
pub fn handle(request: &ClusterRequest) -> Result<ClusterResponse> {
    let (data, style) = coords_to_matrix(&request.data, "data")?;

    let mut init: InitMethod = request.init_method.parse()?;
    if matches!(init, InitMethod::Manual(_)) {
        let coords = request.manual_centroids.as_deref().ok_or_else(|| {
            ClusterError::config("initMethod 'manual' needs 'manualCentroids'")
        })?;
        let (centroids, _) = coords_to_matrix(coords, "manualCentroids")?;
        init = InitMethod::Manual(centroids);
    }

    let mut config = EngineConfig::new(request.k).init(init);
    if let Some(seed) = request.seed {
        config = config.seed(seed);
    }
    if let Some(tolerance) = request.tolerance {
        config = config.tolerance(tolerance);
    }

    let mut engine = ClusterEngine::new(data, config)?;
    engine.initialize()?;
    let max_iters = request.max_iters.unwrap_or(DEFAULT_MAX_ITERS);
    let outcome = if request.trace {
        engine.run_traced(max_iters)?
    } else {
        engine.run(max_iters)?
    };
    info!(
        converged = outcome.converged,
        iterations = outcome.iterations,
        "request handled"
    );

    Ok(ClusterResponse {
        centroids: matrix_to_coords(&outcome.centroids, style),
        clusters: outcome.labels,
        converged: outcome.converged,
        iterations: outcome.iterations,
        inertia: engine.inertia(),
        steps: outcome.steps.map(|steps| {
            steps
                .into_iter()
                .map(|s| snapshot_to_wire(s, style))
                .collect()
        }),
    })
}

/// Parse a JSON request and serialize the JSON response.
pub fn handle_json(input: &str) -> Result<String> {
    let request: ClusterRequest = serde_json::from_str(input)?;
    let response = handle(&request)?;
    Ok(serde_json::to_string(&response)?)
}

/// Like [`handle_json`], but failures become an [`ErrorResponse`] body.
/// Returns the status code alongside the body.
pub fn respond(input: &str) -> (u16, String) {
    match handle_json(input) {
        Ok(body) => (200, body),
        Err(err) => {
            let body = serde_json::to_string(&ErrorResponse::from(&err))
                .unwrap_or_else(|_| format!("{{\"status\":500,\"error\":\"{err}\"}}"));
            (err.status_code(), body)
        }
    }
}
