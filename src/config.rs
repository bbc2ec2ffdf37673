use ndarray::Array2;
use std::fmt;
use std::str::FromStr;

use crate::error::{ClusterError, Result};

/// Iteration cap used by the command line and the request contract when the
/// caller does not pick one.
pub const DEFAULT_MAX_ITERS: usize = 100;

/// How the starting centroids are chosen.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InitMethod {
    /// K distinct data points drawn uniformly without replacement.
    #[default]
    Random,
    /// Farthest-first traversal from one random starting point.
    Farthest,
    /// Seeding weighted by squared distance to the nearest chosen centroid.
    KMeansPlusPlus,
    /// Caller-supplied centroids, used verbatim (K rows × D columns).
    Manual(Array2<f64>),
}

impl InitMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Farthest => "farthest",
            Self::KMeansPlusPlus => "kmeans++",
            Self::Manual(_) => "manual",
        }
    }
}

impl fmt::Display for InitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses the method name. `manual` yields an empty 0×0 centroid set which
/// the caller has to replace before building an engine.
impl FromStr for InitMethod {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "farthest" | "farthest-first" => Ok(Self::Farthest),
            "kmeans++" | "k-means++" => Ok(Self::KMeansPlusPlus),
            "manual" => Ok(Self::Manual(Array2::zeros((0, 0)))),
            other => Err(ClusterError::config(format!(
                "unsupported init method '{other}' (expected random, farthest, kmeans++ or manual)"
            ))),
        }
    }
}

/// Settings for one [`ClusterEngine`](crate::ClusterEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of clusters.
    pub k: usize,
    /// Centroid seeding strategy.
    pub init: InitMethod,
    /// Seed for the engine's generator; `None` draws one from the OS.
    pub seed: Option<u64>,
    /// Largest per-coordinate centroid move still counted as converged.
    /// `0.0` demands bit-identical centroids.
    pub tolerance: f64,
}

impl EngineConfig {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            init: InitMethod::default(),
            seed: None,
            tolerance: 0.0,
        }
    }

    pub fn init(mut self, init: InitMethod) -> Self {
        self.init = init;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Checks everything that can be checked against the dataset shape.
    pub(crate) fn validate(&self, n_points: usize, dim: usize) -> Result<()> {
        if self.k < 1 {
            return Err(ClusterError::config("k must be at least 1"));
        }
        if self.k > n_points {
            return Err(ClusterError::config(format!(
                "k ({}) exceeds the number of points ({n_points})",
                self.k
            )));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ClusterError::config(format!(
                "tolerance must be a finite value >= 0, got {}",
                self.tolerance
            )));
        }
        if let InitMethod::Manual(centroids) = &self.init {
            if centroids.nrows() != self.k {
                return Err(ClusterError::config(format!(
                    "manual initialization needs exactly {} centroids, got {}",
                    self.k,
                    centroids.nrows()
                )));
            }
            if centroids.ncols() != dim {
                return Err(ClusterError::config(format!(
                    "manual centroids have {} dimensions but the data has {dim}",
                    centroids.ncols()
                )));
            }
            if centroids.iter().any(|v| !v.is_finite()) {
                return Err(ClusterError::config(
                    "manual centroids contain a non-finite coordinate",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_parse_init_method() {
        assert_eq!("random".parse::<InitMethod>().unwrap(), InitMethod::Random);
        assert_eq!(" Farthest ".parse::<InitMethod>().unwrap(), InitMethod::Farthest);
        assert_eq!("kmeans++".parse::<InitMethod>().unwrap(), InitMethod::KMeansPlusPlus);
        assert_eq!("k-means++".parse::<InitMethod>().unwrap(), InitMethod::KMeansPlusPlus);
        assert!(matches!("manual".parse::<InitMethod>().unwrap(), InitMethod::Manual(_)));
        assert!("median".parse::<InitMethod>().is_err());
    }

    #[test]
    fn test_display_round_trips_names() {
        for name in ["random", "farthest", "kmeans++", "manual"] {
            assert_eq!(name.parse::<InitMethod>().unwrap().to_string(), name);
        }
    }

    #[test]
    fn test_validate_k_bounds() {
        assert!(EngineConfig::new(0).validate(4, 2).is_err());
        assert!(EngineConfig::new(5).validate(4, 2).is_err());
        assert!(EngineConfig::new(4).validate(4, 2).is_ok());
    }

    #[test]
    fn test_validate_tolerance() {
        assert!(EngineConfig::new(2).tolerance(-1.0).validate(4, 2).is_err());
        assert!(EngineConfig::new(2).tolerance(f64::NAN).validate(4, 2).is_err());
        assert!(EngineConfig::new(2).tolerance(1e-6).validate(4, 2).is_ok());
    }

    #[test]
    fn test_validate_manual_shape() {
        let wrong_count = EngineConfig::new(2).init(InitMethod::Manual(array![[0.0, 0.0]]));
        assert!(wrong_count.validate(4, 2).is_err());

        let wrong_dim = EngineConfig::new(2).init(InitMethod::Manual(array![[0.0], [1.0]]));
        assert!(wrong_dim.validate(4, 2).is_err());

        let not_finite =
            EngineConfig::new(1).init(InitMethod::Manual(array![[f64::INFINITY, 0.0]]));
        assert!(not_finite.validate(4, 2).is_err());

        let ok = EngineConfig::new(2).init(InitMethod::Manual(array![[0.0, 0.0], [1.0, 1.0]]));
        assert!(ok.validate(4, 2).is_ok());
    }
}
