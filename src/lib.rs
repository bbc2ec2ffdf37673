//! Steppable K-means clustering.
//!
//! ```
//! use kmeans_engine::{ClusterEngine, EngineConfig, InitMethod};
//! use ndarray::array;
//!
//! let data = array![[0.0, 0.0], [0.0, 1.0], [10.0, 0.0], [10.0, 1.0]];
//! let config = EngineConfig::new(2)
//!     .init(InitMethod::Manual(array![[0.0, 0.0], [10.0, 0.0]]));
//! let mut engine = ClusterEngine::new(data, config)?;
//! engine.initialize()?;
//!
//! let first = engine.step()?;
//! assert_eq!(first.labels, vec![0, 0, 1, 1]);
//! assert!(!first.converged);
//!
//! let outcome = engine.run(100)?;
//! assert!(outcome.converged);
//! assert_eq!(outcome.centroids, array![[0.0, 0.5], [10.0, 0.5]]);
//! # Ok::<(), kmeans_engine::ClusterError>(())
//! ```

pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod request;

pub use config::{EngineConfig, InitMethod, DEFAULT_MAX_ITERS};
pub use dataset::DataSet;
pub use engine::{
    euclidean_distance, ClusterEngine, Phase, PlotData, PlotPoint, RunOutcome, Snapshot,
    StepOutcome,
};
pub use error::{ClusterError, Result};
pub use request::{ClusterRequest, ClusterResponse, Coord, ErrorResponse, XyPoint};
