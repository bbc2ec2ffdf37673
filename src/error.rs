use thiserror::Error;

/// Everything the engine and its input/output helpers can fail with.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Bad K, malformed manual centroids, empty or ragged data.
    /// Detected before any iteration runs.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// An operation was called in the wrong lifecycle phase.
    #[error("state error: {0}")]
    State(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClusterError>;

impl ClusterError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// HTTP-style status for the request/response contract:
    /// caller mistakes are 400, engine defects are 500.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Configuration(_) | Self::Csv(_) | Self::Json(_) => 400,
            Self::State(_) | Self::Io(_) => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}
