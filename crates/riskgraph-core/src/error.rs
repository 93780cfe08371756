use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskGraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Node not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A clustering backend could not run on the current graph. Callers fall
    /// back to a simpler strategy instead of surfacing this.
    #[error("Algorithm unavailable: {0}")]
    AlgorithmUnavailable(String),

    /// The optional influence predictor failed or is not reachable.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Query cancelled after visiting {visited} nodes")]
    Cancelled { visited: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl RiskGraphError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// True for errors that describe the caller's request rather than a
    /// failure inside the engine.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, RiskGraphError>;
