use thiserror::Error;

/// Failure of a ranked candidate-path request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("API endpoint is not configured")]
    EmptyEndpoint,
    #[error("no candidate path succeeded: {last_error}")]
    Exhausted { last_error: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
