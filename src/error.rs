use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors surfaced to the host engine. Both categories are fatal for the
/// batch (or, for `Config`, fatal before any batch is processed): the core
/// never produces partial output for a failed group.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed input record: {0}")]
    MalformedInput(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::MalformedInput(err.to_string())
    }
}
