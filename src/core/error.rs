use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Model output could not be turned into an extraction. Recovered locally
    /// as a clarification turn.
    #[error("Could not parse model output: {0}")]
    ExtractionParse(String),

    /// The generation backend failed, refused, or timed out.
    #[error("Generation error: {0}")]
    Generation(String),

    /// A store query failed while expanding search criteria.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// A single action's store mutation failed.
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
