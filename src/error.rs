//! Typed failures raised by the engine's request surface.
//!
//! Only [`EngineError::NoActiveAlgorithm`] and [`EngineError::AlgorithmNotFound`]
//! are hard failures for callers. Provider and persistence problems are logged
//! where they happen and degrade to empty results or in-memory defaults; the
//! variants exist so bulk reports and explicit import/export calls can name
//! them.

use crate::algorithm::Capability;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("candidate source `{source_name}` unavailable: {reason}")]
    ProviderUnavailable { source_name: String, reason: String },

    #[error("no algorithm is active; select one before scoring or ranking")]
    NoActiveAlgorithm,

    #[error("algorithm `{0}` is not registered")]
    AlgorithmNotFound(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("algorithm `{id}` failed: {reason}")]
    Plugin { id: String, reason: String },

    #[error("algorithm `{id}` does not support {capability}")]
    Unsupported { id: String, capability: Capability },

    #[error("a training run is already in progress")]
    TrainingInProgress,
}

impl EngineError {
    /// Wrap a plugin's `anyhow` error with the plugin id.
    pub(crate) fn plugin(id: &str, err: &anyhow::Error) -> Self {
        Self::Plugin {
            id: id.to_string(),
            reason: format!("{err:#}"),
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
