//! Error taxonomy for the engine.
//!
//! Only genuinely broken setups are errors. "No data" and "insufficient
//! sample for significance" are legitimate computed states carried on
//! results, never raised through here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed definition or request. Aborts the whole calculation;
    /// never silently repaired.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Cooperative cancellation observed at a tree-node boundary. The
    /// partially built tree is discarded, never returned.
    #[error("calculation cancelled")]
    Cancelled,

    /// A collaborator (answer source, configuration provider, weighting
    /// repository) failed. Propagated as-is; retries belong to the
    /// collaborator.
    #[error("upstream collaborator failure: {0}")]
    Upstream(#[from] anyhow::Error),
}

impl EngineError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        EngineError::InvalidConfiguration {
            message: message.into(),
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        matches!(self, EngineError::InvalidConfiguration { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
