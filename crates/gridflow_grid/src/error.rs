//! Error taxonomy shared by the CE and storage adapters.

use thiserror::Error;

/// Adapter failures, classified by what the caller should do next.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Worth retrying on a later sweep.
    #[error("transient: {0}")]
    Transient(String),

    /// Retrying will not help.
    #[error("permanent: {0}")]
    Permanent(String),

    /// The external command did not return within its deadline.
    #[error("timeout: {0}")]
    Timeout(String),
}

impl AdapterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Transient(_) | AdapterError::Timeout(_))
    }
}

impl From<crate::command::CommandError> for AdapterError {
    fn from(err: crate::command::CommandError) -> Self {
        match err {
            crate::command::CommandError::Timeout { .. } => AdapterError::Timeout(err.to_string()),
            crate::command::CommandError::Spawn { .. } => AdapterError::Transient(err.to_string()),
        }
    }
}
