use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::error::Elapsed;

use crate::transport::TransportError;

/// Why a property could not be read
///
/// Distinct from a property that is simply not set, which reads as `None`.
#[derive(Error, Debug)]
pub enum PropertyError {
    #[error("Interrupted while fetching property {key}")]
    Interrupted {
        key: String,
        #[source]
        source: oneshot::error::RecvError,
    },

    #[error("Device failed to return property {key}: {source}")]
    Execution {
        key: String,
        #[source]
        source: TransportError,
    },

    #[error("Timed out fetching property {key}")]
    Timeout {
        key: String,
        #[source]
        source: Elapsed,
    },
}

impl PropertyError {
    /// The property key that was being fetched
    pub fn key(&self) -> &str {
        match self {
            PropertyError::Interrupted { key, .. }
            | PropertyError::Execution { key, .. }
            | PropertyError::Timeout { key, .. } => key,
        }
    }
}
