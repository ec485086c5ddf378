//! Acquisition error types

use std::path::PathBuf;

use contracts::{CameraError, ContractError};
use illumination::IlluminationError;
use thiserror::Error;

/// Acquisition Controller error
///
/// Every variant aborts the run.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Illumination protocol failure (stall, resends exhausted, transport)
    #[error("illumination failed: {0}")]
    Illumination(#[from] IlluminationError),

    /// Camera failure (device contention or capture fault)
    #[error("camera failed: {0}")]
    Camera(#[from] CameraError),

    /// Artifact directory or commit failure
    #[error("artifact store error at '{}': {source}", path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl AcquisitionError {
    /// Create artifact store error
    pub fn store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Store {
            path: path.into(),
            source,
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, AcquisitionError>;
