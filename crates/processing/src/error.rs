//! Processing error types

use std::path::PathBuf;

use contracts::ContractError;
use sync_engine::SyncError;
use thiserror::Error;

/// Batch processing error
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Dataset directory unreadable or malformed
    #[error("dataset '{}': {message}", dir.display())]
    Dataset { dir: PathBuf, message: String },

    /// File count does not match positions × exposures
    #[error("incomplete dataset: found {found} images, expected {expected}")]
    IncompleteDataset { found: usize, expected: usize },

    /// HDR fusion called with mismatched or empty inputs
    #[error("fusion precondition violated: {exposures} exposures for {images} images")]
    FusionPrecondition { exposures: usize, images: usize },

    /// Images of different shapes in one burst
    #[error("shape mismatch: {message}")]
    Shape { message: String },

    /// Response curve could not be solved
    #[error("response calibration failed: {message}")]
    Calibration { message: String },

    /// Blocking worker panicked or was cancelled
    #[error("worker failed: {message}")]
    Worker { message: String },

    /// Image IO or memory gate
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl ProcessingError {
    pub fn dataset(dir: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Dataset {
            dir: dir.into(),
            message: message.into(),
        }
    }

    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape {
            message: message.into(),
        }
    }

    pub fn calibration(message: impl Into<String>) -> Self {
        Self::Calibration {
            message: message.into(),
        }
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProcessingError>;
