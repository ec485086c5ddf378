//! Sync engine error types

use std::path::PathBuf;

use contracts::ContractError;
use thiserror::Error;

/// Host-side synchronization error
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote run could not be started
    #[error("failed to start remote run on '{host}': {message}")]
    Trigger { host: String, message: String },

    /// Directory listing failed
    #[error("artifact index '{index}' failed: {message}")]
    Index { index: String, message: String },

    /// Artifact download failed
    #[error("failed to fetch '{name}': {message}")]
    Fetch { name: String, message: String },

    /// Normalized image could not be written
    #[error("failed to write '{}': {message}", path.display())]
    Write { path: PathBuf, message: String },

    /// Memory gate closed
    #[error("memory gate closed")]
    GateClosed,

    /// Wrapped ContractError (artifact names, raw codec)
    #[error(transparent)]
    Contract(#[from] ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn trigger(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Trigger {
            host: host.into(),
            message: message.into(),
        }
    }

    pub fn index(index: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Index {
            index: index.into(),
            message: message.into(),
        }
    }

    pub fn fetch(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Write {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, SyncError>;
