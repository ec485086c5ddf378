//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Command-line overrides produced an invalid configuration
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    /// No transport to the illumination controller in this build
    #[error("Illumination transport unavailable: {message}")]
    TransportUnavailable { message: String },

    /// Some downloads failed, so the dataset cannot be processed
    #[error("Sync incomplete: {failed} of {dispatched} artifacts failed")]
    IncompleteSync { failed: usize, dispatched: usize },

    /// Interrupted by Ctrl+C or SIGTERM
    #[error("Interrupted during {stage}")]
    Interrupted { stage: &'static str },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    #[cfg_attr(feature = "mqtt", allow(dead_code))]
    pub fn transport_unavailable(message: impl Into<String>) -> Self {
        Self::TransportUnavailable {
            message: message.into(),
        }
    }

    pub fn incomplete_sync(failed: usize, dispatched: usize) -> Self {
        Self::IncompleteSync { failed, dispatched }
    }

    pub fn interrupted(stage: &'static str) -> Self {
        Self::Interrupted { stage }
    }
}
