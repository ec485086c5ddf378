//! Layered error definitions
//!
//! Categorized by source: config / transport / artifact / codec

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Transport Errors =====
    /// Message transport failure (publish or connection)
    #[error("transport '{transport}' error: {message}")]
    Transport { transport: String, message: String },

    /// Malformed protocol payload
    #[error("protocol error: {message}")]
    Protocol { message: String },

    // ===== Artifact Errors =====
    /// Artifact name does not follow `img<p>_<e>us<ext>`
    #[error("invalid artifact name '{name}': {message}")]
    ArtifactName { name: String, message: String },

    /// Raw frame codec error
    #[error("raw codec error: {message}")]
    RawCodec { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create transport error
    pub fn transport(transport: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            transport: transport.into(),
            message: message.into(),
        }
    }

    /// Create protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create artifact name error
    pub fn artifact_name(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ArtifactName {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create raw codec error
    pub fn raw_codec(message: impl Into<String>) -> Self {
        Self::RawCodec {
            message: message.into(),
        }
    }
}
