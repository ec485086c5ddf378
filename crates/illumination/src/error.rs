//! Illumination client error types

use contracts::{ContractError, Position};
use thiserror::Error;

/// Illumination Sync Client error
#[derive(Debug, Error)]
pub enum IlluminationError {
    /// A previous command has not been acknowledged yet
    #[error("command for position {pending} still awaiting acknowledgement")]
    CommandInFlight { pending: Position },

    /// Controller kept dropping the command
    #[error("command '{command}' not acknowledged after {resends} resends")]
    ResendsExhausted { command: String, resends: u32 },

    /// No status traffic for longer than the stall timeout
    #[error("controller silent for {waited_ms} ms while awaiting ack for '{command}'")]
    Stalled { command: String, waited_ms: u64 },

    /// Inbound status stream ended
    #[error("status stream closed")]
    StatusStreamClosed,

    /// Wrapped ContractError (transport failures)
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl IlluminationError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CommandInFlight { .. } => "in_flight",
            Self::ResendsExhausted { .. } => "resends_exhausted",
            Self::Stalled { .. } => "stalled",
            Self::StatusStreamClosed => "stream_closed",
            Self::Contract(_) => "transport",
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, IlluminationError>;
