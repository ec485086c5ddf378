//! Illumination controller wire protocol
//!
//! Request topic carries `PXL+<index>+<r>+<g>+<b>` or `CLEAR`.
//! Status topic carries `PXL DONE` (ack), `0` (busy) or `1` (ready).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ContractError, Position};

/// RGB triple driven onto one illumination position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Pattern off
    pub const OFF: Rgb = Rgb::new(0, 0, 0);

    /// Full red, the default acquisition color
    pub const RED: Rgb = Rgb::new(255, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn is_off(self) -> bool {
        self == Self::OFF
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Command published on the request topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Full assignment of one position's color
    SetPixel { position: Position, color: Rgb },
    /// Turn every position off
    Clear,
}

impl Command {
    /// Wire payload
    pub fn encode(&self) -> String {
        match self {
            Command::SetPixel { position, color } => {
                format!("PXL+{}+{}+{}+{}", position.0, color.r, color.g, color.b)
            }
            Command::Clear => "CLEAR".to_string(),
        }
    }

    /// Parse a wire payload
    pub fn parse(payload: &str) -> Result<Self, ContractError> {
        let payload = payload.trim();
        if payload == "CLEAR" {
            return Ok(Command::Clear);
        }

        let mut parts = payload.split('+');
        if parts.next() != Some("PXL") {
            return Err(ContractError::protocol(format!(
                "unknown command '{payload}'"
            )));
        }

        let fields: Vec<&str> = parts.collect();
        if fields.len() != 4 {
            return Err(ContractError::protocol(format!(
                "PXL expects 4 fields, got {} in '{payload}'",
                fields.len()
            )));
        }

        let index = fields[0]
            .parse::<u32>()
            .map_err(|e| ContractError::protocol(format!("bad index in '{payload}': {e}")))?;
        let channel = |s: &str| {
            s.parse::<u8>()
                .map_err(|e| ContractError::protocol(format!("bad color in '{payload}': {e}")))
        };

        Ok(Command::SetPixel {
            position: Position(index),
            color: Rgb::new(channel(fields[1])?, channel(fields[2])?, channel(fields[3])?),
        })
    }
}

/// Message received on the status topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    /// Last pattern command applied
    PixelDone,
    /// Controller busy, commands are being dropped
    Busy,
    /// Controller ready to accept commands
    Ready,
    /// Anything else (logged and ignored)
    Other(String),
}

impl StatusMessage {
    /// Parse a raw status payload
    pub fn parse(payload: &[u8]) -> Self {
        match payload {
            b"PXL DONE" => StatusMessage::PixelDone,
            b"0" => StatusMessage::Busy,
            b"1" => StatusMessage::Ready,
            other => StatusMessage::Other(String::from_utf8_lossy(other).into_owned()),
        }
    }

    /// Wire payload
    pub fn as_payload(&self) -> &str {
        match self {
            StatusMessage::PixelDone => "PXL DONE",
            StatusMessage::Busy => "0",
            StatusMessage::Ready => "1",
            StatusMessage::Other(s) => s,
        }
    }
}

/// Request/status topic pair of one controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Commands to the controller
    pub request: String,
    /// Status from the controller
    pub status: String,
}

impl Topics {
    /// Topics for `/<setup_id>/<device_id>/`
    pub fn new(setup_id: &str, device_id: &str) -> Self {
        let base = format!("/{setup_id}/{device_id}/");
        Self {
            request: format!("{base}RECM"),
            status: format!("{base}STAT"),
        }
    }
}
