//! Camera trait - opaque raw capture
//!
//! The camera driver is an external collaborator: the acquisition controller
//! claims it once with `open()` and then only calls `capture(exposure) -> raw_frame`.

use thiserror::Error;

use crate::{Exposure, RawFrame};

/// Camera failures
///
/// Every variant is fatal for an acquisition run: a dataset with gaps cannot be
/// told apart from one that is still being written.
#[derive(Debug, Error)]
pub enum CameraError {
    /// Device already owned by another process
    #[error("camera busy: {message}")]
    Busy { message: String },

    /// Hardware or driver fault during capture
    #[error("camera hardware fault: {message}")]
    Hardware { message: String },
}

impl CameraError {
    pub fn busy(message: impl Into<String>) -> Self {
        Self::Busy {
            message: message.into(),
        }
    }

    pub fn hardware(message: impl Into<String>) -> Self {
        Self::Hardware {
            message: message.into(),
        }
    }
}

/// Raw capture interface
#[trait_variant::make(Camera: Send)]
pub trait LocalCamera {
    /// Camera name (used for logging)
    fn name(&self) -> &str;

    /// Claim the device before the first capture
    ///
    /// # Errors
    /// Returns `CameraError::Busy` if another process owns the device.
    async fn open(&mut self) -> Result<(), CameraError>;

    /// Capture one raw frame at the given exposure
    ///
    /// # Errors
    /// Returns `CameraError` on any driver failure.
    async fn capture(&mut self, exposure: Exposure) -> Result<RawFrame, CameraError>;
}
