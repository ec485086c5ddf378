//! # Illumination
//!
//! Illumination Sync Client: drives the external illumination controller over
//! a request/acknowledge messaging protocol.
//!
//! Responsibilities:
//! - Publish pattern commands and wait for `PXL DONE`
//! - Resend on the controller's busy → ready transition (bounded)
//! - Detect stalls
//! - Provide an in-process simulated controller
//!
//! ## Feature Flags
//!
//! - `mqtt`: Enable the MQTT transport (requires rumqttc)

pub mod client;
pub mod error;
pub mod simulated;

#[cfg(feature = "mqtt")]
pub mod mqtt;

pub use client::{ClientConfig, ControllerReadiness, IlluminationClient};
pub use error::{IlluminationError, Result};
pub use simulated::{SimulatedBehavior, SimulatedController};

#[cfg(feature = "mqtt")]
pub use mqtt::MqttTransport;
