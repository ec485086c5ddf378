//! # Acquisition
//!
//! On-device acquisition: steps the illumination controller through every
//! position and captures an exposure burst at each one.
//!
//! Responsibilities:
//! - Sequence positions and bursts (`AcquisitionController`)
//! - Commit raw artifacts and their completion markers (`ArtifactStore`)
//! - Provide camera implementations: synthetic and external command

pub mod command_camera;
pub mod controller;
pub mod error;
pub mod store;
pub mod synthetic_camera;

pub use command_camera::CommandCamera;
pub use controller::{AcquisitionController, AcquisitionPlan, AcquisitionReport, AcquisitionState};
pub use error::{AcquisitionError, Result};
pub use store::ArtifactStore;
pub use synthetic_camera::{SyntheticCamera, SyntheticFaults, SYNTHETIC_DARK_LEVEL};
