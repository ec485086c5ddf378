//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace: the
//! artifact naming convention, the raw frame codec, the illumination wire
//! protocol, run configuration and the trait seams for the opaque collaborators
//! (camera, message transport).
//!
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Naming model
//! - Raw artifact: `img<position>_<exposure_us>us.raw`
//! - Completion marker: `img<position>_<exposure_us>us.done`
//! - The marker's presence is the sole readiness signal for its raw artifact.

mod artifact;
mod blueprint;
mod camera;
mod error;
mod frame;
mod protocol;
mod sync_state;
mod transport;

pub use artifact::*;
pub use blueprint::*;
pub use camera::{Camera, CameraError, LocalCamera};
pub use error::*;
pub use frame::*;
pub use protocol::*;
pub use sync_state::SyncState;
pub use transport::{InboundMessage, LocalMessageTransport, MessageTransport};
