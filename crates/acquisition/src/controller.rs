//! Acquisition Controller
//!
//! On-device state machine sequencing illumination positions and exposure
//! bursts:
//!
//! ```text
//! Init → SetPattern{0} → CaptureBurst{0, 0..E} → SetPattern{1} → ... → Done
//!   any failure ─────────────────────────────────────────────────────→ Aborted
//! ```
//!
//! The camera is claimed in INIT before any illumination command, so a sensor
//! owned by another process aborts the run with the matrix untouched. The
//! pattern for a position is acknowledged before the first capture of its
//! burst, every frame is committed (raw data, then marker) before the next
//! capture starts, and the position is turned off once its burst completes.
//! An aborted run clears the matrix on a best-effort basis.

use std::fmt;
use std::time::Duration;

use contracts::{AcquisitionConfig, ArtifactKey, Camera, Exposure, MessageTransport, Position, Rgb};
use illumination::IlluminationClient;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::error::{AcquisitionError, Result};
use crate::store::ArtifactStore;

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    /// Preparing the artifact directory, opening the camera and clearing the illumination
    Init,
    /// Waiting for the pattern acknowledgement of a position
    SetPattern { position: Position },
    /// Capturing exposure `index` of a position's burst
    CaptureBurst { position: Position, index: usize },
    /// All positions captured
    Done,
    /// Run stopped by an unrecoverable failure
    Aborted,
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::SetPattern { position } => write!(f, "SET_PATTERN({position})"),
            Self::CaptureBurst { position, index } => {
                write!(f, "CAPTURE_BURST({position}, {index})")
            }
            Self::Done => write!(f, "DONE"),
            Self::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Acquisition sequence
#[derive(Debug, Clone)]
pub struct AcquisitionPlan {
    /// Positions visited in order `0..positions`
    pub positions: u32,
    /// Exposures captured in this order for every position
    pub exposures: Vec<Exposure>,
    /// Color of the active position
    pub color: Rgb,
    /// Delete stale files before the first capture
    pub clean_artifact_dir: bool,
}

impl From<&AcquisitionConfig> for AcquisitionPlan {
    fn from(config: &AcquisitionConfig) -> Self {
        Self {
            positions: config.positions,
            exposures: config.exposures.clone(),
            color: config.color,
            clean_artifact_dir: config.clean_artifact_dir,
        }
    }
}

impl AcquisitionPlan {
    /// Number of frames a complete run produces
    pub fn total_frames(&self) -> usize {
        self.positions as usize * self.exposures.len()
    }
}

/// Summary of a completed run
#[derive(Debug, Clone)]
pub struct AcquisitionReport {
    /// Positions completed
    pub positions: u32,
    /// Frames committed
    pub frames: usize,
    /// Stale files removed during INIT
    pub stale_removed: usize,
    /// Wall-clock duration
    pub elapsed: Duration,
}

/// Acquisition Controller
pub struct AcquisitionController<T, C> {
    client: IlluminationClient<T>,
    camera: C,
    store: ArtifactStore,
    plan: AcquisitionPlan,
    state: AcquisitionState,
    frames: usize,
}

impl<T, C> AcquisitionController<T, C>
where
    T: MessageTransport,
    C: Camera,
{
    pub fn new(
        client: IlluminationClient<T>,
        camera: C,
        store: ArtifactStore,
        plan: AcquisitionPlan,
    ) -> Self {
        Self {
            client,
            camera,
            store,
            plan,
            state: AcquisitionState::Init,
            frames: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Frames committed so far
    pub fn frames_committed(&self) -> usize {
        self.frames
    }

    pub fn client(&self) -> &IlluminationClient<T> {
        &self.client
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    /// Run the whole sequence
    ///
    /// # Errors
    /// Any illumination, camera or store failure aborts the run; artifacts
    /// committed before the failure stay on disk with their markers.
    #[instrument(
        name = "acquisition_run",
        skip(self),
        fields(positions = self.plan.positions, exposures = self.plan.exposures.len())
    )]
    pub async fn run(&mut self) -> Result<AcquisitionReport> {
        let started = Instant::now();
        match self.execute().await {
            Ok(stale_removed) => {
                self.transition(AcquisitionState::Done);
                let report = AcquisitionReport {
                    positions: self.plan.positions,
                    frames: self.frames,
                    stale_removed,
                    elapsed: started.elapsed(),
                };
                info!(
                    frames = report.frames,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Acquisition complete"
                );
                Ok(report)
            }
            Err(e) => {
                let failed_in = self.state;
                self.transition(AcquisitionState::Aborted);
                error!(state = %failed_in, frames = self.frames, error = %e, "Acquisition aborted");
                self.release_illumination().await;
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<usize> {
        self.transition(AcquisitionState::Init);
        let stale_removed = self.store.prepare(self.plan.clean_artifact_dir).await?;
        self.camera.open().await.map_err(|e| {
            warn!(camera = self.camera.name(), error = %e, "Camera unavailable");
            AcquisitionError::Camera(e)
        })?;
        self.client.clear().await?;

        for index in 0..self.plan.positions {
            let position = Position(index);

            self.transition(AcquisitionState::SetPattern { position });
            self.client.set_pattern(position, self.plan.color).await?;

            for (burst_index, exposure) in self.plan.exposures.clone().into_iter().enumerate() {
                self.transition(AcquisitionState::CaptureBurst {
                    position,
                    index: burst_index,
                });
                self.capture_one(position, exposure).await?;
            }

            self.client.set_off(position).await?;
        }

        Ok(stale_removed)
    }

    async fn capture_one(&mut self, position: Position, exposure: Exposure) -> Result<()> {
        let frame = self.camera.capture(exposure).await.map_err(|e| {
            warn!(camera = self.camera.name(), error = %e, "Capture failed");
            AcquisitionError::Camera(e)
        })?;

        let key = ArtifactKey::new(position, exposure);
        let encoded = frame.encode();
        let bytes = encoded.len();
        self.store.commit(&key, encoded).await?;
        self.frames += 1;
        observability::record_frame_captured(exposure, bytes);
        Ok(())
    }

    /// Turn the matrix off after an abort; failures are only logged
    async fn release_illumination(&mut self) {
        self.client.abandon_pending();
        if let Err(e) = self.client.clear().await {
            warn!(error = %e, "Failed to clear illumination after abort");
        }
    }

    fn transition(&mut self, next: AcquisitionState) {
        tracing::debug!(from = %self.state, to = %next, "State transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic_camera::{SyntheticCamera, SyntheticFaults};
    use contracts::{CameraConfig, Command, Topics};
    use illumination::{ClientConfig, IlluminationError, SimulatedBehavior, SimulatedController};
    use tempfile::tempdir;

    fn client_config() -> ClientConfig {
        ClientConfig {
            ack_poll: Duration::from_millis(1),
            max_resends: 3,
            stall_timeout: Some(Duration::from_millis(200)),
            clear_settle: Duration::from_millis(1),
        }
    }

    fn plan(positions: u32, exposures: &[u32]) -> AcquisitionPlan {
        AcquisitionPlan {
            positions,
            exposures: exposures
                .iter()
                .filter_map(|m| Exposure::from_micros(*m))
                .collect(),
            color: Rgb::RED,
            clean_artifact_dir: true,
        }
    }

    fn camera() -> SyntheticCamera {
        SyntheticCamera::new(&CameraConfig {
            width: 4,
            height: 4,
            ..CameraConfig::default()
        })
    }

    fn controller(
        behavior: SimulatedBehavior,
        camera: SyntheticCamera,
        dir: &std::path::Path,
        plan: AcquisitionPlan,
    ) -> (
        AcquisitionController<SimulatedController, SyntheticCamera>,
        SimulatedController,
    ) {
        let topics = Topics::new("FPMSCOPE", "LEDMATRIX");
        let (sim, status) = SimulatedController::new(topics.clone(), behavior);
        let client = IlluminationClient::new(sim.clone(), topics, status, client_config());
        let controller = AcquisitionController::new(client, camera, ArtifactStore::new(dir), plan);
        (controller, sim)
    }

    fn names(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_full_run_commits_every_frame_with_marker() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("img9_1us.done"), b"").unwrap();

        let (mut controller, sim) = controller(
            SimulatedBehavior::responsive(Duration::ZERO),
            camera(),
            dir.path(),
            plan(3, &[1000, 5000]),
        );

        let report = controller.run().await.unwrap();
        assert_eq!(report.frames, 6);
        assert_eq!(report.positions, 3);
        assert_eq!(report.stale_removed, 1);
        assert_eq!(controller.state(), AcquisitionState::Done);

        let files = names(dir.path());
        assert_eq!(files.len(), 12);
        for p in 0..3 {
            for e in [1000, 5000] {
                assert!(files.contains(&format!("img{p}_{e}us.raw")));
                assert!(files.contains(&format!("img{p}_{e}us.done")));
            }
        }

        // every position lit then turned off; nothing lit at the end
        assert!(sim.lit_positions().is_empty());
        let commands = sim.commands();
        assert_eq!(commands[0], Command::Clear);
        assert_eq!(
            commands[1],
            Command::SetPixel {
                position: Position(0),
                color: Rgb::RED
            }
        );
        assert_eq!(
            commands[2],
            Command::SetPixel {
                position: Position(0),
                color: Rgb::OFF
            }
        );
        assert_eq!(commands.len(), 1 + 3 * 2);
    }

    #[tokio::test]
    async fn test_busy_controller_recovers() {
        let dir = tempdir().unwrap();
        let behavior = SimulatedBehavior::responsive(Duration::ZERO)
            .with_busy([2], Duration::from_millis(10));
        let (mut controller, _sim) =
            controller(behavior, camera(), dir.path(), plan(2, &[1000]));

        let report = controller.run().await.unwrap();
        assert_eq!(report.frames, 2);
    }

    #[tokio::test]
    async fn test_camera_failure_aborts_run() {
        let dir = tempdir().unwrap();
        let camera = camera().with_faults(SyntheticFaults {
            busy: false,
            fail_at: Some(3),
        });
        let (mut controller, sim) = controller(
            SimulatedBehavior::responsive(Duration::ZERO),
            camera,
            dir.path(),
            plan(4, &[1000, 5000]),
        );

        let err = controller.run().await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Camera(_)));
        assert_eq!(controller.state(), AcquisitionState::Aborted);
        assert_eq!(controller.frames_committed(), 3);

        // committed frames keep their markers, the failed one has neither
        let files = names(dir.path());
        assert_eq!(files.len(), 6);
        assert!(!files.contains(&"img1_5000us.raw".to_string()));

        // position 1 was lit when the capture failed; the abort clears it
        assert!(sim.lit_positions().is_empty());
        assert_eq!(sim.commands().last(), Some(&Command::Clear));
    }

    #[tokio::test]
    async fn test_busy_camera_is_fatal() {
        let dir = tempdir().unwrap();
        let camera = camera().with_faults(SyntheticFaults {
            busy: true,
            fail_at: None,
        });
        let (mut controller, sim) = controller(
            SimulatedBehavior::responsive(Duration::ZERO),
            camera,
            dir.path(),
            plan(3, &[1000]),
        );

        let err = controller.run().await.unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::Camera(contracts::CameraError::Busy { .. })
        ));
        assert_eq!(controller.state(), AcquisitionState::Aborted);
        assert!(names(dir.path()).is_empty());

        // no position is ever lit when the sensor is owned elsewhere
        let commands = sim.commands();
        assert!(commands
            .iter()
            .all(|c| !matches!(c, Command::SetPixel { .. })));
        assert!(sim.lit_positions().is_empty());
        assert_eq!(sim.acks_sent(), 0);
    }

    #[tokio::test]
    async fn test_stalled_controller_aborts_before_capture() {
        let dir = tempdir().unwrap();
        let behavior = SimulatedBehavior {
            silent: true,
            ..SimulatedBehavior::default()
        };
        let (mut controller, _sim) = controller(behavior, camera(), dir.path(), plan(2, &[1000]));

        let err = controller.run().await.unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::Illumination(IlluminationError::Stalled { .. })
        ));
        assert_eq!(controller.camera().captures(), 0);
    }

    #[test]
    fn test_state_display() {
        let state = AcquisitionState::CaptureBurst {
            position: Position(4),
            index: 2,
        };
        assert_eq!(state.to_string(), "CAPTURE_BURST(4, 2)");
        assert_eq!(plan(64, &[1, 2, 3, 4, 5]).total_frames(), 320);
    }
}
