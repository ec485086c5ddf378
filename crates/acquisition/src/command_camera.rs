//! External capture command camera
//!
//! Bridges to a vendor capture tool: the configured command template is run
//! through `sh -c` with `{exposure_us}` and `{output}` substituted, and the
//! file it writes is read back as a raw artifact. An optional probe command is
//! run once when the camera is opened to detect a sensor owned by another
//! process before any illumination is set.

use std::path::PathBuf;
use std::process::Stdio;

use contracts::{Camera, CameraError, Exposure, RawFrame};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Camera backed by an external capture command
#[derive(Debug, Clone)]
pub struct CommandCamera {
    template: String,
    probe: Option<String>,
    scratch_dir: PathBuf,
    captures: usize,
}

impl CommandCamera {
    /// Create a camera writing intermediate frames into `scratch_dir`
    pub fn new(template: impl Into<String>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            probe: None,
            scratch_dir: scratch_dir.into(),
            captures: 0,
        }
    }

    /// Run `probe` when the camera is opened
    pub fn with_probe(mut self, probe: Option<String>) -> Self {
        self.probe = probe;
        self
    }

    /// Command line for one capture
    pub fn render_command(&self, exposure: Exposure, output: &str) -> String {
        self.template
            .replace("{exposure_us}", &exposure.micros().to_string())
            .replace("{output}", output)
    }
}

impl Camera for CommandCamera {
    fn name(&self) -> &str {
        "command"
    }

    #[instrument(name = "command_camera_open", skip(self))]
    async fn open(&mut self) -> Result<(), CameraError> {
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| CameraError::hardware(format!("scratch directory unusable: {e}")))?;
        if let Some(probe) = &self.probe {
            run_shell(probe, "probe").await?;
            debug!("Camera probe passed");
        }
        Ok(())
    }

    #[instrument(name = "command_camera_capture", skip(self), fields(exposure = %exposure))]
    async fn capture(&mut self, exposure: Exposure) -> Result<RawFrame, CameraError> {
        let output = self
            .scratch_dir
            .join(format!(".capture-{}-{}.raw", std::process::id(), self.captures));
        let output_str = output.to_string_lossy().into_owned();
        let command = self.render_command(exposure, &output_str);

        if let Err(e) = run_shell(&command, "capture").await {
            let _ = tokio::fs::remove_file(&output).await;
            return Err(e);
        }

        let data = tokio::fs::read(&output)
            .await
            .map_err(|e| CameraError::hardware(format!("capture output missing: {e}")))?;
        let _ = tokio::fs::remove_file(&output).await;

        let frame = RawFrame::decode(&data).map_err(|e| CameraError::hardware(e.to_string()))?;
        self.captures += 1;
        debug!(width = frame.width, height = frame.height, "Frame read from capture command");
        Ok(frame)
    }
}

/// Run `command` through `sh -c`; stderr mentioning "busy" maps to `CameraError::Busy`
async fn run_shell(command: &str, what: &str) -> Result<(), CameraError> {
    let result = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| CameraError::hardware(format!("failed to spawn {what} command: {e}")))?;

    if result.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
    Err(if stderr.to_lowercase().contains("busy") {
        CameraError::busy(stderr)
    } else {
        CameraError::hardware(format!("{what} command exited with {}: {stderr}", result.status))
    })
}
