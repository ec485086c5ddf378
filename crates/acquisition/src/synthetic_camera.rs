//! Synthetic camera
//!
//! Deterministic stand-in for the camera driver. Renders a static scene onto
//! the configured CFA so that every channel sees a smooth radiance field, adds
//! a fixed dark level and saturates at the sensor maximum. Longer exposures
//! therefore clip in bright regions while short ones stay close to the dark
//! level, which is what the downstream dark-level correction and HDR fusion
//! expect.

use std::time::Duration;

use contracts::{
    max_value_for, Camera, CameraConfig, CameraError, CfaPattern, Channel, Exposure, RawFrame,
};
use tracing::debug;

/// Dark level baked into every synthetic sample
pub const SYNTHETIC_DARK_LEVEL: u16 = 256;

/// Failure injection for the synthetic camera
#[derive(Debug, Clone, Default)]
pub struct SyntheticFaults {
    /// Report the device as owned by another process when opened
    pub busy: bool,
    /// Fail the capture with this zero-based index
    pub fail_at: Option<usize>,
}

/// Synthetic camera
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    bit_depth: u8,
    pattern: CfaPattern,
    gain: f64,
    faults: SyntheticFaults,
    simulate_exposure: bool,
    captures: usize,
}

impl SyntheticCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            bit_depth: config.bit_depth,
            pattern: config.pattern,
            gain: f64::from(config.analog_gain) * f64::from(config.digital_gain),
            faults: SyntheticFaults::default(),
            simulate_exposure: false,
            captures: 0,
        }
    }

    /// Inject failures
    pub fn with_faults(mut self, faults: SyntheticFaults) -> Self {
        self.faults = faults;
        self
    }

    /// Sleep for the exposure duration on every capture
    pub fn with_exposure_delay(mut self, enabled: bool) -> Self {
        self.simulate_exposure = enabled;
        self
    }

    /// Number of successful captures so far
    pub fn captures(&self) -> usize {
        self.captures
    }

    /// Scene radiance in counts per second at `(x, y)` for `channel`
    pub fn radiance(&self, x: u32, y: u32, channel: Channel) -> f64 {
        let u = f64::from(x) / f64::from(self.width.max(2) - 1);
        let v = f64::from(y) / f64::from(self.height.max(2) - 1);
        let base = match channel {
            Channel::Red => 2_000.0 + 90_000.0 * u,
            Channel::Green => 1_000.0 + 45_000.0 * v,
            Channel::Blue => 500.0 + 30_000.0 * (u * v),
        };
        base * self.gain
    }

    fn render(&self, exposure: Exposure) -> Result<RawFrame, CameraError> {
        let max = f64::from(max_value_for(self.bit_depth));
        let dark = f64::from(SYNTHETIC_DARK_LEVEL).min(max);
        let seconds = exposure.as_secs_f64();

        let mut samples = Vec::with_capacity(self.width as usize * self.height as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let channel = self.pattern.channel_at(x as usize, y as usize);
                let value = dark + self.radiance(x, y, channel) * seconds;
                samples.push(value.round().min(max) as u16);
            }
        }

        RawFrame::new(self.width, self.height, self.bit_depth, self.pattern, samples)
            .map_err(|e| CameraError::hardware(e.to_string()))
    }
}

impl Camera for SyntheticCamera {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn open(&mut self) -> Result<(), CameraError> {
        if self.faults.busy {
            return Err(CameraError::busy("device held by another process"));
        }
        debug!(width = self.width, height = self.height, "Synthetic camera opened");
        Ok(())
    }

    async fn capture(&mut self, exposure: Exposure) -> Result<RawFrame, CameraError> {
        if self.faults.fail_at == Some(self.captures) {
            return Err(CameraError::hardware(format!(
                "injected failure at capture {}",
                self.captures
            )));
        }

        if self.simulate_exposure {
            tokio::time::sleep(Duration::from_micros(u64::from(exposure.micros()))).await;
        }

        let frame = self.render(exposure)?;
        self.captures += 1;
        debug!(exposure = %exposure, capture = self.captures, "Synthetic frame captured");
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> CameraConfig {
        CameraConfig {
            width: 8,
            height: 6,
            ..CameraConfig::default()
        }
    }

    fn exposure(micros: u32) -> Exposure {
        Exposure::from_micros(micros).unwrap()
    }

    #[tokio::test]
    async fn test_longer_exposure_is_brighter() {
        let mut camera = SyntheticCamera::new(&small_config());
        let short = camera.capture(exposure(1_000)).await.unwrap();
        let long = camera.capture(exposure(10_000)).await.unwrap();

        assert_eq!(short.samples.len(), 48);
        assert!(short.samples.iter().all(|s| *s >= SYNTHETIC_DARK_LEVEL));
        let sum = |f: &RawFrame| f.samples.iter().map(|s| u64::from(*s)).sum::<u64>();
        assert!(sum(&long) > sum(&short));
        assert_eq!(camera.captures(), 2);
    }

    #[tokio::test]
    async fn test_long_exposure_saturates() {
        let mut camera = SyntheticCamera::new(&small_config());
        let frame = camera.capture(exposure(1_000_000)).await.unwrap();
        assert!(frame.samples.iter().any(|s| *s == frame.max_value()));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let mut busy = SyntheticCamera::new(&small_config()).with_faults(SyntheticFaults {
            busy: true,
            fail_at: None,
        });
        assert!(matches!(busy.open().await, Err(CameraError::Busy { .. })));
        assert_eq!(busy.captures(), 0);

        let mut flaky = SyntheticCamera::new(&small_config()).with_faults(SyntheticFaults {
            busy: false,
            fail_at: Some(1),
        });
        flaky.open().await.unwrap();
        assert!(flaky.capture(exposure(1_000)).await.is_ok());
        assert!(matches!(
            flaky.capture(exposure(1_000)).await,
            Err(CameraError::Hardware { .. })
        ));
    }
}
