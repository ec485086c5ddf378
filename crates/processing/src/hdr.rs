//! Debevec HDR fusion
//!
//! Response recovery follows Debevec & Malik: samples are quantized to 256
//! bins, a hat weighting favors mid-range values and the log response `g` is
//! the least-squares solution of
//!
//! ```text
//! w(z_ij) * (g(z_ij) - ln E_i - ln t_j) = 0        (data)
//! g(128) = 0                                        (scale)
//! λ * w(z) * (g(z-1) - 2 g(z) + g(z+1)) = 0         (smoothness)
//! ```
//!
//! The merge is the weighted average of `g(z) - ln t` per pixel. Tone mapping
//! normalizes the radiance map by its min/max (gamma 1.0) and requantizes to
//! the input bit depth.

use std::collections::BTreeMap;

use contracts::{Channel, Exposure};
use nalgebra::{DMatrix, DVector};

use crate::demosaic::ColorImage;
use crate::error::{ProcessingError, Result};

/// Response curve resolution
pub const RESPONSE_BINS: usize = 256;

const MID_BIN: usize = RESPONSE_BINS / 2;

/// Calibration parameters
#[derive(Debug, Clone, Copy)]
pub struct DebevecParams {
    /// Smoothness weight λ
    pub lambda: f64,
    /// Number of grid sample locations
    pub samples: usize,
}

impl Default for DebevecParams {
    fn default() -> Self {
        Self {
            lambda: 10.0,
            samples: 70,
        }
    }
}

/// Recovered log response `g(z)` of one channel
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseCurve {
    log: Vec<f64>,
}

impl ResponseCurve {
    /// `g(z)` for bin `z`
    pub fn log_response(&self, bin: usize) -> f64 {
        self.log[bin.min(RESPONSE_BINS - 1)]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.log
    }
}

/// Per-channel response curves of one dataset
#[derive(Debug, Clone, Default)]
pub struct CalibrationResponse {
    curves: BTreeMap<Channel, ResponseCurve>,
}

impl CalibrationResponse {
    pub fn curve(&self, channel: Channel) -> Option<&ResponseCurve> {
        self.curves.get(&channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.curves.keys().copied()
    }
}

/// Hat weight of a bin
pub fn weight(bin: usize) -> f64 {
    if bin < MID_BIN {
        (bin + 1) as f64
    } else {
        (RESPONSE_BINS - bin) as f64
    }
}

/// Quantize a sample to a response bin
pub fn to_bin(value: u16, max_value: u16) -> usize {
    if max_value == 0 {
        return 0;
    }
    let scaled = f64::from(value.min(max_value)) * (RESPONSE_BINS - 1) as f64 / f64::from(max_value);
    scaled.round() as usize
}

fn check_burst(images: &[ColorImage], exposures: &[Exposure]) -> Result<()> {
    if images.is_empty() || images.len() != exposures.len() {
        return Err(ProcessingError::FusionPrecondition {
            exposures: exposures.len(),
            images: images.len(),
        });
    }
    let (width, height) = (images[0].width(), images[0].height());
    if images
        .iter()
        .any(|img| img.width() != width || img.height() != height)
    {
        return Err(ProcessingError::shape("burst images differ in size"));
    }
    Ok(())
}

fn burst_planes<'a>(images: &'a [ColorImage], channel: Channel) -> Result<Vec<&'a [u16]>> {
    images
        .iter()
        .map(|img| {
            img.plane(channel)
                .ok_or_else(|| ProcessingError::shape(format!("{channel:?} plane missing")))
        })
        .collect()
}

/// Grid of sample pixel indices spread over the image
fn sample_grid(width: usize, height: usize, samples: usize) -> Vec<usize> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let samples = samples.min(width * height).max(1);
    let aspect = width as f64 / height as f64;
    let cols = ((samples as f64 * aspect).sqrt().round() as usize).clamp(1, width);
    let rows = samples.div_ceil(cols).min(height);

    let mut points = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        let y = ((r as f64 + 0.5) * height as f64 / rows as f64) as usize;
        for c in 0..cols {
            let x = ((c as f64 + 0.5) * width as f64 / cols as f64) as usize;
            points.push(y.min(height - 1) * width + x.min(width - 1));
        }
    }
    points.truncate(samples);
    points
}

/// Solve the log response of one channel from a burst
pub fn calibrate_channel(
    planes: &[&[u16]],
    width: u32,
    height: u32,
    exposures: &[Exposure],
    max_value: u16,
    params: DebevecParams,
) -> Result<ResponseCurve> {
    if planes.is_empty() || planes.len() != exposures.len() {
        return Err(ProcessingError::FusionPrecondition {
            exposures: exposures.len(),
            images: planes.len(),
        });
    }

    let points = sample_grid(width as usize, height as usize, params.samples);
    let n = points.len();
    let p = planes.len();
    let rows = n * p + 1 + (RESPONSE_BINS - 2);
    let cols = RESPONSE_BINS + n;

    let mut a = DMatrix::<f64>::zeros(rows, cols);
    let mut b = DVector::<f64>::zeros(rows);

    let mut k = 0;
    for (i, &pixel) in points.iter().enumerate() {
        for (j, plane) in planes.iter().enumerate() {
            let z = to_bin(plane[pixel], max_value);
            let w = weight(z);
            a[(k, z)] = w;
            a[(k, RESPONSE_BINS + i)] = -w;
            b[k] = w * exposures[j].as_secs_f64().ln();
            k += 1;
        }
    }

    a[(k, MID_BIN)] = 1.0;
    k += 1;

    for z in 1..RESPONSE_BINS - 1 {
        let w = params.lambda * weight(z);
        a[(k, z - 1)] = w;
        a[(k, z)] = -2.0 * w;
        a[(k, z + 1)] = w;
        k += 1;
    }

    let x = a
        .svd(true, true)
        .solve(&b, 1e-12)
        .map_err(ProcessingError::calibration)?;

    Ok(ResponseCurve {
        log: x.rows(0, RESPONSE_BINS).iter().copied().collect(),
    })
}

/// Response curves for every channel present in the reference burst
pub fn calibrate(
    images: &[ColorImage],
    exposures: &[Exposure],
    max_value: u16,
    params: DebevecParams,
) -> Result<CalibrationResponse> {
    check_burst(images, exposures)?;
    let (width, height) = (images[0].width(), images[0].height());

    let mut curves = BTreeMap::new();
    for channel in images[0].channels() {
        let planes = burst_planes(images, channel)?;
        let curve = calibrate_channel(&planes, width, height, exposures, max_value, params)?;
        curves.insert(channel, curve);
    }
    Ok(CalibrationResponse { curves })
}

/// Linear radiance map of one channel
pub fn merge_channel(
    planes: &[&[u16]],
    exposures: &[Exposure],
    curve: &ResponseCurve,
    max_value: u16,
) -> Vec<f32> {
    let log_times: Vec<f64> = exposures.iter().map(|e| e.as_secs_f64().ln()).collect();
    let len = planes.first().map_or(0, |p| p.len());

    (0..len)
        .map(|pixel| {
            let mut sum = 0.0;
            let mut total = 0.0;
            for (plane, log_t) in planes.iter().zip(&log_times) {
                let z = to_bin(plane[pixel], max_value);
                let w = weight(z);
                sum += w * (curve.log_response(z) - log_t);
                total += w;
            }
            (sum / total).exp() as f32
        })
        .collect()
}

/// Min/max normalization with gamma, jointly over all planes
pub fn tonemap(planes: &mut [Vec<f32>], gamma: f32) {
    let (min, max) = planes
        .iter()
        .flatten()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    let inv_gamma = 1.0 / gamma;

    for v in planes.iter_mut().flatten() {
        *v = if range > 0.0 && v.is_finite() {
            ((*v - min) / range).clamp(0.0, 1.0).powf(inv_gamma)
        } else {
            0.0
        };
    }
}

/// `[0, 1]` → `[0, max_value]`
pub fn requantize(plane: &[f32], max_value: u16) -> Vec<u16> {
    let scale = f32::from(max_value);
    plane
        .iter()
        .map(|v| (v * scale).round().clamp(0.0, scale) as u16)
        .collect()
}

/// Fuse one position's burst into a tone-mapped composite
///
/// # Errors
/// `ProcessingError::FusionPrecondition` when the image and exposure counts
/// differ or are zero.
pub fn fuse_hdr(
    images: &[ColorImage],
    exposures: &[Exposure],
    response: &CalibrationResponse,
    max_value: u16,
) -> Result<ColorImage> {
    check_burst(images, exposures)?;
    let (width, height) = (images[0].width(), images[0].height());

    let channels: Vec<Channel> = images[0].channels().collect();
    let mut radiance = Vec::with_capacity(channels.len());
    for &channel in &channels {
        let curve = response.curve(channel).ok_or_else(|| {
            ProcessingError::calibration(format!("no response curve for {channel:?}"))
        })?;
        let planes = burst_planes(images, channel)?;
        radiance.push(merge_channel(&planes, exposures, curve, max_value));
    }

    tonemap(&mut radiance, 1.0);

    let mut fused = ColorImage::new(width, height);
    for (channel, plane) in channels.into_iter().zip(&radiance) {
        fused.insert(channel, requantize(plane, max_value))?;
    }
    Ok(fused)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: u16 = 4095;

    fn exposures() -> Vec<Exposure> {
        [1000, 5000, 10000, 50000, 100000]
            .into_iter()
            .map(|e| Exposure::from_micros(e).unwrap())
            .collect()
    }

    /// Linear sensor over a radiance ramp spanning three decades
    fn radiance(i: usize, len: usize) -> f64 {
        1_000.0 * 1000f64.powf(i as f64 / (len - 1) as f64)
    }

    fn burst(width: u32, height: u32) -> Vec<ColorImage> {
        let len = (width * height) as usize;
        exposures()
            .iter()
            .map(|e| {
                let plane: Vec<u16> = (0..len)
                    .map(|i| (radiance(i, len) * e.as_secs_f64()).min(f64::from(MAX)) as u16)
                    .collect();
                let mut image = ColorImage::new(width, height);
                image.insert(Channel::Green, plane).unwrap();
                image
            })
            .collect()
    }

    #[test]
    fn test_weight_is_hat_shaped() {
        assert_eq!(weight(0), 1.0);
        assert_eq!(weight(127), 128.0);
        assert_eq!(weight(128), 128.0);
        assert_eq!(weight(255), 1.0);
    }

    #[test]
    fn test_to_bin_bounds() {
        assert_eq!(to_bin(0, MAX), 0);
        assert_eq!(to_bin(MAX, MAX), 255);
        assert_eq!(to_bin(u16::MAX, MAX), 255);
    }

    #[test]
    fn test_precondition_violations() {
        let images = burst(8, 8);
        let response = CalibrationResponse::default();

        let err = fuse_hdr(&images[..3], &exposures(), &response, MAX).unwrap_err();
        assert!(matches!(
            err,
            ProcessingError::FusionPrecondition {
                exposures: 5,
                images: 3
            }
        ));

        let err = fuse_hdr(&[], &[], &response, MAX).unwrap_err();
        assert!(matches!(
            err,
            ProcessingError::FusionPrecondition {
                exposures: 0,
                images: 0
            }
        ));
    }

    #[test]
    fn test_recovered_response_is_increasing() {
        let images = burst(32, 32);
        let response = calibrate(&images, &exposures(), MAX, DebevecParams::default()).unwrap();
        let curve = response.curve(Channel::Green).unwrap();

        assert_eq!(curve.as_slice().len(), RESPONSE_BINS);
        assert!(curve.log_response(128).abs() < 1e-6);
        assert!(curve.log_response(32) < curve.log_response(96));
        assert!(curve.log_response(96) < curve.log_response(160));
        assert!(curve.log_response(160) < curve.log_response(224));
    }

    #[test]
    fn test_merge_orders_radiance() {
        let images = burst(32, 32);
        let exposures = exposures();
        let response = calibrate(&images, &exposures, MAX, DebevecParams::default()).unwrap();
        let planes = burst_planes(&images, Channel::Green).unwrap();
        let merged = merge_channel(&planes, &exposures, response.curve(Channel::Green).unwrap(), MAX);

        let len = merged.len();
        let dark = merged[len / 4];
        let mid = merged[len / 2];
        let bright = merged[3 * len / 4];
        assert!(dark < mid && mid < bright);

        // true ratio between these pixels is 1000^(1/4) ≈ 5.6
        let ratio = f64::from(bright / mid);
        assert!(ratio > 2.0 && ratio < 15.0, "ratio {ratio}");
    }

    #[test]
    fn test_fused_output_spans_full_range() {
        let images = burst(16, 16);
        let exposures = exposures();
        let response = calibrate(&images, &exposures, MAX, DebevecParams::default()).unwrap();
        let fused = fuse_hdr(&images, &exposures, &response, MAX).unwrap();

        let plane = fused.plane(Channel::Green).unwrap();
        assert_eq!(plane.len(), 256);
        assert_eq!(plane.iter().min(), Some(&0));
        assert_eq!(plane.iter().max(), Some(&MAX));
    }

    #[test]
    fn test_tonemap_flat_input() {
        let mut planes = vec![vec![3.0f32; 4]];
        tonemap(&mut planes, 1.0);
        assert_eq!(planes[0], vec![0.0; 4]);
    }

    #[test]
    fn test_sample_grid_within_bounds() {
        let points = sample_grid(40, 30, 70);
        assert_eq!(points.len(), 70);
        assert!(points.iter().all(|&p| p < 40 * 30));

        assert_eq!(sample_grid(2, 2, 70).len(), 4);
    }
}
