//! Bilinear CFA demosaic
//!
//! Each output channel is a normalized 3x3 convolution over the photosites
//! of that color: green uses the cross kernel `[0 1 0; 1 4 1; 0 1 0]`, red
//! and blue the full kernel `[1 2 1; 2 4 2; 1 2 1]`. Weights are normalized
//! by the neighbors actually present, so borders need no padding and native
//! samples pass through unchanged.

use std::collections::BTreeMap;

use contracts::{CfaPattern, Channel};

use crate::error::{ProcessingError, Result};

const GREEN_KERNEL: [[u32; 3]; 3] = [[0, 1, 0], [1, 4, 1], [0, 1, 0]];
const RED_BLUE_KERNEL: [[u32; 3]; 3] = [[1, 2, 1], [2, 4, 2], [1, 2, 1]];

/// Single-plane CFA mosaic
#[derive(Debug, Clone)]
pub struct Mosaic {
    pub width: u32,
    pub height: u32,
    pub samples: Vec<u16>,
}

impl Mosaic {
    pub fn new(width: u32, height: u32, samples: Vec<u16>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if samples.len() != expected {
            return Err(ProcessingError::shape(format!(
                "{width}x{height} mosaic needs {expected} samples, got {}",
                samples.len()
            )));
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }
}

/// Demosaiced image holding one full-resolution plane per produced channel
#[derive(Debug, Clone, PartialEq)]
pub struct ColorImage {
    width: u32,
    height: u32,
    planes: BTreeMap<Channel, Vec<u16>>,
}

impl ColorImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            planes: BTreeMap::new(),
        }
    }

    /// Add (or replace) a plane
    pub fn insert(&mut self, channel: Channel, plane: Vec<u16>) -> Result<()> {
        if plane.len() != self.width as usize * self.height as usize {
            return Err(ProcessingError::shape(format!(
                "{channel:?} plane has {} samples for {}x{}",
                plane.len(),
                self.width,
                self.height
            )));
        }
        self.planes.insert(channel, plane);
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn plane(&self, channel: Channel) -> Option<&[u16]> {
        self.planes.get(&channel).map(Vec::as_slice)
    }

    /// Channels present, in RGB order
    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.planes.keys().copied()
    }

    pub fn planes(&self) -> impl Iterator<Item = (Channel, &[u16])> {
        self.planes.iter().map(|(c, p)| (*c, p.as_slice()))
    }
}

/// Interpolate the requested channels (all three when `channels` is empty)
pub fn demosaic_bilinear(mosaic: &Mosaic, pattern: CfaPattern, channels: &[Channel]) -> ColorImage {
    let channels = if channels.is_empty() {
        &Channel::ALL[..]
    } else {
        channels
    };

    let mut image = ColorImage::new(mosaic.width, mosaic.height);
    for &channel in channels {
        image
            .planes
            .insert(channel, interpolate(mosaic, pattern, channel));
    }
    image
}

fn interpolate(mosaic: &Mosaic, pattern: CfaPattern, channel: Channel) -> Vec<u16> {
    let kernel = if channel == Channel::Green {
        &GREEN_KERNEL
    } else {
        &RED_BLUE_KERNEL
    };
    let (width, height) = (mosaic.width as usize, mosaic.height as usize);
    let mut out = vec![0u16; width * height];

    for y in 0..height {
        for x in 0..width {
            let mut acc = 0u64;
            let mut weight = 0u64;
            for (ky, row) in kernel.iter().enumerate() {
                let Some(sy) = (y + ky).checked_sub(1).filter(|&sy| sy < height) else {
                    continue;
                };
                for (kx, &k) in row.iter().enumerate() {
                    if k == 0 {
                        continue;
                    }
                    let Some(sx) = (x + kx).checked_sub(1).filter(|&sx| sx < width) else {
                        continue;
                    };
                    if pattern.channel_at(sx, sy) != channel {
                        continue;
                    }
                    acc += u64::from(k) * u64::from(mosaic.samples[sy * width + sx]);
                    weight += u64::from(k);
                }
            }
            if weight > 0 {
                out[y * width + x] = ((acc + weight / 2) / weight) as u16;
            }
        }
    }
    out
}
