//! RawFrame - Camera output
//!
//! Color-filter-array sensor data and its on-disk codec.
//!
//! Layout (little endian):
//!
//! ```text
//! "FPMR" | u16 version | u8 bit_depth | u8 cfa_pattern | u32 width | u32 height | u16 * width * height
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::ContractError;

const MAGIC: &[u8; 4] = b"FPMR";
const VERSION: u16 = 1;

/// Size of the raw artifact header in bytes
pub const RAW_HEADER_LEN: usize = 16;

/// Color channel of a demosaiced image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    /// All channels in RGB order
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    /// Plane index (0=R, 1=G, 2=B)
    pub fn index(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }

    /// Short suffix used in output file names
    pub fn suffix(self) -> &'static str {
        match self {
            Channel::Red => "r",
            Channel::Green => "g",
            Channel::Blue => "b",
        }
    }
}

/// Bayer color-filter-array layout, named by the top-left 2x2 block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CfaPattern {
    Rggb,
    #[default]
    Bggr,
    Grbg,
    Gbrg,
}

impl CfaPattern {
    /// Color channel sampled at pixel `(x, y)`
    pub fn channel_at(self, x: usize, y: usize) -> Channel {
        use Channel::{Blue, Green, Red};
        match (self, x % 2, y % 2) {
            (CfaPattern::Rggb, 0, 0) | (CfaPattern::Bggr, 1, 1) => Red,
            (CfaPattern::Rggb, 1, 1) | (CfaPattern::Bggr, 0, 0) => Blue,
            (CfaPattern::Grbg, 1, 0) | (CfaPattern::Gbrg, 0, 1) => Red,
            (CfaPattern::Grbg, 0, 1) | (CfaPattern::Gbrg, 1, 0) => Blue,
            _ => Green,
        }
    }

    fn code(self) -> u8 {
        match self {
            CfaPattern::Rggb => 0,
            CfaPattern::Bggr => 1,
            CfaPattern::Grbg => 2,
            CfaPattern::Gbrg => 3,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(CfaPattern::Rggb),
            1 => Some(CfaPattern::Bggr),
            2 => Some(CfaPattern::Grbg),
            3 => Some(CfaPattern::Gbrg),
            _ => None,
        }
    }
}

/// Raw sensor frame (single plane, one sample per photosite)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Significant bits per sample (1..=16)
    pub bit_depth: u8,
    /// CFA layout
    pub pattern: CfaPattern,
    /// Row-major samples, `width * height` entries
    pub samples: Vec<u16>,
}

impl RawFrame {
    /// Create a frame, checking the sample count and bit depth
    pub fn new(
        width: u32,
        height: u32,
        bit_depth: u8,
        pattern: CfaPattern,
        samples: Vec<u16>,
    ) -> Result<Self, ContractError> {
        if !(1..=16).contains(&bit_depth) {
            return Err(ContractError::raw_codec(format!(
                "bit depth must be within 1..=16, got {bit_depth}"
            )));
        }
        let expected = sample_count(width, height)?;
        if samples.len() != expected {
            return Err(ContractError::raw_codec(format!(
                "expected {expected} samples for {width}x{height}, got {}",
                samples.len()
            )));
        }
        Ok(Self {
            width,
            height,
            bit_depth,
            pattern,
            samples,
        })
    }

    /// Largest representable sample value
    pub fn max_value(&self) -> u16 {
        max_value_for(self.bit_depth)
    }

    /// Sample at `(x, y)`
    pub fn get(&self, x: usize, y: usize) -> u16 {
        self.samples[y * self.width as usize + x]
    }

    /// Encode into the raw artifact format
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RAW_HEADER_LEN + self.samples.len() * 2);
        buf.put_slice(MAGIC);
        buf.put_u16_le(VERSION);
        buf.put_u8(self.bit_depth);
        buf.put_u8(self.pattern.code());
        buf.put_u32_le(self.width);
        buf.put_u32_le(self.height);
        for sample in &self.samples {
            buf.put_u16_le(*sample);
        }
        buf.freeze()
    }

    /// Decode from the raw artifact format
    pub fn decode(data: &[u8]) -> Result<Self, ContractError> {
        if data.len() < RAW_HEADER_LEN {
            return Err(ContractError::raw_codec(format!(
                "truncated header: {} bytes",
                data.len()
            )));
        }
        if &data[0..4] != MAGIC {
            return Err(ContractError::raw_codec("bad magic"));
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != VERSION {
            return Err(ContractError::raw_codec(format!(
                "unsupported version {version}"
            )));
        }
        let bit_depth = data[6];
        let pattern = CfaPattern::from_code(data[7])
            .ok_or_else(|| ContractError::raw_codec(format!("bad cfa code {}", data[7])))?;
        let width = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        let height = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);

        let body = &data[RAW_HEADER_LEN..];
        let expected = sample_count(width, height)?
            .checked_mul(2)
            .ok_or_else(|| ContractError::raw_codec(format!("{width}x{height} frame is too large")))?;
        if body.len() != expected {
            return Err(ContractError::raw_codec(format!(
                "payload is {} bytes, header announces {expected}",
                body.len()
            )));
        }
        let samples = body
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Self::new(width, height, bit_depth, pattern, samples)
    }
}

fn sample_count(width: u32, height: u32) -> Result<usize, ContractError> {
    (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| ContractError::raw_codec(format!("{width}x{height} frame is too large")))
}

/// Largest sample value for a bit depth
pub fn max_value_for(bit_depth: u8) -> u16 {
    if bit_depth >= 16 {
        u16::MAX
    } else {
        (1u16 << bit_depth) - 1
    }
}
