//! Artifact naming convention
//!
//! Every capture is identified by `(position, exposure)` and encoded into file
//! names as `img<position>_<exposure_us>us<ext>`. Downstream consumers recover
//! the key by parsing the name, so encode and parse must stay symmetric.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ContractError;

/// Extension of raw capture artifacts (without the dot)
pub const RAW_EXTENSION: &str = "raw";

/// Extension of completion markers (without the dot)
pub const MARKER_EXTENSION: &str = "done";

/// Extension of normalized and processed images (without the dot)
pub const IMAGE_EXTENSION: &str = "png";

/// Illumination position index in `[0, N)`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Position(pub u32);

impl Position {
    /// Raw index
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exposure duration in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Exposure(u32);

impl Exposure {
    /// Create an exposure from microseconds
    ///
    /// Returns `None` for a zero duration.
    pub fn from_micros(micros: u32) -> Option<Self> {
        (micros > 0).then_some(Self(micros))
    }

    /// Duration in microseconds
    pub fn micros(self) -> u32 {
        self.0
    }

    /// Duration in seconds
    pub fn as_secs_f64(self) -> f64 {
        f64::from(self.0) / 1_000_000.0
    }
}

impl fmt::Display for Exposure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

/// Identity of one capture artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
    /// Illumination position
    pub position: Position,
    /// Exposure duration
    pub exposure: Exposure,
}

impl ArtifactKey {
    /// Create a new key
    pub fn new(position: Position, exposure: Exposure) -> Self {
        Self { position, exposure }
    }

    /// Name without extension: `img<p>_<e>us`
    pub fn stem(&self) -> String {
        format!("img{}_{}us", self.position.0, self.exposure.0)
    }

    /// Name with the given extension (without the dot)
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.stem(), extension)
    }

    /// Raw artifact file name
    pub fn raw_name(&self) -> String {
        self.file_name(RAW_EXTENSION)
    }

    /// Completion marker file name
    pub fn marker_name(&self) -> String {
        self.file_name(MARKER_EXTENSION)
    }

    /// Parse `img<p>_<e>us[.<ext>]`, ignoring any leading directory component
    pub fn parse(name: &str) -> Result<Self, ContractError> {
        let base = name.rsplit('/').next().unwrap_or(name);
        let stem = match base.split_once('.') {
            Some((stem, _ext)) => stem,
            None => base,
        };

        let body = stem
            .strip_prefix("img")
            .ok_or_else(|| ContractError::artifact_name(name, "missing 'img' prefix"))?;
        let body = body
            .strip_suffix("us")
            .ok_or_else(|| ContractError::artifact_name(name, "missing 'us' suffix"))?;
        let (position, exposure) = body
            .split_once('_')
            .ok_or_else(|| ContractError::artifact_name(name, "missing '_' separator"))?;

        let position = position
            .parse::<u32>()
            .map_err(|e| ContractError::artifact_name(name, format!("bad position: {e}")))?;
        let exposure = exposure
            .parse::<u32>()
            .ok()
            .and_then(Exposure::from_micros)
            .ok_or_else(|| ContractError::artifact_name(name, "bad exposure"))?;

        Ok(Self::new(Position(position), exposure))
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem())
    }
}

/// Marker name companion of a raw artifact name, if `name` is a raw artifact
pub fn marker_for(name: &str) -> Option<String> {
    name.strip_suffix(RAW_EXTENSION)
        .and_then(|stem| stem.strip_suffix('.'))
        .map(|stem| format!("{stem}.{MARKER_EXTENSION}"))
}

/// Whether `name` is a well-formed raw artifact name
pub fn is_raw_artifact(name: &str) -> bool {
    marker_for(name).is_some() && ArtifactKey::parse(name).is_ok()
}
