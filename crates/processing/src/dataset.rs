//! Local dataset discovery

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use contracts::{ArtifactKey, Exposure, Position, IMAGE_EXTENSION};
use tracing::info;

use crate::error::{ProcessingError, Result};

/// Normalized images of one acquisition, indexed by position and exposure
#[derive(Debug, Clone)]
pub struct Dataset {
    dir: PathBuf,
    positions: u32,
    exposures: Vec<Exposure>,
    files: BTreeMap<ArtifactKey, PathBuf>,
}

impl Dataset {
    /// Scan `dir` for `img<p>_<e>us.png`
    ///
    /// The position count is the highest index plus one and the exposure list
    /// is every distinct exposure, ascending. The dataset must be complete:
    /// exactly one image per position and exposure.
    pub fn scan(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries =
            std::fs::read_dir(dir).map_err(|e| ProcessingError::dataset(dir, e.to_string()))?;

        let mut files = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| ProcessingError::dataset(dir, e.to_string()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_image =
                Path::new(&name).extension().and_then(|e| e.to_str()) == Some(IMAGE_EXTENSION);
            if name.starts_with('.') || !is_image {
                continue;
            }
            let Ok(key) = ArtifactKey::parse(&name) else {
                continue;
            };
            files.insert(key, entry.path());
        }

        if files.is_empty() {
            return Err(ProcessingError::dataset(dir, "no images found"));
        }

        let positions = files
            .keys()
            .map(|k| k.position.index())
            .max()
            .map_or(0, |max| max + 1);
        let exposures: Vec<Exposure> = files
            .keys()
            .map(|k| k.exposure)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let expected = positions as usize * exposures.len();
        if files.len() != expected {
            return Err(ProcessingError::IncompleteDataset {
                found: files.len(),
                expected,
            });
        }

        info!(
            dir = %dir.display(),
            positions,
            exposures = ?exposures.iter().map(|e| e.micros()).collect::<Vec<_>>(),
            "Dataset loaded"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            positions,
            exposures,
            files,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of illumination positions
    pub fn positions(&self) -> u32 {
        self.positions
    }

    /// Distinct exposures, ascending
    pub fn exposures(&self) -> &[Exposure] {
        &self.exposures
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Image path for one capture
    pub fn path(&self, position: Position, exposure: Exposure) -> Option<&Path> {
        self.files
            .get(&ArtifactKey::new(position, exposure))
            .map(PathBuf::as_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_scan_derives_positions_and_exposures() {
        let dir = tempdir().unwrap();
        for p in 0..3 {
            for e in [5000, 1000] {
                touch(dir.path(), &format!("img{p}_{e}us.png"));
            }
        }
        touch(dir.path(), "notes.txt");
        touch(dir.path(), ".img9_1000us.png.partial");

        let dataset = Dataset::scan(dir.path()).unwrap();
        assert_eq!(dataset.positions(), 3);
        assert_eq!(
            dataset.exposures(),
            &[
                Exposure::from_micros(1000).unwrap(),
                Exposure::from_micros(5000).unwrap()
            ]
        );
        assert_eq!(dataset.len(), 6);
        assert!(dataset
            .path(Position(2), Exposure::from_micros(5000).unwrap())
            .is_some());
    }

    #[test]
    fn test_scan_rejects_incomplete_dataset() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "img0_1000us.png");
        touch(dir.path(), "img0_5000us.png");
        touch(dir.path(), "img1_1000us.png");

        assert!(matches!(
            Dataset::scan(dir.path()),
            Err(ProcessingError::IncompleteDataset {
                found: 3,
                expected: 4
            })
        ));
    }

    #[test]
    fn test_scan_empty_dir() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Dataset::scan(dir.path()),
            Err(ProcessingError::Dataset { .. })
        ));
    }
}
