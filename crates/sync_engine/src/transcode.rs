//! Raw artifact → normalized image

use std::path::{Path, PathBuf};

use contracts::{ArtifactKey, IMAGE_EXTENSION, RawFrame};
use image::{ImageBuffer, ImageFormat, Luma};

use crate::error::{Result, SyncError};

/// Transcode settings
#[derive(Debug, Clone, Copy)]
pub struct TranscodeOptions {
    /// Apply floor-and-subtract dark-level correction
    pub remove_dark_level: bool,
    /// Sensor black level
    pub dark_level: u16,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            remove_dark_level: true,
            dark_level: 256,
        }
    }
}

/// Floor-and-subtract: samples below `dark_level` become 0
pub fn correct_dark_level(frame: &mut RawFrame, dark_level: u16) {
    for sample in &mut frame.samples {
        *sample = (*sample).max(dark_level) - dark_level;
    }
}

/// Decode one raw artifact, correct it and write `img<p>_<e>us.png` into `out_dir`
pub fn transcode(
    name: &str,
    data: &[u8],
    options: TranscodeOptions,
    out_dir: &Path,
) -> Result<PathBuf> {
    let key = ArtifactKey::parse(name)?;
    let mut frame = RawFrame::decode(data)?;
    if options.remove_dark_level {
        correct_dark_level(&mut frame, options.dark_level);
    }

    let path = out_dir.join(key.file_name(IMAGE_EXTENSION));
    write_gray16_png(&path, frame.width, frame.height, frame.samples)?;
    Ok(path)
}

/// Write a 16-bit grayscale PNG atomically (temp file + rename)
pub fn write_gray16_png(path: &Path, width: u32, height: u32, samples: Vec<u16>) -> Result<()> {
    let buffer: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(width, height, samples)
        .ok_or_else(|| SyncError::write(path, "sample count does not match dimensions"))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| SyncError::write(path, "missing file name"))?;
    let temp = path.with_file_name(format!(".{file_name}.partial"));

    buffer
        .save_with_format(&temp, ImageFormat::Png)
        .map_err(|e| SyncError::write(&temp, e.to_string()))?;
    std::fs::rename(&temp, path).map_err(|e| SyncError::write(path, e.to_string()))?;
    Ok(())
}

/// Read a 16-bit grayscale PNG as `(width, height, samples)`
pub fn read_gray16_png(path: &Path) -> Result<(u32, u32, Vec<u16>)> {
    let image = image::open(path).map_err(|e| SyncError::write(path, format!("read: {e}")))?;
    let gray = image.into_luma16();
    let (width, height) = gray.dimensions();
    Ok((width, height, gray.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::CfaPattern;
    use tempfile::tempdir;

    fn frame(samples: Vec<u16>) -> RawFrame {
        RawFrame::new(2, 2, 12, CfaPattern::Bggr, samples).unwrap()
    }

    #[test]
    fn test_dark_level_floor_and_subtract() {
        let mut f = frame(vec![100, 300, 256, 4095]);
        correct_dark_level(&mut f, 256);
        assert_eq!(f.samples, vec![0, 44, 0, 3839]);
    }

    #[test]
    fn test_transcode_writes_corrected_png() {
        let dir = tempdir().unwrap();
        let data = frame(vec![100, 300, 1000, 4095]).encode();

        let path = transcode(
            "img3_5000us.raw",
            &data,
            TranscodeOptions::default(),
            dir.path(),
        )
        .unwrap();
        assert_eq!(path, dir.path().join("img3_5000us.png"));

        let (w, h, samples) = read_gray16_png(&path).unwrap();
        assert_eq!((w, h), (2, 2));
        assert_eq!(samples, vec![0, 44, 744, 3839]);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_transcode_without_correction() {
        let dir = tempdir().unwrap();
        let data = frame(vec![100, 300, 1000, 4095]).encode();
        let options = TranscodeOptions {
            remove_dark_level: false,
            dark_level: 256,
        };
        let path = transcode("img0_1000us.raw", &data, options, dir.path()).unwrap();
        let (_, _, samples) = read_gray16_png(&path).unwrap();
        assert_eq!(samples, vec![100, 300, 1000, 4095]);
    }

    #[test]
    fn test_transcode_rejects_bad_input() {
        let dir = tempdir().unwrap();
        let data = frame(vec![0; 4]).encode();
        assert!(matches!(
            transcode("frame.raw", &data, TranscodeOptions::default(), dir.path()),
            Err(SyncError::Contract(_))
        ));
        assert!(matches!(
            transcode("img0_1000us.raw", b"junk", TranscodeOptions::default(), dir.path()),
            Err(SyncError::Contract(_))
        ));
    }
}
