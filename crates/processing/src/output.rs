//! Processed image output

use std::path::{Path, PathBuf};

use contracts::{Channel, Position, IMAGE_EXTENSION};
use sync_engine::write_gray16_png;

use crate::demosaic::ColorImage;
use crate::error::Result;

/// `img<p>_<r|g|b>.png`
pub fn output_name(position: Position, channel: Channel) -> String {
    format!("img{}_{}.{}", position.index(), channel.suffix(), IMAGE_EXTENSION)
}

/// Write every plane of `image` as a 16-bit grayscale PNG
pub fn write_position(dir: &Path, position: Position, image: &ColorImage) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (channel, plane) in image.planes() {
        let path = dir.join(output_name(position, channel));
        write_gray16_png(&path, image.width(), image.height(), plane.to_vec())?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_engine::read_gray16_png;
    use tempfile::tempdir;

    #[test]
    fn test_output_names() {
        assert_eq!(output_name(Position(7), Channel::Red), "img7_r.png");
        assert_eq!(output_name(Position(63), Channel::Blue), "img63_b.png");
    }

    #[test]
    fn test_write_position_one_file_per_channel() {
        let dir = tempdir().unwrap();
        let mut image = ColorImage::new(2, 1);
        image.insert(Channel::Red, vec![1, 2]).unwrap();
        image.insert(Channel::Blue, vec![3, 4]).unwrap();

        let written = write_position(dir.path(), Position(4), &image).unwrap();
        assert_eq!(
            written,
            vec![dir.path().join("img4_r.png"), dir.path().join("img4_b.png")]
        );
        let (_, _, blue) = read_gray16_png(&written[1]).unwrap();
        assert_eq!(blue, vec![3, 4]);
    }
}
