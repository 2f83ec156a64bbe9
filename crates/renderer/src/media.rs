//! Decoding external media into RGBA8 texels for single-texture channels.

use std::path::{Path, PathBuf};

use image::imageops::flip_vertical_in_place;

use crate::channels::ChannelError;
use crate::types::{Resolution, TexelFormat};

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("failed to decode image {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} holds {actual} bytes but a {resolution} RGBA8 volume needs {expected}")]
    VolumeSize {
        path: PathBuf,
        resolution: Resolution,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Tightly packed RGBA8 texels plus their extent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Texels {
    pub resolution: Resolution,
    pub data: Vec<u8>,
}

/// Decodes an image file, flipped so row 0 is the bottom of the picture.
pub fn load_image(path: &Path) -> Result<Texels, MediaError> {
    let image = image::open(path).map_err(|source| MediaError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rgba = image.to_rgba8();
    flip_vertical_in_place(&mut rgba);
    let (width, height) = rgba.dimensions();
    tracing::debug!(path = %path.display(), width, height, "decoded image channel");
    Ok(Texels {
        resolution: Resolution::new(width, height),
        data: rgba.into_raw(),
    })
}

/// Reads a raw RGBA8 volume laid out slice after slice.
pub fn load_volume(path: &Path, resolution: Resolution) -> Result<Texels, MediaError> {
    let data = std::fs::read(path).map_err(|source| MediaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let expected = resolution.texel_count() * TexelFormat::Rgba8.bytes_per_texel();
    if data.len() != expected {
        return Err(MediaError::VolumeSize {
            path: path.to_path_buf(),
            resolution,
            expected,
            actual: data.len(),
        });
    }
    Ok(Texels { resolution, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn images_are_flipped_to_bottom_left_origin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gradient.png");
        let mut picture = RgbaImage::new(1, 2);
        picture.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        picture.put_pixel(0, 1, Rgba([0, 0, 255, 255]));
        picture.save(&path).expect("save png");

        let texels = load_image(&path).expect("decode");
        assert_eq!(texels.resolution, Resolution::new(1, 2));
        assert_eq!(&texels.data[..4], &[0, 0, 255, 255]);
        assert_eq!(&texels.data[4..], &[255, 0, 0, 255]);
    }

    #[test]
    fn volume_size_must_match() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("noise.bin");
        std::fs::write(&path, vec![0u8; 2 * 2 * 2 * 4]).expect("write");

        let texels = load_volume(&path, Resolution::volume(2, 2, 2)).expect("volume");
        assert_eq!(texels.data.len(), 32);
        assert!(matches!(
            load_volume(&path, Resolution::volume(4, 2, 2)),
            Err(MediaError::VolumeSize { expected: 64, actual: 32, .. })
        ));
    }
}
