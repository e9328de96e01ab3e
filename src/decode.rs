//! Decode boundary — where raw pixel buffers enter the pipeline.
//!
//! The pipeline treats decoding as an external collaborator behind
//! [`PanelDecoder`]: a fast downsampled decode forced to a target box,
//! plus a plain full decode the workers fall back to. [`FileDecoder`] is
//! the stock implementation over the `image` crate. Buffers are
//! validated here so a malformed image fails fast with a descriptive
//! error instead of propagating into a transform.

use std::path::Path;

use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GrayImage, ImageReader};
use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid image format: {0}")]
    InvalidFormat(String),
    #[error("render worker panicked: {0}")]
    Panicked(String),
}

/// External decode collaborator.
///
/// Implementations must be shareable across the worker pool.
pub trait PanelDecoder: Send + Sync {
    /// Fast downsampled decode, forced to exactly `width × height`.
    fn decode_scaled(&self, path: &Path, width: u32, height: u32)
    -> Result<GrayImage, DecodeError>;

    /// Plain full-resolution grayscale decode; the degraded-but-available
    /// fallback when the scaled path fails.
    fn decode_plain(&self, path: &Path) -> Result<GrayImage, DecodeError>;
}

/// Accept only the 8-bit formats the transform kernels understand.
///
/// Higher bit depths and exotic channel layouts fail fast here rather
/// than silently truncating inside a transform.
pub fn validate_format(img: &DynamicImage) -> Result<(), DecodeError> {
    match img.color() {
        ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => Ok(()),
        other => Err(DecodeError::InvalidFormat(format!(
            "unsupported pixel format {other:?} (expected an 8-bit gray or RGB(A) image)"
        ))),
    }
}

/// Stock decoder reading panel files via the `image` crate.
pub struct FileDecoder;

impl FileDecoder {
    fn open(&self, path: &Path) -> Result<DynamicImage, DecodeError> {
        let reader = ImageReader::open(path).map_err(|source| DecodeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let img = reader.decode().map_err(|source| DecodeError::Image {
            path: path.display().to_string(),
            source,
        })?;
        validate_format(&img)?;
        Ok(img)
    }
}

impl PanelDecoder for FileDecoder {
    fn decode_scaled(
        &self,
        path: &Path,
        width: u32,
        height: u32,
    ) -> Result<GrayImage, DecodeError> {
        if width == 0 || height == 0 {
            return Err(DecodeError::InvalidFormat(format!(
                "target box {width}x{height} has a zero dimension"
            )));
        }
        let img = self.open(path)?;
        debug!(
            "decode: {} {}x{} -> {}x{}",
            path.display(),
            img.width(),
            img.height(),
            width,
            height
        );
        Ok(img.resize_exact(width, height, FilterType::Triangle).into_luma8())
    }

    fn decode_plain(&self, path: &Path) -> Result<GrayImage, DecodeError> {
        Ok(self.open(path)?.into_luma8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn temp_png(name: &str, w: u32, h: u32) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("panelflow-decode-tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let img = GrayImage::from_fn(w, h, |x, _| Luma([(x % 256) as u8]));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn validate_accepts_8bit_formats() {
        assert!(validate_format(&DynamicImage::new_luma8(2, 2)).is_ok());
        assert!(validate_format(&DynamicImage::new_rgb8(2, 2)).is_ok());
        assert!(validate_format(&DynamicImage::new_rgba8(2, 2)).is_ok());
    }

    #[test]
    fn validate_rejects_high_bit_depth() {
        let err = validate_format(&DynamicImage::new_luma16(2, 2)).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidFormat(_)));
        assert!(validate_format(&DynamicImage::new_rgb32f(2, 2)).is_err());
    }

    #[test]
    fn decode_scaled_forces_target_box() {
        let path = temp_png("scaled.png", 64, 48);
        let img = FileDecoder.decode_scaled(&path, 16, 20).unwrap();
        assert_eq!(img.dimensions(), (16, 20));
    }

    #[test]
    fn decode_plain_keeps_source_size() {
        let path = temp_png("plain.png", 33, 21);
        let img = FileDecoder.decode_plain(&path).unwrap();
        assert_eq!(img.dimensions(), (33, 21));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = FileDecoder
            .decode_plain(Path::new("/nonexistent/panel.png"))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Io { .. }));
    }

    #[test]
    fn zero_target_box_rejected() {
        let path = temp_png("zero.png", 8, 8);
        assert!(FileDecoder.decode_scaled(&path, 0, 10).is_err());
    }
}
