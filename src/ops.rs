//! Panel image operations — the closed set of transforms a timeline can hold.
//!
//! Each operation is pure: `apply` never mutates its input and always
//! returns a buffer of the same pixel type. `signature` is the stable
//! identity string used for chained timeline hashing and cache keys;
//! `name` is the human-readable label a host UI shows in the timeline.

use image::{GrayImage, Luma};
use thiserror::Error;

/// Smallest / largest allowed morphological structuring element.
pub const MIN_KERNEL: u8 = 3;
pub const MAX_KERNEL: u8 = 15;

#[derive(Debug, Error)]
pub enum OpError {
    #[error("unknown operation kind '{0}'")]
    UnknownKind(String),
    #[error("invalid parameter for {kind}: {reason}")]
    InvalidParameter { kind: &'static str, reason: String },
}

/// One image transform. Immutable once constructed; owned by a timeline node.
///
/// `Threshold(0)` is not a literal zero cutoff — it selects Otsu's
/// automatic threshold computed from the image histogram.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Binary threshold: `px > value → 255, else 0`. Value 0 means Otsu.
    Threshold(u8),
    /// Rotation about the image center, degrees counter-clockwise.
    /// Output keeps the original dimensions; borders are replicated.
    Rotate(f32),
    /// Morphological opening (erosion then dilation), square kernel.
    MorphOpen(u8),
    /// Morphological closing (dilation then erosion), square kernel.
    MorphClose(u8),
    /// Per-pixel inversion: `255 - px`.
    Invert,
}

impl Operation {
    /// Build an operation from a kind name and an optional parameter.
    ///
    /// Kind names match the original factory: `Threshold`, `Rotate`,
    /// `MorphOpen`, `MorphClose`, `Invert`. Kernel sizes must be odd and
    /// within `[3, 15]`; threshold values within `[0, 255]`.
    pub fn parse(kind: &str, param: Option<f64>) -> Result<Self, OpError> {
        match kind {
            "Threshold" => {
                let v = require_param("Threshold", param)?;
                if !(0.0..=255.0).contains(&v) || v.fract() != 0.0 {
                    return Err(OpError::InvalidParameter {
                        kind: "Threshold",
                        reason: format!("cutoff {v} not an integer in [0, 255]"),
                    });
                }
                Ok(Operation::Threshold(v as u8))
            }
            "Rotate" => {
                let v = require_param("Rotate", param)?;
                if !v.is_finite() {
                    return Err(OpError::InvalidParameter {
                        kind: "Rotate",
                        reason: format!("angle {v} is not finite"),
                    });
                }
                Ok(Operation::Rotate(v as f32))
            }
            "MorphOpen" => Ok(Operation::MorphOpen(parse_kernel("MorphOpen", param)?)),
            "MorphClose" => Ok(Operation::MorphClose(parse_kernel("MorphClose", param)?)),
            "Invert" => Ok(Operation::Invert),
            other => Err(OpError::UnknownKind(other.to_string())),
        }
    }

    /// Human-readable label, matching the original UI strings.
    pub fn name(&self) -> String {
        match self {
            Operation::Threshold(0) => "Threshold(OTSU)".to_string(),
            Operation::Threshold(v) => format!("Threshold({v})"),
            Operation::Rotate(a) => format!("Rotate({a:.1}°)"),
            Operation::MorphOpen(k) => format!("MorphOpen({k}x{k})"),
            Operation::MorphClose(k) => format!("MorphClose({k}x{k})"),
            Operation::Invert => "Invert".to_string(),
        }
    }

    /// Stable identity string: kind plus parameters.
    ///
    /// Feeds the timeline's chained history hash, so the format must not
    /// change between releases without invalidating cached renders.
    pub fn signature(&self) -> String {
        match self {
            Operation::Threshold(v) => format!("threshold:{v}"),
            Operation::Rotate(a) => format!("rotate:{a:.3}"),
            Operation::MorphOpen(k) => format!("open:{k}"),
            Operation::MorphClose(k) => format!("close:{k}"),
            Operation::Invert => "invert".to_string(),
        }
    }

    /// Apply the transform to `img`, returning a new buffer.
    pub fn apply(&self, img: &GrayImage) -> GrayImage {
        match *self {
            Operation::Threshold(0) => threshold(img, otsu_threshold(img)),
            Operation::Threshold(v) => threshold(img, v),
            Operation::Rotate(angle) => rotate(img, angle),
            Operation::MorphOpen(k) => {
                let r = u32::from(k) / 2;
                max_filter(&min_filter(img, r), r)
            }
            Operation::MorphClose(k) => {
                let r = u32::from(k) / 2;
                min_filter(&max_filter(img, r), r)
            }
            Operation::Invert => invert(img),
        }
    }
}

fn require_param(kind: &'static str, param: Option<f64>) -> Result<f64, OpError> {
    param.ok_or_else(|| OpError::InvalidParameter {
        kind,
        reason: "missing required parameter".to_string(),
    })
}

fn parse_kernel(kind: &'static str, param: Option<f64>) -> Result<u8, OpError> {
    let v = require_param(kind, param)?;
    let range = f64::from(MIN_KERNEL)..=f64::from(MAX_KERNEL);
    if !range.contains(&v) || v.fract() != 0.0 || (v as u8) % 2 == 0 {
        return Err(OpError::InvalidParameter {
            kind,
            reason: format!("kernel size {v} not an odd integer in [{MIN_KERNEL}, {MAX_KERNEL}]"),
        });
    }
    Ok(v as u8)
}

// ---------------------------------------------------------------------------
// Kernels
// ---------------------------------------------------------------------------

fn threshold(img: &GrayImage, cutoff: u8) -> GrayImage {
    let mut out = img.clone();
    for p in out.pixels_mut() {
        p.0[0] = if p.0[0] > cutoff { 255 } else { 0 };
    }
    out
}

fn invert(img: &GrayImage) -> GrayImage {
    let mut out = img.clone();
    for p in out.pixels_mut() {
        p.0[0] = 255 - p.0[0];
    }
    out
}

/// Otsu's method: the cutoff maximizing between-class variance of the
/// image histogram (equivalently, minimizing intra-class variance).
fn otsu_threshold(img: &GrayImage) -> u8 {
    let mut hist = [0u64; 256];
    for p in img.pixels() {
        hist[p.0[0] as usize] += 1;
    }
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 0;
    }
    let sum_all: u64 = hist
        .iter()
        .enumerate()
        .map(|(v, &c)| v as u64 * c)
        .sum();

    let mut sum_bg = 0u64;
    let mut weight_bg = 0u64;
    let mut best_cutoff = 0u8;
    let mut best_variance = 0.0f64;

    for t in 0..256usize {
        weight_bg += hist[t];
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += t as u64 * hist[t];
        let mean_bg = sum_bg as f64 / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) as f64 / weight_fg as f64;
        let variance =
            weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg) * (mean_bg - mean_fg);
        if variance > best_variance {
            best_variance = variance;
            best_cutoff = t as u8;
        }
    }
    best_cutoff
}

/// Rotate about the integer image center, keeping original dimensions.
///
/// Inverse-maps each output pixel and samples bilinearly; coordinates are
/// clamped to the image, which replicates border pixels instead of
/// introducing a hard edge at the rotated corners.
fn rotate(img: &GrayImage, angle_deg: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let cx = (w / 2) as f32;
    let cy = (h / 2) as f32;

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let src_x = cos * dx - sin * dy + cx;
            let src_y = sin * dx + cos * dy + cy;
            out.put_pixel(x, y, Luma([sample_bilinear(img, src_x, src_y)]));
        }
    }
    out
}

fn sample_bilinear(img: &GrayImage, x: f32, y: f32) -> u8 {
    let (w, h) = img.dimensions();
    let x_floor = x.floor();
    let y_floor = y.floor();
    let fx = x - x_floor;
    let fy = y - y_floor;

    let clamp_x = |v: i64| v.clamp(0, i64::from(w) - 1) as u32;
    let clamp_y = |v: i64| v.clamp(0, i64::from(h) - 1) as u32;
    let x0 = clamp_x(x_floor as i64);
    let x1 = clamp_x(x_floor as i64 + 1);
    let y0 = clamp_y(y_floor as i64);
    let y1 = clamp_y(y_floor as i64 + 1);

    let at = |px: u32, py: u32| f32::from(img.get_pixel(px, py).0[0]);
    let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
    let bottom = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
}

/// Erosion: minimum over a `(2r+1)²` window clamped to the image bounds.
fn min_filter(img: &GrayImage, radius: u32) -> GrayImage {
    window_filter(img, radius, u8::min, 255)
}

/// Dilation: maximum over a `(2r+1)²` window clamped to the image bounds.
fn max_filter(img: &GrayImage, radius: u32) -> GrayImage {
    window_filter(img, radius, u8::max, 0)
}

fn window_filter(img: &GrayImage, radius: u32, fold: fn(u8, u8) -> u8, init: u8) -> GrayImage {
    let (w, h) = img.dimensions();
    let r = i64::from(radius);
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        let y_lo = (i64::from(y) - r).max(0) as u32;
        let y_hi = (i64::from(y) + r).min(i64::from(h) - 1) as u32;
        for x in 0..w {
            let x_lo = (i64::from(x) - r).max(0) as u32;
            let x_hi = (i64::from(x) + r).min(i64::from(w) - 1) as u32;
            let mut acc = init;
            for wy in y_lo..=y_hi {
                for wx in x_lo..=x_hi {
                    acc = fold(acc, img.get_pixel(wx, wy).0[0]);
                }
            }
            out.put_pixel(x, y, Luma([acc]));
        }
    }
    out
}
