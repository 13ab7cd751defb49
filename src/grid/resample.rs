//! Resampling arbitrary RGBA images onto the 16x16 frame grid
//!
//! Two techniques are supported:
//! - Nearest neighbor (sharp, good for pixel art sources)
//! - Bilinear interpolation (smooth, good for photos)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::frame::{Frame, FRAME_BYTES, GRID_SIZE};

/// Errors raised by the resampler
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResampleError {
    #[error("invalid resample input: {0}")]
    InvalidInput(String),

    #[error("unsupported sampling mode: {0:?}")]
    UnsupportedMode(String),
}

/// Resampling technique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    #[default]
    Nearest,
    Bilinear,
}

impl SamplingMode {
    pub const ALL: [SamplingMode; 2] = [SamplingMode::Nearest, SamplingMode::Bilinear];

    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingMode::Nearest => "nearest",
            SamplingMode::Bilinear => "bilinear",
        }
    }
}

impl fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SamplingMode {
    type Err = ResampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(SamplingMode::Nearest),
            "bilinear" => Ok(SamplingMode::Bilinear),
            _ => Err(ResampleError::UnsupportedMode(s.to_string())),
        }
    }
}

/// Borrowed straight-RGBA source image (4 bytes per pixel, row-major)
#[derive(Debug, Clone, Copy)]
pub struct RgbaSource<'a> {
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
}

impl<'a> RgbaSource<'a> {
    /// Wrap a buffer, checking that its length matches the dimensions
    pub fn new(pixels: &'a [u8], width: u32, height: u32) -> Result<Self, ResampleError> {
        if width == 0 || height == 0 {
            return Err(ResampleError::InvalidInput(format!(
                "source dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }

        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| ResampleError::InvalidInput(format!("source {}x{} is too large", width, height)))?;

        if pixels.len() != expected {
            return Err(ResampleError::InvalidInput(format!(
                "expected {} RGBA bytes for {}x{}, got {}",
                expected,
                width,
                height,
                pixels.len()
            )));
        }

        Ok(Self { pixels, width, height })
    }

    fn rgba(&self, x: usize, y: usize) -> &[u8] {
        let i = 4 * (y * self.width as usize + x);
        &self.pixels[i..i + 4]
    }
}

/// Resample a source image onto the 16x16 grid
pub fn resample_to_grid(source: RgbaSource<'_>, mode: SamplingMode) -> Result<Frame, ResampleError> {
    let rgb = resample(source, GRID_SIZE as u32, GRID_SIZE as u32, mode)?;
    let mut pixels = [0u8; FRAME_BYTES];
    pixels.copy_from_slice(&rgb);
    Ok(Frame::from(pixels))
}

/// Resample a source image to `dst_width` x `dst_height` RGB (alpha dropped)
pub fn resample(
    source: RgbaSource<'_>,
    dst_width: u32,
    dst_height: u32,
    mode: SamplingMode,
) -> Result<Vec<u8>, ResampleError> {
    // Re-validate: the fields are public and may have been built by hand
    let source = RgbaSource::new(source.pixels, source.width, source.height)?;
    if dst_width == 0 || dst_height == 0 {
        return Err(ResampleError::InvalidInput(format!(
            "destination dimensions must be non-zero, got {}x{}",
            dst_width, dst_height
        )));
    }

    let out = match mode {
        SamplingMode::Nearest => nearest(source, dst_width as usize, dst_height as usize),
        SamplingMode::Bilinear => bilinear(source, dst_width as usize, dst_height as usize),
    };
    Ok(out)
}

fn nearest(source: RgbaSource<'_>, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let src_w = source.width as usize;
    let src_h = source.height as usize;
    let mut out = Vec::with_capacity(dst_w * dst_h * 3);

    for dy in 0..dst_h {
        let sy = dy * src_h / dst_h;
        for dx in 0..dst_w {
            let sx = dx * src_w / dst_w;
            out.extend_from_slice(&source.rgba(sx, sy)[..3]);
        }
    }
    out
}

/// Map a destination index onto a continuous source coordinate.
/// A one-cell destination axis falls back to nearest mapping (always 0).
fn source_coord(d: usize, src: usize, dst: usize) -> f64 {
    if dst == 1 {
        return (d * src / dst) as f64;
    }
    d as f64 * (src - 1) as f64 / (dst - 1) as f64
}

fn bilinear(source: RgbaSource<'_>, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let src_w = source.width as usize;
    let src_h = source.height as usize;
    let mut out = Vec::with_capacity(dst_w * dst_h * 3);

    for dy in 0..dst_h {
        let y = source_coord(dy, src_h, dst_h);
        let y0 = (y.floor() as usize).min(src_h - 1);
        let y1 = (y0 + 1).min(src_h - 1);
        let y_diff = y - y0 as f64;

        for dx in 0..dst_w {
            let x = source_coord(dx, src_w, dst_w);
            let x0 = (x.floor() as usize).min(src_w - 1);
            let x1 = (x0 + 1).min(src_w - 1);
            let x_diff = x - x0 as f64;

            let a = source.rgba(x0, y0);
            let b = source.rgba(x1, y0);
            let c = source.rgba(x0, y1);
            let d = source.rgba(x1, y1);

            for channel in 0..3 {
                let value = a[channel] as f64 * (1.0 - x_diff) * (1.0 - y_diff)
                    + b[channel] as f64 * x_diff * (1.0 - y_diff)
                    + c[channel] as f64 * y_diff * (1.0 - x_diff)
                    + d[channel] as f64 * x_diff * y_diff;
                out.push(value.round().clamp(0.0, 255.0) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        rgba.iter().copied().cycle().take((width * height * 4) as usize).collect()
    }

    /// Deterministic pseudo-random buffer
    fn noise(width: u32, height: u32) -> Vec<u8> {
        let mut state: u32 = 0x9e37_79b9;
        (0..width * height * 4)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 24) as u8
            })
            .collect()
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!("nearest".parse::<SamplingMode>().unwrap(), SamplingMode::Nearest);
        assert_eq!("Bilinear".parse::<SamplingMode>().unwrap(), SamplingMode::Bilinear);
        assert_eq!(
            "lanczos".parse::<SamplingMode>().unwrap_err(),
            ResampleError::UnsupportedMode("lanczos".to_string())
        );
    }

    #[test]
    fn test_invalid_source_rejected() {
        assert!(matches!(RgbaSource::new(&[0u8; 15], 2, 2), Err(ResampleError::InvalidInput(_))));
        assert!(matches!(RgbaSource::new(&[], 0, 4), Err(ResampleError::InvalidInput(_))));

        let forged = RgbaSource { pixels: &[0u8; 4], width: 3, height: 3 };
        assert!(matches!(
            resample_to_grid(forged, SamplingMode::Nearest),
            Err(ResampleError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_output_is_always_768_bytes() {
        for (w, h) in [(1, 1), (1, 40), (40, 1), (3, 7), (16, 16), (200, 120)] {
            let pixels = noise(w, h);
            let source = RgbaSource::new(&pixels, w, h).unwrap();
            for mode in SamplingMode::ALL {
                let frame = resample_to_grid(source, mode).unwrap();
                assert_eq!(frame.as_bytes().len(), 768, "{}x{} {}", w, h, mode);
            }
        }
    }

    #[test]
    fn test_resampling_is_deterministic() {
        let pixels = noise(37, 23);
        let source = RgbaSource::new(&pixels, 37, 23).unwrap();
        for mode in SamplingMode::ALL {
            let first = resample_to_grid(source, mode).unwrap();
            let second = resample_to_grid(source, mode).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_uniform_source_stays_uniform() {
        for (w, h) in [(1, 1), (5, 9), (64, 64)] {
            let pixels = solid(w, h, [10, 200, 30, 77]);
            let source = RgbaSource::new(&pixels, w, h).unwrap();
            for mode in SamplingMode::ALL {
                let frame = resample_to_grid(source, mode).unwrap();
                assert!(frame.triples().iter().all(|&p| p == [10, 200, 30]));
            }
        }
    }

    #[test]
    fn test_nearest_picks_floor_coordinates() {
        // 32x32 source where each pixel encodes its coordinates
        let mut pixels = Vec::new();
        for y in 0..32u8 {
            for x in 0..32u8 {
                pixels.extend_from_slice(&[x, y, 0, 255]);
            }
        }
        let source = RgbaSource::new(&pixels, 32, 32).unwrap();
        let frame = resample_to_grid(source, SamplingMode::Nearest).unwrap();
        assert_eq!(frame.pixel(0, 0), [0, 0, 0]);
        assert_eq!(frame.pixel(3, 5), [6, 10, 0]);
        assert_eq!(frame.pixel(15, 15), [30, 30, 0]);
    }

    #[test]
    fn test_bilinear_single_row_and_column() {
        // 1 pixel tall: every destination row replicates the interpolated source row
        let pixels: Vec<u8> = [[0u8, 0, 0, 255], [255, 255, 255, 255]].concat();
        let source = RgbaSource::new(&pixels, 2, 1).unwrap();
        let frame = resample_to_grid(source, SamplingMode::Bilinear).unwrap();
        for row in 0..16 {
            assert_eq!(frame.pixel(0, row), [0, 0, 0]);
            assert_eq!(frame.pixel(15, row), [255, 255, 255]);
            assert_eq!(frame.pixel(7, row), frame.pixel(7, 0));
        }

        let source = RgbaSource::new(&pixels, 1, 2).unwrap();
        let frame = resample_to_grid(source, SamplingMode::Bilinear).unwrap();
        for col in 0..16 {
            assert_eq!(frame.pixel(col, 0), [0, 0, 0]);
            assert_eq!(frame.pixel(col, 15), [255, 255, 255]);
        }
    }

    #[test]
    fn test_bilinear_single_cell_destination() {
        let pixels = noise(4, 4);
        let source = RgbaSource::new(&pixels, 4, 4).unwrap();
        let out = resample(source, 1, 1, SamplingMode::Bilinear).unwrap();
        assert_eq!(out, pixels[..3].to_vec());
    }

    #[test]
    fn test_bilinear_two_by_two_corners_and_center() {
        let red = [255u8, 0, 0, 255];
        let green = [0u8, 255, 0, 255];
        let blue = [0u8, 0, 255, 255];
        let yellow = [255u8, 255, 0, 255];
        let pixels: Vec<u8> = [red, green, blue, yellow].concat();
        let source = RgbaSource::new(&pixels, 2, 2).unwrap();
        let frame = resample_to_grid(source, SamplingMode::Bilinear).unwrap();

        assert_eq!(frame.pixel(0, 0), [255, 0, 0]);
        assert_eq!(frame.pixel(15, 0), [0, 255, 0]);
        assert_eq!(frame.pixel(0, 15), [0, 0, 255]);
        assert_eq!(frame.pixel(15, 15), [255, 255, 0]);

        // x = y = 7/15: every corner contributes
        let center = frame.pixel(7, 7);
        let w: f64 = 7.0 / 15.0;
        let expected_r = 255.0 * (1.0 - w) * (1.0 - w) + 255.0 * w * w;
        let expected_g = 255.0 * w * (1.0 - w) + 255.0 * w * w;
        let expected_b = 255.0 * w * (1.0 - w);
        assert_eq!(center, [
            expected_r.round() as u8,
            expected_g.round() as u8,
            expected_b.round() as u8,
        ]);
        assert!(center.iter().all(|&c| c > 0 && c < 255));
    }
}
