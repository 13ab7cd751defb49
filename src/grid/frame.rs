//! Frame identity and raw frame encodings
//!
//! A frame is always a 16x16 grid of RGB triples, stored row-major as a
//! flat 768-byte buffer. This module handles:
//! - Generating random hexadecimal frame identifiers
//! - Encoding/decoding the flat 768-byte transmission format
//! - Slicing concatenated frame batches into individual frames
//! - The `#rrggbb` hex form used by the legacy persisted layout

use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Width and height of the pixel grid
pub const GRID_SIZE: usize = 16;

/// Number of pixels in one frame
pub const GRID_PIXELS: usize = GRID_SIZE * GRID_SIZE;

/// Byte length of one raw RGB frame
pub const FRAME_BYTES: usize = GRID_PIXELS * 3;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Errors raised while creating or decoding frames
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame id length must be at least 1, got {0}")]
    InvalidLength(usize),

    #[error("expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("channel value {value} at pixel {pixel} is outside 0..=255")]
    ValueRange { pixel: usize, value: i64 },

    #[error("invalid hex color {0:?}")]
    InvalidHex(String),

    #[error("no unused {length}-character id found after {attempts} attempts")]
    IdSpaceExhausted { length: usize, attempts: usize },
}

/// Random draws tried before giving up on finding an unused id
pub const MAX_ID_ATTEMPTS: usize = 256;

/// Generate a random lowercase-hex frame identifier of exactly `length` characters
pub fn gen_frame_id(length: usize) -> Result<String, FrameError> {
    if length < 1 {
        return Err(FrameError::InvalidLength(length));
    }

    let mut rng = rand::thread_rng();
    let id = (0..length)
        .map(|_| HEX_DIGITS[rng.gen_range(0..16)] as char)
        .collect();
    Ok(id)
}

/// Generate an id for which `is_taken` is false, giving up after `MAX_ID_ATTEMPTS` draws
pub fn gen_unique_frame_id(length: usize, is_taken: impl Fn(&str) -> bool) -> Result<String, FrameError> {
    for _ in 0..MAX_ID_ATTEMPTS {
        let id = gen_frame_id(length)?;
        if !is_taken(&id) {
            return Ok(id);
        }
    }
    Err(FrameError::IdSpaceExhausted {
        length,
        attempts: MAX_ID_ATTEMPTS,
    })
}

/// One 16x16 RGB frame payload
///
/// The length invariant is enforced at construction, so every `Frame`
/// in the system holds exactly `FRAME_BYTES` bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    pixels: Box<[u8; FRAME_BYTES]>,
}

impl Frame {
    /// A frame filled with a single color
    pub fn filled(rgb: [u8; 3]) -> Self {
        let mut pixels = Box::new([0u8; FRAME_BYTES]);
        for pixel in pixels.chunks_exact_mut(3) {
            pixel.copy_from_slice(&rgb);
        }
        Self { pixels }
    }

    /// Decode a flat raw buffer as received from the frame endpoints
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() != FRAME_BYTES {
            return Err(FrameError::LengthMismatch {
                expected: FRAME_BYTES,
                actual: bytes.len(),
            });
        }
        let mut pixels = Box::new([0u8; FRAME_BYTES]);
        pixels.copy_from_slice(bytes);
        Ok(Self { pixels })
    }

    /// Build a frame from 256 `[R, G, B]` triples of untrusted integers
    ///
    /// This is the insertion boundary for pixel data coming from JSON
    /// documents, so each channel is range checked here.
    pub fn from_triples(triples: &[[i64; 3]]) -> Result<Self, FrameError> {
        if triples.len() != GRID_PIXELS {
            return Err(FrameError::LengthMismatch {
                expected: GRID_PIXELS,
                actual: triples.len(),
            });
        }

        let mut pixels = Box::new([0u8; FRAME_BYTES]);
        for (i, triple) in triples.iter().enumerate() {
            for (channel, &value) in triple.iter().enumerate() {
                let byte = u8::try_from(value).map_err(|_| FrameError::ValueRange { pixel: i, value })?;
                pixels[i * 3 + channel] = byte;
            }
        }
        Ok(Self { pixels })
    }

    /// Decode 256 `#rrggbb` strings (legacy layout)
    pub fn from_hex_pixels<S: AsRef<str>>(hex: &[S]) -> Result<Self, FrameError> {
        if hex.len() != GRID_PIXELS {
            return Err(FrameError::LengthMismatch {
                expected: GRID_PIXELS,
                actual: hex.len(),
            });
        }

        let mut pixels = Box::new([0u8; FRAME_BYTES]);
        for (i, color) in hex.iter().enumerate() {
            let rgb = parse_hex_color(color.as_ref())?;
            pixels[i * 3..i * 3 + 3].copy_from_slice(&rgb);
        }
        Ok(Self { pixels })
    }

    /// Encode as 256 `#rrggbb` strings (legacy layout)
    pub fn to_hex_pixels(&self) -> Vec<String> {
        self.pixels
            .chunks_exact(3)
            .map(|p| format!("#{:02x}{:02x}{:02x}", p[0], p[1], p[2]))
            .collect()
    }

    /// The 256 `[R, G, B]` triples in row-major order
    pub fn triples(&self) -> Vec<[u8; 3]> {
        self.pixels
            .chunks_exact(3)
            .map(|p| [p[0], p[1], p[2]])
            .collect()
    }

    /// RGB value of the cell at (`col`, `row`)
    pub fn pixel(&self, col: usize, row: usize) -> [u8; 3] {
        let i = 3 * (row * GRID_SIZE + col);
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels[..]
    }
}

impl From<[u8; FRAME_BYTES]> for Frame {
    fn from(pixels: [u8; FRAME_BYTES]) -> Self {
        Self { pixels: Box::new(pixels) }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("first_pixel", &self.pixel(0, 0))
            .finish_non_exhaustive()
    }
}

/// Parse `#rrggbb` (the leading `#` is optional)
fn parse_hex_color(color: &str) -> Result<[u8; 3], FrameError> {
    let digits = color.strip_prefix('#').unwrap_or(color);
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(FrameError::InvalidHex(color.to_string()));
    }

    let mut rgb = [0u8; 3];
    for (channel, value) in rgb.iter_mut().enumerate() {
        *value = u8::from_str_radix(&digits[channel * 2..channel * 2 + 2], 16)
            .map_err(|_| FrameError::InvalidHex(color.to_string()))?;
    }
    Ok(rgb)
}

/// Concatenate frames in the given order into one transmission blob
pub fn encode_batch<'a, I>(frames: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a Frame>,
{
    let mut blob = Vec::new();
    for frame in frames {
        blob.extend_from_slice(frame.as_bytes());
    }
    blob
}

/// Slice a concatenated batch blob back into frames keyed by id
///
/// The blob must hold exactly `frame_order.len()` frames in request order.
pub fn split_batch(frame_order: &[String], blob: &[u8]) -> Result<HashMap<String, Frame>, FrameError> {
    let expected = frame_order.len() * FRAME_BYTES;
    if blob.len() != expected {
        return Err(FrameError::LengthMismatch {
            expected,
            actual: blob.len(),
        });
    }

    frame_order
        .iter()
        .zip(blob.chunks_exact(FRAME_BYTES))
        .map(|(id, chunk)| Ok((id.clone(), Frame::from_bytes(chunk)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_id_length_and_alphabet() {
        for length in [1, 8, 16, 33] {
            let id = gen_frame_id(length).unwrap();
            assert_eq!(id.len(), length);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_frame_id_zero_length_rejected() {
        assert_eq!(gen_frame_id(0), Err(FrameError::InvalidLength(0)));
    }

    #[test]
    fn test_frame_ids_do_not_collide() {
        let ids: std::collections::HashSet<String> =
            (0..2000).map(|_| gen_frame_id(16).unwrap()).collect();
        assert_eq!(ids.len(), 2000);
    }

    #[test]
    fn test_unique_id_gives_up_when_every_id_is_taken() {
        let err = gen_unique_frame_id(1, |_| true).unwrap_err();
        assert_eq!(
            err,
            FrameError::IdSpaceExhausted {
                length: 1,
                attempts: MAX_ID_ATTEMPTS
            }
        );
    }

    #[test]
    fn test_unique_id_finds_the_last_free_slot() {
        let id = gen_unique_frame_id(1, |candidate| candidate != "f").unwrap();
        assert_eq!(id, "f");
    }

    #[test]
    fn test_from_bytes_rejects_wrong_length() {
        let err = Frame::from_bytes(&[0u8; 767]).unwrap_err();
        assert_eq!(err, FrameError::LengthMismatch { expected: 768, actual: 767 });
    }

    #[test]
    fn test_pixel_indexing_is_row_major() {
        let mut raw = [0u8; FRAME_BYTES];
        // row 2, col 5
        let i = 3 * (2 * GRID_SIZE + 5);
        raw[i..i + 3].copy_from_slice(&[9, 8, 7]);
        let frame = Frame::from(raw);
        assert_eq!(frame.pixel(5, 2), [9, 8, 7]);
        assert_eq!(frame.triples()[2 * GRID_SIZE + 5], [9, 8, 7]);
    }

    #[test]
    fn test_triples_range_checked() {
        let mut triples = vec![[0i64, 0, 0]; GRID_PIXELS];
        triples[10] = [0, 256, 0];
        let err = Frame::from_triples(&triples).unwrap_err();
        assert_eq!(err, FrameError::ValueRange { pixel: 10, value: 256 });

        triples[10] = [-1, 0, 0];
        assert!(matches!(Frame::from_triples(&triples), Err(FrameError::ValueRange { .. })));

        triples[10] = [255, 128, 0];
        let frame = Frame::from_triples(&triples).unwrap();
        assert_eq!(frame.pixel(10, 0), [255, 128, 0]);
    }

    #[test]
    fn test_hex_pixels_preserve_colors() {
        let frame = Frame::filled([0x12, 0xab, 0xff]);
        let hex = frame.to_hex_pixels();
        assert_eq!(hex.len(), GRID_PIXELS);
        assert_eq!(hex[0], "#12abff");
        assert_eq!(Frame::from_hex_pixels(&hex).unwrap(), frame);
    }

    #[test]
    fn test_bad_hex_rejected() {
        let mut hex = vec!["#000000".to_string(); GRID_PIXELS];
        hex[3] = "#00zz00".to_string();
        assert!(matches!(Frame::from_hex_pixels(&hex), Err(FrameError::InvalidHex(_))));
    }

    #[test]
    fn test_split_batch_in_request_order() {
        let red = Frame::filled([255, 0, 0]);
        let blue = Frame::filled([0, 0, 255]);
        let blob = encode_batch([&red, &blue]);
        assert_eq!(blob.len(), 2 * FRAME_BYTES);

        let order = vec!["f1".to_string(), "f2".to_string()];
        let frames = split_batch(&order, &blob).unwrap();
        assert_eq!(frames["f1"], red);
        assert_eq!(frames["f2"], blue);

        assert!(split_batch(&order, &blob[..FRAME_BYTES]).is_err());
    }
}
