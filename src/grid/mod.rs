//! Pixel grid module
//!
//! Everything that turns uploaded images into 16×16 RGB frames:
//! - Frame values, ids and the packed batch encoding (frame.rs)
//! - Nearest and bilinear resampling (resample.rs)
//! - GIF frame extraction (gif.rs)
//! - The upload pipeline tying them together (import.rs)

pub mod frame;
pub mod gif;
pub mod import;
pub mod resample;
