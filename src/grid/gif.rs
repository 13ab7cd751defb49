//! GIF frame extraction
//!
//! Decodes every frame of an animated GIF into a straight RGBA buffer at the
//! frame's display size, together with its delay. Resampling onto the grid
//! happens afterwards, one frame at a time.

use image::codecs::gif::GifDecoder;
use image::error::{ImageError, ParameterErrorKind};
use image::AnimationDecoder;
use std::io::Cursor;
use thiserror::Error;
use tracing::{debug, warn};

use super::resample::{ResampleError, RgbaSource};

/// Errors raised by the extractor
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no frames could be decoded from the GIF")]
    NoFramesDecoded,

    #[error("GIF decode failed: {0}")]
    Decode(String),
}

/// One decoded frame at its native size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Delay before the next frame; 0 when missing or non-positive
    pub delay_ms: u32,
}

impl DecodedFrame {
    pub fn source(&self) -> Result<RgbaSource<'_>, ResampleError> {
        RgbaSource::new(&self.rgba, self.width, self.height)
    }
}

/// Why a decoder stopped producing frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStop {
    /// Clean end of stream (no more frames)
    End,
    /// Any other decode failure
    Failed(String),
}

/// Incremental frame source that may not know its frame count upfront
pub trait FrameDecoder {
    /// Total number of frames, once the decoder knows it
    fn frame_count(&self) -> Option<usize>;

    /// Decode the next frame
    fn decode_next(&mut self) -> Result<DecodedFrame, DecodeStop>;
}

/// `FrameDecoder` over the `image` crate's GIF decoder
pub struct GifFrames<'a> {
    frames: image::Frames<'a>,
    decoded: usize,
    exhausted: bool,
}

impl<'a> GifFrames<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self, ExtractError> {
        let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(|e| ExtractError::Decode(e.to_string()))?;
        Ok(Self {
            frames: decoder.into_frames(),
            decoded: 0,
            exhausted: false,
        })
    }
}

impl FrameDecoder for GifFrames<'_> {
    fn frame_count(&self) -> Option<usize> {
        // The GIF container never declares a count; it is known once drained
        self.exhausted.then_some(self.decoded)
    }

    fn decode_next(&mut self) -> Result<DecodedFrame, DecodeStop> {
        match self.frames.next() {
            None => {
                self.exhausted = true;
                Err(DecodeStop::End)
            }
            Some(Ok(frame)) => {
                let (numer, denom) = frame.delay().numer_denom_ms();
                let delay_ms = if denom > 0 { numer / denom } else { 0 };

                // Take ownership of the composited buffer; the frame is gone after this
                let buffer = frame.into_buffer();
                let (width, height) = buffer.dimensions();
                self.decoded += 1;

                Ok(DecodedFrame {
                    rgba: buffer.into_raw(),
                    width,
                    height,
                    delay_ms,
                })
            }
            Some(Err(ImageError::Parameter(e))) if matches!(e.kind(), ParameterErrorKind::NoMoreData) => {
                self.exhausted = true;
                Err(DecodeStop::End)
            }
            Some(Err(e)) => Err(DecodeStop::Failed(e.to_string())),
        }
    }
}

/// Decode every frame of a GIF, capped at `max_frames`
pub fn extract_gif_frames(bytes: &[u8], max_frames: usize) -> Result<Vec<DecodedFrame>, ExtractError> {
    let decoder = GifFrames::new(bytes)?;
    extract_frames(decoder, max_frames)
}

/// Drain a `FrameDecoder` until it signals the end of the stream
///
/// The frame count is re-checked before every decode so a decoder that
/// learns its length midway stops without an extra decode attempt.
pub fn extract_frames<D: FrameDecoder>(mut decoder: D, max_frames: usize) -> Result<Vec<DecodedFrame>, ExtractError> {
    let mut frames = Vec::new();

    loop {
        if let Some(total) = decoder.frame_count() {
            if frames.len() >= total {
                break;
            }
        }
        if frames.len() >= max_frames {
            warn!(max_frames, "GIF frame cap reached, ignoring remaining frames");
            break;
        }

        match decoder.decode_next() {
            Ok(frame) if frame.width == 0 || frame.height == 0 => {
                debug!(index = frames.len(), "skipping empty GIF frame");
            }
            Ok(frame) => frames.push(frame),
            Err(DecodeStop::End) => break,
            Err(DecodeStop::Failed(message)) => return Err(ExtractError::Decode(message)),
        }
    }

    if frames.is_empty() {
        return Err(ExtractError::NoFramesDecoded);
    }

    debug!(count = frames.len(), "extracted GIF frames");
    Ok(frames)
}
