//! Upload pipeline
//!
//! Turns uploaded stills and GIFs into grid frames. Every source frame is
//! resampled with both techniques under one frame id, so the editor can
//! switch techniques without recomputing anything.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use walkdir::WalkDir;

use super::frame::{gen_unique_frame_id, FrameError};
use super::gif::{extract_gif_frames, DecodedFrame, ExtractError};
use super::resample::{resample_to_grid, ResampleError, SamplingMode};
use crate::state::data::{AnimationMetadata, FrameMap, RepeatCount};

/// File extensions picked up when importing a whole folder
const IMAGE_EXTENSIONS: [&str; 6] = ["gif", "png", "jpg", "jpeg", "bmp", "webp"];

const GIF_SIGNATURES: [&[u8]; 2] = [b"GIF87a", b"GIF89a"];

/// Errors raised while importing uploads. Any error aborts the whole upload.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {name}: {message}")]
    Image { name: String, message: String },

    #[error("{name}: {source}")]
    Gif {
        name: String,
        #[source]
        source: ExtractError,
    },

    #[error(transparent)]
    Resample(#[from] ResampleError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("nothing to import")]
    Empty,
}

/// Knobs for one upload
#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    pub frame_id_length: usize,
    pub default_frame_duration_ms: u32,
    pub max_gif_frames: usize,
}

/// One uploaded file: a display name and its raw bytes
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn read(path: &Path) -> Result<Self, ImportError> {
        let bytes = std::fs::read(path).map_err(|source| ImportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        Ok(Self { name, bytes })
    }

    fn is_gif(&self) -> bool {
        GIF_SIGNATURES.iter().any(|sig| self.bytes.starts_with(sig))
    }
}

/// Result of an upload: both sampling caches, keyed identically
#[derive(Debug, Clone)]
pub struct ImportedFrames {
    pub frame_order: Vec<String>,
    pub frame_duration_ms: u32,
    nearest: FrameMap,
    bilinear: FrameMap,
}

impl ImportedFrames {
    /// The frame cache for a technique, by reference
    pub fn frames(&self, mode: SamplingMode) -> &FrameMap {
        match mode {
            SamplingMode::Nearest => &self.nearest,
            SamplingMode::Bilinear => &self.bilinear,
        }
    }

    /// Build an animation from the chosen technique's frames
    pub fn into_animation(
        mut self,
        animation_id: impl Into<String>,
        mode: SamplingMode,
        repeat: RepeatCount,
    ) -> (AnimationMetadata, FrameMap) {
        let frames = match mode {
            SamplingMode::Nearest => std::mem::take(&mut self.nearest),
            SamplingMode::Bilinear => std::mem::take(&mut self.bilinear),
        };
        let metadata = AnimationMetadata {
            animation_id: animation_id.into(),
            frame_duration_ms: self.frame_duration_ms,
            repeat,
            frame_order: self.frame_order,
        };
        (metadata, frames)
    }
}

/// Decode, resample and id every frame of every upload, in order
///
/// New frame ids avoid every id in `existing`, so merging the result into
/// a collection never replaces another animation's pixels.
pub fn import_uploads(
    uploads: &[Upload],
    options: &ImportOptions,
    existing: &FrameMap,
) -> Result<ImportedFrames, ImportError> {
    let mut frame_order = Vec::new();
    let mut nearest = FrameMap::new();
    let mut bilinear = FrameMap::new();
    let mut first_delay = None;

    for upload in uploads {
        let decoded = decode_upload(upload, options.max_gif_frames)?;
        info!(name = %upload.name, frames = decoded.len(), "decoded upload");

        for frame in decoded {
            if first_delay.is_none() && frame.delay_ms > 0 {
                first_delay = Some(frame.delay_ms);
            }

            let source = frame.source()?;
            let near = resample_to_grid(source, SamplingMode::Nearest)?;
            let smooth = resample_to_grid(source, SamplingMode::Bilinear)?;

            let id = gen_unique_frame_id(options.frame_id_length, |id| {
                nearest.contains_key(id) || existing.contains_key(id)
            })?;
            nearest.insert(id.clone(), near);
            bilinear.insert(id.clone(), smooth);
            frame_order.push(id);
        }
    }

    if frame_order.is_empty() {
        return Err(ImportError::Empty);
    }

    Ok(ImportedFrames {
        frame_order,
        frame_duration_ms: first_delay.unwrap_or(options.default_frame_duration_ms),
        nearest,
        bilinear,
    })
}

/// Read every supported image under `folder`, sorted by path
pub fn collect_uploads(folder: &Path) -> Result<Vec<Upload>, ImportError> {
    let mut paths: Vec<PathBuf> = WalkDir::new(folder)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_string_lossy().to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    paths.iter().map(|path| Upload::read(path)).collect()
}

fn decode_upload(upload: &Upload, max_gif_frames: usize) -> Result<Vec<DecodedFrame>, ImportError> {
    if upload.is_gif() {
        return extract_gif_frames(&upload.bytes, max_gif_frames).map_err(|source| ImportError::Gif {
            name: upload.name.clone(),
            source,
        });
    }

    let image = image::load_from_memory(&upload.bytes).map_err(|e| ImportError::Image {
        name: upload.name.clone(),
        message: e.to_string(),
    })?;
    let rgba = image.into_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(vec![DecodedFrame {
        rgba: rgba.into_raw(),
        width,
        height,
        delay_ms: 0,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::frame::Frame;
    use crate::grid::gif::tests::encode_gif;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn options() -> ImportOptions {
        ImportOptions {
            frame_id_length: 12,
            default_frame_duration_ms: 100,
            max_gif_frames: 64,
        }
    }

    fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_still_image_becomes_one_frame() {
        let uploads = vec![Upload {
            name: "red.png".into(),
            bytes: png(40, 30, [255, 0, 0, 255]),
        }];
        let imported = import_uploads(&uploads, &options(), &FrameMap::new()).unwrap();

        assert_eq!(imported.frame_order.len(), 1);
        assert_eq!(imported.frame_order[0].len(), 12);
        assert_eq!(imported.frame_duration_ms, 100);
        let id = &imported.frame_order[0];
        for mode in SamplingMode::ALL {
            assert_eq!(imported.frames(mode)[id], Frame::filled([255, 0, 0]));
        }
    }

    #[test]
    fn test_gif_and_still_share_one_animation() {
        let uploads = vec![
            Upload {
                name: "anim.gif".into(),
                bytes: encode_gif(8, 8, &[([0, 0, 0, 255], 0), ([255, 255, 255, 255], 250)]),
            },
            Upload {
                name: "tail.png".into(),
                bytes: png(3, 3, [0, 0, 255, 255]),
            },
        ];
        let imported = import_uploads(&uploads, &options(), &FrameMap::new()).unwrap();

        assert_eq!(imported.frame_order.len(), 3);
        // first non-zero delay wins
        assert_eq!(imported.frame_duration_ms, 250);
        for mode in SamplingMode::ALL {
            let frames = imported.frames(mode);
            assert_eq!(frames.len(), 3);
            assert!(imported.frame_order.iter().all(|id| frames.contains_key(id)));
        }
    }

    #[test]
    fn test_techniques_differ_on_gradients() {
        let mut image = RgbaImage::new(3, 1);
        image.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([255, 255, 255, 255]));
        image.put_pixel(2, 0, Rgba([0, 0, 0, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let imported = import_uploads(&[Upload { name: "g.png".into(), bytes }], &options(), &FrameMap::new()).unwrap();
        let id = &imported.frame_order[0];
        assert_ne!(
            imported.frames(SamplingMode::Nearest)[id],
            imported.frames(SamplingMode::Bilinear)[id]
        );
    }

    #[test]
    fn test_one_bad_file_aborts_upload() {
        let uploads = vec![
            Upload {
                name: "ok.png".into(),
                bytes: png(2, 2, [1, 2, 3, 255]),
            },
            Upload {
                name: "broken.gif".into(),
                bytes: b"GIF89a-truncated".to_vec(),
            },
        ];
        let err = import_uploads(&uploads, &options(), &FrameMap::new()).unwrap_err();
        assert!(matches!(err, ImportError::Gif { ref name, .. } if name == "broken.gif"));
    }

    #[test]
    fn test_into_animation_uses_selected_technique() {
        let uploads = vec![Upload {
            name: "a.png".into(),
            bytes: png(5, 5, [9, 9, 9, 255]),
        }];
        let imported = import_uploads(&uploads, &options(), &FrameMap::new()).unwrap();
        let expected = imported.frames(SamplingMode::Bilinear).clone();

        let (metadata, frames) = imported.into_animation("anim1", SamplingMode::Bilinear, RepeatCount::Infinite);
        assert_eq!(metadata.animation_id, "anim1");
        assert_eq!(metadata.frame_duration_ms, 100);
        assert_eq!(metadata.repeat, RepeatCount::Infinite);
        assert_eq!(frames, expected);
    }

    #[test]
    fn test_collect_uploads_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.png"), png(2, 2, [0, 0, 0, 255])).unwrap();
        std::fs::write(dir.path().join("a.gif"), encode_gif(2, 2, &[([0, 0, 0, 255], 10)])).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

        let uploads = collect_uploads(dir.path()).unwrap();
        let names: Vec<_> = uploads.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["a.gif", "b.png"]);
    }

    #[test]
    fn test_short_ids_run_out_instead_of_spinning() {
        let colors: Vec<([u8; 4], u32)> = (0..17u8).map(|i| ([i * 15, 0, 0, 255], 50)).collect();
        let uploads = vec![Upload {
            name: "long.gif".into(),
            bytes: encode_gif(4, 4, &colors),
        }];
        let options = ImportOptions {
            frame_id_length: 1,
            ..options()
        };

        let err = import_uploads(&uploads, &options, &FrameMap::new()).unwrap_err();
        assert!(matches!(
            err,
            ImportError::Frame(FrameError::IdSpaceExhausted { length: 1, .. })
        ));
    }

    #[test]
    fn test_new_ids_avoid_existing_frames() {
        // every single-digit id except "f" already belongs to someone else
        let existing: FrameMap = "0123456789abcde"
            .chars()
            .map(|c| (c.to_string(), Frame::filled([9, 9, 9])))
            .collect();
        let uploads = vec![Upload {
            name: "red.png".into(),
            bytes: png(4, 4, [255, 0, 0, 255]),
        }];
        let options = ImportOptions {
            frame_id_length: 1,
            ..options()
        };

        let imported = import_uploads(&uploads, &options, &existing).unwrap();
        assert_eq!(imported.frame_order, vec!["f".to_string()]);
    }

    #[test]
    fn test_empty_upload_rejected() {
        assert!(matches!(import_uploads(&[], &options(), &FrameMap::new()), Err(ImportError::Empty)));
    }
}
