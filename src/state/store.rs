//! Storage collaborator interface
//!
//! Everything the collection and catalog need from the outside world:
//! metadata and catalog listings, frame payloads, wholesale saves and archiving.

use thiserror::Error;

use super::data::{AnimationMetadata, FrameMap};
use crate::grid::frame::{split_batch, Frame, FrameError};

/// Errors raised by a store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to prepare storage location: {0}")]
    Io(#[from] std::io::Error),

    #[error("animation {0:?} not found")]
    NotFound(String),

    #[error("frame {0:?} not found")]
    MissingFrame(String),

    #[error("corrupt frame data: {0}")]
    Corrupt(#[from] FrameError),

    #[error("{0}")]
    Unavailable(String),
}

/// Persistence backend for animations, the catalog and frame payloads
pub trait AnimationStore {
    /// The active queue, in display order
    fn fetch_metadata(&self) -> Result<Vec<AnimationMetadata>, StoreError>;

    /// Every saved, non-archived animation
    fn fetch_catalog(&self) -> Result<Vec<AnimationMetadata>, StoreError>;

    /// All frames of one animation concatenated in `frame_order` order,
    /// `frame_order.len() * 768` bytes long
    fn fetch_frame_batch(&self, animation_id: &str, frame_order: &[String]) -> Result<Vec<u8>, StoreError>;

    /// A single frame payload
    fn fetch_frame(&self, frame_id: &str) -> Result<Frame, StoreError>;

    /// Replace the stored queue wholesale with `animations` and their frames
    fn persist(&mut self, animations: &[AnimationMetadata], frames: &FrameMap) -> Result<(), StoreError>;

    /// Move a saved animation to the archive
    fn archive(&mut self, animation_id: &str) -> Result<(), StoreError>;
}

/// Fetch an animation's frame batch and slice it into frames
pub fn fetch_frames<S: AnimationStore + ?Sized>(
    store: &S,
    animation_id: &str,
    frame_order: &[String],
) -> Result<FrameMap, StoreError> {
    let blob = store.fetch_frame_batch(animation_id, frame_order)?;
    Ok(split_batch(frame_order, &blob)?)
}
