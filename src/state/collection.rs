//! The active animation collection
//!
//! Owns the display order, the metadata of every queued animation, the shared
//! frame payload map and each animation's loading status. Frames can be shared
//! between animations, so every frame id carries a reference count that is
//! kept up to date on add, remove and metadata updates.

use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::data::{AnimationMetadata, FrameMap, LoadingStatus};
use crate::grid::frame::Frame;

/// Errors raised by collection operations. A failed operation leaves the
/// collection untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollectionError {
    #[error("animation {0:?} already exists")]
    DuplicateId(String),

    #[error("animation {0:?} does not exist")]
    UnknownAnimation(String),

    #[error("invalid metadata for {animation_id:?}: {reason}")]
    Validation { animation_id: String, reason: String },

    #[error("new order is not a permutation of the current one: {0}")]
    NotAPermutation(String),

    #[error("frame {frame_id:?} appears more than once in {animation_id:?}")]
    DuplicateFrame { animation_id: String, frame_id: String },

    #[error("animation {animation_id:?} references frames without payloads: {frame_ids:?}")]
    MissingFrames { animation_id: String, frame_ids: Vec<String> },

    #[error("index {index} out of range for {len} items")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Move the element at `start` so that it ends up at `end`
///
/// This is a single-element move, not a swap: the element is removed first
/// and reinserted at `end` in the shortened list.
///
/// # Panics
/// Panics if `start` or `end` is out of range.
pub fn reorder<T>(mut list: Vec<T>, start: usize, end: usize) -> Vec<T> {
    let item = list.remove(start);
    list.insert(end, item);
    list
}

/// Reference counts per frame id
///
/// Each animation contributes at most one reference per distinct frame id.
#[derive(Debug, Clone, Default)]
pub(crate) struct FrameRefs {
    counts: HashMap<String, usize>,
}

impl FrameRefs {
    pub(crate) fn retain(&mut self, frame_order: &[String]) {
        for id in distinct(frame_order) {
            *self.counts.entry(id.to_string()).or_insert(0) += 1;
        }
    }

    /// Drop one reference per distinct id; returns the ids nobody references anymore
    pub(crate) fn release(&mut self, frame_order: &[String]) -> Vec<String> {
        let mut freed = Vec::new();
        for id in distinct(frame_order) {
            if let Some(count) = self.counts.get_mut(id) {
                *count -= 1;
                if *count == 0 {
                    self.counts.remove(id);
                    freed.push(id.to_string());
                }
            }
        }
        freed
    }

    pub(crate) fn count(&self, frame_id: &str) -> usize {
        self.counts.get(frame_id).copied().unwrap_or(0)
    }

    pub(crate) fn clear(&mut self) {
        self.counts.clear();
    }
}

fn distinct(frame_order: &[String]) -> impl Iterator<Item = &str> {
    let mut seen = HashSet::new();
    frame_order
        .iter()
        .map(String::as_str)
        .filter(move |id| seen.insert(*id))
}

/// Proof that a load attempt was started; results for stale tickets are dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub animation_id: String,
    pub frame_order: Vec<String>,
    generation: u64,
}

/// What happened to a finished load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Ready,
    Failed,
    /// The animation was removed or reloaded while the fetch was in flight
    Discarded,
}

/// The active, editable set of animations
#[derive(Debug, Clone, Default)]
pub struct Collection {
    order: Vec<String>,
    animations: HashMap<String, AnimationMetadata>,
    frames: FrameMap,
    refs: FrameRefs,
    status: HashMap<String, LoadingStatus>,
    /// Current load generation per animation
    generations: HashMap<String, u64>,
    next_generation: u64,
    dirty: bool,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection from fetched metadata. Frames are not loaded yet, so
    /// every animation starts out `Loading`.
    pub fn from_metadata(list: Vec<AnimationMetadata>) -> Self {
        let mut collection = Self::new();
        for metadata in list {
            if collection.animations.contains_key(&metadata.animation_id) {
                warn!(animation_id = %metadata.animation_id, "duplicate animation in metadata, keeping the first");
                continue;
            }
            collection.refs.retain(&metadata.frame_order);
            collection.order.push(metadata.animation_id.clone());
            collection.status.insert(metadata.animation_id.clone(), LoadingStatus::Loading);
            collection.animations.insert(metadata.animation_id.clone(), metadata);
        }
        info!(animations = collection.order.len(), "collection loaded");
        collection
    }

    // ========== Queries ==========

    /// Animation ids in display order
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Metadata in display order
    pub fn iter(&self) -> impl Iterator<Item = &AnimationMetadata> {
        self.order.iter().filter_map(|id| self.animations.get(id))
    }

    pub fn get(&self, animation_id: &str) -> Option<&AnimationMetadata> {
        self.animations.get(animation_id)
    }

    pub fn contains(&self, animation_id: &str) -> bool {
        self.animations.contains_key(animation_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn frames(&self) -> &FrameMap {
        &self.frames
    }

    pub fn frame(&self, frame_id: &str) -> Option<&Frame> {
        self.frames.get(frame_id)
    }

    /// Number of animations referencing `frame_id`
    pub fn frame_ref_count(&self, frame_id: &str) -> usize {
        self.refs.count(frame_id)
    }

    pub fn status(&self, animation_id: &str) -> Option<&LoadingStatus> {
        self.status.get(animation_id)
    }

    /// True when there are edits not yet persisted
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    // ========== Mutations ==========

    /// Add a new animation at the front of the display order
    ///
    /// Entries of `frames` named by some frame order (this one included) are
    /// merged into the shared frame map, overwriting by id so frame edits can
    /// be submitted keyed by id. Entries nobody references are dropped.
    pub fn add_animation(&mut self, metadata: AnimationMetadata, frames: FrameMap) -> Result<(), CollectionError> {
        let id = metadata.animation_id.clone();
        if self.animations.contains_key(&id) {
            return Err(CollectionError::DuplicateId(id));
        }
        if let Some(frame_id) = metadata.duplicate_frame() {
            return Err(CollectionError::DuplicateFrame {
                animation_id: id,
                frame_id: frame_id.to_string(),
            });
        }
        let missing: Vec<String> = metadata
            .frame_order
            .iter()
            .filter(|f| !frames.contains_key(*f) && !self.frames.contains_key(*f))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(CollectionError::MissingFrames {
                animation_id: id,
                frame_ids: missing,
            });
        }

        self.refs.retain(&metadata.frame_order);
        let offered = frames.len();
        for (frame_id, frame) in frames {
            if self.refs.count(&frame_id) > 0 {
                self.frames.insert(frame_id, frame);
            }
        }
        self.order.insert(0, id.clone());
        self.status.insert(id.clone(), LoadingStatus::Ready);
        self.animations.insert(id.clone(), metadata);
        self.dirty = true;

        info!(animation_id = %id, offered_frames = offered, "animation added");
        Ok(())
    }

    /// Remove an animation and every frame no other animation references.
    /// Removing an absent id is a no-op.
    pub fn remove_animation(&mut self, animation_id: &str) -> Option<AnimationMetadata> {
        let metadata = self.animations.remove(animation_id)?;
        self.order.retain(|id| id != animation_id);
        self.status.remove(animation_id);
        self.generations.remove(animation_id);

        let freed = self.refs.release(&metadata.frame_order);
        for frame_id in &freed {
            self.frames.remove(frame_id);
        }
        self.dirty = true;

        info!(animation_id, freed_frames = freed.len(), "animation removed");
        Some(metadata)
    }

    /// Replace the display order with a permutation of the current ids
    pub fn rearrange_animations(&mut self, new_order: Vec<String>) -> Result<(), CollectionError> {
        check_permutation(&self.order, &new_order)?;
        self.order = new_order;
        self.dirty = true;
        Ok(())
    }

    /// Replace one animation's frame order with a permutation of it
    pub fn rearrange_frames(&mut self, animation_id: &str, new_frame_order: Vec<String>) -> Result<(), CollectionError> {
        let metadata = self
            .animations
            .get_mut(animation_id)
            .ok_or_else(|| CollectionError::UnknownAnimation(animation_id.to_string()))?;
        check_permutation(&metadata.frame_order, &new_frame_order)?;
        metadata.frame_order = new_frame_order;
        self.dirty = true;
        Ok(())
    }

    /// Move one animation within the display order
    pub fn move_animation(&mut self, start: usize, end: usize) -> Result<(), CollectionError> {
        let len = self.order.len();
        bounds_check(start, len)?;
        bounds_check(end, len)?;
        let new_order = reorder(self.order.clone(), start, end);
        self.rearrange_animations(new_order)
    }

    /// Move one frame within an animation's frame order
    pub fn move_frame(&mut self, animation_id: &str, start: usize, end: usize) -> Result<(), CollectionError> {
        let current = self
            .animations
            .get(animation_id)
            .ok_or_else(|| CollectionError::UnknownAnimation(animation_id.to_string()))?
            .frame_order
            .clone();
        bounds_check(start, current.len())?;
        bounds_check(end, current.len())?;
        self.rearrange_frames(animation_id, reorder(current, start, end))
    }

    /// Replace an animation's metadata wholesale
    ///
    /// Rejected when a required field is empty or zero, when the id would
    /// change, or when the new frame order has duplicates or unknown frames.
    /// Frames the animation no longer uses are released.
    pub fn update_metadata(&mut self, animation_id: &str, new_metadata: AnimationMetadata) -> Result<(), CollectionError> {
        let missing = new_metadata.missing_fields();
        if !missing.is_empty() {
            warn!(animation_id, ?missing, "rejected metadata update");
            return Err(CollectionError::Validation {
                animation_id: animation_id.to_string(),
                reason: format!("missing required fields: {}", missing.join(", ")),
            });
        }
        if new_metadata.animation_id != animation_id {
            warn!(animation_id, new_id = %new_metadata.animation_id, "rejected metadata update");
            return Err(CollectionError::Validation {
                animation_id: animation_id.to_string(),
                reason: format!("animation id cannot change to {:?}", new_metadata.animation_id),
            });
        }
        if let Some(frame_id) = new_metadata.duplicate_frame() {
            return Err(CollectionError::DuplicateFrame {
                animation_id: animation_id.to_string(),
                frame_id: frame_id.to_string(),
            });
        }
        if !self.animations.contains_key(animation_id) {
            return Err(CollectionError::UnknownAnimation(animation_id.to_string()));
        }
        let unknown: Vec<String> = new_metadata
            .missing_frames(&self.frames)
            .into_iter()
            .map(str::to_string)
            .collect();
        if !unknown.is_empty() && self.status(animation_id).map_or(false, LoadingStatus::is_ready) {
            return Err(CollectionError::MissingFrames {
                animation_id: animation_id.to_string(),
                frame_ids: unknown,
            });
        }

        self.refs.retain(&new_metadata.frame_order);
        if let Some(old) = self.animations.insert(animation_id.to_string(), new_metadata) {
            for frame_id in self.refs.release(&old.frame_order) {
                self.frames.remove(&frame_id);
            }
        }
        self.dirty = true;
        debug!(animation_id, "metadata updated");
        Ok(())
    }

    // ========== Loading ==========

    /// Start (or restart) a frame load for an animation, resetting it to `Loading`
    pub fn begin_load(&mut self, animation_id: &str) -> Option<LoadTicket> {
        let metadata = self.animations.get(animation_id)?;
        self.next_generation += 1;
        let generation = self.next_generation;

        self.generations.insert(animation_id.to_string(), generation);
        self.status.insert(animation_id.to_string(), LoadingStatus::Loading);

        Some(LoadTicket {
            animation_id: animation_id.to_string(),
            frame_order: metadata.frame_order.clone(),
            generation,
        })
    }

    /// Apply the result of a load started with `begin_load`
    ///
    /// Results for animations that were removed, or that have been reloaded
    /// since the ticket was issued, are discarded without touching the frame map.
    pub fn finish_load(&mut self, ticket: LoadTicket, result: Result<FrameMap, String>) -> LoadOutcome {
        let current = self.generations.get(&ticket.animation_id).copied();
        if current != Some(ticket.generation) {
            debug!(animation_id = %ticket.animation_id, "discarding stale frame fetch");
            return LoadOutcome::Discarded;
        }

        match result {
            Ok(frames) => {
                // Only keep payloads this collection still references
                let wanted: Vec<(String, Frame)> = frames
                    .into_iter()
                    .filter(|(id, _)| self.refs.count(id) > 0)
                    .collect();
                self.frames.extend(wanted);

                let missing: Vec<String> = self.animations[&ticket.animation_id]
                    .missing_frames(&self.frames)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                if missing.is_empty() {
                    self.status.insert(ticket.animation_id.clone(), LoadingStatus::Ready);
                    debug!(animation_id = %ticket.animation_id, "frames ready");
                    LoadOutcome::Ready
                } else {
                    let message = format!("missing frames: {}", missing.join(", "));
                    warn!(animation_id = %ticket.animation_id, %message, "frame load incomplete");
                    self.status.insert(ticket.animation_id, LoadingStatus::Error(message));
                    LoadOutcome::Failed
                }
            }
            Err(message) => {
                warn!(animation_id = %ticket.animation_id, %message, "frame load failed");
                self.status.insert(ticket.animation_id, LoadingStatus::Error(message));
                LoadOutcome::Failed
            }
        }
    }
}

fn bounds_check(index: usize, len: usize) -> Result<(), CollectionError> {
    if index >= len {
        return Err(CollectionError::IndexOutOfRange { index, len });
    }
    Ok(())
}

fn check_permutation(current: &[String], proposed: &[String]) -> Result<(), CollectionError> {
    if current.len() != proposed.len() {
        return Err(CollectionError::NotAPermutation(format!(
            "expected {} ids, got {}",
            current.len(),
            proposed.len()
        )));
    }

    let mut remaining: HashMap<&str, usize> = HashMap::new();
    for id in current {
        *remaining.entry(id.as_str()).or_insert(0) += 1;
    }
    for id in proposed {
        match remaining.get_mut(id.as_str()) {
            Some(count) if *count > 0 => *count -= 1,
            _ => return Err(CollectionError::NotAPermutation(format!("unexpected id {:?}", id))),
        }
    }
    Ok(())
}
