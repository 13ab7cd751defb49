//! Saved-animation catalog and its reconciliation with the active queue
//!
//! The catalog lists saved animations that are not queued, plus its own
//! frame cache filled lazily from the store. An animation is either in the
//! queue or in the catalog list, never both.

use thiserror::Error;
use tracing::{debug, info, warn};

use super::collection::{CollectionError, FrameRefs};
use super::data::{AnimationMetadata, FrameMap};
use super::store::{fetch_frames, AnimationStore, StoreError};
use super::workspace::Workspace;

/// Errors raised by catalog operations
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error("animation {0:?} is not in the catalog")]
    NotInCatalog(String),

    #[error("catalog animation {animation_id:?} is missing frames: {frame_ids:?}")]
    MissingFrames { animation_id: String, frame_ids: Vec<String> },

    #[error("failed to load frames for {} catalog animation(s): {}", failures.len(), describe(failures))]
    PartialFetch { failures: Vec<(String, String)> },

    #[error("failed to archive {animation_id:?}{}: {source}", if *dequeued { " (already removed from the queue)" } else { "" })]
    ArchiveFailed {
        animation_id: String,
        /// The queue removal that preceded the failed request stays in effect
        dequeued: bool,
        #[source]
        source: StoreError,
    },
}

fn describe(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(id, message)| format!("{}: {}", id, message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Catalog entries and their frame cache
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<AnimationMetadata>,
    frames: FrameMap,
    refs: FrameRefs,
}

impl Catalog {
    pub fn entries(&self) -> &[AnimationMetadata] {
        &self.entries
    }

    pub fn frames(&self) -> &FrameMap {
        &self.frames
    }

    pub fn get(&self, animation_id: &str) -> Option<&AnimationMetadata> {
        self.entries.iter().find(|e| e.animation_id == animation_id)
    }

    pub fn contains(&self, animation_id: &str) -> bool {
        self.get(animation_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if any frame of a non-empty entry is absent from the cache
    pub fn needs_frames(&self, entry: &AnimationMetadata) -> bool {
        entry.frame_order.iter().any(|id| !self.frames.contains_key(id))
    }

    fn replace_entries(&mut self, entries: Vec<AnimationMetadata>) {
        self.refs.clear();
        for entry in &entries {
            self.refs.retain(&entry.frame_order);
        }
        self.entries = entries;
        self.drop_unreferenced_frames();
    }

    /// Evict cached frames no remaining entry names
    fn drop_unreferenced_frames(&mut self) -> usize {
        let refs = &self.refs;
        let before = self.frames.len();
        self.frames.retain(|frame_id, _| refs.count(frame_id) > 0);
        before - self.frames.len()
    }

    fn remove_entry(&mut self, animation_id: &str) -> Option<AnimationMetadata> {
        let index = self.entries.iter().position(|e| e.animation_id == animation_id)?;
        let entry = self.entries.remove(index);
        self.refs.release(&entry.frame_order);
        Some(entry)
    }
}

impl<S: AnimationStore> Workspace<S> {
    /// Reload the catalog from the store, leaving out anything already queued
    pub fn refresh_catalog(&mut self) -> Result<usize, CatalogError> {
        let fetched = self.store.fetch_catalog()?;
        let total = fetched.len();

        let mut seen = std::collections::HashSet::new();
        let available: Vec<AnimationMetadata> = fetched
            .into_iter()
            .filter(|entry| !self.collection.contains(&entry.animation_id))
            .filter(|entry| seen.insert(entry.animation_id.clone()))
            .collect();

        info!(total, available = available.len(), "catalog refreshed");
        let count = available.len();
        self.catalog.replace_entries(available);
        Ok(count)
    }

    /// Fill the catalog frame cache for the given entries
    ///
    /// Entries whose frames are all cached, or that have no frames, are
    /// skipped. One entry failing does not stop the others; frames fetched
    /// before and after a failure stay cached and the failures are reported
    /// together. Returns the number of entries fetched.
    pub fn ensure_frames_loaded(&mut self, animation_ids: &[String]) -> Result<usize, CatalogError> {
        let targets: Vec<AnimationMetadata> = animation_ids
            .iter()
            .filter_map(|id| self.catalog.get(id))
            .filter(|entry| !entry.frame_order.is_empty() && self.catalog.needs_frames(entry))
            .cloned()
            .collect();

        let mut fetched = 0;
        let mut failures = Vec::new();
        for entry in targets {
            match fetch_frames(&self.store, &entry.animation_id, &entry.frame_order) {
                Ok(frames) => {
                    debug!(animation_id = %entry.animation_id, frames = frames.len(), "catalog frames cached");
                    self.catalog.frames.extend(frames);
                    fetched += 1;
                }
                Err(e) => {
                    warn!(animation_id = %entry.animation_id, error = %e, "catalog frame fetch failed");
                    failures.push((entry.animation_id.clone(), e.to_string()));
                }
            }
        }

        if !failures.is_empty() {
            return Err(CatalogError::PartialFetch { failures });
        }
        Ok(fetched)
    }

    /// `ensure_frames_loaded` over every catalog entry
    pub fn ensure_all_frames_loaded(&mut self) -> Result<usize, CatalogError> {
        let ids: Vec<String> = self.catalog.entries.iter().map(|e| e.animation_id.clone()).collect();
        self.ensure_frames_loaded(&ids)
    }

    /// Move a catalog animation into the active queue
    ///
    /// Returns `Ok(false)` without doing anything if it is already queued.
    /// Every frame must already be in the catalog cache; otherwise nothing is added.
    pub fn add_catalog_animation(&mut self, animation_id: &str) -> Result<bool, CatalogError> {
        if self.collection.contains(animation_id) {
            debug!(animation_id, "already queued");
            return Ok(false);
        }

        let entry = self
            .catalog
            .get(animation_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotInCatalog(animation_id.to_string()))?;

        let missing: Vec<String> = entry
            .missing_frames(&self.catalog.frames)
            .into_iter()
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            warn!(animation_id, ?missing, "catalog animation has unloaded frames");
            return Err(CatalogError::MissingFrames {
                animation_id: animation_id.to_string(),
                frame_ids: missing,
            });
        }

        let frames: FrameMap = entry
            .frame_order
            .iter()
            .filter_map(|id| self.catalog.frames.get(id).map(|f| (id.clone(), f.clone())))
            .collect();
        self.collection.add_animation(entry, frames)?;
        self.catalog.remove_entry(animation_id);
        let evicted = self.catalog.drop_unreferenced_frames();
        debug!(animation_id, evicted, "catalog frames handed to the queue");

        info!(animation_id, "catalog animation queued");
        Ok(true)
    }

    /// Archive a saved animation, removing it from the queue first if needed
    ///
    /// The queue removal is not rolled back when the store rejects the archive.
    pub fn archive_animation(&mut self, animation_id: &str) -> Result<(), CatalogError> {
        let dequeued = self.collection.remove_animation(animation_id);

        if let Err(e) = self.store.archive(animation_id) {
            warn!(
                animation_id,
                error = %e,
                dequeued = dequeued.is_some(),
                "archive failed; queue removal stays in effect"
            );
            return Err(CatalogError::ArchiveFailed {
                animation_id: animation_id.to_string(),
                dequeued: dequeued.is_some(),
                source: e,
            });
        }

        let entry = self.catalog.remove_entry(animation_id);
        let frame_order = entry
            .map(|e| e.frame_order)
            .or_else(|| dequeued.map(|m| m.frame_order))
            .unwrap_or_default();

        let mut dropped = 0;
        for frame_id in &frame_order {
            if self.catalog.refs.count(frame_id) == 0
                && self.collection.frame_ref_count(frame_id) == 0
                && self.catalog.frames.remove(frame_id).is_some()
            {
                dropped += 1;
            }
        }

        info!(animation_id, dropped_frames = dropped, "animation archived");
        Ok(())
    }
}
