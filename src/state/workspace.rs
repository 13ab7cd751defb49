//! Top-level application state container
//!
//! A `Workspace` exclusively owns the active collection, the catalog and the
//! store they are loaded from and saved to. Every mutation goes through the
//! collection/catalog operations; nothing else holds a mutable reference.

use tracing::{info, warn};

use super::catalog::Catalog;
use super::collection::{Collection, LoadOutcome};
use super::store::{fetch_frames, AnimationStore, StoreError};

pub struct Workspace<S: AnimationStore> {
    pub(crate) store: S,
    pub(crate) collection: Collection,
    pub(crate) catalog: Catalog,
}

impl<S: AnimationStore> Workspace<S> {
    /// An empty workspace; call `load` to pull the saved queue
    pub fn new(store: S) -> Self {
        Self {
            store,
            collection: Collection::new(),
            catalog: Catalog::default(),
        }
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Mutable access for the collection operations (add, remove, rearrange, update)
    pub fn collection_mut(&mut self) -> &mut Collection {
        &mut self.collection
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replace the collection with the stored queue. Frames are not fetched,
    /// so every animation is `Loading` afterwards.
    pub fn load(&mut self) -> Result<(), StoreError> {
        let metadata = self.store.fetch_metadata()?;
        self.collection = Collection::from_metadata(metadata);
        Ok(())
    }

    /// Fetch one animation's frames. `None` if the animation is unknown.
    pub fn prefetch(&mut self, animation_id: &str) -> Option<LoadOutcome> {
        let ticket = self.collection.begin_load(animation_id)?;
        let result = fetch_frames(&self.store, &ticket.animation_id, &ticket.frame_order).map_err(|e| e.to_string());
        Some(self.collection.finish_load(ticket, result))
    }

    /// Fetch frames for every animation in display order. A failure only marks
    /// that animation as errored; the rest still load.
    pub fn prefetch_all(&mut self) -> Vec<(String, LoadOutcome)> {
        let ids = self.collection.order().to_vec();
        ids.into_iter()
            .filter_map(|id| self.prefetch(&id).map(|outcome| (id, outcome)))
            .collect()
    }

    /// Persist the whole collection, replacing the stored queue
    pub fn save(&mut self) -> Result<(), StoreError> {
        for id in self.collection.order() {
            match self.collection.status(id) {
                Some(status) if status.is_ready() => {}
                Some(status) => {
                    warn!(animation_id = %id, %status, "refusing to save while frames are not loaded");
                    return Err(StoreError::Unavailable(format!(
                        "animation {:?} cannot be saved ({})",
                        id, status
                    )));
                }
                None => {
                    return Err(StoreError::Unavailable(format!("animation {:?} has no loading status", id)));
                }
            }
        }

        let animations: Vec<_> = self.collection.iter().cloned().collect();
        self.store.persist(&animations, self.collection.frames())?;
        self.collection.mark_saved();
        info!(animations = animations.len(), "workspace saved");
        Ok(())
    }
}

impl<S: AnimationStore + std::fmt::Debug> std::fmt::Debug for Workspace<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("store", &self.store)
            .field("animations", &self.collection.len())
            .field("catalog", &self.catalog.len())
            .finish()
    }
}
