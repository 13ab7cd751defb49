//! Concurrent frame prefetch
//!
//! Fetches every animation's frame batch on tokio's blocking pool, one task
//! per animation. Each task opens its own store (an SQLite connection cannot
//! be shared across threads). Results are applied to the collection one at a
//! time as tasks finish, in whatever order that happens.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::collection::{Collection, LoadOutcome, LoadTicket};
use super::data::FrameMap;
use super::store::{fetch_frames, AnimationStore, StoreError};
use super::workspace::Workspace;

/// Load frames for every animation in `collection` concurrently
///
/// `open_store` is called once per task to get a store handle. Results that
/// arrive after their animation was removed or reloaded are discarded.
pub async fn prefetch_concurrent<T, F>(collection: &mut Collection, open_store: F) -> Vec<(String, LoadOutcome)>
where
    T: AnimationStore,
    F: Fn() -> Result<T, StoreError> + Send + Sync + 'static,
{
    let open_store = Arc::new(open_store);
    let mut tasks: JoinSet<(LoadTicket, Result<FrameMap, String>)> = JoinSet::new();
    let mut pending = Vec::new();

    for animation_id in collection.order().to_vec() {
        let Some(ticket) = collection.begin_load(&animation_id) else {
            continue;
        };
        pending.push(ticket.clone());

        let open_store = Arc::clone(&open_store);
        tasks.spawn_blocking(move || {
            let result = open_store()
                .and_then(|store| fetch_frames(&store, &ticket.animation_id, &ticket.frame_order))
                .map_err(|e| e.to_string());
            (ticket, result)
        });
    }

    let mut outcomes = Vec::with_capacity(pending.len());
    let mut finished = HashSet::new();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((ticket, result)) => {
                let animation_id = ticket.animation_id.clone();
                let outcome = collection.finish_load(ticket, result);
                finished.insert(animation_id.clone());
                outcomes.push((animation_id, outcome));
            }
            Err(e) => warn!(error = %e, "frame fetch task did not complete"),
        }
    }

    // Tasks that panicked or were cancelled never reported back
    for ticket in pending {
        if !finished.contains(&ticket.animation_id) {
            let animation_id = ticket.animation_id.clone();
            let outcome = collection.finish_load(ticket, Err("frame fetch task failed".to_string()));
            outcomes.push((animation_id, outcome));
        }
    }

    let failed = outcomes.iter().filter(|(_, o)| *o == LoadOutcome::Failed).count();
    info!(animations = outcomes.len(), failed, "prefetch finished");
    outcomes
}

impl<S: AnimationStore> Workspace<S> {
    /// `prefetch_all`, but with one concurrent fetch per animation
    pub async fn prefetch_concurrent<T, F>(&mut self, open_store: F) -> Vec<(String, LoadOutcome)>
    where
        T: AnimationStore,
        F: Fn() -> Result<T, StoreError> + Send + Sync + 'static,
    {
        prefetch_concurrent(&mut self.collection, open_store).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::frame::Frame;
    use crate::state::data::{AnimationMetadata, LoadingStatus, RepeatCount};
    use crate::state::library::Library;
    use tempfile::TempDir;

    fn meta(id: &str, frames: &[&str]) -> AnimationMetadata {
        AnimationMetadata {
            animation_id: id.to_string(),
            frame_duration_ms: 60,
            repeat: RepeatCount::times(1).unwrap(),
            frame_order: frames.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn seeded_library(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("prefetch.db");
        let mut library = Library::open(&path).unwrap();
        let frames: FrameMap = ["f1", "f2", "f3"]
            .iter()
            .map(|id| (id.to_string(), Frame::filled([1, 2, 3])))
            .collect();
        library
            .persist(&[meta("a", &["f1", "f2"]), meta("b", &["f2", "f3"]), meta("c", &["f3"])], &frames)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_concurrent_prefetch_loads_everything() {
        let dir = TempDir::new().unwrap();
        let path = seeded_library(&dir);

        let mut ws = Workspace::new(Library::open(&path).unwrap());
        ws.load().unwrap();

        let open_path = path.clone();
        let outcomes = ws.prefetch_concurrent(move || Library::open(&open_path)).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|(_, o)| *o == LoadOutcome::Ready));
        for id in ["a", "b", "c"] {
            assert_eq!(ws.collection().status(id), Some(&LoadingStatus::Ready));
        }
        assert_eq!(ws.collection().frames().len(), 3);
    }

    #[tokio::test]
    async fn test_store_failures_mark_each_animation() {
        let dir = TempDir::new().unwrap();
        let path = seeded_library(&dir);

        let mut ws = Workspace::new(Library::open(&path).unwrap());
        ws.load().unwrap();

        let outcomes = ws
            .prefetch_concurrent(|| -> Result<Library, StoreError> { Err(StoreError::Unavailable("offline".into())) })
            .await;

        assert_eq!(outcomes.len(), 3);
        for id in ["a", "b", "c"] {
            assert_eq!(
                ws.collection().status(id),
                Some(&LoadingStatus::Error("offline".into()))
            );
        }
        assert!(ws.collection().frames().is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_is_per_animation() {
        let dir = TempDir::new().unwrap();
        let path = seeded_library(&dir);

        let mut collection = Collection::from_metadata(vec![meta("a", &["f1"]), meta("broken", &["missing"])]);
        let open_path = path.clone();
        let outcomes = prefetch_concurrent(&mut collection, move || Library::open(&open_path)).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(collection.status("a"), Some(&LoadingStatus::Ready));
        assert!(matches!(collection.status("broken"), Some(LoadingStatus::Error(_))));
    }
}
