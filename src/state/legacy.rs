//! Legacy two-document layout
//!
//! The first editor persisted two flat JSON documents: an ordered list of
//! animation ids, and a list of animation records with their frames inlined
//! as 256-entry arrays of `#rrggbb` strings. Frames had no ids of their own,
//! so importing generates fresh frame ids.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use super::collection::{Collection, CollectionError};
use super::data::{AnimationMetadata, FrameMap, RepeatCount};
use crate::grid::frame::{gen_unique_frame_id, Frame, FrameError};

const ORDER_FILE: &str = "order.json";
const ANIMATIONS_FILE: &str = "animations.json";

#[derive(Debug, Error)]
pub enum LegacyError {
    #[error("failed to access legacy document: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed legacy document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("animation {animation_id:?}: {source}")]
    Frame {
        animation_id: String,
        #[source]
        source: FrameError,
    },

    #[error("order lists {0:?} but no record exists for it")]
    MissingRecord(String),

    #[error("animation {0:?} cannot be exported before its frames are loaded")]
    NotLoaded(String),

    #[error(transparent)]
    Collection(#[from] CollectionError),
}

/// One legacy animation record
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LegacyAnimation {
    pub id: String,
    #[serde(rename = "frameDuration")]
    pub frame_duration: u32,
    #[serde(rename = "repeatCount")]
    pub repeat_count: RepeatCount,
    pub frames: Vec<Vec<String>>,
}

/// Both legacy documents together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyDocuments {
    pub order: Vec<String>,
    pub animations: Vec<LegacyAnimation>,
}

impl LegacyDocuments {
    /// Inline every frame of the collection, in display order
    pub fn export(collection: &Collection) -> Result<Self, LegacyError> {
        let mut animations = Vec::with_capacity(collection.len());
        for metadata in collection.iter() {
            let frames = metadata
                .frame_order
                .iter()
                .map(|id| collection.frame(id).map(Frame::to_hex_pixels))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| LegacyError::NotLoaded(metadata.animation_id.clone()))?;

            animations.push(LegacyAnimation {
                id: metadata.animation_id.clone(),
                frame_duration: metadata.frame_duration_ms,
                repeat_count: metadata.repeat,
                frames,
            });
        }

        Ok(Self {
            order: collection.order().to_vec(),
            animations,
        })
    }

    /// Build a fresh collection in the documents' order
    ///
    /// Records not named in the order document are skipped. Generated frame
    /// ids avoid every id in `existing`.
    pub fn import(&self, frame_id_length: usize, existing: &FrameMap) -> Result<Collection, LegacyError> {
        let records: HashMap<&str, &LegacyAnimation> = self.animations.iter().map(|a| (a.id.as_str(), a)).collect();
        let mut collection = Collection::new();

        // add_animation puts new entries first, so walk the order backwards
        for animation_id in self.order.iter().rev() {
            let record = records
                .get(animation_id.as_str())
                .ok_or_else(|| LegacyError::MissingRecord(animation_id.clone()))?;

            let mut frame_order = Vec::with_capacity(record.frames.len());
            let mut frames = FrameMap::new();
            for hex in &record.frames {
                let frame = Frame::from_hex_pixels(hex).map_err(|source| LegacyError::Frame {
                    animation_id: animation_id.clone(),
                    source,
                })?;
                let frame_id = gen_unique_frame_id(frame_id_length, |id| {
                    frames.contains_key(id) || collection.frame(id).is_some() || existing.contains_key(id)
                })
                .map_err(|source| LegacyError::Frame {
                    animation_id: animation_id.clone(),
                    source,
                })?;
                frames.insert(frame_id.clone(), frame);
                frame_order.push(frame_id);
            }

            let metadata = AnimationMetadata {
                animation_id: animation_id.clone(),
                frame_duration_ms: record.frame_duration,
                repeat: record.repeat_count,
                frame_order,
            };
            collection.add_animation(metadata, frames)?;
        }

        let skipped = self.animations.iter().filter(|a| !self.order.contains(&a.id)).count();
        if skipped > 0 {
            warn!(skipped, "legacy records without an order entry were skipped");
        }
        info!(animations = collection.len(), "imported legacy documents");
        Ok(collection)
    }

    /// Write `order.json` and `animations.json` into `dir`
    pub fn write_dir(&self, dir: &Path) -> Result<(), LegacyError> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(ORDER_FILE), serde_json::to_string_pretty(&self.order)?)?;
        std::fs::write(dir.join(ANIMATIONS_FILE), serde_json::to_string_pretty(&self.animations)?)?;
        Ok(())
    }

    /// Read `order.json` and `animations.json` from `dir`
    pub fn read_dir(dir: &Path) -> Result<Self, LegacyError> {
        let order = serde_json::from_str(&std::fs::read_to_string(dir.join(ORDER_FILE))?)?;
        let animations = serde_json::from_str(&std::fs::read_to_string(dir.join(ANIMATIONS_FILE))?)?;
        Ok(Self { order, animations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::frame::GRID_PIXELS;

    fn collection() -> Collection {
        let mut collection = Collection::new();
        let frames: FrameMap = [("f2".to_string(), Frame::filled([0, 0, 255]))].into();
        collection
            .add_animation(
                AnimationMetadata {
                    animation_id: "second".into(),
                    frame_duration_ms: 250,
                    repeat: RepeatCount::Infinite,
                    frame_order: vec!["f2".into()],
                },
                frames,
            )
            .unwrap();
        collection
            .add_animation(
                AnimationMetadata {
                    animation_id: "first".into(),
                    frame_duration_ms: 500,
                    repeat: RepeatCount::times(3).unwrap(),
                    frame_order: vec!["f1".into(), "f2".into()],
                },
                [("f1".to_string(), Frame::filled([255, 0, 0]))].into(),
            )
            .unwrap();
        collection
    }

    #[test]
    fn test_export_inlines_hex_frames() {
        let docs = LegacyDocuments::export(&collection()).unwrap();
        assert_eq!(docs.order, vec!["first", "second"]);
        assert_eq!(docs.animations[0].frames.len(), 2);
        assert_eq!(docs.animations[0].frames[0].len(), GRID_PIXELS);
        assert_eq!(docs.animations[0].frames[0][0], "#ff0000");
        assert_eq!(docs.animations[1].frame_duration, 250);
    }

    #[test]
    fn test_import_preserves_order_and_pixels() {
        let docs = LegacyDocuments::export(&collection()).unwrap();
        let imported = docs.import(10, &FrameMap::new()).unwrap();

        assert_eq!(imported.order(), &["first".to_string(), "second".to_string()]);
        let first = imported.get("first").unwrap();
        assert_eq!(first.repeat, RepeatCount::times(3).unwrap());
        assert_eq!(first.frame_order.len(), 2);
        assert!(first.frame_order.iter().all(|id| id.len() == 10));
        assert_eq!(imported.frame(&first.frame_order[1]), Some(&Frame::filled([0, 0, 255])));
        assert!(imported.status("second").unwrap().is_ready());
    }

    #[test]
    fn test_import_avoids_ids_already_in_use() {
        let docs = LegacyDocuments::export(&collection()).unwrap();
        let existing: FrameMap = "0123456789abc"
            .chars()
            .map(|c| (c.to_string(), Frame::filled([7, 7, 7])))
            .collect();

        let imported = docs.import(1, &existing).unwrap();
        let mut used: Vec<&str> = imported.frames().keys().map(String::as_str).collect();
        used.sort();
        assert_eq!(used, vec!["d", "e", "f"]);
    }

    #[test]
    fn test_import_fails_when_ids_run_out() {
        let docs = LegacyDocuments::export(&collection()).unwrap();
        let existing: FrameMap = "0123456789abcde"
            .chars()
            .map(|c| (c.to_string(), Frame::filled([7, 7, 7])))
            .collect();

        assert!(matches!(
            docs.import(1, &existing),
            Err(LegacyError::Frame {
                source: FrameError::IdSpaceExhausted { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_import_missing_record() {
        let docs = LegacyDocuments {
            order: vec!["ghost".into()],
            animations: vec![],
        };
        assert!(matches!(docs.import(8, &FrameMap::new()), Err(LegacyError::MissingRecord(_))));
    }

    #[test]
    fn test_import_rejects_bad_pixels() {
        let mut docs = LegacyDocuments::export(&collection()).unwrap();
        docs.animations[1].frames[0].pop();
        assert!(matches!(docs.import(8, &FrameMap::new()), Err(LegacyError::Frame { .. })));
    }

    #[test]
    fn test_documents_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let docs = LegacyDocuments::export(&collection()).unwrap();
        docs.write_dir(&dir.path().join("legacy")).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("legacy").join("animations.json")).unwrap();
        assert!(raw.contains("\"frameDuration\": 500"));
        assert!(raw.contains("\"repeatCount\": \"infinite\""));

        let read = LegacyDocuments::read_dir(&dir.path().join("legacy")).unwrap();
        assert_eq!(read, docs);
    }

    #[test]
    fn test_export_requires_loaded_frames() {
        let collection = Collection::from_metadata(vec![AnimationMetadata {
            animation_id: "a".into(),
            frame_duration_ms: 100,
            repeat: RepeatCount::Infinite,
            frame_order: vec!["f1".into()],
        }]);
        assert!(matches!(LegacyDocuments::export(&collection), Err(LegacyError::NotLoaded(_))));
    }
}
