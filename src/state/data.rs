//! Shared data structures for the application state
//!
//! These structs represent the data model that flows between
//! the storage layer, the collection and the catalog.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::num::NonZeroU32;

use crate::grid::frame::Frame;

/// Frame payloads keyed by frame id
pub type FrameMap = HashMap<String, Frame>;

/// How many times an animation plays
///
/// On the wire this is either a positive integer or the string `"infinite"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RepeatWire", into = "RepeatWire")]
pub enum RepeatCount {
    Times(NonZeroU32),
    Infinite,
}

impl RepeatCount {
    /// `None` for zero, which has no meaning here
    pub fn times(count: u32) -> Option<Self> {
        NonZeroU32::new(count).map(RepeatCount::Times)
    }
}

impl Default for RepeatCount {
    fn default() -> Self {
        RepeatCount::Infinite
    }
}

impl fmt::Display for RepeatCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepeatCount::Times(n) => write!(f, "{}", n),
            RepeatCount::Infinite => f.write_str("infinite"),
        }
    }
}

impl std::str::FromStr for RepeatCount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RepeatCount::try_from(RepeatWire::Named(s.to_string()))
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RepeatWire {
    Count(i64),
    Named(String),
}

impl TryFrom<RepeatWire> for RepeatCount {
    type Error = String;

    fn try_from(wire: RepeatWire) -> Result<Self, Self::Error> {
        match wire {
            RepeatWire::Count(n) => u32::try_from(n)
                .ok()
                .and_then(RepeatCount::times)
                .ok_or_else(|| format!("repeat count must be a positive integer or \"infinite\", got {}", n)),
            RepeatWire::Named(s) if s.trim().eq_ignore_ascii_case("infinite") => Ok(RepeatCount::Infinite),
            RepeatWire::Named(s) => s
                .trim()
                .parse::<u32>()
                .ok()
                .and_then(RepeatCount::times)
                .ok_or_else(|| format!("repeat count must be a positive integer or \"infinite\", got {:?}", s)),
        }
    }
}

impl From<RepeatCount> for RepeatWire {
    fn from(repeat: RepeatCount) -> Self {
        match repeat {
            RepeatCount::Times(n) => RepeatWire::Count(n.get() as i64),
            RepeatCount::Infinite => RepeatWire::Named("infinite".to_string()),
        }
    }
}

/// Timing, repeat and frame order of one animation
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AnimationMetadata {
    #[serde(rename = "animationID")]
    pub animation_id: String,

    /// Display time of every frame, in milliseconds
    #[serde(rename = "frameDuration")]
    pub frame_duration_ms: u32,

    #[serde(rename = "repeatCount")]
    pub repeat: RepeatCount,

    /// Frame ids in playback order
    #[serde(rename = "frameOrder")]
    pub frame_order: Vec<String>,
}

impl AnimationMetadata {
    /// Convert to JSON string for storage
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Names of the required fields that are empty or zero
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.animation_id.is_empty() {
            missing.push("animationID");
        }
        if self.frame_duration_ms == 0 {
            missing.push("frameDuration");
        }
        if self.frame_order.is_empty() {
            missing.push("frameOrder");
        }
        missing
    }

    /// First frame id that appears more than once in the frame order
    pub fn duplicate_frame(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.frame_order
            .iter()
            .find(|id| !seen.insert(id.as_str()))
            .map(String::as_str)
    }

    /// Frame ids of this animation that `frames` does not hold
    pub fn missing_frames<'a>(&'a self, frames: &FrameMap) -> Vec<&'a str> {
        self.frame_order
            .iter()
            .filter(|id| !frames.contains_key(id.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// An animation needs at least one frame to play
    pub fn is_playable(&self) -> bool {
        !self.frame_order.is_empty()
    }
}

/// Per-animation frame loading state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadingStatus {
    Loading,
    Ready,
    Error(String),
}

impl LoadingStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, LoadingStatus::Ready)
    }
}

impl fmt::Display for LoadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadingStatus::Loading => f.write_str("loading"),
            LoadingStatus::Ready => f.write_str("ready"),
            LoadingStatus::Error(message) => write!(f, "error: {}", message),
        }
    }
}
