//! Pixel Queue
//!
//! Core of a 16×16 RGB pixel animation editor: import images and GIFs as
//! grid frames, keep an ordered queue of animations with shared frames, and
//! reconcile it with the saved catalog in a local SQLite library.

pub mod config;
pub mod error;
pub mod grid;
pub mod state;

pub use config::Config;
pub use error::{AppError, ErrorKind};
pub use grid::frame::Frame;
pub use grid::resample::SamplingMode;
pub use state::data::{AnimationMetadata, FrameMap, LoadingStatus, RepeatCount};
pub use state::workspace::Workspace;
