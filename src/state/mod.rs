//! State management module
//!
//! This module handles all application state, including:
//! - Shared data structures (data.rs)
//! - The active animation queue (collection.rs)
//! - Saved animations outside the queue (catalog.rs)
//! - The storage seam and its SQLite implementation (store.rs, library.rs)
//! - The workspace that owns all of the above (workspace.rs)
//! - Concurrent frame fetching (loader.rs)
//! - Reading and writing the old two-document layout (legacy.rs)

pub mod catalog;
pub mod collection;
pub mod data;
pub mod legacy;
pub mod library;
pub mod loader;
pub mod store;
pub mod workspace;
