//! # reel-db
//!
//! In-memory chapter store for the chapter video pipeline.
//!
//! Production deployments implement [`reel_core::ChapterStore`] over their own
//! persistence layer. [`MemoryChapterStore`] backs local runs, embedding in
//! other services, and the test suites.
//!
//! ## Example
//!
//! ```rust,ignore
//! use reel_core::{Chapter, ChapterStore};
//! use reel_db::MemoryChapterStore;
//!
//! let store = MemoryChapterStore::new();
//! store.insert(Chapter::new(1, "rust ownership explained")).await;
//! let chapter = store.find_chapter_by_id(1).await?;
//! ```

pub mod chapters;

pub use chapters::{ChapterWrite, MemoryChapterStore};
