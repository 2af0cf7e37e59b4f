//! Interfaces to the collaborators the pipeline depends on.
//!
//! The job pipeline reads and writes chapters, searches for videos, and
//! optionally delegates to a faster resolver exclusively through these
//! traits, so tests and embedders can plug in their own backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};
use crate::models::{Chapter, ChapterId, VideoStatus};

/// Repository for chapter video state.
#[async_trait]
pub trait ChapterStore: Send + Sync {
    /// Find a chapter by ID.
    async fn find_chapter_by_id(&self, id: ChapterId) -> Result<Option<Chapter>>;

    /// Record the video for a chapter together with its status.
    async fn update_chapter_video(
        &self,
        id: ChapterId,
        video_id: Option<&str>,
        status: VideoStatus,
    ) -> Result<()>;
}

/// Third-party lookup from a search query to a video ID.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search for a video. `Ok(None)` means nothing usable was found.
    async fn search_for_video(&self, query: &str) -> std::result::Result<Option<String>, ProviderError>;
}

/// Answer from the fast-path resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickResolution {
    pub video_id: Option<String>,
}

/// Alternate single-shot lookup service.
#[async_trait]
pub trait FastPathResolver: Send + Sync {
    async fn resolve_quick(
        &self,
        chapter_id: ChapterId,
        query: &str,
    ) -> std::result::Result<QuickResolution, ProviderError>;
}
