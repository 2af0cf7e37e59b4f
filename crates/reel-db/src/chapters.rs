//! Chapter repository backed by a shared in-memory map.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use reel_core::{Chapter, ChapterId, ChapterStore, Error, Result, VideoStatus};

/// A recorded call to `update_chapter_video`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterWrite {
    pub chapter_id: ChapterId,
    pub video_id: Option<String>,
    pub status: VideoStatus,
}

/// Thread-safe in-memory chapter store.
///
/// Clones share the same underlying data. Every write is appended to a log
/// so callers can audit the sequence of status transitions.
#[derive(Debug, Clone, Default)]
pub struct MemoryChapterStore {
    chapters: Arc<RwLock<HashMap<ChapterId, Chapter>>>,
    writes: Arc<RwLock<Vec<ChapterWrite>>>,
}

impl MemoryChapterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with chapters.
    pub fn with_chapters(chapters: impl IntoIterator<Item = Chapter>) -> Self {
        let map = chapters.into_iter().map(|c| (c.id, c)).collect();
        Self {
            chapters: Arc::new(RwLock::new(map)),
            writes: Arc::default(),
        }
    }

    /// Insert or replace a chapter.
    pub async fn insert(&self, chapter: Chapter) {
        self.chapters.write().await.insert(chapter.id, chapter);
    }

    /// Remove a chapter, returning it if present.
    pub async fn remove(&self, id: ChapterId) -> Option<Chapter> {
        self.chapters.write().await.remove(&id)
    }

    /// Current state of a chapter.
    pub async fn get(&self, id: ChapterId) -> Option<Chapter> {
        self.chapters.read().await.get(&id).cloned()
    }

    /// Number of stored chapters.
    pub async fn len(&self) -> usize {
        self.chapters.read().await.len()
    }

    /// Whether the store holds no chapters.
    pub async fn is_empty(&self) -> bool {
        self.chapters.read().await.is_empty()
    }

    /// All writes performed through [`ChapterStore::update_chapter_video`].
    pub async fn writes(&self) -> Vec<ChapterWrite> {
        self.writes.read().await.clone()
    }

    /// Writes performed for one chapter, oldest first.
    pub async fn writes_for(&self, id: ChapterId) -> Vec<ChapterWrite> {
        self.writes
            .read()
            .await
            .iter()
            .filter(|w| w.chapter_id == id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ChapterStore for MemoryChapterStore {
    async fn find_chapter_by_id(&self, id: ChapterId) -> Result<Option<Chapter>> {
        Ok(self.chapters.read().await.get(&id).cloned())
    }

    async fn update_chapter_video(
        &self,
        id: ChapterId,
        video_id: Option<&str>,
        status: VideoStatus,
    ) -> Result<()> {
        let mut chapters = self.chapters.write().await;
        let chapter = chapters
            .get_mut(&id)
            .ok_or_else(|| Error::Store(format!("Chapter {id} does not exist")))?;

        // A status-only write keeps the previously stored video.
        if video_id.is_some() {
            chapter.video_id = video_id.map(String::from);
        }
        chapter.video_status = status;
        drop(chapters);

        self.writes.write().await.push(ChapterWrite {
            chapter_id: id,
            video_id: video_id.map(String::from),
            status,
        });
        debug!(chapter_id = id, status = status.as_str(), "Chapter video updated");
        Ok(())
    }
}
