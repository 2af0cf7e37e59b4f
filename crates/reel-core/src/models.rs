//! Data models shared across the pipeline crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a chapter in the chapter store.
pub type ChapterId = i64;

/// Identifier of a single job submission.
pub type JobId = Uuid;

// =============================================================================
// CHAPTER
// =============================================================================

/// Video status recorded on the chapter itself.
///
/// The chapter store is authoritative for this value; jobs keep it in sync
/// on every transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Error,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Pending => "pending",
            VideoStatus::Processing => "processing",
            VideoStatus::Completed => "completed",
            VideoStatus::Error => "error",
        }
    }
}

/// Read-only view of a chapter as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub search_query: String,
    pub video_id: Option<String>,
    pub video_status: VideoStatus,
}

impl Chapter {
    /// Create a pending chapter without a video.
    pub fn new(id: ChapterId, search_query: impl Into<String>) -> Self {
        Self {
            id,
            search_query: search_query.into(),
            video_id: None,
            video_status: VideoStatus::Pending,
        }
    }

    /// Attach an already-resolved video.
    pub fn with_video(mut self, video_id: impl Into<String>) -> Self {
        self.video_id = Some(video_id.into());
        self.video_status = VideoStatus::Completed;
        self
    }

    /// Override the video status.
    pub fn with_status(mut self, status: VideoStatus) -> Self {
        self.video_status = status;
        self
    }

    /// Whether the search query has any non-whitespace content.
    pub fn has_search_query(&self) -> bool {
        !self.search_query.trim().is_empty()
    }
}

// =============================================================================
// JOB
// =============================================================================

/// Lifecycle state of a job.
///
/// `Queued -> Processing -> (Completed | Error | Cancelled)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Error,
    Cancelled,
}

impl JobState {
    /// Queued or processing.
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Queued | JobState::Processing)
    }

    /// Completed, failed or cancelled. No further transitions occur.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Error => "error",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One video-resolution task for a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub chapter_id: ChapterId,
    pub state: JobState,
    pub priority: i32,
    pub search_query: String,
    /// Set only when `state` is `Completed`.
    pub video_id: Option<String>,
    /// Set only when `state` is `Error`.
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job with a fresh time-ordered identifier.
    pub fn new(chapter_id: ChapterId, search_query: impl Into<String>, priority: i32) -> Self {
        Self {
            job_id: Uuid::now_v7(),
            chapter_id,
            state: JobState::Queued,
            priority,
            search_query: search_query.into(),
            video_id: None,
            error: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Elapsed milliseconds between start and end (or now, while active).
    pub fn processing_time_ms(&self) -> i64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds().max(0)
    }

    /// Move to `Processing`.
    pub fn mark_processing(&mut self) {
        self.state = JobState::Processing;
    }

    /// Move to `Completed` with the resolved video.
    pub fn complete(&mut self, video_id: impl Into<String>) {
        self.state = JobState::Completed;
        self.video_id = Some(video_id.into());
        self.error = None;
        self.end_time = Some(Utc::now());
    }

    /// Move to `Error` with a message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.state = JobState::Error;
        self.video_id = None;
        self.error = Some(error.into());
        self.end_time = Some(Utc::now());
    }

    /// Move to `Cancelled`.
    pub fn cancel(&mut self) {
        self.state = JobState::Cancelled;
        self.video_id = None;
        self.error = None;
        self.end_time = Some(Utc::now());
    }
}

// =============================================================================
// FACADE REQUESTS / RESPONSES
// =============================================================================

/// Per-submission options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// Scheduling priority; lower runs first. Negative values jump the queue.
    #[serde(default)]
    pub priority: i32,
    /// Resolve through the fast-path resolver instead of the search provider.
    #[serde(default)]
    pub use_optimized_service: Option<bool>,
    /// Override the number of additional fetch attempts.
    #[serde(default)]
    pub retries: Option<u32>,
    /// Override the per-attempt timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ProcessOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_optimized_service(mut self, enabled: bool) -> Self {
        self.use_optimized_service = Some(enabled);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Outcome of `process_video`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubmission {
    pub job_id: JobId,
    pub chapter_id: ChapterId,
    pub video_status: JobState,
    pub message: String,
    pub video_id: Option<String>,
    /// True when an active job already existed for the chapter.
    pub deduplicated: bool,
}

/// A chapter rejected at validation during a batch submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRejection {
    pub chapter_id: ChapterId,
    pub error: String,
}

/// Outcome of `process_multiple_videos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub processed: usize,
    pub total: usize,
    pub message: String,
    pub rejected: Vec<BatchRejection>,
}

/// Snapshot of the queue for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub queued_count: usize,
    pub active_count: usize,
    pub active_chapter_ids: Vec<ChapterId>,
}
