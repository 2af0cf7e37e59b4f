//! Execution of a single chapter video job.

use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use reel_core::defaults::{PROGRESS_DONE, PROGRESS_SEARCHING};
use reel_core::{
    ChapterStore, FastPathResolver, Job, JobState, StatusBus, StatusEvent, VideoStatus,
};

use crate::fetcher::{resolve_quick, FetchError, FetchPolicy, RetryableFetcher};
use crate::registry::JobRegistry;
use crate::scheduler::ScheduledTask;

/// Collaborators shared by every job of one service.
#[derive(Clone)]
pub(crate) struct JobContext {
    pub store: Arc<dyn ChapterStore>,
    pub fetcher: Arc<RetryableFetcher>,
    pub fast_path: Option<Arc<dyn FastPathResolver>>,
    pub registry: Arc<JobRegistry>,
    pub bus: StatusBus,
}

impl JobContext {
    /// Retire `job` from the registry, then announce its final state.
    ///
    /// Unregistering first means a subscriber reacting to the event can
    /// resubmit the chapter immediately.
    pub fn finish(&self, job: Job, event: StatusEvent) {
        self.registry.unregister(job);
        self.bus.publish(event);
    }

    /// Best-effort `error` status write; failures are logged and ignored.
    async fn mark_error(&self, job: &Job) {
        if let Err(e) = self
            .store
            .update_chapter_video(job.chapter_id, None, VideoStatus::Error)
            .await
        {
            error!(
                chapter_id = job.chapter_id,
                job_id = %job.job_id,
                error = %e,
                "Failed to record error status"
            );
        }
    }
}

enum Outcome {
    Resolved(String),
    AlreadyProcessed(String),
    InProgressElsewhere,
    Failed(String),
    Cancelled,
}

/// Scheduled task resolving one chapter's video.
pub(crate) struct VideoJob {
    ctx: JobContext,
    job: Job,
    policy: FetchPolicy,
    use_fast_path: bool,
}

impl VideoJob {
    pub fn new(ctx: JobContext, job: Job, policy: FetchPolicy, use_fast_path: bool) -> Self {
        Self {
            ctx,
            job,
            policy,
            use_fast_path,
        }
    }

    async fn execute(mut self, cancel: CancellationToken) {
        let started = Instant::now();
        let chapter_id = self.job.chapter_id;
        let job_id = self.job.job_id;

        let outcome = if cancel.is_cancelled() {
            Outcome::Cancelled
        } else {
            self.job.mark_processing();
            self.ctx
                .registry
                .set_state(chapter_id, job_id, JobState::Processing);
            self.resolve(&cancel).await
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let mut job = self.job;
        let event = match outcome {
            Outcome::Resolved(video_id) => {
                info!(chapter_id, %job_id, %video_id, duration_ms, "Video job completed");
                job.complete(video_id.clone());
                StatusEvent::for_job(&job, JobState::Completed)
                    .with_progress(PROGRESS_DONE)
                    .with_video_id(video_id)
                    .with_message("Video found")
            }
            Outcome::AlreadyProcessed(video_id) => {
                info!(chapter_id, %job_id, %video_id, "Chapter already has a video");
                job.complete(video_id.clone());
                StatusEvent::for_job(&job, JobState::Completed)
                    .with_progress(PROGRESS_DONE)
                    .with_video_id(video_id)
                    .with_message("Video already processed")
            }
            // Another worker owns the chapter. The job retires still marked
            // Processing; its end_time is the only sign it is finished.
            Outcome::InProgressElsewhere => {
                info!(chapter_id, %job_id, "Chapter is already being processed elsewhere");
                job.end_time = Some(Utc::now());
                StatusEvent::for_job(&job, JobState::Processing)
                    .with_message("Video is already being processed")
            }
            Outcome::Failed(message) => {
                warn!(chapter_id, %job_id, error = %message, duration_ms, "Video job failed");
                job.fail(message.clone());
                StatusEvent::for_job(&job, JobState::Error)
                    .with_error(message)
                    .with_message("Video processing failed")
            }
            Outcome::Cancelled => {
                info!(chapter_id, %job_id, duration_ms, "Video job cancelled");
                job.cancel();
                StatusEvent::for_job(&job, JobState::Cancelled)
                    .with_message("Video processing cancelled")
            }
        };

        self.ctx.finish(job, event);
    }

    async fn resolve(&self, cancel: &CancellationToken) -> Outcome {
        let job = &self.job;
        let chapter = match self.ctx.store.find_chapter_by_id(job.chapter_id).await {
            Ok(Some(chapter)) => chapter,
            Ok(None) => {
                self.ctx.mark_error(job).await;
                return Outcome::Failed("Chapter not found".to_string());
            }
            Err(e) => {
                error!(chapter_id = job.chapter_id, error = %e, "Failed to load chapter");
                self.ctx.mark_error(job).await;
                return Outcome::Failed(e.to_string());
            }
        };

        // Borrow only: `chapter` is still needed for the query below.
        if let Some(video_id) = chapter.video_id.as_deref().filter(|v| !v.is_empty()) {
            return Outcome::AlreadyProcessed(video_id.to_string());
        }
        if chapter.video_status == VideoStatus::Processing {
            return Outcome::InProgressElsewhere;
        }
        if !chapter.has_search_query() {
            self.ctx.mark_error(job).await;
            return Outcome::Failed(format!(
                "Chapter {} has an empty search query",
                job.chapter_id
            ));
        }

        if let Err(e) = self
            .ctx
            .store
            .update_chapter_video(job.chapter_id, None, VideoStatus::Processing)
            .await
        {
            error!(chapter_id = job.chapter_id, error = %e, "Failed to mark chapter processing");
            self.ctx.mark_error(job).await;
            return Outcome::Failed(e.to_string());
        }

        self.ctx.bus.publish(
            StatusEvent::for_job(job, JobState::Processing)
                .with_progress(PROGRESS_SEARCHING)
                .with_message("Searching for video"),
        );

        let fetched = match self.ctx.fast_path.as_deref().filter(|_| self.use_fast_path) {
            Some(resolver) => {
                debug!(chapter_id = job.chapter_id, "Resolving via fast path");
                resolve_quick(
                    resolver,
                    job.chapter_id,
                    &chapter.search_query,
                    &self.policy,
                    cancel,
                )
                .await
            }
            None => {
                self.ctx
                    .fetcher
                    .fetch_with(&chapter.search_query, &self.policy, cancel)
                    .await
            }
        };

        match fetched {
            Ok(video_id) => {
                match self
                    .ctx
                    .store
                    .update_chapter_video(job.chapter_id, Some(&video_id), VideoStatus::Completed)
                    .await
                {
                    Ok(()) => Outcome::Resolved(video_id),
                    Err(e) => {
                        error!(chapter_id = job.chapter_id, error = %e, "Failed to store video");
                        self.ctx.mark_error(job).await;
                        Outcome::Failed(e.to_string())
                    }
                }
            }
            Err(e) => {
                self.ctx.mark_error(job).await;
                classify(e)
            }
        }
    }
}

fn classify(err: FetchError) -> Outcome {
    if err.is_cancelled() {
        Outcome::Cancelled
    } else {
        Outcome::Failed(err.to_string())
    }
}

impl ScheduledTask for VideoJob {
    fn run(self: Box<Self>, cancel: CancellationToken) -> BoxFuture<'static, ()> {
        let span = info_span!(
            "video_job",
            job_id = %self.job.job_id,
            chapter_id = self.job.chapter_id,
            priority = self.job.priority
        );
        Box::pin((*self).execute(cancel).instrument(span))
    }

    fn cancelled(self: Box<Self>) {
        let VideoJob { ctx, mut job, .. } = *self;
        debug!(chapter_id = job.chapter_id, job_id = %job.job_id, "Job cancelled before start");
        job.cancel();
        let event = StatusEvent::for_job(&job, JobState::Cancelled)
            .with_message("Video processing cancelled before start");
        ctx.finish(job, event);
    }
}
