//! Public facade over the registry, scheduler, fetcher and status bus.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use reel_core::defaults::PROGRESS_DONE;
use reel_core::{
    BatchRejection, BatchResult, ChapterId, ChapterStore, Error, FastPathResolver, Job, JobId,
    JobState, JobSubmission, ProcessOptions, QueueStatus, Result, SearchProvider, StatusBus,
    StatusEvent, StatusSubscription,
};

use crate::config::ServiceConfig;
use crate::fetcher::{FetchPolicy, RetryableFetcher};
use crate::job::{JobContext, VideoJob};
use crate::registry::{JobRegistry, Registration};
use crate::scheduler::Scheduler;

/// Builder for [`VideoJobService`].
pub struct VideoJobServiceBuilder {
    store: Arc<dyn ChapterStore>,
    provider: Arc<dyn SearchProvider>,
    fast_path: Option<Arc<dyn FastPathResolver>>,
    bus: Option<StatusBus>,
    config: ServiceConfig,
}

impl VideoJobServiceBuilder {
    pub fn new(store: Arc<dyn ChapterStore>, provider: Arc<dyn SearchProvider>) -> Self {
        Self {
            store,
            provider,
            fast_path: None,
            bus: None,
            config: ServiceConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Configure the optional fast-path resolver.
    pub fn with_fast_path(mut self, resolver: Arc<dyn FastPathResolver>) -> Self {
        self.fast_path = Some(resolver);
        self
    }

    /// Publish onto an existing bus instead of creating one.
    pub fn with_status_bus(mut self, bus: StatusBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Build the service and start its scheduler.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> VideoJobService {
        let bus = self
            .bus
            .unwrap_or_else(|| StatusBus::new(self.config.event_bus_capacity));
        let ctx = JobContext {
            store: self.store,
            fetcher: Arc::new(RetryableFetcher::new(self.provider, self.config.fetch)),
            fast_path: self.fast_path,
            registry: Arc::new(JobRegistry::new(self.config.history_capacity)),
            bus,
        };
        let scheduler = Scheduler::start(self.config.scheduler.clone());

        info!(
            fast_path = ctx.fast_path.is_some(),
            use_optimized_service = self.config.use_optimized_service,
            "Video job service ready"
        );

        VideoJobService {
            inner: Arc::new(ServiceInner {
                ctx,
                scheduler,
                config: self.config,
            }),
        }
    }
}

struct ServiceInner {
    ctx: JobContext,
    scheduler: Scheduler,
    config: ServiceConfig,
}

/// Entry point for requesting chapter videos.
///
/// Cheap to clone; clones share the same queue, registry and bus.
#[derive(Clone)]
pub struct VideoJobService {
    inner: Arc<ServiceInner>,
}

impl VideoJobService {
    /// Shorthand for [`VideoJobServiceBuilder::new`].
    pub fn builder(
        store: Arc<dyn ChapterStore>,
        provider: Arc<dyn SearchProvider>,
    ) -> VideoJobServiceBuilder {
        VideoJobServiceBuilder::new(store, provider)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// Request a video for a chapter.
    ///
    /// Returns as soon as the job is queued; the lookup itself happens in
    /// the background and is reported on the status bus. A chapter that
    /// already has a video is answered immediately, and a chapter with an
    /// active job yields that job instead of a new one.
    #[instrument(skip(self, options), fields(priority = options.priority))]
    pub async fn process_video(
        &self,
        chapter_id: ChapterId,
        options: ProcessOptions,
    ) -> Result<JobSubmission> {
        let inner = &self.inner;
        if inner.scheduler.is_shut_down() {
            return Err(Error::ShuttingDown);
        }

        let chapter = inner
            .ctx
            .store
            .find_chapter_by_id(chapter_id)
            .await?
            .ok_or(Error::ChapterNotFound(chapter_id))?;

        if let Some(video_id) = chapter.video_id.clone().filter(|v| !v.is_empty()) {
            debug!(chapter_id, %video_id, "Chapter already has a video");
            let mut job = Job::new(chapter_id, chapter.search_query, options.priority);
            job.complete(video_id.clone());
            let event = StatusEvent::for_job(&job, JobState::Completed)
                .with_progress(PROGRESS_DONE)
                .with_video_id(video_id.clone())
                .with_message("Video already processed");
            let job_id = job.job_id;
            inner.ctx.registry.record(job);
            inner.ctx.bus.publish(event);

            return Ok(JobSubmission {
                job_id,
                chapter_id,
                video_status: JobState::Completed,
                message: "Video already processed".to_string(),
                video_id: Some(video_id),
                deduplicated: false,
            });
        }

        if !chapter.has_search_query() {
            return Err(Error::EmptySearchQuery(chapter_id));
        }

        let job = Job::new(chapter_id, chapter.search_query, options.priority);
        let cancel = CancellationToken::new();
        match inner.ctx.registry.try_register(job.clone(), cancel.clone()) {
            Registration::Existing(existing) => {
                debug!(chapter_id, job_id = %existing.job_id, "Deduplicated submission");
                return Ok(JobSubmission {
                    job_id: existing.job_id,
                    chapter_id,
                    video_status: existing.state,
                    message: "Video processing already in progress".to_string(),
                    video_id: None,
                    deduplicated: true,
                });
            }
            Registration::Registered => {}
        }

        inner.ctx.bus.publish(
            StatusEvent::for_job(&job, JobState::Queued)
                .with_progress(0)
                .with_message("Video processing queued"),
        );

        let policy = self.policy_for(&options);
        let use_fast_path = self.use_fast_path(chapter_id, &options);
        let job_id = job.job_id;
        let task = VideoJob::new(inner.ctx.clone(), job.clone(), policy, use_fast_path);

        if let Err(e) = inner
            .scheduler
            .submit(job_id, options.priority, cancel, Box::new(task))
        {
            let mut job = job;
            job.cancel();
            let event = StatusEvent::for_job(&job, JobState::Cancelled)
                .with_message("Video processing cancelled before start");
            inner.ctx.finish(job, event);
            return Err(e);
        }

        info!(chapter_id, %job_id, priority = options.priority, "Video job queued");
        Ok(JobSubmission {
            job_id,
            chapter_id,
            video_status: JobState::Queued,
            message: "Video processing queued".to_string(),
            video_id: None,
            deduplicated: false,
        })
    }

    /// Submit several chapters; earlier entries are scheduled first.
    ///
    /// Entry `i` is submitted at `options.priority + i`. Rejections are
    /// collected and never abort the rest of the batch.
    pub async fn process_multiple_videos(
        &self,
        chapter_ids: &[ChapterId],
        options: ProcessOptions,
    ) -> BatchResult {
        let total = chapter_ids.len();
        let mut processed = 0;
        let mut rejected = Vec::new();

        for (index, &chapter_id) in chapter_ids.iter().enumerate() {
            let offset = i32::try_from(index).unwrap_or(i32::MAX);
            let opts = ProcessOptions {
                priority: options.priority.saturating_add(offset),
                ..options.clone()
            };
            match self.process_video(chapter_id, opts).await {
                Ok(_) => processed += 1,
                Err(e) => {
                    warn!(chapter_id, error = %e, "Batch entry rejected");
                    rejected.push(BatchRejection {
                        chapter_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(processed, total, "Batch submitted");
        BatchResult {
            processed,
            total,
            message: format!("Queued {processed} of {total} chapters for video processing"),
            rejected,
        }
    }

    /// Cancel the chapter's active job.
    ///
    /// A queued job is removed without running; a running job stops at its
    /// next checkpoint. Returns whether a cancellation was dispatched.
    pub fn cancel_processing(&self, chapter_id: ChapterId) -> bool {
        let Some(job_id) = self.inner.ctx.registry.cancel_job(chapter_id) else {
            debug!(chapter_id, "No active job to cancel");
            return false;
        };
        let outcome = self.inner.scheduler.cancel(job_id);
        info!(chapter_id, %job_id, ?outcome, "Cancellation requested");
        true
    }

    /// Queue depth and active chapters.
    pub fn get_queue_status(&self) -> QueueStatus {
        let stats = self.inner.scheduler.stats();
        QueueStatus {
            queued_count: stats.queued,
            active_count: stats.active,
            active_chapter_ids: self.inner.ctx.registry.active_chapter_ids(),
        }
    }

    /// Register a callback for every status event. Dropping the returned
    /// handle deregisters it.
    pub fn subscribe_to_status_updates<F>(&self, callback: F) -> StatusSubscription
    where
        F: FnMut(StatusEvent) + Send + 'static,
    {
        self.inner.ctx.bus.subscribe(callback)
    }

    /// Raw status event stream.
    pub fn events(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.ctx.bus.subscribe_stream()
    }

    pub fn status_bus(&self) -> &StatusBus {
        &self.inner.ctx.bus
    }

    /// Look up an active or recently finished job.
    ///
    /// A job that found its chapter already being processed by someone else
    /// is retired without a terminal state: it stays `Processing` with
    /// `end_time` set, and its last event is a `Processing` event saying the
    /// video is already being processed. Check `end_time` rather than
    /// [`JobState::is_active`] to tell whether such a job has finished.
    pub fn get_job(&self, job_id: JobId) -> Option<Job> {
        self.inner.ctx.registry.get(job_id)
    }

    /// The chapter's active job, if any.
    pub fn active_job_for_chapter(&self, chapter_id: ChapterId) -> Option<Job> {
        self.inner.ctx.registry.active_job(chapter_id)
    }

    /// Stop starting queued jobs. Submissions are still accepted.
    pub fn pause(&self) {
        self.inner.scheduler.pause();
    }

    pub fn resume(&self) {
        self.inner.scheduler.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.scheduler.is_paused()
    }

    /// Stop accepting work, cancel queued jobs and signal running ones.
    pub fn shutdown(&self) {
        info!("Video job service shutting down");
        self.inner.scheduler.shutdown();
    }

    fn policy_for(&self, options: &ProcessOptions) -> FetchPolicy {
        let mut policy = self.inner.config.fetch;
        if let Some(retries) = options.retries {
            policy.retries = retries;
        }
        if let Some(ms) = options.timeout_ms.filter(|ms| *ms > 0) {
            policy.timeout = Duration::from_millis(ms);
        }
        policy
    }

    fn use_fast_path(&self, chapter_id: ChapterId, options: &ProcessOptions) -> bool {
        let requested = options
            .use_optimized_service
            .unwrap_or(self.inner.config.use_optimized_service);
        if requested && self.inner.ctx.fast_path.is_none() {
            warn!(chapter_id, "Fast path requested but no resolver is configured");
            return false;
        }
        requested
    }
}
