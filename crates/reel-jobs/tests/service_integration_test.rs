//! Integration tests for VideoJobService.
//!
//! This test suite validates:
//! - Service-001: Concurrent submissions for one chapter share a single job
//! - Service-002: Chapters with a video are answered without a search
//! - Service-003: Retry budget and abort rules of the fetcher
//! - Service-004: Priority ordering and the concurrency cap
//! - Service-005: Cancellation of queued and running jobs
//! - Service-006: Validation errors and batch submission
//! - Service-007: Fast path, store failures, shutdown and status events
//!
//! All tests run on a paused tokio clock so retry delays, provider latency
//! and timeouts resolve instantly and deterministically.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};

use reel_core::{
    Chapter, ChapterId, ChapterStore, Error, FastPathResolver, JobState, ProcessOptions,
    ProviderError, QuickResolution, SearchProvider, StatusEvent, VideoStatus,
};
use reel_db::MemoryChapterStore;
use reel_jobs::{FetchPolicy, SchedulerConfig, ServiceConfig, VideoJobService, VideoJobServiceBuilder};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

#[derive(Clone, Copy)]
enum Reply {
    /// Answer `vid-<query>`.
    Found,
    Empty,
    Forbidden,
    Fail,
}

/// Search provider with a fixed reply and latency that records every call.
struct TestProvider {
    reply: Reply,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl TestProvider {
    fn new(reply: Reply) -> Arc<Self> {
        Self::with_delay(reply, Duration::ZERO)
    }

    fn with_delay(reply: Reply, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply,
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl SearchProvider for TestProvider {
    async fn search_for_video(&self, query: &str) -> Result<Option<String>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(query.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.reply {
            Reply::Found => Ok(Some(format!("vid-{query}"))),
            Reply::Empty => Ok(None),
            Reply::Forbidden => Err(ProviderError::http(403, "quota exceeded")),
            Reply::Fail => Err(ProviderError::Other("connection reset".to_string())),
        }
    }
}

/// Fast-path resolver returning a fixed answer.
struct TestResolver {
    video_id: Option<&'static str>,
    calls: AtomicUsize,
}

#[async_trait]
impl FastPathResolver for TestResolver {
    async fn resolve_quick(
        &self,
        _chapter_id: ChapterId,
        _query: &str,
    ) -> Result<QuickResolution, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(QuickResolution {
            video_id: self.video_id.map(String::from),
        })
    }
}

/// Store that refuses to record completed videos.
struct RejectingStore {
    inner: MemoryChapterStore,
}

#[async_trait]
impl ChapterStore for RejectingStore {
    async fn find_chapter_by_id(&self, id: ChapterId) -> reel_core::Result<Option<Chapter>> {
        self.inner.find_chapter_by_id(id).await
    }

    async fn update_chapter_video(
        &self,
        id: ChapterId,
        video_id: Option<&str>,
        status: VideoStatus,
    ) -> reel_core::Result<()> {
        if status == VideoStatus::Completed {
            return Err(Error::Store("disk full".to_string()));
        }
        self.inner.update_chapter_video(id, video_id, status).await
    }
}

fn fast_fetch() -> FetchPolicy {
    FetchPolicy::default()
        .with_retries(0)
        .with_timeout(Duration::from_secs(5))
        .with_retry_delay(Duration::from_millis(100))
}

fn chapters(ids: &[ChapterId]) -> MemoryChapterStore {
    MemoryChapterStore::with_chapters(
        ids.iter()
            .map(|id| Chapter::new(*id, format!("chapter {id}"))),
    )
}

fn service_with(
    store: &MemoryChapterStore,
    provider: Arc<TestProvider>,
    config: ServiceConfig,
) -> VideoJobService {
    VideoJobServiceBuilder::new(Arc::new(store.clone()), provider)
        .with_config(config)
        .build()
}

fn default_config() -> ServiceConfig {
    ServiceConfig::default().with_fetch_policy(fast_fetch())
}

/// Wait until no job is queued, running or registered.
async fn wait_idle(service: &VideoJobService) {
    for _ in 0..10_000 {
        let status = service.get_queue_status();
        if status.queued_count == 0 && status.active_count == 0 && status.active_chapter_ids.is_empty()
        {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("service never went idle: {:?}", service.get_queue_status());
}

fn drain(rx: &mut broadcast::Receiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn statuses(events: &[StatusEvent], chapter_id: ChapterId) -> Vec<JobState> {
    events
        .iter()
        .filter(|e| e.chapter_id == chapter_id)
        .map(|e| e.status)
        .collect()
}

// ============================================================================
// INTEGRATION TESTS - Deduplication
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_submissions_share_one_job() {
    let store = chapters(&[1]);
    let provider = TestProvider::with_delay(Reply::Found, Duration::from_millis(50));
    let service = service_with(&store, provider.clone(), default_config());

    let submissions = futures::future::join_all(
        (0..10).map(|_| service.process_video(1, ProcessOptions::default())),
    )
    .await;

    let submissions: Vec<_> = submissions.into_iter().map(|s| s.unwrap()).collect();
    let first = submissions[0].job_id;
    assert!(submissions.iter().all(|s| s.job_id == first));
    assert_eq!(submissions.iter().filter(|s| !s.deduplicated).count(), 1);

    wait_idle(&service).await;
    assert_eq!(provider.calls(), 1);
    assert_eq!(store.get(1).await.unwrap().video_id.as_deref(), Some("vid-chapter 1"));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_while_active_reports_existing_job() {
    let store = chapters(&[1]);
    let provider = TestProvider::new(Reply::Found);
    let service = service_with(&store, provider, default_config());
    service.pause();

    let first = service.process_video(1, ProcessOptions::default()).await.unwrap();
    let second = service.process_video(1, ProcessOptions::default()).await.unwrap();

    assert_eq!(first.video_status, JobState::Queued);
    assert!(second.deduplicated);
    assert_eq!(second.job_id, first.job_id);
    assert_eq!(second.video_status, JobState::Queued);
    assert_eq!(service.active_job_for_chapter(1).unwrap().job_id, first.job_id);
}

// ============================================================================
// INTEGRATION TESTS - Already Processed
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_chapter_with_video_short_circuits() {
    let store = MemoryChapterStore::with_chapters([Chapter::new(1, "intro").with_video("existing")]);
    let provider = TestProvider::new(Reply::Found);
    let service = service_with(&store, provider.clone(), default_config());
    let mut rx = service.events();

    let submission = service.process_video(1, ProcessOptions::default()).await.unwrap();

    assert_eq!(submission.video_status, JobState::Completed);
    assert_eq!(submission.video_id.as_deref(), Some("existing"));
    assert!(service.active_job_for_chapter(1).is_none());
    assert_eq!(
        service.get_job(submission.job_id).unwrap().state,
        JobState::Completed
    );

    sleep(Duration::from_millis(100)).await;
    assert_eq!(provider.calls(), 0);
    assert!(store.writes().await.is_empty());
    assert_eq!(statuses(&drain(&mut rx), 1), vec![JobState::Completed]);
}

#[tokio::test(start_paused = true)]
async fn test_resubmit_after_completion_is_idempotent() {
    let store = chapters(&[1]);
    let provider = TestProvider::new(Reply::Found);
    let service = service_with(&store, provider.clone(), default_config());

    let first = service.process_video(1, ProcessOptions::default()).await.unwrap();
    wait_idle(&service).await;
    assert_eq!(service.get_job(first.job_id).unwrap().state, JobState::Completed);

    let again = service.process_video(1, ProcessOptions::default()).await.unwrap();
    assert_eq!(again.video_status, JobState::Completed);
    assert_eq!(again.video_id.as_deref(), Some("vid-chapter 1"));
    assert_ne!(again.job_id, first.job_id);

    wait_idle(&service).await;
    assert_eq!(provider.calls(), 1);
}

// ============================================================================
// INTEGRATION TESTS - Retry Budget
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_empty_results_exhaust_retry_budget() {
    let store = chapters(&[1]);
    let provider = TestProvider::new(Reply::Empty);
    let service = service_with(&store, provider.clone(), default_config());
    let mut rx = service.events();

    let submission = service
        .process_video(1, ProcessOptions::default().with_retries(2))
        .await
        .unwrap();
    wait_idle(&service).await;

    assert_eq!(provider.calls(), 3);
    assert_eq!(store.get(1).await.unwrap().video_status, VideoStatus::Error);

    let job = service.get_job(submission.job_id).unwrap();
    assert_eq!(job.state, JobState::Error);
    assert!(job.error.unwrap().contains("3 attempt"));

    let events = drain(&mut rx);
    assert_eq!(
        statuses(&events, 1),
        vec![JobState::Queued, JobState::Processing, JobState::Error]
    );
    assert!(events.last().unwrap().error.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_forbidden_makes_single_attempt() {
    let store = chapters(&[1]);
    let provider = TestProvider::new(Reply::Forbidden);
    let service = service_with(&store, provider.clone(), default_config());

    let submission = service
        .process_video(1, ProcessOptions::default().with_retries(5))
        .await
        .unwrap();
    wait_idle(&service).await;

    assert_eq!(provider.calls(), 1);
    assert_eq!(store.get(1).await.unwrap().video_status, VideoStatus::Error);
    let error = service.get_job(submission.job_id).unwrap().error.unwrap();
    assert!(error.contains("aborted"), "unexpected error: {error}");
}

#[tokio::test(start_paused = true)]
async fn test_provider_errors_are_retried() {
    let store = chapters(&[1]);
    let provider = TestProvider::new(Reply::Fail);
    let service = service_with(&store, provider.clone(), default_config());

    let submission = service
        .process_video(1, ProcessOptions::default().with_retries(1))
        .await
        .unwrap();
    wait_idle(&service).await;

    assert_eq!(provider.calls(), 2);
    let error = service.get_job(submission.job_id).unwrap().error.unwrap();
    assert!(error.contains("connection reset"), "unexpected error: {error}");
}

#[tokio::test(start_paused = true)]
async fn test_slow_provider_times_out() {
    let store = chapters(&[1]);
    let provider = TestProvider::with_delay(Reply::Found, Duration::from_secs(10));
    let service = service_with(&store, provider.clone(), default_config());

    let submission = service
        .process_video(
            1,
            ProcessOptions::default().with_retries(1).with_timeout_ms(100),
        )
        .await
        .unwrap();
    wait_idle(&service).await;

    assert_eq!(provider.calls(), 2);
    let error = service.get_job(submission.job_id).unwrap().error.unwrap();
    assert!(error.contains("timed out"), "unexpected error: {error}");
    assert_eq!(store.get(1).await.unwrap().video_status, VideoStatus::Error);
}

// ============================================================================
// INTEGRATION TESTS - Scheduling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_lower_priority_value_runs_first() {
    let store = MemoryChapterStore::with_chapters([
        Chapter::new(1, "A"),
        Chapter::new(2, "B"),
        Chapter::new(3, "C"),
    ]);
    let provider = TestProvider::new(Reply::Found);
    let config = default_config().with_max_concurrent(1);
    let service = service_with(&store, provider.clone(), config);
    service.pause();

    service.process_video(1, ProcessOptions::default()).await.unwrap();
    service
        .process_video(2, ProcessOptions::default().with_priority(-5))
        .await
        .unwrap();
    service.process_video(3, ProcessOptions::default()).await.unwrap();

    service.resume();
    wait_idle(&service).await;

    assert_eq!(provider.queries(), vec!["B", "A", "C"]);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_cap_of_two() {
    let store = chapters(&[1, 2, 3]);
    let provider = TestProvider::with_delay(Reply::Found, Duration::from_millis(100));
    let config = default_config().with_max_concurrent(2);
    let service = service_with(&store, provider.clone(), config);

    let started = Instant::now();
    for id in [1, 2, 3] {
        service.process_video(id, ProcessOptions::default()).await.unwrap();
    }
    wait_idle(&service).await;
    let elapsed = started.elapsed();

    assert_eq!(provider.peak.load(Ordering::SeqCst), 2);
    assert!(elapsed >= Duration::from_millis(200), "finished in {elapsed:?}");
    assert!(elapsed < Duration::from_millis(300), "finished in {elapsed:?}");
    for id in [1, 2, 3] {
        assert_eq!(store.get(id).await.unwrap().video_status, VideoStatus::Completed);
    }
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_spreads_starts() {
    let store = chapters(&[1, 2, 3]);
    let provider = TestProvider::new(Reply::Found);
    let config = default_config().with_scheduler(
        SchedulerConfig::default()
            .with_max_concurrent(5)
            .with_rate_limit(2, Duration::from_secs(1)),
    );
    let service = service_with(&store, provider.clone(), config);

    for id in [1, 2, 3] {
        service.process_video(id, ProcessOptions::default()).await.unwrap();
    }
    sleep(Duration::from_millis(500)).await;
    assert_eq!(provider.calls(), 2);
    assert_eq!(service.get_queue_status().queued_count, 1);

    wait_idle(&service).await;
    assert_eq!(provider.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_queue_status_while_paused() {
    let store = chapters(&[1, 2]);
    let service = service_with(&store, TestProvider::new(Reply::Found), default_config());
    service.pause();
    assert!(service.is_paused());

    service.process_video(2, ProcessOptions::default()).await.unwrap();
    service.process_video(1, ProcessOptions::default()).await.unwrap();

    let status = service.get_queue_status();
    assert_eq!(status.queued_count, 2);
    assert_eq!(status.active_count, 0);
    assert_eq!(status.active_chapter_ids, vec![1, 2]);
}

// ============================================================================
// INTEGRATION TESTS - Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_queued_job_never_searches() {
    let store = chapters(&[1]);
    let provider = TestProvider::new(Reply::Found);
    let service = service_with(&store, provider.clone(), default_config());
    let mut rx = service.events();
    service.pause();

    let submission = service.process_video(1, ProcessOptions::default()).await.unwrap();
    assert!(service.cancel_processing(1));
    assert!(!service.cancel_processing(1));

    service.resume();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(provider.calls(), 0);
    assert!(store.writes().await.is_empty());
    assert_eq!(service.get_job(submission.job_id).unwrap().state, JobState::Cancelled);
    assert_eq!(
        statuses(&drain(&mut rx), 1),
        vec![JobState::Queued, JobState::Cancelled]
    );

    let again = service.process_video(1, ProcessOptions::default()).await.unwrap();
    assert!(!again.deduplicated);
    assert_ne!(again.job_id, submission.job_id);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_running_job_interrupts_search() {
    let store = chapters(&[1]);
    let provider = TestProvider::with_delay(Reply::Found, Duration::from_secs(30));
    let service = service_with(&store, provider.clone(), default_config());
    let mut rx = service.events();

    let submission = service.process_video(1, ProcessOptions::default()).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(provider.calls(), 1);

    let started = Instant::now();
    assert!(service.cancel_processing(1));
    wait_idle(&service).await;
    assert!(started.elapsed() < Duration::from_secs(1));

    let job = service.get_job(submission.job_id).unwrap();
    assert_eq!(job.state, JobState::Cancelled);
    assert!(job.video_id.is_none());

    let written: Vec<VideoStatus> = store.writes_for(1).await.iter().map(|w| w.status).collect();
    assert_eq!(written, vec![VideoStatus::Processing, VideoStatus::Error]);
    assert_eq!(
        statuses(&drain(&mut rx), 1),
        vec![JobState::Queued, JobState::Processing, JobState::Cancelled]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_unknown_chapter_returns_false() {
    let store = chapters(&[1]);
    let service = service_with(&store, TestProvider::new(Reply::Found), default_config());
    assert!(!service.cancel_processing(99));
}

// ============================================================================
// INTEGRATION TESTS - Validation and Batches
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_missing_chapter_is_rejected_synchronously() {
    let store = MemoryChapterStore::new();
    let provider = TestProvider::new(Reply::Found);
    let service = service_with(&store, provider.clone(), default_config());
    let mut rx = service.events();

    let err = service
        .process_video(42, ProcessOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ChapterNotFound(42)));
    assert!(err.is_validation());
    assert!(service.active_job_for_chapter(42).is_none());
    sleep(Duration::from_millis(100)).await;
    assert!(drain(&mut rx).is_empty());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_blank_search_query_is_rejected() {
    let store = MemoryChapterStore::with_chapters([Chapter::new(5, "   ")]);
    let service = service_with(&store, TestProvider::new(Reply::Found), default_config());

    let err = service
        .process_video(5, ProcessOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EmptySearchQuery(5)));
}

#[tokio::test(start_paused = true)]
async fn test_batch_counts_rejections_without_aborting() {
    let store = chapters(&[1, 2]);
    let provider = TestProvider::new(Reply::Found);
    let service = service_with(&store, provider.clone(), default_config());

    let result = service
        .process_multiple_videos(&[1, 42, 2], ProcessOptions::default())
        .await;

    assert_eq!(result.processed, 2);
    assert_eq!(result.total, 3);
    assert_eq!(result.rejected.len(), 1);
    assert_eq!(result.rejected[0].chapter_id, 42);
    assert!(result.message.contains("2 of 3"));

    wait_idle(&service).await;
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_batch_runs_in_submission_order() {
    let store = MemoryChapterStore::with_chapters([
        Chapter::new(1, "first"),
        Chapter::new(2, "second"),
        Chapter::new(3, "third"),
    ]);
    let provider = TestProvider::new(Reply::Found);
    let service = service_with(&store, provider.clone(), default_config().with_max_concurrent(1));
    service.pause();

    let result = service
        .process_multiple_videos(&[3, 1, 2], ProcessOptions::default())
        .await;
    assert_eq!(result.processed, 3);

    service.resume();
    wait_idle(&service).await;
    assert_eq!(provider.queries(), vec!["third", "first", "second"]);
}

// ============================================================================
// INTEGRATION TESTS - Fast Path, Store Failures, Lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fast_path_resolves_without_search() {
    let store = chapters(&[1]);
    let provider = TestProvider::new(Reply::Found);
    let resolver = Arc::new(TestResolver {
        video_id: Some("quick-1"),
        calls: AtomicUsize::new(0),
    });
    let service = VideoJobServiceBuilder::new(Arc::new(store.clone()), provider.clone())
        .with_config(default_config())
        .with_fast_path(resolver.clone())
        .build();

    service
        .process_video(1, ProcessOptions::default().with_optimized_service(true))
        .await
        .unwrap();
    wait_idle(&service).await;

    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.calls(), 0);
    assert_eq!(store.get(1).await.unwrap().video_id.as_deref(), Some("quick-1"));
}

#[tokio::test(start_paused = true)]
async fn test_fast_path_miss_does_not_fall_back() {
    let store = chapters(&[1]);
    let provider = TestProvider::new(Reply::Found);
    let resolver = Arc::new(TestResolver {
        video_id: None,
        calls: AtomicUsize::new(0),
    });
    let service = VideoJobServiceBuilder::new(Arc::new(store.clone()), provider.clone())
        .with_config(default_config().with_optimized_service(true))
        .with_fast_path(resolver)
        .build();

    service.process_video(1, ProcessOptions::default()).await.unwrap();
    wait_idle(&service).await;

    assert_eq!(provider.calls(), 0);
    assert_eq!(store.get(1).await.unwrap().video_status, VideoStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn test_fast_path_requested_without_resolver_uses_search() {
    let store = chapters(&[1]);
    let provider = TestProvider::new(Reply::Found);
    let service = service_with(&store, provider.clone(), default_config());

    service
        .process_video(1, ProcessOptions::default().with_optimized_service(true))
        .await
        .unwrap();
    wait_idle(&service).await;

    assert_eq!(provider.calls(), 1);
    assert_eq!(store.get(1).await.unwrap().video_status, VideoStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_after_search_marks_error() {
    let inner = chapters(&[1]);
    let store = Arc::new(RejectingStore {
        inner: inner.clone(),
    });
    let provider = TestProvider::new(Reply::Found);
    let service = VideoJobServiceBuilder::new(store, provider.clone())
        .with_config(default_config())
        .build();

    let submission = service.process_video(1, ProcessOptions::default()).await.unwrap();
    wait_idle(&service).await;

    let job = service.get_job(submission.job_id).unwrap();
    assert_eq!(job.state, JobState::Error);
    assert!(job.error.unwrap().contains("disk full"));
    assert_eq!(inner.get(1).await.unwrap().video_status, VideoStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_queue_and_rejects_submissions() {
    let store = chapters(&[1, 2]);
    let provider = TestProvider::new(Reply::Found);
    let service = service_with(&store, provider.clone(), default_config());
    service.pause();

    let queued = service.process_video(1, ProcessOptions::default()).await.unwrap();
    service.shutdown();

    assert_eq!(service.get_job(queued.job_id).unwrap().state, JobState::Cancelled);
    let err = service
        .process_video(2, ProcessOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ShuttingDown));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_service_cancels_queued_job() {
    let store = chapters(&[1]);
    let provider = TestProvider::new(Reply::Found);
    let service = service_with(&store, provider.clone(), default_config());
    let mut rx = service.events();
    service.pause();

    service.process_video(1, ProcessOptions::default()).await.unwrap();
    assert_eq!(Arc::strong_count(&provider), 2);

    drop(service);
    sleep(Duration::from_millis(100)).await;

    assert_eq!(Arc::strong_count(&provider), 1);
    assert_eq!(provider.calls(), 0);
    assert!(store.writes().await.is_empty());
    assert_eq!(
        statuses(&drain(&mut rx), 1),
        vec![JobState::Queued, JobState::Cancelled]
    );
}

#[tokio::test(start_paused = true)]
async fn test_subscriber_sees_full_lifecycle() {
    let store = chapters(&[1]);
    let service = service_with(&store, TestProvider::new(Reply::Found), default_config());

    let seen: Arc<Mutex<Vec<StatusEvent>>> = Arc::default();
    let sink = seen.clone();
    let subscription = service.subscribe_to_status_updates(move |event| sink.lock().push(event));

    service.process_video(1, ProcessOptions::default()).await.unwrap();
    wait_idle(&service).await;
    sleep(Duration::from_millis(10)).await;

    let events = seen.lock().clone();
    assert_eq!(
        statuses(&events, 1),
        vec![JobState::Queued, JobState::Processing, JobState::Completed]
    );
    let done = events.last().unwrap();
    assert_eq!(done.progress, Some(100));
    assert_eq!(done.video_id.as_deref(), Some("vid-chapter 1"));
    assert!(events.iter().all(|e| e.processing_time_ms >= 0));

    subscription.unsubscribe();
}
