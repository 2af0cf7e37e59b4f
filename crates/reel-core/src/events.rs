//! Status events and the bus that fans them out to subscribers.
//!
//! Every job transition produces a [`StatusEvent`]. The [`StatusBus`] wraps a
//! `tokio::sync::broadcast` channel so publishing never waits on consumers.
//! Callback subscribers each get their own receiver and their own task: a
//! slow callback only lags itself and a panicking callback is caught and
//! logged without affecting anyone else.

use std::panic::AssertUnwindSafe;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::models::{ChapterId, Job, JobId, JobState};

// ============================================================================
// Status Event
// ============================================================================

/// A job status transition as seen by dashboards and other consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub chapter_id: ChapterId,
    pub status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    /// `now - start_time` in milliseconds, stamped by [`StatusBus::publish`].
    pub processing_time_ms: i64,
}

impl StatusEvent {
    /// Create an event for a chapter without job attribution.
    pub fn new(chapter_id: ChapterId, status: JobState, start_time: DateTime<Utc>) -> Self {
        Self {
            job_id: None,
            chapter_id,
            status,
            progress: None,
            video_id: None,
            message: None,
            error: None,
            start_time,
            processing_time_ms: 0,
        }
    }

    /// Create an event describing `job` in the given status.
    pub fn for_job(job: &Job, status: JobState) -> Self {
        let mut event = Self::new(job.chapter_id, status, job.start_time);
        event.job_id = Some(job.job_id);
        event
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_video_id(mut self, video_id: impl Into<String>) -> Self {
        self.video_id = Some(video_id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Namespaced event name (e.g. `"job.completed"`).
    pub fn event_type(&self) -> &'static str {
        match self.status {
            JobState::Queued => "job.queued",
            JobState::Processing => "job.processing",
            JobState::Completed => "job.completed",
            JobState::Error => "job.error",
            JobState::Cancelled => "job.cancelled",
        }
    }
}

// ============================================================================
// Status Bus
// ============================================================================

/// Broadcast-based bus distributing status events to multiple consumers.
///
/// Receivers that fall behind the buffer receive a `Lagged` error and miss
/// the oldest events; the callback driver logs the gap and continues.
#[derive(Debug, Clone)]
pub struct StatusBus {
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusBus {
    /// Create a new bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Stamp `processing_time_ms` and deliver the event to every subscriber.
    ///
    /// Returns the number of receivers the event was handed to. With no
    /// subscribers the event is dropped.
    pub fn publish(&self, mut event: StatusEvent) -> usize {
        event.processing_time_ms = (Utc::now() - event.start_time).num_milliseconds().max(0);
        debug!(
            event_type = event.event_type(),
            chapter_id = event.chapter_id,
            job_id = ?event.job_id,
            subscriber_count = self.tx.receiver_count(),
            "StatusBus publish"
        );
        self.tx.send(event).unwrap_or(0)
    }

    /// Register a callback invoked for every subsequent event.
    ///
    /// Must be called from within a tokio runtime. The callback runs on its
    /// own task; panics are caught and logged. Dropping the returned handle
    /// deregisters the callback.
    pub fn subscribe<F>(&self, mut callback: F) -> StatusSubscription
    where
        F: FnMut(StatusEvent) + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let chapter_id = event.chapter_id;
                        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| callback(event)));
                        if outcome.is_err() {
                            warn!(chapter_id, "Status subscriber panicked, event skipped");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Status subscriber lagged behind, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        StatusSubscription {
            handle: Some(task.abort_handle()),
        }
    }

    /// Subscribe to the raw event stream.
    pub fn subscribe_stream(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    /// Number of active receivers, callback drivers included.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Handle to a callback registered with [`StatusBus::subscribe`].
#[must_use = "dropping the subscription deregisters the callback"]
#[derive(Debug)]
pub struct StatusSubscription {
    handle: Option<AbortHandle>,
}

impl StatusSubscription {
    /// Deregister the callback.
    pub fn unsubscribe(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Keep the callback registered for the lifetime of the bus.
    pub fn detach(mut self) {
        self.handle = None;
    }

    /// Whether the callback is still receiving events.
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
