//! Active-job index keyed by chapter.
//!
//! The registry answers "is chapter X currently being processed" and holds
//! the cancellation token for each active job. All state sits behind one
//! mutex so register-if-absent is a single atomic check-and-set.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use reel_core::{ChapterId, Job, JobId, JobState};

/// Result of [`JobRegistry::try_register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The job is now the active job for its chapter.
    Registered,
    /// Another job is already active for the chapter.
    Existing(Job),
}

struct ActiveJob {
    job: Job,
    cancel: CancellationToken,
}

#[derive(Default)]
struct RegistryState {
    active: HashMap<ChapterId, ActiveJob>,
    history: VecDeque<Job>,
}

/// Thread-safe map from chapter to its active job.
pub struct JobRegistry {
    state: Mutex<RegistryState>,
    history_capacity: usize,
}

impl JobRegistry {
    /// Create a registry retaining up to `history_capacity` terminal jobs.
    pub fn new(history_capacity: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            history_capacity,
        }
    }

    /// Register `job` as the active job for its chapter unless one exists.
    pub fn try_register(&self, job: Job, cancel: CancellationToken) -> Registration {
        let mut state = self.state.lock();
        if let Some(existing) = state.active.get(&job.chapter_id) {
            debug!(
                chapter_id = job.chapter_id,
                job_id = %existing.job.job_id,
                "Chapter already has an active job"
            );
            return Registration::Existing(existing.job.clone());
        }
        state.active.insert(job.chapter_id, ActiveJob { job, cancel });
        Registration::Registered
    }

    /// Remove the active entry for `job` and retain `job` as its final snapshot.
    ///
    /// Returns false when the chapter's active entry belongs to another job
    /// (or none); the snapshot is still retained in that case.
    pub fn unregister(&self, job: Job) -> bool {
        let mut state = self.state.lock();
        let owned = state
            .active
            .get(&job.chapter_id)
            .is_some_and(|entry| entry.job.job_id == job.job_id);
        if owned {
            state.active.remove(&job.chapter_id);
        }
        Self::push_history(&mut state, job, self.history_capacity);
        owned
    }

    /// Retain a job that never became active (e.g. an already-processed
    /// chapter answered without queuing).
    pub fn record(&self, job: Job) {
        let mut state = self.state.lock();
        Self::push_history(&mut state, job, self.history_capacity);
    }

    fn push_history(state: &mut RegistryState, job: Job, capacity: usize) {
        if capacity == 0 {
            return;
        }
        if state.history.len() >= capacity {
            state.history.pop_front();
        }
        state.history.push_back(job);
    }

    /// ID of the active job for a chapter.
    pub fn lookup(&self, chapter_id: ChapterId) -> Option<JobId> {
        self.state
            .lock()
            .active
            .get(&chapter_id)
            .map(|entry| entry.job.job_id)
    }

    /// Active job for a chapter.
    pub fn active_job(&self, chapter_id: ChapterId) -> Option<Job> {
        self.state
            .lock()
            .active
            .get(&chapter_id)
            .map(|entry| entry.job.clone())
    }

    /// Signal cancellation to the chapter's active job.
    ///
    /// Returns whether a cancellation was dispatched.
    pub fn cancel(&self, chapter_id: ChapterId) -> bool {
        self.cancel_job(chapter_id).is_some()
    }

    /// Signal cancellation and return the ID of the job that received it.
    pub fn cancel_job(&self, chapter_id: ChapterId) -> Option<JobId> {
        let state = self.state.lock();
        let entry = state.active.get(&chapter_id)?;
        entry.cancel.cancel();
        Some(entry.job.job_id)
    }

    /// Update the state recorded for an active job.
    pub fn set_state(&self, chapter_id: ChapterId, job_id: JobId, job_state: JobState) -> bool {
        let mut state = self.state.lock();
        match state.active.get_mut(&chapter_id) {
            Some(entry) if entry.job.job_id == job_id => {
                entry.job.state = job_state;
                true
            }
            _ => false,
        }
    }

    /// Find a job by ID among active and recently finished jobs.
    pub fn get(&self, job_id: JobId) -> Option<Job> {
        let state = self.state.lock();
        state
            .active
            .values()
            .map(|entry| &entry.job)
            .chain(state.history.iter().rev())
            .find(|job| job.job_id == job_id)
            .cloned()
    }

    /// Chapters with an active job, ascending.
    pub fn active_chapter_ids(&self) -> Vec<ChapterId> {
        let mut ids: Vec<ChapterId> = self.state.lock().active.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of active jobs.
    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(reel_core::defaults::JOB_HISTORY_CAPACITY)
    }
}
