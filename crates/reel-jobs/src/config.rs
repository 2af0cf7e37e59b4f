//! Service configuration.

use std::time::Duration;

use reel_core::defaults::{
    EVENT_BUS_CAPACITY, FETCH_RETRIES, FETCH_RETRY_DELAY_MS, FETCH_TIMEOUT_MS,
    JOB_HISTORY_CAPACITY, JOB_MAX_CONCURRENT, JOB_RATE_LIMIT, JOB_RATE_WINDOW_MS,
};

use crate::fetcher::FetchPolicy;
use crate::scheduler::SchedulerConfig;

/// Configuration for [`VideoJobService`](crate::VideoJobService).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub scheduler: SchedulerConfig,
    /// Default fetch policy; submissions may override retries and timeout.
    pub fetch: FetchPolicy,
    pub event_bus_capacity: usize,
    /// Terminal jobs kept for [`get_job`](crate::VideoJobService::get_job).
    pub history_capacity: usize,
    /// Route lookups through the fast-path resolver unless a submission
    /// says otherwise.
    pub use_optimized_service: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            fetch: FetchPolicy::default(),
            event_bus_capacity: EVENT_BUS_CAPACITY,
            history_capacity: JOB_HISTORY_CAPACITY,
            use_optimized_service: false,
        }
    }
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `VIDEO_JOB_MAX_CONCURRENT` | 3 |
    /// | `VIDEO_JOB_RATE_LIMIT` | 10 |
    /// | `VIDEO_JOB_RATE_WINDOW_MS` | 1000 |
    /// | `VIDEO_FETCH_RETRIES` | 3 |
    /// | `VIDEO_FETCH_TIMEOUT_MS` | 45000 |
    /// | `VIDEO_FETCH_RETRY_DELAY_MS` | 1000 |
    /// | `VIDEO_USE_OPTIMIZED_SERVICE` | false |
    /// | `VIDEO_EVENT_BUS_CAPACITY` | 256 |
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.trim().parse::<T>().ok())
        }

        let max_concurrent = parsed::<usize>(lookup("VIDEO_JOB_MAX_CONCURRENT"))
            .unwrap_or(JOB_MAX_CONCURRENT)
            .max(1);
        let rate_limit = parsed::<usize>(lookup("VIDEO_JOB_RATE_LIMIT"))
            .unwrap_or(JOB_RATE_LIMIT)
            .max(1);
        let rate_window_ms =
            parsed::<u64>(lookup("VIDEO_JOB_RATE_WINDOW_MS")).unwrap_or(JOB_RATE_WINDOW_MS);

        let retries = parsed::<u32>(lookup("VIDEO_FETCH_RETRIES")).unwrap_or(FETCH_RETRIES);
        let timeout_ms = parsed::<u64>(lookup("VIDEO_FETCH_TIMEOUT_MS"))
            .filter(|ms| *ms > 0)
            .unwrap_or(FETCH_TIMEOUT_MS);
        let retry_delay_ms =
            parsed::<u64>(lookup("VIDEO_FETCH_RETRY_DELAY_MS")).unwrap_or(FETCH_RETRY_DELAY_MS);

        let use_optimized_service = lookup("VIDEO_USE_OPTIMIZED_SERVICE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let event_bus_capacity = parsed::<usize>(lookup("VIDEO_EVENT_BUS_CAPACITY"))
            .unwrap_or(EVENT_BUS_CAPACITY)
            .max(1);

        Self {
            scheduler: SchedulerConfig::default()
                .with_max_concurrent(max_concurrent)
                .with_rate_limit(rate_limit, Duration::from_millis(rate_window_ms)),
            fetch: FetchPolicy::default()
                .with_retries(retries)
                .with_timeout(Duration::from_millis(timeout_ms))
                .with_retry_delay(Duration::from_millis(retry_delay_ms)),
            event_bus_capacity,
            history_capacity: JOB_HISTORY_CAPACITY,
            use_optimized_service,
        }
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Set maximum concurrent jobs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.scheduler.max_concurrent = max.max(1);
        self
    }

    pub fn with_fetch_policy(mut self, fetch: FetchPolicy) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_event_bus_capacity(mut self, capacity: usize) -> Self {
        self.event_bus_capacity = capacity.max(1);
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_optimized_service(mut self, enabled: bool) -> Self {
        self.use_optimized_service = enabled;
        self
    }
}
