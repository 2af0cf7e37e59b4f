//! # reel-jobs
//!
//! Background video lookup pipeline for course chapters.
//!
//! This crate provides:
//! - Per-chapter deduplication of in-flight jobs
//! - Priority-based scheduling with a concurrency cap and start rate limit
//! - Search lookups with retries, per-attempt timeouts and abort rules
//! - Cancellation of queued and running jobs
//! - Status notifications via broadcast channels
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use reel_db::MemoryChapterStore;
//! use reel_jobs::{ProcessOptions, ServiceConfig, VideoJobServiceBuilder};
//!
//! let store = Arc::new(MemoryChapterStore::new());
//! let service = VideoJobServiceBuilder::new(store, Arc::new(my_search_provider))
//!     .with_config(ServiceConfig::from_env())
//!     .build();
//!
//! // Listen for status updates
//! let subscription = service.subscribe_to_status_updates(|event| {
//!     println!("{} chapter {}", event.event_type(), event.chapter_id);
//! });
//!
//! let submission = service.process_video(7, ProcessOptions::default()).await?;
//! println!("queued job {}", submission.job_id);
//!
//! // Graceful shutdown
//! service.shutdown();
//! subscription.unsubscribe();
//! ```

pub mod config;
pub mod fetcher;
mod job;
mod rate;
pub mod registry;
pub mod scheduler;
pub mod service;

// Re-export core types
pub use reel_core::*;

pub use config::ServiceConfig;
pub use fetcher::{resolve_quick, AbortReason, FetchError, FetchPolicy, RetryableFetcher};
pub use registry::{JobRegistry, Registration};
pub use scheduler::{CancelOutcome, ScheduledTask, Scheduler, SchedulerConfig, SchedulerStats};
pub use service::{VideoJobService, VideoJobServiceBuilder};

/// Default number of additional fetch attempts.
pub const DEFAULT_FETCH_RETRIES: u32 = reel_core::defaults::FETCH_RETRIES;

/// Default maximum number of jobs executing simultaneously.
pub const DEFAULT_MAX_CONCURRENT: usize = reel_core::defaults::JOB_MAX_CONCURRENT;
