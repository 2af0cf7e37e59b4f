//! Centralized default constants for the chapter video pipeline.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration types in other crates reference these constants instead of
//! defining their own magic numbers.

// =============================================================================
// SCHEDULER
// =============================================================================

/// Default maximum number of jobs executing simultaneously.
pub const JOB_MAX_CONCURRENT: usize = 3;

/// Default maximum number of job starts per rate window.
pub const JOB_RATE_LIMIT: usize = 10;

/// Default rolling rate window in milliseconds.
pub const JOB_RATE_WINDOW_MS: u64 = 1_000;

/// Default job priority. Lower values are scheduled first.
pub const JOB_PRIORITY: i32 = 0;

/// Number of terminal jobs kept for lookup after they leave the active set.
pub const JOB_HISTORY_CAPACITY: usize = 256;

// =============================================================================
// VIDEO SEARCH
// =============================================================================

/// Additional fetch attempts after the first one.
pub const FETCH_RETRIES: u32 = 3;

/// Per-attempt timeout for the search provider in milliseconds.
pub const FETCH_TIMEOUT_MS: u64 = 45_000;

/// Fixed delay between fetch attempts in milliseconds.
pub const FETCH_RETRY_DELAY_MS: u64 = 1_000;

/// HTTP status the search provider uses for an explicit denial.
pub const FORBIDDEN_STATUS: u16 = 403;

// =============================================================================
// STATUS EVENTS
// =============================================================================

/// Default status bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Progress reported when a job starts searching.
pub const PROGRESS_SEARCHING: u8 = 10;

/// Progress reported on completion.
pub const PROGRESS_DONE: u8 = 100;
