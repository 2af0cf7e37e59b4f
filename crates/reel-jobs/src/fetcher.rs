//! Search provider access with retries, per-attempt timeouts, and aborts.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use reel_core::defaults::{FETCH_RETRIES, FETCH_RETRY_DELAY_MS, FETCH_TIMEOUT_MS};
use reel_core::{ChapterId, FastPathResolver, ProviderError, SearchProvider};

/// Retry and timeout policy for video lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Additional attempts after the first one.
    pub retries: u32,
    /// Deadline for each individual attempt.
    pub timeout: Duration,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            retries: FETCH_RETRIES,
            timeout: Duration::from_millis(FETCH_TIMEOUT_MS),
            retry_delay: Duration::from_millis(FETCH_RETRY_DELAY_MS),
        }
    }
}

impl FetchPolicy {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Total number of attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Why a fetch stopped before exhausting its attempts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortReason {
    #[error("cancelled")]
    Cancelled,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("provider refused retry: {0}")]
    DoNotRetry(String),
}

impl From<ProviderError> for AbortReason {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::DoNotRetry(msg) => AbortReason::DoNotRetry(msg),
            other => AbortReason::Forbidden(other.to_string()),
        }
    }
}

/// Classified failure of a video lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The last attempt exceeded its deadline.
    #[error("Video search timed out after {attempts} attempt(s) ({timeout_ms}ms each)")]
    Timeout { attempts: u32, timeout_ms: u64 },

    /// Cancelled by the caller or refused by the provider.
    #[error("Video search aborted after {attempts} attempt(s): {reason}")]
    Aborted { attempts: u32, reason: AbortReason },

    /// The provider kept answering without a video.
    #[error("Failed to fetch video ID after {attempts} attempt(s)")]
    NotFound { attempts: u32 },

    /// The last attempt failed with a provider error.
    #[error("Video search failed after {attempts} attempt(s): {message}")]
    Unknown { attempts: u32, message: String },
}

impl FetchError {
    /// Number of provider calls made.
    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::Timeout { attempts, .. }
            | FetchError::Aborted { attempts, .. }
            | FetchError::NotFound { attempts }
            | FetchError::Unknown { attempts, .. } => *attempts,
        }
    }

    /// Whether the caller cancelled the fetch.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            FetchError::Aborted {
                reason: AbortReason::Cancelled,
                ..
            }
        )
    }

    fn cancelled(attempts: u32) -> Self {
        FetchError::Aborted {
            attempts,
            reason: AbortReason::Cancelled,
        }
    }
}

enum AttemptFailure {
    Timeout,
    Empty,
    Provider(ProviderError),
}

/// Resolves search queries to video IDs through a [`SearchProvider`].
pub struct RetryableFetcher {
    provider: Arc<dyn SearchProvider>,
    policy: FetchPolicy,
}

impl RetryableFetcher {
    pub fn new(provider: Arc<dyn SearchProvider>, policy: FetchPolicy) -> Self {
        Self { provider, policy }
    }

    /// Default policy used by [`fetch`](Self::fetch).
    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Fetch with the default policy.
    pub async fn fetch(&self, query: &str, cancel: &CancellationToken) -> Result<String, FetchError> {
        self.fetch_with(query, &self.policy, cancel).await
    }

    /// Fetch with an explicit policy.
    ///
    /// Cancellation is checked before each attempt, races the provider call
    /// alongside the attempt deadline, and interrupts the retry delay.
    #[instrument(skip(self, policy, cancel), fields(max_attempts = policy.max_attempts()))]
    pub async fn fetch_with(
        &self,
        query: &str,
        policy: &FetchPolicy,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError> {
        let max_attempts = policy.max_attempts();
        let mut last = AttemptFailure::Empty;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(FetchError::cancelled(attempt - 1));
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::cancelled(attempt)),
                res = timeout(policy.timeout, self.provider.search_for_video(query)) => res,
            };

            match outcome {
                Ok(Ok(Some(video_id))) if !video_id.trim().is_empty() => {
                    debug!(attempt, %video_id, "Video found");
                    return Ok(video_id);
                }
                Ok(Ok(_)) => {
                    warn!(attempt, max_attempts, "Search returned no video");
                    last = AttemptFailure::Empty;
                }
                Ok(Err(err)) if err.is_abort() => {
                    warn!(attempt, error = %err, "Search provider refused, not retrying");
                    return Err(FetchError::Aborted {
                        attempts: attempt,
                        reason: err.into(),
                    });
                }
                Ok(Err(err)) => {
                    warn!(attempt, max_attempts, error = %err, "Search attempt failed");
                    last = AttemptFailure::Provider(err);
                }
                Err(_) => {
                    warn!(
                        attempt,
                        max_attempts,
                        timeout_ms = policy.timeout_ms(),
                        "Search attempt timed out"
                    );
                    last = AttemptFailure::Timeout;
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(FetchError::cancelled(attempt)),
                    _ = sleep(policy.retry_delay) => {}
                }
            }
        }

        Err(match last {
            AttemptFailure::Timeout => FetchError::Timeout {
                attempts: max_attempts,
                timeout_ms: policy.timeout_ms(),
            },
            AttemptFailure::Empty => FetchError::NotFound {
                attempts: max_attempts,
            },
            AttemptFailure::Provider(err) => FetchError::Unknown {
                attempts: max_attempts,
                message: err.to_string(),
            },
        })
    }
}

/// Single-shot lookup through the fast-path resolver.
///
/// Shares the attempt deadline and cancellation semantics of
/// [`RetryableFetcher`] but never retries.
pub async fn resolve_quick(
    resolver: &dyn FastPathResolver,
    chapter_id: ChapterId,
    query: &str,
    policy: &FetchPolicy,
    cancel: &CancellationToken,
) -> Result<String, FetchError> {
    if cancel.is_cancelled() {
        return Err(FetchError::cancelled(0));
    }

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(FetchError::cancelled(1)),
        res = timeout(policy.timeout, resolver.resolve_quick(chapter_id, query)) => res,
    };

    match outcome {
        Ok(Ok(resolution)) => match resolution.video_id {
            Some(video_id) if !video_id.trim().is_empty() => Ok(video_id),
            _ => Err(FetchError::NotFound { attempts: 1 }),
        },
        Ok(Err(err)) if err.is_abort() => Err(FetchError::Aborted {
            attempts: 1,
            reason: err.into(),
        }),
        Ok(Err(err)) => Err(FetchError::Unknown {
            attempts: 1,
            message: err.to_string(),
        }),
        Err(_) => Err(FetchError::Timeout {
            attempts: 1,
            timeout_ms: policy.timeout_ms(),
        }),
    }
}
