//! Retry classification with exponential backoff
//!
//! Every inference call made by the loop goes through [`retry_with_classifier`].
//! Before each attempt beyond the first, a [`RetryClassifier`] looks at the
//! [`RetryContext`] (how many attempts were made, what the last failure was)
//! and decides whether another attempt is worth it. Between attempts the
//! [`RetryConfig`] supplies an exponentially growing, jittered delay.
//!
//! # Examples
//!
//! ```rust,no_run
//! use open_agent_loop::retry::{retry_with_classifier, DefaultRetryClassifier, RetryConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RetryConfig::default()
//!     .with_max_attempts(3)
//!     .with_initial_delay(Duration::from_secs(1));
//!
//! let result = retry_with_classifier(&config, &DefaultRetryClassifier::new(), || async {
//!     Ok::<_, open_agent_loop::Error>(42)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::error::ErrorClass;
use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Phrases that mark a non-transient failure as a rate limit.
pub const DEFAULT_RATE_LIMIT_PHRASES: &[&str] = &[
    "rate limit",
    "rate-limit",
    "rate_limit",
    "too many requests",
    "429",
    "quota exceeded",
    "throttl",
];

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,

    /// Initial delay before first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (e.g., 2.0 doubles the delay each time)
    pub backoff_multiplier: f64,

    /// Add random jitter to prevent thundering herd (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set jitter factor (clamped to 0.0..=1.0)
    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `retry` (0-based), with backoff and jitter.
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let base_delay_ms = self.initial_delay.as_millis() as f64;
        let exponential_delay = base_delay_ms * self.backoff_multiplier.powi(retry as i32);

        let capped_delay = exponential_delay.min(self.max_delay.as_millis() as f64);

        let jitter_range = capped_delay * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range;
        let final_delay = capped_delay + jitter - (jitter_range / 2.0);

        Duration::from_millis(final_delay.max(0.0) as u64)
    }
}

/// What the classifier knows when deciding about the next attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryContext<'a> {
    /// Attempts already made.
    pub attempt_count: u32,
    pub last_failure: Option<&'a Error>,
    pub max_attempts: u32,
}

/// Decides whether a failed operation gets another attempt.
pub trait RetryClassifier: Send + Sync {
    /// Whether this failure is worth retrying at all, ignoring the ceiling.
    fn is_retryable(&self, failure: &Error) -> bool;

    /// Consulted before every attempt. The first attempt always proceeds.
    fn can_retry(&self, ctx: &RetryContext<'_>) -> bool {
        if ctx.attempt_count == 0 {
            return true;
        }
        if ctx.attempt_count >= ctx.max_attempts {
            return false;
        }
        ctx.last_failure.is_none_or(|failure| self.is_retryable(failure))
    }
}

/// Classifier built on [`Error::class`].
///
/// Transient and unclassified failures retry. Non-transient failures retry
/// only when their message reads like a rate limit. Contract violations and
/// control-flow signals never retry.
#[derive(Debug, Clone)]
pub struct DefaultRetryClassifier {
    rate_limit_phrases: Vec<String>,
}

impl Default for DefaultRetryClassifier {
    fn default() -> Self {
        Self {
            rate_limit_phrases: DEFAULT_RATE_LIMIT_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl DefaultRetryClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the rate-limit phrases. Matching is case-insensitive.
    pub fn with_rate_limit_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rate_limit_phrases = phrases
            .into_iter()
            .map(|p| p.into().to_lowercase())
            .collect();
        self
    }

    pub fn is_rate_limited(&self, failure: &Error) -> bool {
        let message = failure.to_string().to_lowercase();
        self.rate_limit_phrases
            .iter()
            .any(|phrase| message.contains(phrase.as_str()))
    }
}

impl RetryClassifier for DefaultRetryClassifier {
    fn is_retryable(&self, failure: &Error) -> bool {
        match failure.class() {
            ErrorClass::ControlFlow | ErrorClass::ContractViolation => false,
            ErrorClass::Transient | ErrorClass::Unclassified => true,
            ErrorClass::NonTransient => self.is_rate_limited(failure),
        }
    }
}

/// Run `operation` until it succeeds, fails in a way the classifier will not
/// retry, or the attempt ceiling is reached.
///
/// [`RetryClassifier::can_retry`] alone decides whether another attempt is
/// made. When it declines, a failure that ran into the attempt ceiling while
/// still retryable is wrapped in [`Error::RetriesExhausted`]; any other
/// failure is returned as-is.
pub async fn retry_with_classifier<F, Fut, T>(
    config: &RetryConfig,
    classifier: &dyn RetryClassifier,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0u32;
    loop {
        let failure = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        attempts += 1;

        let ctx = RetryContext {
            attempt_count: attempts,
            last_failure: Some(&failure),
            max_attempts: config.max_attempts,
        };
        if !classifier.can_retry(&ctx) {
            if attempts >= config.max_attempts && classifier.is_retryable(&failure) {
                log::warn!("Giving up after {} attempts: {}", attempts, failure);
                return Err(Error::RetriesExhausted {
                    attempts,
                    source: Box::new(failure),
                });
            }
            log::debug!("Not retrying after attempt {}: {}", attempts, failure);
            return Err(failure);
        }

        let delay = config.calculate_delay(attempts - 1);
        log::warn!(
            "Attempt {} failed ({}); retrying in {:?}",
            attempts,
            failure,
            delay
        );
        sleep(delay).await;
    }
}
