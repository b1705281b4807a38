//! Retry with exponential backoff for tool downloads
//!
//! Only transient failures are retried: connection problems, timeouts and server
//! side HTTP statuses. Anything that would fail the same way again (a 404, a hash
//! mismatch, a full disk) is returned immediately.
//!
//! ```no_run
//! use playlist_dl::config::RetryConfig;
//! use playlist_dl::error::Error;
//! use playlist_dl::retry::download_with_retry;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::default();
//! let bytes = download_with_retry(&config, || async {
//!     Ok::<Vec<u8>, Error>(Vec::new())
//! })
//! .await?;
//! # let _ = bytes;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, ProvisioningError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Classifies errors as transient (worth another attempt) or permanent
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        // transport failures reach here already classified as provisioning errors
        match self {
            Error::Provisioning(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl IsRetryable for ProvisioningError {
    fn is_retryable(&self) -> bool {
        match self {
            // request never completed: DNS, connect, reset, timeout, truncated body
            ProvisioningError::Fetch { .. } => true,
            // 408 request timeout, 429 rate limited, 5xx server trouble
            ProvisioningError::HttpStatus { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            // a short body is usually a dropped connection
            ProvisioningError::TooSmall { .. } => true,
            ProvisioningError::HashMismatch { .. }
            | ProvisioningError::InsufficientSpace { .. }
            | ProvisioningError::Unpack { .. }
            | ProvisioningError::TranscoderNotFound { .. }
            | ProvisioningError::Io { .. } => false,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out
///
/// The operation is attempted once plus up to `config.max_attempts` retries. The
/// delay starts at `initial_delay`, grows by `backoff_multiplier` after every
/// retry and never exceeds `max_delay`. With `jitter` enabled each sleep is
/// stretched by a random factor in `[1, 2]`.
pub async fn download_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "download succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "download failed, retrying"
                );

                let sleep_for = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };
                tokio::time::sleep(sleep_for).await;

                let next = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(error = %e, attempts = attempt + 1, "download failed, retries exhausted");
                } else {
                    tracing::error!(error = %e, "download failed with permanent error");
                }
                return Err(e);
            }
        }
    }
}

/// Stretch `delay` by a uniform random factor in `[1, 2]`
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
