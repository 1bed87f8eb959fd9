// SPDX-License-Identifier: MIT
//! Bounded retry for transient RPC failures.
//!
//! Provides [`retry_transient`] — a generic async helper that re-invokes a
//! fallible operation when its failure is classified as transient, waiting a
//! fixed delay between attempts. Any other failure is returned immediately;
//! retrying is always the caller's decision, never the service's.
//!
//! # Example
//! ```rust,ignore
//! use taskd::retry::{retry_transient, RetryConfig};
//!
//! let result = retry_transient(&RetryConfig::default(), |e| e.is_transient(), || {
//!     client.call_once("task.create", params.clone())
//! })
//! .await;
//! ```

use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for [`retry_transient`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first try).
    ///
    /// Default: 3
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    ///
    /// Default: 50 ms
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(50),
        }
    }
}

impl RetryConfig {
    /// Create a config suitable for quick unit tests (no real waiting).
    pub fn instant() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    /// Create a config with a single attempt (no retries).
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

/// Retry an async operation while its failures are transient.
///
/// Calls `f()` up to `config.max_attempts` times. A failure for which
/// `is_transient` returns false is returned to the caller at once. A
/// transient failure triggers a fixed `config.delay` wait and another
/// attempt; when every attempt fails transiently, the last error is
/// returned. Success on any attempt returns immediately.
///
/// # Type parameters
/// - `F`: Closure that returns a `Future` producing `Result<T, E>`.
/// - `P`: Predicate deciding whether an error may be retried.
/// - `E`: Error type; must implement `Debug` for logging.
///
/// # Panics
/// Panics if `config.max_attempts` is 0 (would never attempt the operation).
pub async fn retry_transient<F, Fut, T, E, P>(
    config: &RetryConfig,
    mut is_transient: P,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
    E: std::fmt::Debug,
{
    assert!(
        config.max_attempts > 0,
        "RetryConfig.max_attempts must be at least 1"
    );

    let mut last_err: Option<E> = None;

    for attempt in 1..=config.max_attempts {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "retry succeeded");
                }
                return Ok(value);
            }
            Err(e) => {
                if !is_transient(&e) {
                    return Err(e);
                }
                if attempt < config.max_attempts {
                    warn!(
                        attempt,
                        max = config.max_attempts,
                        delay_ms = config.delay.as_millis(),
                        err = ?e,
                        "transient failure — retrying"
                    );
                    tokio::time::sleep(config.delay).await;
                } else {
                    warn!(
                        attempt,
                        max = config.max_attempts,
                        err = ?e,
                        "all retry attempts exhausted"
                    );
                }
                last_err = Some(e);
            }
        }
    }

    // Safety: the loop always assigns last_err when all attempts fail.
    Err(last_err.expect("retry loop ended without setting last_err"))
}
