// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of LeaseLock.
//
// LeaseLock is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// LeaseLock is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with LeaseLock. If not, see <https://www.gnu.org/licenses/>.

//! Bounded, fixed-interval retry loop.
//!
//! ## Purpose
//! Runs an attempt up to `max_attempts` times, sleeping `poll_interval`
//! between failures, and stops early when an external [`CancelSignal`]
//! fires. Not specific to locking.
//!
//! ## Policy
//! - **Fixed interval**: no exponential backoff, no jitter
//! - **Hard cap**: the loop never spins past `max_attempts`, whether or not
//!   anyone cancels it
//! - **Cooperative cancel**: checked before every attempt and raced against
//!   every poll sleep, never in the middle of an attempt
//! - **No trailing sleep**: the loop returns as soon as the last attempt fails

use crate::cancel::CancelSignal;
use crate::error::{LockError, LockResult};
use std::future::Future;
use std::time::Duration;

/// Default attempt cap for retry loops.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1000;

/// Default wait between attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Terminal outcome of a bounded retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    /// An attempt succeeded
    Completed { value: T, attempts: u32 },
    /// Hit the attempt cap without success
    Exhausted { attempts: u32 },
    /// External cancellation stopped the loop
    Cancelled { attempts: u32 },
}

impl<T> RetryOutcome<T> {
    /// Number of attempts actually made.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Completed { attempts, .. }
            | RetryOutcome::Exhausted { attempts }
            | RetryOutcome::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RetryOutcome::Completed { .. })
    }

    /// Successful value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            RetryOutcome::Completed { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Fixed-interval retry policy with a hard attempt cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedRetry {
    max_attempts: u32,
    poll_interval: Duration,
}

impl Default for BoundedRetry {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl BoundedRetry {
    /// Create a policy. `max_attempts` must be at least 1.
    pub fn new(max_attempts: u32, poll_interval: Duration) -> LockResult<Self> {
        if max_attempts == 0 {
            return Err(LockError::ConfigError(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            poll_interval,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Run `attempt` until it yields `Some`, the cap is hit, or `cancel` fires.
    ///
    /// The closure receives the 1-based attempt number. `Ok(None)` means
    /// "not yet, try again"; an `Err` aborts the loop and is returned as-is.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &mut CancelSignal,
        mut attempt: F,
    ) -> Result<RetryOutcome<T>, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                return Ok(RetryOutcome::Cancelled { attempts });
            }

            attempts += 1;
            if let Some(value) = attempt(attempts).await? {
                return Ok(RetryOutcome::Completed { value, attempts });
            }

            if attempts >= self.max_attempts {
                return Ok(RetryOutcome::Exhausted { attempts });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(RetryOutcome::Cancelled { attempts });
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancellation;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_zero_attempts_rejected() {
        let result = BoundedRetry::new(0, Duration::from_millis(10));
        assert!(matches!(result, Err(LockError::ConfigError(_))));
    }

    #[test]
    fn test_default_policy() {
        let policy = BoundedRetry::default();
        assert_eq!(policy.max_attempts(), 1000);
        assert_eq!(policy.poll_interval(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_first_attempt() {
        let policy = BoundedRetry::new(5, Duration::from_millis(10)).unwrap();
        let mut cancel = CancelSignal::never();

        let outcome: RetryOutcome<&str> = policy
            .run(&mut cancel, |_| async { Ok::<_, LockError>(Some("done")) })
            .await
            .unwrap();

        assert_eq!(outcome, RetryOutcome::Completed { value: "done", attempts: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_retries() {
        let policy = BoundedRetry::new(10, Duration::from_millis(10)).unwrap();
        let mut cancel = CancelSignal::never();

        let outcome = policy
            .run(&mut cancel, |n| async move {
                Ok::<_, LockError>(if n == 3 { Some(n) } else { None })
            })
            .await
            .unwrap();

        assert_eq!(outcome, RetryOutcome::Completed { value: 3, attempts: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_exact_attempts() {
        let policy = BoundedRetry::new(5, Duration::from_millis(10)).unwrap();
        let mut cancel = CancelSignal::never();
        let calls = Arc::new(AtomicU32::new(0));

        let start = tokio::time::Instant::now();
        let counter = calls.clone();
        let outcome: RetryOutcome<()> = policy
            .run(&mut cancel, move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, LockError>(None)
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome, RetryOutcome::Exhausted { attempts: 5 });
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // Four sleeps between five attempts, none after the last
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(40), "elapsed = {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(50), "elapsed = {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_poll() {
        let policy = BoundedRetry::new(1000, Duration::from_millis(10)).unwrap();
        let (handle, mut cancel) = cancellation();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(35)).await;
            handle.cancel();
        });

        let outcome: RetryOutcome<()> = policy
            .run(&mut cancel, |_| async { Ok::<_, LockError>(None) })
            .await
            .unwrap();

        match outcome {
            RetryOutcome::Cancelled { attempts } => {
                assert!(attempts >= 1 && attempts < 1000, "attempts = {}", attempts);
            }
            other => panic!("expected Cancelled, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_attempt() {
        let policy = BoundedRetry::new(5, Duration::from_millis(10)).unwrap();
        let (handle, mut cancel) = cancellation();
        handle.cancel();

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let outcome: RetryOutcome<()> = policy
            .run(&mut cancel, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, LockError>(None) }
            })
            .await
            .unwrap();

        assert_eq!(outcome, RetryOutcome::Cancelled { attempts: 0 });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_aborts_loop() {
        let policy = BoundedRetry::new(5, Duration::from_millis(10)).unwrap();
        let mut cancel = CancelSignal::never();

        let result: Result<RetryOutcome<()>, LockError> = policy
            .run(&mut cancel, |n| async move {
                if n == 2 {
                    Err(LockError::Backend("connection reset".to_string()))
                } else {
                    Ok(None)
                }
            })
            .await;

        assert!(matches!(result, Err(LockError::Backend(_))));
    }
}
