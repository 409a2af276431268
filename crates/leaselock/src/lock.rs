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

//! Lock handle: acquisition, renewal, and release of one named lock.
//!
//! ## Lifecycle
//! A handle moves `Idle -> Held -> Released` and is not reused across
//! lock/unlock cycles. Create a new handle (and with it a new token) for
//! every acquisition cycle.
//!
//! ## Ownership
//! The handle's token is written as the record value at acquisition and
//! presented on every extend and delete, so a handle can never extend or
//! remove a record that another handle created after its lease expired.

use crate::cancel::{cancellation, CancelHandle, CancelSignal};
use crate::retry::{BoundedRetry, RetryOutcome};
use crate::token::LockToken;
use crate::watchdog::{Lease, StopReason, Watchdog, WatchdogState};
use crate::{LockError, LockResult, LockStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

/// Default lease duration.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(10);

/// Shortest accepted lease.
pub const MIN_LEASE_DURATION: Duration = Duration::from_millis(1);

/// Longest accepted lease (one year).
pub const MAX_LEASE_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Per-handle lock options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// TTL applied at acquisition and at every renewal
    pub lease_duration: Duration,
    /// Renewal cap: `None` renews until release, `Some(0)` disables the watchdog
    pub max_renewals: Option<u32>,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            lease_duration: DEFAULT_LEASE_DURATION,
            max_renewals: None,
        }
    }
}

impl LockOptions {
    pub fn new(lease_duration: Duration) -> Self {
        Self {
            lease_duration,
            max_renewals: None,
        }
    }

    /// Cap the number of renewals.
    pub fn with_max_renewals(mut self, max_renewals: u32) -> Self {
        self.max_renewals = Some(max_renewals);
        self
    }

    /// Single-TTL lock: no background renewal at all.
    pub fn without_watchdog(self) -> Self {
        self.with_max_renewals(0)
    }

    pub fn watchdog_enabled(&self) -> bool {
        self.max_renewals != Some(0)
    }

    pub fn validate(&self) -> LockResult<()> {
        if self.lease_duration < MIN_LEASE_DURATION {
            return Err(LockError::InvalidLease(format!(
                "lease duration must be at least {:?}, got {:?}",
                MIN_LEASE_DURATION, self.lease_duration
            )));
        }
        if self.lease_duration > MAX_LEASE_DURATION {
            return Err(LockError::InvalidLease(format!(
                "lease duration must be at most {:?}, got {:?}",
                MAX_LEASE_DURATION, self.lease_duration
            )));
        }
        Ok(())
    }
}

/// Result of a retrying acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Lock acquired
    Acquired { attempts: u32 },
    /// Attempt cap reached while the key stayed held
    Exhausted { attempts: u32 },
    /// External cancellation fired first
    Cancelled { attempts: u32 },
}

impl AcquireOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, AcquireOutcome::Acquired { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            AcquireOutcome::Acquired { attempts }
            | AcquireOutcome::Exhausted { attempts }
            | AcquireOutcome::Cancelled { attempts } => *attempts,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            AcquireOutcome::Acquired { .. } => "acquired",
            AcquireOutcome::Exhausted { .. } => "exhausted",
            AcquireOutcome::Cancelled { .. } => "cancelled",
        }
    }
}

impl From<RetryOutcome<()>> for AcquireOutcome {
    fn from(outcome: RetryOutcome<()>) -> Self {
        match outcome {
            RetryOutcome::Completed { attempts, .. } => AcquireOutcome::Acquired { attempts },
            RetryOutcome::Exhausted { attempts } => AcquireOutcome::Exhausted { attempts },
            RetryOutcome::Cancelled { attempts } => AcquireOutcome::Cancelled { attempts },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Held,
    Released,
}

struct HandleState {
    phase: Phase,
    watchdog: Option<Watchdog>,
    // Handed to the watchdog when it spawns
    watchdog_state_tx: Option<watch::Sender<WatchdogState>>,
}

/// Handle on one attempt to hold a named lock.
///
/// ## Example
/// ```rust,no_run
/// use leaselock::{LockHandle, LockOptions, MemoryLockStore};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(MemoryLockStore::new());
/// let lock = LockHandle::new(store, "jobs:nightly-report", LockOptions::new(Duration::from_secs(10)))?;
///
/// if lock.try_acquire().await? {
///     // protected work
///     lock.release().await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct LockHandle {
    store: Arc<dyn LockStore>,
    key: String,
    token: LockToken,
    options: LockOptions,
    stop: CancelHandle,
    watchdog_state: watch::Receiver<WatchdogState>,
    state: Mutex<HandleState>,
}

impl LockHandle {
    /// Create a handle with a fresh token. Does not touch the store.
    pub fn new(
        store: Arc<dyn LockStore>,
        key: impl Into<String>,
        options: LockOptions,
    ) -> LockResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(LockError::InvalidKey("lock key must not be empty".to_string()));
        }
        options.validate()?;

        let (stop, _) = cancellation();
        let (state_tx, state_rx) = watch::channel(WatchdogState::Idle);

        Ok(Self {
            store,
            key,
            token: LockToken::generate(),
            options,
            stop,
            watchdog_state: state_rx,
            state: Mutex::new(HandleState {
                phase: Phase::Idle,
                watchdog: None,
                watchdog_state_tx: Some(state_tx),
            }),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &LockToken {
        &self.token
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    pub fn lease_duration(&self) -> Duration {
        self.options.lease_duration
    }

    /// Single acquisition attempt.
    ///
    /// ## Returns
    /// - `Ok(true)`: this handle created the record and now owns the lock
    /// - `Ok(false)`: the key is held by someone else
    /// - `Err(LockError::Backend)`: the store could not be reached
    /// - `Err(LockError::AlreadyAcquired)` / `Err(LockError::HandleReleased)`: handle misuse
    ///
    /// On success the watchdog starts unless renewal is disabled.
    #[instrument(skip(self), fields(key = %self.key, backend = self.store.backend_name()))]
    pub async fn try_acquire(&self) -> LockResult<bool> {
        let mut state = self.state.lock().await;
        match state.phase {
            Phase::Idle => {}
            Phase::Held => return Err(LockError::AlreadyAcquired(self.key.clone())),
            Phase::Released => return Err(LockError::HandleReleased(self.key.clone())),
        }

        let acquired = match self
            .store
            .create_if_absent(&self.key, self.token.as_str(), self.options.lease_duration)
            .await
        {
            Ok(acquired) => acquired,
            Err(e) => {
                metrics::counter!("leaselock_acquire_total", "outcome" => "error").increment(1);
                warn!(error = %e, "Lock acquisition failed");
                return Err(e);
            }
        };

        if !acquired {
            metrics::counter!("leaselock_acquire_total", "outcome" => "contended").increment(1);
            debug!("Lock held elsewhere");
            return Ok(false);
        }

        metrics::counter!("leaselock_acquire_total", "outcome" => "acquired").increment(1);
        state.phase = Phase::Held;

        if self.options.watchdog_enabled() {
            if let Some(state_tx) = state.watchdog_state_tx.take() {
                let lease = Lease {
                    key: self.key.clone(),
                    token: self.token.clone(),
                    duration: self.options.lease_duration,
                    max_renewals: self.options.max_renewals,
                };
                state.watchdog = Some(Watchdog::spawn(
                    self.store.clone(),
                    lease,
                    self.stop.signal(),
                    state_tx,
                ));
            }
        }

        debug!(
            lease_ms = self.options.lease_duration.as_millis() as u64,
            watchdog = self.options.watchdog_enabled(),
            "Lock acquired"
        );
        Ok(true)
    }

    /// Acquire with a bounded, fixed-interval retry loop.
    ///
    /// Polls [`try_acquire`](Self::try_acquire) every `policy.poll_interval()`
    /// until it succeeds, `policy.max_attempts()` attempts have failed, or
    /// `cancel` fires. A store error ends the loop and is returned as `Err`.
    #[instrument(skip(self, policy, cancel), fields(key = %self.key, max_attempts = policy.max_attempts()))]
    pub async fn acquire_with_retry(
        &self,
        policy: &BoundedRetry,
        cancel: &mut CancelSignal,
    ) -> LockResult<AcquireOutcome> {
        let outcome: AcquireOutcome = policy
            .run(cancel, |_| async move {
                Ok::<_, LockError>(self.try_acquire().await?.then_some(()))
            })
            .await?
            .into();

        match outcome {
            AcquireOutcome::Acquired { attempts } => debug!(attempts, "Lock acquired after retries"),
            other => info!(attempts = other.attempts(), outcome = other.as_str(), "Lock not acquired"),
        }
        Ok(outcome)
    }

    /// Release the lock.
    ///
    /// Stops the watchdog and waits for it to exit, then deletes the record
    /// only if it still carries this handle's token.
    ///
    /// ## Returns
    /// - `Ok(true)`: this handle owned the record and removed it
    /// - `Ok(false)`: nothing to remove (not acquired, expired, taken over,
    ///   or already released)
    /// - `Err(LockError::Backend)`: the store could not be reached; the
    ///   watchdog is stopped anyway and the lease will expire on its own
    #[instrument(skip(self), fields(key = %self.key, backend = self.store.backend_name()))]
    pub async fn release(&self) -> LockResult<bool> {
        let mut state = self.state.lock().await;

        // Watchdog must be gone before the delete, or an in-flight renewal
        // lands on the missing record and reports a false ownership loss
        if state.phase == Phase::Held {
            self.stop.cancel();
        }
        state.phase = Phase::Released;
        if let Some(watchdog) = state.watchdog.take() {
            watchdog.join().await;
        }

        let result = self
            .store
            .compare_and_delete(&self.key, self.token.as_str())
            .await;

        match result {
            Ok(deleted) => {
                let released = deleted == 1;
                metrics::counter!(
                    "leaselock_release_total",
                    "outcome" => if released { "released" } else { "not_owner" }
                )
                .increment(1);
                debug!(released, "Lock release");
                Ok(released)
            }
            Err(e) => {
                metrics::counter!("leaselock_release_total", "outcome" => "error").increment(1);
                warn!(error = %e, "Lock release failed, lease left to expire");
                Err(e)
            }
        }
    }

    /// Whether the store still holds this handle's token under the key.
    pub async fn is_held(&self) -> LockResult<bool> {
        let current = self.store.get(&self.key).await?;
        Ok(current.as_deref() == Some(self.token.as_str()))
    }

    /// Current watchdog state.
    pub fn watchdog_state(&self) -> WatchdogState {
        *self.watchdog_state.borrow()
    }

    /// Subscribe to watchdog state transitions.
    pub fn subscribe(&self) -> watch::Receiver<WatchdogState> {
        self.watchdog_state.clone()
    }

    /// Resolve when the watchdog reports that the lease is lost.
    ///
    /// Only `OwnershipLost` and `StoreError` resolve this future. A release,
    /// a reached renewal cap, or a disabled watchdog leave it pending, which
    /// makes it suitable as a `tokio::select!` branch next to protected work.
    pub async fn lease_lost(&self) -> StopReason {
        let mut rx = self.watchdog_state.clone();
        let reason = rx
            .wait_for(|s| s.stop_reason().is_some_and(|r| r.is_lease_lost()))
            .await
            .ok()
            .and_then(|s| s.stop_reason());

        match reason {
            Some(reason) => reason,
            None => std::future::pending().await,
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        // Dropped while held: stop renewing and let the lease expire
        if self.state.get_mut().phase == Phase::Held {
            self.stop.cancel();
        }
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("options", &self.options)
            .field("watchdog", &self.watchdog_state())
            .finish()
    }
}
