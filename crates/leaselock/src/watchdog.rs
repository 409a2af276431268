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

//! Lease renewal watchdog.
//!
//! ## Purpose
//! Keeps a held lock alive while its handle is alive, by extending the
//! record's expiry every three quarters of the lease. Every extension is a
//! compare-and-extend, so a record that now belongs to someone else is never
//! touched.
//!
//! ## State Machine
//! ```text
//!   Idle ──spawn──> Renewing ──┬── stop signal ─────────> Stopped(Released)
//!                     │  ^     ├── token mismatch/absent > Stopped(OwnershipLost)
//!                     └──┘     ├── store error ─────────> Stopped(StoreError)
//!                   extended   └── cap reached ─────────> Stopped(RenewalCapReached)
//! ```
//! Every exit path ends in `Stopped`, which is published on a
//! `watch` channel so the lock holder can observe a lost lease.
//!
//! ## Timing
//! The first renewal fires one period after acquisition. If the timer and the
//! stop signal are ready together, either may win.

use crate::cancel::CancelSignal;
use crate::token::LockToken;
use crate::LockStore;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

/// Shortest renewal period, for very short leases.
pub const MIN_RENEWAL_PERIOD: Duration = Duration::from_millis(1);

/// Why a watchdog stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// Handle released (or dropped) the lock
    Released,
    /// Record absent or held under another token
    OwnershipLost,
    /// Renewal could not be confirmed
    StoreError,
    /// Configured renewal count reached; record left to expire
    RenewalCapReached,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Released => "released",
            StopReason::OwnershipLost => "ownership_lost",
            StopReason::StoreError => "store_error",
            StopReason::RenewalCapReached => "renewal_cap_reached",
        }
    }

    /// True when the holder can no longer assume it owns the lock.
    pub fn is_lease_lost(&self) -> bool {
        matches!(self, StopReason::OwnershipLost | StopReason::StoreError)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable watchdog state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// No watchdog running (not acquired yet, or renewal disabled)
    Idle,
    /// Renewal loop active
    Renewing { renewals: u32 },
    /// Loop finished
    Stopped { reason: StopReason, renewals: u32 },
}

impl WatchdogState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, WatchdogState::Stopped { .. })
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            WatchdogState::Stopped { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Successful extensions so far.
    pub fn renewals(&self) -> u32 {
        match self {
            WatchdogState::Idle => 0,
            WatchdogState::Renewing { renewals } | WatchdogState::Stopped { renewals, .. } => {
                *renewals
            }
        }
    }
}

/// Renewal period for a lease: three quarters of it, at least 1 ms.
pub fn renewal_period(lease: Duration) -> Duration {
    let period = match lease.checked_mul(3) {
        Some(triple) => triple / 4,
        None => lease / 4 * 3,
    };
    period.max(MIN_RENEWAL_PERIOD)
}

/// What a watchdog renews.
pub(crate) struct Lease {
    pub key: String,
    pub token: LockToken,
    pub duration: Duration,
    pub max_renewals: Option<u32>,
}

/// Running renewal task for one lock handle.
pub(crate) struct Watchdog {
    task: JoinHandle<StopReason>,
}

impl Watchdog {
    /// Spawn the renewal loop. `state` receives every transition.
    pub(crate) fn spawn(
        store: Arc<dyn LockStore>,
        lease: Lease,
        stop: CancelSignal,
        state: watch::Sender<WatchdogState>,
    ) -> Self {
        let task = tokio::spawn(run_renewal_loop(store, lease, stop, state));
        Self { task }
    }

    /// Wait for the loop to exit.
    pub(crate) async fn join(self) -> Option<StopReason> {
        match self.task.await {
            Ok(reason) => Some(reason),
            Err(e) => {
                error!(error = %e, "Watchdog task failed");
                None
            }
        }
    }
}

async fn run_renewal_loop(
    store: Arc<dyn LockStore>,
    lease: Lease,
    mut stop: CancelSignal,
    state: watch::Sender<WatchdogState>,
) -> StopReason {
    let period = renewal_period(lease.duration);
    let now = Instant::now();
    let mut ticker = interval_at(now.checked_add(period).unwrap_or(now), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut renewals: u32 = 0;
    state.send_replace(WatchdogState::Renewing { renewals });

    debug!(
        key = %lease.key,
        period_ms = period.as_millis() as u64,
        max_renewals = ?lease.max_renewals,
        "Watchdog started"
    );

    let reason = loop {
        tokio::select! {
            _ = stop.cancelled() => {
                break StopReason::Released;
            }
            _ = ticker.tick() => {
                match store
                    .compare_and_extend(&lease.key, lease.token.as_str(), lease.duration)
                    .await
                {
                    Ok(true) => {
                        renewals += 1;
                        metrics::counter!("leaselock_renewals_total").increment(1);
                        state.send_replace(WatchdogState::Renewing { renewals });
                        debug!(key = %lease.key, renewals, "Lease renewed");

                        if lease.max_renewals.is_some_and(|cap| renewals >= cap) {
                            break StopReason::RenewalCapReached;
                        }
                    }
                    Ok(false) => {
                        warn!(key = %lease.key, renewals, "Lease no longer owned, watchdog stopping");
                        break StopReason::OwnershipLost;
                    }
                    Err(e) => {
                        error!(key = %lease.key, error = %e, "Lease renewal failed, watchdog stopping");
                        break StopReason::StoreError;
                    }
                }
            }
        }
    };

    metrics::counter!("leaselock_watchdog_stopped_total", "reason" => reason.as_str()).increment(1);
    debug!(key = %lease.key, renewals, reason = %reason, "Watchdog stopped");
    state.send_replace(WatchdogState::Stopped { reason, renewals });
    reason
}
