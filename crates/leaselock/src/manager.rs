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

//! Lock manager: shared store plus configured defaults.

use crate::cancel::CancelSignal;
use crate::config::LockConfig;
use crate::lock::{AcquireOutcome, LockHandle, LockOptions};
use crate::retry::BoundedRetry;
use crate::{LockResult, LockStore};
use std::future::Future;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Outcome of [`LockManager::run_exclusive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusive<T> {
    /// Lock acquired and the closure ran.
    ///
    /// `released` is false when the record was no longer ours at release
    /// time (lease lost mid-section) or the release call failed.
    Completed { value: T, released: bool },
    /// Lock never acquired
    NotAcquired(AcquireOutcome),
}

/// Creates lock handles against one store with shared defaults.
///
/// ## Example
/// ```rust,no_run
/// use leaselock::{CancelSignal, Exclusive, LockConfig, LockManager, MemoryLockStore};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = LockManager::new(Arc::new(MemoryLockStore::new()), &LockConfig::default())?;
///
/// let mut cancel = CancelSignal::never();
/// match manager.run_exclusive("jobs:rebuild-index", &mut cancel, || async { 42 }).await? {
///     Exclusive::Completed { value, .. } => assert_eq!(value, 42),
///     Exclusive::NotAcquired(outcome) => eprintln!("busy: {:?}", outcome),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
    options: LockOptions,
    retry: BoundedRetry,
}

impl LockManager {
    /// Create a manager using the protocol settings from `config`.
    pub fn new(store: Arc<dyn LockStore>, config: &LockConfig) -> LockResult<Self> {
        Ok(Self {
            store,
            options: config.lock_options()?,
            retry: config.retry_policy()?,
        })
    }

    /// Create a manager from explicit defaults.
    pub fn with_defaults(
        store: Arc<dyn LockStore>,
        options: LockOptions,
        retry: BoundedRetry,
    ) -> LockResult<Self> {
        options.validate()?;
        Ok(Self { store, options, retry })
    }

    pub fn store(&self) -> &Arc<dyn LockStore> {
        &self.store
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    pub fn retry_policy(&self) -> &BoundedRetry {
        &self.retry
    }

    /// New handle for `key` with the default options.
    pub fn handle(&self, key: impl Into<String>) -> LockResult<LockHandle> {
        LockHandle::new(self.store.clone(), key, self.options.clone())
    }

    /// New handle for `key` with explicit options.
    pub fn handle_with(&self, key: impl Into<String>, options: LockOptions) -> LockResult<LockHandle> {
        LockHandle::new(self.store.clone(), key, options)
    }

    /// Acquire `key` (retrying per policy), run `f`, and release.
    ///
    /// The lock is released whether or not `f` reports success. Store
    /// errors during acquisition are returned; a failed release is logged and
    /// reported through `Exclusive::Completed { released: false, .. }`.
    #[instrument(skip(self, cancel, f))]
    pub async fn run_exclusive<F, Fut, T>(
        &self,
        key: &str,
        cancel: &mut CancelSignal,
        f: F,
    ) -> LockResult<Exclusive<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let handle = self.handle(key)?;
        let outcome = handle.acquire_with_retry(&self.retry, cancel).await?;
        if !outcome.is_acquired() {
            return Ok(Exclusive::NotAcquired(outcome));
        }

        let value = f().await;

        let released = match handle.release().await {
            Ok(true) => true,
            Ok(false) => {
                warn!(key = %key, "Lock was no longer held at release");
                false
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Lock release failed");
                false
            }
        };

        Ok(Exclusive::Completed { value, released })
    }
}

#[cfg(all(test, feature = "memory-backend"))]
mod tests {
    use super::*;
    use crate::memory::MemoryLockStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn manager(store: Arc<MemoryLockStore>) -> LockManager {
        LockManager::with_defaults(
            store,
            LockOptions::new(Duration::from_secs(10)),
            BoundedRetry::new(3, Duration::from_millis(10)).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exclusive_releases() {
        let store = Arc::new(MemoryLockStore::new());
        let manager = manager(store.clone());
        let mut cancel = CancelSignal::never();

        let result = manager
            .run_exclusive("job", &mut cancel, || async { "done" })
            .await
            .unwrap();

        assert_eq!(result, Exclusive::Completed { value: "done", released: true });
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exclusive_busy() {
        let store = Arc::new(MemoryLockStore::new());
        let manager = manager(store.clone());
        let holder = manager.handle("job").unwrap();
        assert!(holder.try_acquire().await.unwrap());

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let mut cancel = CancelSignal::never();
        let result = manager
            .run_exclusive("job", &mut cancel, move || async move {
                flag.store(true, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(
            result,
            Exclusive::NotAcquired(AcquireOutcome::Exhausted { attempts: 3 })
        );
        assert!(!ran.load(Ordering::SeqCst));
        assert!(holder.is_held().await.unwrap());
        holder.release().await.unwrap();
    }

    #[test]
    fn test_manager_from_config() {
        let store = Arc::new(MemoryLockStore::new());
        let config = LockConfig {
            lease_duration_secs: 4,
            max_renewals: Some(2),
            ..Default::default()
        };
        let manager = LockManager::new(store, &config).unwrap();

        assert_eq!(manager.options().lease_duration, Duration::from_secs(4));
        assert_eq!(manager.options().max_renewals, Some(2));
        assert_eq!(manager.retry_policy().max_attempts(), 1000);
    }

    #[test]
    fn test_handle_with_rejects_bad_options() {
        let manager = manager(Arc::new(MemoryLockStore::new()));
        let result = manager.handle_with("job", LockOptions::new(Duration::ZERO));
        assert!(result.is_err());
    }
}
