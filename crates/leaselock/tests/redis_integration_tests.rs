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

//! Redis lock store integration tests.
//!
//! ## Purpose
//! Verifies the SET NX / Lua compare-and-delete / Lua compare-and-extend
//! primitives against a live Redis server.
//!
//! ## Running
//! ```bash
//! docker run -d -p 6379:6379 redis:7
//! LEASELOCK_REDIS_URL=redis://localhost:6379 \
//!   cargo test -p leaselock --features redis-backend -- --ignored
//! ```

#[cfg(feature = "redis-backend")]
mod tests {
    use leaselock::{LockHandle, LockOptions, LockStore, RedisLockStore, StopReason};
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};
    use ulid::Ulid;

    fn redis_url() -> String {
        std::env::var("LEASELOCK_REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    /// Unique key per test run
    fn unique_key(prefix: &str) -> String {
        format!("{}-{}", prefix, Ulid::new())
    }

    async fn create_store() -> Arc<RedisLockStore> {
        Arc::new(
            RedisLockStore::new(&redis_url(), "leaselock-test")
                .await
                .expect("Redis must be running for integration tests"),
        )
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_primitives() {
        let store = create_store().await;
        let key = unique_key("primitives");

        assert!(store.create_if_absent(&key, "token-a", Duration::from_secs(5)).await.unwrap());
        assert!(!store.create_if_absent(&key, "token-b", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), Some("token-a".to_string()));

        assert!(!store.compare_and_extend(&key, "token-b", Duration::from_secs(5)).await.unwrap());
        assert!(store.compare_and_extend(&key, "token-a", Duration::from_secs(5)).await.unwrap());

        assert_eq!(store.compare_and_delete(&key, "token-b").await.unwrap(), 0);
        assert_eq!(store.compare_and_delete(&key, "token-a").await.unwrap(), 1);
        assert_eq!(store.compare_and_delete(&key, "token-a").await.unwrap(), 0);
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_lease_expires() {
        let store = create_store().await;
        let key = unique_key("expiry");

        let lock = LockHandle::new(
            store.clone(),
            key.as_str(),
            LockOptions::new(Duration::from_secs(1)).without_watchdog(),
        )
        .unwrap();
        assert!(lock.try_acquire().await.unwrap());

        sleep(Duration::from_millis(2100)).await;
        assert!(store.get(&key).await.unwrap().is_none());
        assert!(!lock.release().await.unwrap());
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_watchdog_renews() {
        let store = create_store().await;
        let key = unique_key("renewal");

        let lock = LockHandle::new(store.clone(), key.as_str(), LockOptions::new(Duration::from_secs(2))).unwrap();
        assert!(lock.try_acquire().await.unwrap());

        sleep(Duration::from_secs(5)).await;
        assert!(lock.is_held().await.unwrap());
        assert!(lock.watchdog_state().renewals() >= 2);

        assert!(lock.release().await.unwrap());
        assert_eq!(lock.watchdog_state().stop_reason(), Some(StopReason::Released));
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_mutual_exclusion() {
        let store = create_store().await;
        let key = unique_key("exclusion");

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                let lock = LockHandle::new(store, key, LockOptions::new(Duration::from_secs(5))).unwrap();
                let acquired = lock.try_acquire().await.unwrap();
                (acquired, lock)
            }));
        }

        let mut holders = Vec::new();
        for task in tasks {
            let (acquired, lock) = task.await.unwrap();
            if acquired {
                holders.push(lock);
            }
        }

        assert_eq!(holders.len(), 1);
        assert!(holders[0].release().await.unwrap());
    }
}
