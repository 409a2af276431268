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

//! # LeaseLock
//!
//! ## Purpose
//! Lease-based mutual exclusion for processes that share a key-value store
//! with native expiry. A lock is a record whose value is the holder's unique
//! token; the record expires on its own if the holder disappears.
//!
//! ## Architecture
//! - **LockStore**: the three atomic primitives a backend must provide
//!   (create-if-absent with TTL, compare-and-delete, compare-and-extend)
//! - **LockHandle**: one acquisition cycle of a named lock, with a fresh token
//! - **Watchdog**: background task that extends the lease while it is held
//! - **BoundedRetry**: fixed-interval polling with an attempt cap and
//!   cooperative cancellation
//! - **LockManager**: shared store plus configured defaults
//!
//! ## Design Decisions
//! - **Token-gated mutation**: release and renewal only touch a record that
//!   still carries the caller's token
//! - **Expiry as the safety net**: a crashed holder's lock frees itself after
//!   one lease
//! - **Single store instance**: no quorum across independent stores
//!
//! ## Backend Support
//! - **InMemory**: HashMap-based (feature: `memory-backend`, default)
//! - **Redis**: native TTL and Lua scripts (feature: `redis-backend`)
//!
//! ## Examples
//!
//! ### Basic Usage
//! ```rust,no_run
//! use leaselock::{BoundedRetry, CancelSignal, LockHandle, LockOptions, MemoryLockStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryLockStore::new());
//! let lock = LockHandle::new(store, "scheduler:nightly", LockOptions::new(Duration::from_secs(10)))?;
//!
//! let policy = BoundedRetry::new(50, Duration::from_millis(100))?;
//! let mut cancel = CancelSignal::never();
//! if lock.acquire_with_retry(&policy, &mut cancel).await?.is_acquired() {
//!     tokio::select! {
//!         _ = async { /* protected work */ } => {}
//!         reason = lock.lease_lost() => eprintln!("lease lost: {}", reason),
//!     }
//!     lock.release().await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### From Environment
//! ```rust,no_run
//! use leaselock::{create_store_from_env, LockConfig, LockManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LockConfig::from_env()?;
//! let store = create_store_from_env().await?;
//! let manager = LockManager::new(store, &config)?;
//! let lock = manager.handle("scheduler:nightly")?;
//! # let _ = lock;
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod lock;
pub mod manager;
pub mod retry;
pub mod store;
pub mod token;
pub mod watchdog;

#[cfg(feature = "memory-backend")]
pub mod memory;

#[cfg(feature = "redis-backend")]
pub mod redis;

#[cfg(test)]
mod testing;

pub use cancel::{cancellation, CancelHandle, CancelSignal};
pub use config::{create_store_from_config, create_store_from_env, BackendType, LockConfig};
pub use error::{LockError, LockResult};
pub use lock::{AcquireOutcome, LockHandle, LockOptions};
pub use manager::{Exclusive, LockManager};
pub use retry::{BoundedRetry, RetryOutcome};
pub use store::LockStore;
pub use token::LockToken;
pub use watchdog::{StopReason, WatchdogState};

#[cfg(feature = "memory-backend")]
pub use memory::MemoryLockStore;

#[cfg(feature = "redis-backend")]
pub use self::redis::RedisLockStore;
