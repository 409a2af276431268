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

//! Atomic store trait backing distributed locks.

use crate::LockResult;
use async_trait::async_trait;
use std::time::Duration;

/// Atomic primitives a lock store must provide.
///
/// ## Purpose
/// The store-resident record `key -> token` (with an expiry) *is* the lock.
/// These operations are the only source of mutual exclusion, so each one
/// must be atomic with respect to concurrent callers on the same key.
///
/// ## Design
/// - **Create**: conditional create with expiry (`SET NX EX` in Redis)
/// - **Compare-and-delete**: delete only if the value equals the token
/// - **Compare-and-extend**: reset expiry only if the value equals the token
/// - A client-side read-then-write is not an acceptable implementation of the
///   compare operations; use server-side scripting or a transaction
///
/// ## Errors
/// Implementations return `LockError::Backend` for communication failures.
/// "Key already exists" and "token mismatch" are normal results, never errors.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Set `key = value` with expiry `ttl` only if `key` does not exist.
    ///
    /// ## Returns
    /// - `Ok(true)`: record created, caller owns the lock
    /// - `Ok(false)`: key already exists
    /// - `Err(LockError::Backend)`: store unreachable or protocol failure
    async fn create_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool>;

    /// Delete `key` if its value equals `token`.
    ///
    /// ## Returns
    /// Number of records deleted: `1` if the token matched, `0` otherwise
    /// (absent key or foreign token).
    async fn compare_and_delete(&self, key: &str, token: &str) -> LockResult<u64>;

    /// Reset the expiry of `key` to `ttl` if its value equals `token`.
    ///
    /// ## Returns
    /// - `Ok(true)`: expiry extended
    /// - `Ok(false)`: key absent or held under another token
    async fn compare_and_extend(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool>;

    /// Current value of `key`, if the record exists (non-mutating).
    async fn get(&self, key: &str) -> LockResult<Option<String>>;

    /// Short backend name for logs and metrics.
    fn backend_name(&self) -> &'static str;
}
