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

//! In-memory lock store implementation (for testing).

use crate::{LockError, LockResult, LockStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Record {
    value: String,
    expires_at: Instant,
}

impl Record {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory lock store (for testing).
///
/// ## Purpose
/// Provides a simple in-memory implementation of `LockStore` for testing
/// and single-process scenarios.
///
/// ## Limitations
/// - Not persistent (records lost on restart)
/// - Not distributed (single process only)
/// - Expired records are dropped lazily, on the next access to the key
///
/// Expiry is measured with `tokio::time::Instant`, so tests running on a
/// paused clock see leases expire deterministically.
#[derive(Clone, Default)]
pub struct MemoryLockStore {
    records: Arc<Mutex<HashMap<String, Record>>>,
}

impl MemoryLockStore {
    /// Create a new in-memory lock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let records = self.records.lock().await;
        records.values().filter(|r| r.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining time before `key` expires, if it exists.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let records = self.records.lock().await;
        records
            .get(key)
            .filter(|r| r.is_live(now))
            .map(|r| r.expires_at - now)
    }
}

fn expiry(now: Instant, ttl: Duration) -> LockResult<Instant> {
    now.checked_add(ttl)
        .ok_or_else(|| LockError::InvalidLease(format!("ttl {:?} overflows the clock", ttl)))
}

fn record_op(op: &'static str, start: std::time::Instant) {
    metrics::histogram!(
        "leaselock_store_op_duration_seconds",
        "op" => op,
        "backend" => "memory"
    )
    .record(start.elapsed().as_secs_f64());
}

impl MemoryLockStore {
    async fn create_record(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        let now = Instant::now();
        let expires_at = expiry(now, ttl)?;
        let mut records = self.records.lock().await;

        if let Some(existing) = records.get(key) {
            if existing.is_live(now) {
                return Ok(false);
            }
        }

        records.insert(
            key.to_string(),
            Record {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn delete_record(&self, key: &str, token: &str) -> LockResult<u64> {
        let now = Instant::now();
        let mut records = self.records.lock().await;

        match records.get(key) {
            Some(existing) if !existing.is_live(now) => {
                records.remove(key);
                Ok(0)
            }
            Some(existing) if existing.value == token => {
                records.remove(key);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn extend_record(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool> {
        let now = Instant::now();
        let expires_at = expiry(now, ttl)?;
        let mut records = self.records.lock().await;

        match records.get_mut(key) {
            Some(existing) if !existing.is_live(now) => {
                records.remove(key);
                Ok(false)
            }
            Some(existing) if existing.value == token => {
                existing.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn create_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        let start = std::time::Instant::now();
        let result = self.create_record(key, value, ttl).await;
        record_op("create_if_absent", start);
        result
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> LockResult<u64> {
        let start = std::time::Instant::now();
        let result = self.delete_record(key, token).await;
        record_op("compare_and_delete", start);
        result
    }

    async fn compare_and_extend(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool> {
        let start = std::time::Instant::now();
        let result = self.extend_record(key, token, ttl).await;
        record_op("compare_and_extend", start);
        result
    }

    async fn get(&self, key: &str) -> LockResult<Option<String>> {
        let start = std::time::Instant::now();
        let now = Instant::now();
        let value = {
            let records = self.records.lock().await;
            records
                .get(key)
                .filter(|r| r.is_live(now))
                .map(|r| r.value.clone())
        };
        record_op("get", start);
        Ok(value)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
