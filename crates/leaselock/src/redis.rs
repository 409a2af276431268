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

//! Redis-based lock store implementation.
//!
//! ## Purpose
//! TTL-based lock records on a single Redis instance.
//!
//! ## Primitives
//! - **Create**: `SET key token NX EX ttl`
//! - **Compare-and-delete**: Lua script, `GET` + `DEL` in one server-side unit
//! - **Compare-and-extend**: Lua script, `GET` + `EXPIRE` in one server-side unit
//!
//! Scripts go through [`redis::Script`], which sends `EVALSHA` and falls back
//! to `EVAL` when the server has not cached the script yet.
//!
//! ## TTL Resolution
//! Redis receives whole seconds. Sub-second leases are rounded up, and every
//! lease is at least one second on the server.

use crate::{LockError, LockResult, LockStore};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisResult, Script};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

const COMPARE_AND_DELETE_LUA: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

const COMPARE_AND_EXTEND_LUA: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("EXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Redis lock store.
///
/// ## Architecture
/// - Uses `redis` crate with async `ConnectionManager` (automatic reconnection)
/// - Optional namespace prefix so several applications can share one instance
/// - Expiry is native Redis TTL; no client-side cleanup
#[derive(Clone)]
pub struct RedisLockStore {
    conn: ConnectionManager,
    namespace: String,
    compare_and_delete: Script,
    compare_and_extend: Script,
}

impl RedisLockStore {
    /// Create a new Redis lock store.
    ///
    /// Example URLs:
    /// - `redis://127.0.0.1/`
    /// - `rediss://host:6379/`
    ///
    /// An empty `namespace` stores keys verbatim.
    pub async fn new(redis_url: &str, namespace: &str) -> LockResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| LockError::Backend(format!("failed to create redis client: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| LockError::Backend(format!("failed to connect redis: {e}")))?;

        debug!(redis_url = %redis_url, namespace = %namespace, "Redis lock store connected");

        Ok(Self::with_connection(conn, namespace))
    }

    /// Wrap an existing connection manager.
    pub fn with_connection(conn: ConnectionManager, namespace: &str) -> Self {
        let namespace = if namespace.is_empty() || namespace.ends_with(':') {
            namespace.to_string()
        } else {
            format!("{}:", namespace)
        };

        Self {
            conn,
            namespace,
            compare_and_delete: Script::new(COMPARE_AND_DELETE_LUA),
            compare_and_extend: Script::new(COMPARE_AND_EXTEND_LUA),
        }
    }

    fn prefixed_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

}

/// Await a Redis call, record its latency whether or not it failed, and map
/// the error into `LockError::Backend`.
async fn timed<T, F>(op: &'static str, call: F) -> LockResult<T>
where
    F: Future<Output = RedisResult<T>>,
{
    let start = Instant::now();
    let result = call.await;
    metrics::histogram!(
        "leaselock_store_op_duration_seconds",
        "op" => op,
        "backend" => "redis"
    )
    .record(start.elapsed().as_secs_f64());
    Ok(result?)
}

/// Whole seconds for `EX` / `EXPIRE`, rounded up, never below one.
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl LockStore for RedisLockStore {
    #[instrument(skip(self, value), fields(backend = "redis"))]
    async fn create_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        let mut conn = self.conn.clone();

        // SET NX replies OK on create and nil when the key exists
        let reply: Option<String> = timed(
            "create_if_absent",
            redis::cmd("SET")
                .arg(self.prefixed_key(key))
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(ttl_secs(ttl))
                .query_async(&mut conn),
        )
        .await?;

        Ok(reply.is_some())
    }

    #[instrument(skip(self, token), fields(backend = "redis"))]
    async fn compare_and_delete(&self, key: &str, token: &str) -> LockResult<u64> {
        let mut conn = self.conn.clone();

        let deleted: u64 = timed(
            "compare_and_delete",
            self.compare_and_delete
                .key(self.prefixed_key(key))
                .arg(token)
                .invoke_async(&mut conn),
        )
        .await?;

        Ok(deleted)
    }

    #[instrument(skip(self, token), fields(backend = "redis"))]
    async fn compare_and_extend(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool> {
        let mut conn = self.conn.clone();

        let extended: i64 = timed(
            "compare_and_extend",
            self.compare_and_extend
                .key(self.prefixed_key(key))
                .arg(token)
                .arg(ttl_secs(ttl))
                .invoke_async(&mut conn),
        )
        .await?;

        Ok(extended == 1)
    }

    #[instrument(skip(self), fields(backend = "redis"))]
    async fn get(&self, key: &str) -> LockResult<Option<String>> {
        let mut conn = self.conn.clone();

        let value: Option<String> = timed(
            "get",
            redis::cmd("GET").arg(self.prefixed_key(key)).query_async(&mut conn),
        )
        .await?;

        Ok(value)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
