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

//! Configuration support for lock store backends and protocol defaults.
//!
//! ## Purpose
//! Provides environment-based configuration for selecting the lock store
//! backend and the lease / retry defaults handed to new lock handles.
//!
//! ## Environment Variables
//!
//! ### Backend Selection
//! - `LEASELOCK_BACKEND`: Backend type (default: "in-memory")
//!   - "in-memory" | "memory" → MemoryLockStore
//!   - "redis" → RedisLockStore
//!
//! ### Redis Configuration
//! - `LEASELOCK_REDIS_URL`: Redis server URL (default: "redis://localhost:6379")
//! - `LEASELOCK_REDIS_NAMESPACE`: Key prefix for isolation (default: "leaselock:")
//!
//! ### Protocol Defaults
//! - `LEASELOCK_LEASE_SECS`: Lease duration in seconds (default: 10)
//! - `LEASELOCK_MAX_RENEWALS`: Watchdog renewal cap (default: unbounded)
//!   - unset or "-1" → renew until release
//!   - "0" → no watchdog, single-TTL locks
//! - `LEASELOCK_POLL_INTERVAL_MS`: Retry poll interval (default: 100)
//! - `LEASELOCK_MAX_ATTEMPTS`: Retry attempt cap (default: 1000)
//!
//! ## Examples
//!
//! ### Redis
//! ```bash
//! export LEASELOCK_BACKEND=redis
//! export LEASELOCK_REDIS_URL=redis://localhost:6379
//! export LEASELOCK_LEASE_SECS=30
//! export LEASELOCK_MAX_RENEWALS=10
//! ```

use crate::lock::LockOptions;
use crate::retry::{BoundedRetry, DEFAULT_MAX_ATTEMPTS};
use crate::{LockError, LockResult, LockStore};
use serde::Deserialize;
use std::env::VarError;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
const DEFAULT_REDIS_NAMESPACE: &str = "leaselock:";

fn default_redis_namespace() -> String {
    DEFAULT_REDIS_NAMESPACE.to_string()
}

/// Backend type configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BackendType {
    /// In-memory HashMap backend (default)
    #[default]
    InMemory,
    /// Redis backend (requires redis-backend feature)
    Redis {
        /// Redis server URL
        url: String,
        /// Redis key namespace prefix
        #[serde(default = "default_redis_namespace")]
        namespace: String,
    },
}

/// Lock configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Backend type
    pub backend: BackendType,
    /// Lease duration (seconds)
    pub lease_duration_secs: u64,
    /// Watchdog renewal cap; `None` is unbounded, `Some(0)` disables the watchdog
    pub max_renewals: Option<u32>,
    /// Retry poll interval (milliseconds)
    pub poll_interval_ms: u64,
    /// Retry attempt cap
    pub max_attempts: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::InMemory,
            lease_duration_secs: 10,
            max_renewals: None,
            poll_interval_ms: 100,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Read an environment variable. Unset is `None`; a non-UTF-8 value is a
/// `ConfigError`.
fn env_var(name: &str) -> LockResult<Option<String>> {
    match std::env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(raw)) => Err(LockError::ConfigError(format!(
            "Invalid value for {}: not valid UTF-8 ({:?})",
            name, raw
        ))),
    }
}

fn env_parse<T: FromStr>(name: &str) -> LockResult<Option<T>> {
    match env_var(name)? {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| LockError::ConfigError(format!("Invalid value for {}: {:?}", name, raw))),
        None => Ok(None),
    }
}

impl LockConfig {
    /// Create configuration with explicit backend and default protocol settings.
    pub fn new(backend: BackendType) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// ## Environment Variables
    /// See module documentation for complete list.
    pub fn from_env() -> LockResult<Self> {
        let backend_str = env_var("LEASELOCK_BACKEND")?
            .unwrap_or_else(|| "in-memory".to_string())
            .to_lowercase();

        let backend = match backend_str.as_str() {
            "in-memory" | "memory" => BackendType::InMemory,

            "redis" => {
                let url = env_var("LEASELOCK_REDIS_URL")?
                    .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());
                let namespace = env_var("LEASELOCK_REDIS_NAMESPACE")?
                    .unwrap_or_else(default_redis_namespace);
                BackendType::Redis { url, namespace }
            }

            other => {
                return Err(LockError::ConfigError(format!(
                    "Unknown backend type: {}. Valid options: in-memory, redis",
                    other
                )));
            }
        };

        let defaults = Self::default();

        let max_renewals = match env_parse::<i64>("LEASELOCK_MAX_RENEWALS")? {
            None | Some(-1) => None,
            Some(n) => Some(u32::try_from(n).map_err(|_| {
                LockError::ConfigError(format!("Invalid value for LEASELOCK_MAX_RENEWALS: {}", n))
            })?),
        };

        let config = Self {
            backend,
            lease_duration_secs: env_parse("LEASELOCK_LEASE_SECS")?
                .unwrap_or(defaults.lease_duration_secs),
            max_renewals,
            poll_interval_ms: env_parse("LEASELOCK_POLL_INTERVAL_MS")?
                .unwrap_or(defaults.poll_interval_ms),
            max_attempts: env_parse("LEASELOCK_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check protocol settings.
    pub fn validate(&self) -> LockResult<()> {
        self.lock_options()?;
        self.retry_policy()?;
        Ok(())
    }

    /// Options for new lock handles.
    pub fn lock_options(&self) -> LockResult<LockOptions> {
        let options = LockOptions {
            lease_duration: Duration::from_secs(self.lease_duration_secs),
            max_renewals: self.max_renewals,
        };
        options.validate()?;
        Ok(options)
    }

    /// Retry policy for acquisition loops.
    pub fn retry_policy(&self) -> LockResult<BoundedRetry> {
        BoundedRetry::new(self.max_attempts, Duration::from_millis(self.poll_interval_ms))
    }
}

/// Create a lock store from configuration.
pub async fn create_store_from_config(config: &LockConfig) -> LockResult<Arc<dyn LockStore>> {
    match &config.backend {
        #[cfg(feature = "memory-backend")]
        BackendType::InMemory => Ok(Arc::new(crate::memory::MemoryLockStore::new())),

        #[cfg(not(feature = "memory-backend"))]
        BackendType::InMemory => Err(LockError::ConfigError(
            "In-memory backend requires the memory-backend feature".to_string(),
        )),

        #[cfg(feature = "redis-backend")]
        BackendType::Redis { url, namespace } => {
            let store = crate::redis::RedisLockStore::new(url, namespace).await?;
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "redis-backend"))]
        BackendType::Redis { .. } => Err(LockError::ConfigError(
            "Redis backend requires the redis-backend feature".to_string(),
        )),
    }
}

/// Create a lock store from environment variables.
pub async fn create_store_from_env() -> LockResult<Arc<dyn LockStore>> {
    let config = LockConfig::from_env()?;
    create_store_from_config(&config).await
}
