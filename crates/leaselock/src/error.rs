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

//! Error types for distributed lock operations.
//!
//! Contention ("someone else holds the key"), ownership mismatch on release
//! or renewal, and retry exhaustion are *not* errors: they come back as
//! ordinary `false` / outcome values. This enum is reserved for failures the
//! caller has to treat differently from "the lock is busy".

use thiserror::Error;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors that can occur during lock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// Store communication failure (network, timeout, protocol)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Invalid lock key
    #[error("Invalid lock key: {0}")]
    InvalidKey(String),

    /// Invalid lease duration
    #[error("Invalid lease duration: {0}")]
    InvalidLease(String),

    /// Handle already holds its lock
    #[error("Lock already acquired by this handle: {0}")]
    AlreadyAcquired(String),

    /// Handle was released and cannot be reused
    #[error("Lock handle already released: {0}")]
    HandleReleased(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl LockError {
    /// True for store communication failures.
    pub fn is_backend(&self) -> bool {
        matches!(self, LockError::Backend(_))
    }
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for LockError {
    fn from(err: redis::RedisError) -> Self {
        LockError::Backend(format!("Redis error: {}", err))
    }
}
