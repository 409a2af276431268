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

//! Ownership tokens.
//!
//! Every lock handle carries a token that is written as the lock record's
//! value and presented on every mutation (delete, extend). Tokens are ULIDs:
//! 80 random bits drawn from the thread-local generator plus a millisecond
//! timestamp, so concurrent handles never share generator state.

use std::fmt;
use ulid::Ulid;

/// Opaque per-handle ownership token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// Generate a fresh, unpredictable token.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Token value as stored in the lock record.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LockToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tokens_are_unique() {
        let tokens: HashSet<LockToken> = (0..10_000).map(|_| LockToken::generate()).collect();
        assert_eq!(tokens.len(), 10_000);
    }

    #[test]
    fn test_tokens_unique_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..1_000).map(|_| LockToken::generate()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for token in handle.join().unwrap() {
                assert!(all.insert(token), "duplicate token generated");
            }
        }
        assert_eq!(all.len(), 8_000);
    }

    #[test]
    fn test_token_is_opaque_string() {
        let token = LockToken::generate();
        assert_eq!(token.as_str().len(), 26);
        assert_eq!(token.to_string(), token.as_str());
    }
}
