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

//! Close-once cancellation signal.
//!
//! Used both as the external cancel for bounded retries and as the stop
//! signal between a lock handle and its watchdog. Built on a
//! `watch::channel(false)`: firing flips the value to `true` exactly once,
//! later calls observe it is already set and do nothing.

use tokio::sync::watch;

/// Create a connected cancel handle / signal pair.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Sending side of a cancellation.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Fire the signal. Returns `true` only for the call that fired it.
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    /// Whether the signal has fired.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Another receiver for this cancellation.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving side of a cancellation. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether the signal has fired.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal fires.
    ///
    /// If every [`CancelHandle`] is dropped without firing, this never
    /// resolves.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_fires_once() {
        let (handle, signal) = cancellation();
        assert!(!signal.is_cancelled());

        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(!handle.cancel());

        assert!(signal.is_cancelled());
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_fire() {
        let (handle, mut signal) = cancellation();
        let waiter = tokio::spawn(async move {
            signal.cancelled().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should observe cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_after_handle_dropped() {
        let (handle, mut signal) = cancellation();
        handle.cancel();
        drop(handle);

        // Value was set before the sender went away
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .expect("fired signal should resolve immediately");
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_does_not_fire() {
        let mut signal = CancelSignal::never();
        assert!(!signal.is_cancelled());

        let result = tokio::time::timeout(Duration::from_secs(60), signal.cancelled()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_subscribed_signal_sees_cancel() {
        let (handle, _signal) = cancellation();
        let other = handle.signal();
        handle.cancel();
        assert!(other.is_cancelled());
    }
}
