// Copyright 2026 warmcache Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Startup hydration phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StartupPhase {
    /// Awaited before the cache is handed to the host.
    Blocking,
    /// Runs concurrently with request traffic.
    Background,
}

impl Display for StartupPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupPhase::Blocking => write!(f, "blocking"),
            StartupPhase::Background => write!(f, "background"),
        }
    }
}

/// Why the cache asks its host to stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// A startup hydration phase exhausted its attempts.
    StartupFailed {
        /// The failed phase.
        phase: StartupPhase,
        /// Consecutive failed attempts.
        failures: usize,
    },
    /// The refresh job failed too many times in a row.
    RefreshFailed {
        /// Consecutive failed runs.
        failures: usize,
    },
}

impl Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::StartupFailed { phase, failures } => {
                write!(f, "{phase} startup hydration failed {failures} time(s)")
            }
            StopReason::RefreshFailed { failures } => write!(f, "refresh failed {failures} time(s) in a row"),
        }
    }
}

/// Lifecycle signals shared by the cache and its background jobs.
///
/// Two independent signals are carried:
///
/// - cancellation, raised by the host (or by dropping the cache), stops background loops and aborts in-flight loads;
/// - stop request, raised by the cache, asks the host to shut the process down. Only the first reason is kept.
#[derive(Debug)]
pub struct Lifecycle {
    cancel: watch::Sender<bool>,
    stop: watch::Sender<Option<StopReason>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Create a lifecycle with no cancellation and no stop request.
    pub fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        let (stop, _) = watch::channel(None);
        Self { cancel, stop }
    }

    /// Get a cancellation signal to pass into loaders.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.cancel.subscribe(),
        }
    }

    /// Cancel all background jobs and in-flight loads.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Whether [`Lifecycle::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Ask the host to stop.
    ///
    /// Returns `true` if this is the first stop request.
    pub fn request_stop(&self, reason: StopReason) -> bool {
        let requested = self.stop.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason.clone());
            true
        });
        if requested {
            tracing::error!("[lifecycle]: host stop requested: {reason}");
        }
        requested
    }

    /// The stop request, if any.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop.borrow().clone()
    }

    /// Wait until a stop is requested.
    pub async fn stop_requested(&self) -> StopReason {
        let mut rx = self.stop.subscribe();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            // The sender is owned by `self`, so the channel cannot close while we wait on it.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Cancellation signal handed to every loader call.
///
/// The signal also fires when its [`Lifecycle`] is dropped.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Whether the cache is shutting down.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Wait until the cache is shutting down.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // Either cancelled or the lifecycle is gone, both mean shutdown.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
