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

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::{runtime::Handle, task::JoinHandle};

use crate::error::{Error, ErrorKind, Result};

/// A wrapper for [`JoinHandle`] that maps join failures into [`Error`].
#[derive(Debug)]
pub struct SpawnHandle<T> {
    inner: JoinHandle<T>,
}

impl<T> SpawnHandle<T> {
    /// Abort the task.
    pub fn abort(&self) {
        self.inner.abort();
    }

    /// Whether the task has finished.
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl<T> Future for SpawnHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Ready(Ok(v)) => Poll::Ready(Ok(v)),
            Poll::Ready(Err(e)) if e.is_cancelled() => {
                Poll::Ready(Err(Error::new(ErrorKind::TaskCancelled, "task aborted").with_source(e)))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(Error::new(ErrorKind::Join, "tokio join error").with_source(e))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A wrapper around a tokio runtime handle to spawn the background jobs of a cache.
#[derive(Debug, Clone)]
pub struct Spawner {
    handle: Handle,
}

impl From<Handle> for Spawner {
    fn from(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Spawner {
    /// Wrapper for [`Handle::spawn`].
    pub fn spawn<F>(&self, future: F) -> SpawnHandle<<F as Future>::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        SpawnHandle {
            inner: self.handle.spawn(future),
        }
    }

    /// Get the spawner of the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn current() -> Self {
        Spawner {
            handle: Handle::current(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_spawn_and_join() {
        let spawner = Spawner::current();
        let v = spawner.spawn(async { 42 }).await.unwrap();
        assert_eq!(v, 42);
    }

    #[test_log::test(tokio::test)]
    async fn test_abort_maps_to_cancelled() {
        let spawner = Spawner::current();
        let handle = spawner.spawn(tokio::time::sleep(Duration::from_secs(3600)));
        handle.abort();
        let err = handle.await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TaskCancelled);
    }

    #[test_log::test(tokio::test)]
    async fn test_panic_maps_to_join_error() {
        let spawner = Spawner::current();
        let err = spawner
            .spawn(async {
                panic!("boom");
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Join);
    }
}
