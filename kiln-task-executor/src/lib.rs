#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::new_without_default)]

//! A cloneable handle to a tokio runtime.
//!
//! Executors come in two flavors:
//! * "borrowed" — created with [`Executor::new`], wrapping a `Handle` to a runtime owned by
//!   someone else (typically a `#[tokio::main]` function, or a test macro). Dropping all clones
//!   never shuts the runtime down.
//! * "owned" — created with [`Executor::new_owned`]. When all clones are dropped, or
//!   [`Executor::shutdown`] is called, the underlying `Runtime` is shut down.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinError;

#[derive(Debug, Clone)]
pub struct Executor {
    runtime: Arc<Mutex<Option<Runtime>>>,
    handle: Handle,
}

impl Executor {
    /// Wraps the `Handle` of the ambient tokio `Runtime`. Panics outside of a runtime context.
    pub fn new() -> Executor {
        Self {
            runtime: Arc::new(Mutex::new(None)),
            handle: Handle::current(),
        }
    }

    /// Creates a new multi-threaded `Runtime` owned by this `Executor`.
    pub fn new_owned(num_worker_threads: usize) -> Result<Executor, String> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(num_worker_threads)
            .enable_all()
            .build()
            .map_err(|e| format!("failed to start the runtime: {e}"))?;
        let handle = runtime.handle().clone();
        Ok(Executor {
            runtime: Arc::new(Mutex::new(Some(runtime))),
            handle,
        })
    }

    /// Creates a clone of this `Executor` which is disconnected from shutdown events.
    pub fn to_borrowed(&self) -> Executor {
        Self {
            runtime: Arc::new(Mutex::new(None)),
            handle: self.handle.clone(),
        }
    }

    /// Runs a Future as a new task, returning a Future resolved to its output (or to the output
    /// of `rescue_join_error` if the task panicked).
    pub fn spawn<O: Send + 'static, F: Future<Output = O> + Send + 'static>(
        &self,
        future: F,
        rescue_join_error: impl FnOnce(JoinError) -> O,
    ) -> impl Future<Output = O> {
        self.handle.spawn(future).map(|res| match res {
            Ok(o) => o,
            Err(e) => rescue_join_error(e),
        })
    }

    /// Spawns a blocking closure on a thread reserved for I/O, for work (stat, hash, process
    /// wait) that would otherwise starve the async runtime.
    pub fn spawn_blocking<F: FnOnce() -> R + Send + 'static, R: Send + 'static>(
        &self,
        f: F,
        rescue_join_error: impl FnOnce(JoinError) -> R,
    ) -> impl Future<Output = R> {
        self.handle.spawn_blocking(f).map(|res| match res {
            Ok(o) => o,
            Err(e) => rescue_join_error(e),
        })
    }

    /// Blocks the calling thread on a Future. Must not be called from within a Future context.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Shuts down the owned `Runtime`, if any. Tasks that have not completed within `timeout`
    /// are leaked. No-op for borrowed Executors.
    pub fn shutdown(&self, timeout: Duration) {
        let Some(runtime) = self.runtime.lock().take() else {
            return;
        };
        let start = Instant::now();
        runtime.shutdown_timeout(timeout + Duration::from_millis(250));
        if start.elapsed() > timeout {
            log::warn!("executor shutdown took unexpectedly long: tasks were likely leaked");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.runtime.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_executor_runs_spawned_work() {
        let executor = Executor::new_owned(2).unwrap();
        let result = executor.block_on(executor.spawn(async { 1 + 1 }, |_| 0));
        assert_eq!(result, 2);
    }

    #[test]
    fn join_error_is_rescued_on_panic() {
        let executor = Executor::new_owned(1).unwrap();
        let result = executor.block_on(
            executor.spawn(async { panic!("boom") }, |_join_error: JoinError| -1),
        );
        assert_eq!(result, -1);
    }

    #[test]
    fn borrowed_clone_does_not_own_shutdown() {
        let executor = Executor::new_owned(1).unwrap();
        let borrowed = executor.to_borrowed();
        assert!(!borrowed.is_shutdown());
        borrowed.shutdown(Duration::from_millis(10));
        assert!(!executor.is_shutdown());
    }

    #[tokio::test]
    async fn spawn_blocking_runs_on_separate_thread() {
        let executor = Executor::new();
        let id = std::thread::current().id();
        let spawned_id = executor
            .spawn_blocking(|| std::thread::current().id(), |_| id)
            .await;
        assert_ne!(id, spawned_id);
    }
}
