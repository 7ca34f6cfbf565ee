//! The I/O pool driving every session callback.
//!
//! Connect, write, inbound-frame and timer callbacks all run as tasks on a
//! Tokio multi-thread runtime. [`IoPool`] either borrows a runtime owned by
//! the application (through its [`Handle`]) or owns a dedicated one.

use std::{fmt, future::Future, io, sync::Arc};

use tokio::runtime::{Builder, Handle, Runtime};

use crate::{correlation::CorrelationSlot, error::BridgeError};

struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        // Dropping a runtime blocks; shutting down in the background keeps
        // drop safe from any thread.
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// Handle to the runtime executing transport callbacks.
#[derive(Clone)]
pub struct IoPool {
    handle: Handle,
    owned: Option<Arc<OwnedRuntime>>,
}

impl fmt::Debug for IoPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoPool")
            .field("owned", &self.owned.is_some())
            .finish_non_exhaustive()
    }
}

impl IoPool {
    /// Build a dedicated pool with `threads` worker threads.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if the runtime cannot be created.
    pub fn new(threads: usize) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name("wirebridge-io")
            .enable_all()
            .build()?;
        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Some(Arc::new(OwnedRuntime(Some(runtime)))),
        })
    }

    /// Drive callbacks on an existing runtime.
    #[must_use]
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            owned: None,
        }
    }

    /// Access the runtime handle.
    #[must_use]
    pub fn handle(&self) -> &Handle { &self.handle }

    /// Spawn a task on the pool.
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Run `future` on the pool and park the calling thread until it
    /// finishes.
    ///
    /// Must not be called from inside an async task.
    pub(crate) fn run_blocking<T, F>(&self, future: F) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, BridgeError>> + Send + 'static,
    {
        let (slot, waiter) = CorrelationSlot::pair();
        self.spawn(async move {
            let guard = FailOnDrop(slot);
            match future.await {
                Ok(value) => guard.0.resolve(value),
                Err(err) => guard.0.fail(err),
            }
        });
        waiter.wait()
    }
}

/// Fails the slot with [`BridgeError::Stopped`] if the task is torn down
/// before it settles, so a parked caller is never stranded.
struct FailOnDrop<T>(CorrelationSlot<T>);

impl<T> Drop for FailOnDrop<T> {
    fn drop(&mut self) { self.0.fail(BridgeError::Stopped); }
}

/// Default worker count for owned pools.
pub(crate) fn default_io_threads() -> usize {
    std::thread::available_parallelism().map_or(2, |n| n.get().min(4))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_blocking_returns_task_outcome() {
        let pool = IoPool::new(1).expect("build pool");
        let value = pool
            .run_blocking(async { Ok::<_, BridgeError>(tokio::task::yield_now().await) })
            .map(|()| 5);
        assert_eq!(value.expect("task result"), 5);

        let err = pool
            .run_blocking(async { Err::<(), _>(BridgeError::NoResponse) })
            .expect_err("task failure");
        assert!(matches!(err, BridgeError::NoResponse));
    }
}
