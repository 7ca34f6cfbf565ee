//! Shared completion signals.
//!
//! A [`Completion`] is set once and observed by any number of parties, both
//! blocking threads and async tasks. Sessions hand one out from every
//! `close()` call so that concurrent closers wait on the same teardown.

use std::{
    fmt,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    done: Mutex<bool>,
    ready: Condvar,
    notify: Notify,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, bool> { self.done.lock().unwrap_or_else(PoisonError::into_inner) }
}

/// A one-way, idempotent completion flag.
///
/// # Examples
///
/// ```
/// use wirebridge::completion::Completion;
///
/// let completion = Completion::new();
/// let observer = completion.clone();
/// assert!(completion.complete());
/// assert!(!completion.complete());
/// observer.wait();
/// assert!(observer.is_complete());
/// ```
#[derive(Clone, Default)]
pub struct Completion {
    inner: Arc<Inner>,
}

/// Completion handed out by [`Session::close`](crate::Session::close).
pub type CloseCompletion = Completion;

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl Completion {
    /// Create a pending completion.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create a completion that is already set.
    #[must_use]
    pub fn completed() -> Self {
        let completion = Self::new();
        completion.complete();
        completion
    }

    /// Mark the completion as done. Returns `true` on the first call only.
    pub fn complete(&self) -> bool {
        let mut done = self.inner.lock();
        if *done {
            return false;
        }
        *done = true;
        drop(done);
        self.inner.ready.notify_all();
        self.inner.notify.notify_waiters();
        true
    }

    /// Whether the completion has been set.
    #[must_use]
    pub fn is_complete(&self) -> bool { *self.inner.lock() }

    /// Whether both handles observe the same completion.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool { Arc::ptr_eq(&self.inner, &other.inner) }

    /// Block the calling thread until the completion is set.
    pub fn wait(&self) {
        let mut done = self.inner.lock();
        while !*done {
            done = self
                .inner
                .ready
                .wait(done)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block for at most `limit`; returns whether the completion is set.
    #[must_use]
    pub fn wait_timeout(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        let mut done = self.inner.lock();
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            done = self
                .inner
                .ready
                .wait_timeout(done, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Wait asynchronously until the completion is set.
    pub async fn completed_async(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_complete() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn blocking_waiters_share_one_completion() {
        let completion = Completion::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let c = completion.clone();
                thread::spawn(move || c.wait())
            })
            .collect();
        thread::sleep(Duration::from_millis(10));
        assert!(completion.complete());
        for waiter in waiters {
            waiter.join().expect("join waiter");
        }
    }

    #[test]
    fn wait_timeout_reports_pending() {
        let completion = Completion::new();
        assert!(!completion.wait_timeout(Duration::from_millis(5)));
        assert!(Completion::completed().wait_timeout(Duration::ZERO));
    }

    #[tokio::test]
    async fn async_waiter_wakes_on_completion() {
        let completion = Completion::new();
        let observer = completion.clone();
        let task = tokio::spawn(async move { observer.completed_async().await });
        tokio::task::yield_now().await;
        completion.complete();
        task.await.expect("join observer");
    }
}
