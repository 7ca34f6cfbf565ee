//! One-shot correlation slots.
//!
//! A [`CorrelationSlot`] links one sent request to its eventual outcome. Any
//! number of parties may race to resolve it (the response dispatcher, the
//! deadline timer, the transport reporting a failure, a cancelling caller)
//! but only the first attempt takes effect. Every resolution goes through a
//! single mutex-guarded state transition, so the winner is decided in one
//! place and later attempts observe a settled slot and return `false`.
//!
//! The waiting half, [`SlotWaiter`], is not `Clone`: exactly one caller
//! observes the outcome, exactly once.

use std::{
    fmt,
    sync::{
        Arc,
        Condvar,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use crate::error::BridgeError;

static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(1);

/// Observable state of a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    /// No outcome yet.
    Waiting,
    /// Resolved with a payload that has not been collected.
    Resolved,
    /// Failed with an error that has not been collected.
    Failed,
    /// The waiter has collected the outcome.
    Consumed,
}

enum SlotState<T> {
    Waiting,
    Resolved(T),
    Failed(BridgeError),
    Consumed,
}

impl<T> SlotState<T> {
    fn status(&self) -> SlotStatus {
        match self {
            Self::Waiting => SlotStatus::Waiting,
            Self::Resolved(_) => SlotStatus::Resolved,
            Self::Failed(_) => SlotStatus::Failed,
            Self::Consumed => SlotStatus::Consumed,
        }
    }
}

struct SlotInner<T> {
    id: u64,
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T> SlotInner<T> {
    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, outcome: SlotState<T>) -> bool {
        let mut state = self.lock();
        if !matches!(*state, SlotState::Waiting) {
            return false;
        }
        *state = outcome;
        drop(state);
        self.ready.notify_all();
        true
    }

    fn take(state: &mut SlotState<T>) -> Option<Result<T, BridgeError>> {
        match std::mem::replace(state, SlotState::Consumed) {
            SlotState::Resolved(value) => Some(Ok(value)),
            SlotState::Failed(err) => Some(Err(err)),
            pending @ SlotState::Waiting => {
                *state = pending;
                None
            }
            SlotState::Consumed => None,
        }
    }
}

/// Resolving half of a one-shot result holder.
///
/// Cloning shares the same slot; all clones compete for the single
/// resolution.
///
/// # Examples
///
/// ```
/// use wirebridge::{BridgeError, correlation::CorrelationSlot};
///
/// let (slot, waiter) = CorrelationSlot::<String>::pair();
/// assert!(slot.resolve("Slept 150 ms".to_owned()));
/// assert!(!slot.fail(BridgeError::NoResponse));
/// assert_eq!(waiter.wait().expect("resolved"), "Slept 150 ms");
/// ```
pub struct CorrelationSlot<T> {
    inner: Arc<SlotInner<T>>,
}

impl<T> Clone for CorrelationSlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for CorrelationSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationSlot")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .finish()
    }
}

impl<T> CorrelationSlot<T> {
    /// Create a fresh slot and its waiter.
    #[must_use]
    pub fn pair() -> (Self, SlotWaiter<T>) {
        let inner = Arc::new(SlotInner {
            id: NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(SlotState::Waiting),
            ready: Condvar::new(),
        });
        let waiter = SlotWaiter {
            inner: Arc::clone(&inner),
        };
        (Self { inner }, waiter)
    }

    /// Process-unique identifier of this slot.
    #[must_use]
    pub fn id(&self) -> u64 { self.inner.id }

    /// Resolve the slot with a payload. Returns `true` if this call won.
    pub fn resolve(&self, value: T) -> bool { self.inner.settle(SlotState::Resolved(value)) }

    /// Fail the slot. Returns `true` if this call won.
    pub fn fail(&self, error: BridgeError) -> bool { self.inner.settle(SlotState::Failed(error)) }

    /// Current state.
    #[must_use]
    pub fn status(&self) -> SlotStatus { self.inner.lock().status() }

    /// Whether no outcome has been recorded yet.
    #[must_use]
    pub fn is_pending(&self) -> bool { self.status() == SlotStatus::Waiting }
}

/// Waiting half of a [`CorrelationSlot`].
///
/// Blocking waits park the calling thread on a condition variable; they must
/// not be used from inside an async task.
pub struct SlotWaiter<T> {
    inner: Arc<SlotInner<T>>,
}

impl<T> fmt::Debug for SlotWaiter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotWaiter")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

impl<T> SlotWaiter<T> {
    /// Identifier of the slot this waiter observes.
    #[must_use]
    pub fn id(&self) -> u64 { self.inner.id }

    /// Block until the slot settles and return its outcome.
    ///
    /// # Errors
    ///
    /// Returns the error the slot was failed with.
    pub fn wait(self) -> Result<T, BridgeError> {
        let mut state = self.inner.lock();
        loop {
            if let Some(outcome) = SlotInner::take(&mut state) {
                return outcome;
            }
            state = self
                .inner
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block for at most `limit`. Hands the waiter back if the slot is still
    /// pending when the limit elapses.
    ///
    /// # Errors
    ///
    /// The outer `Err` returns the waiter on expiry; the inner result is the
    /// slot outcome.
    pub fn wait_timeout(self, limit: Duration) -> Result<Result<T, BridgeError>, Self> {
        let deadline = Instant::now() + limit;
        let mut state = self.inner.lock();
        loop {
            if let Some(outcome) = SlotInner::take(&mut state) {
                return Ok(outcome);
            }
            let now = Instant::now();
            if now >= deadline {
                drop(state);
                return Err(self);
            }
            state = self
                .inner
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}
