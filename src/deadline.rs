//! Per-request deadlines.
//!
//! A [`Deadline`] races a timer, and optionally a caller's
//! [`CancellationToken`], against the request's correlation slot. Whichever
//! settles the slot first wins; the loser is a no-op. Dropping the deadline
//! stops the timer task.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{correlation::CorrelationSlot, error::BridgeError, io_pool::IoPool};

/// Which branch of a deadline settled the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeadlineOutcome {
    /// The timer expired and failed the slot with `Timeout`.
    Expired,
    /// The caller's token fired and failed the slot with `Cancelled`.
    Cancelled,
}

/// Timer armed against one correlation slot.
#[derive(Debug)]
pub struct Deadline {
    task: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
    cancelled_by_caller: Arc<AtomicBool>,
}

impl Deadline {
    /// Arm a deadline on the I/O pool.
    ///
    /// `started` is the instant the request is written; the timer expires at
    /// `started + timeout`. Time spent connecting or queued behind another
    /// request is not counted. `None` disables the timer, leaving only `cancel`.
    /// With neither, no task is spawned.
    #[must_use]
    pub fn arm<T: Send + 'static>(
        pool: &IoPool,
        slot: CorrelationSlot<T>,
        started: Instant,
        timeout: Option<Duration>,
        cancel: Option<CancellationToken>,
    ) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        let cancelled_by_caller = Arc::new(AtomicBool::new(false));
        if timeout.is_none() && cancel.is_none() {
            return Self {
                task: None,
                fired,
                cancelled_by_caller,
            };
        }
        let task = pool.spawn({
            let fired = Arc::clone(&fired);
            let cancelled_by_caller = Arc::clone(&cancelled_by_caller);
            async move {
                let cancel = cancel.unwrap_or_default();
                let expiry = async {
                    match timeout {
                        Some(timeout) => tokio::time::sleep_until(started + timeout).await,
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::select! {
                    () = expiry => {
                        if let Some(timeout) = timeout
                            && slot.fail(BridgeError::Timeout(timeout))
                        {
                            fired.store(true, Ordering::Release);
                        }
                    }
                    () = cancel.cancelled() => {
                        if slot.fail(BridgeError::Cancelled) {
                            cancelled_by_caller.store(true, Ordering::Release);
                            fired.store(true, Ordering::Release);
                        }
                    }
                }
            }
        });
        Self {
            task: Some(task),
            fired,
            cancelled_by_caller,
        }
    }

    /// Whether this deadline settled the slot, and how.
    #[must_use]
    pub fn outcome(&self) -> Option<DeadlineOutcome> {
        if !self.fired.load(Ordering::Acquire) {
            None
        } else if self.cancelled_by_caller.load(Ordering::Acquire) {
            Some(DeadlineOutcome::Cancelled)
        } else {
            Some(DeadlineOutcome::Expired)
        }
    }

    /// Stop the timer. Has no effect once it has fired.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Deadline {
    fn drop(&mut self) { self.cancel(); }
}

#[cfg(test)]
mod tests {
    use tokio::runtime::Handle;

    use super::*;
    use crate::correlation::SlotStatus;

    fn pool() -> IoPool { IoPool::from_handle(Handle::current()) }

    #[tokio::test(start_paused = true)]
    async fn expiry_fails_slot_with_timeout() {
        let (slot, _waiter) = CorrelationSlot::<String>::pair();
        let deadline = Deadline::arm(
            &pool(),
            slot.clone(),
            Instant::now(),
            Some(Duration::from_millis(100)),
            None,
        );
        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(slot.is_pending());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(slot.status(), SlotStatus::Failed);
        assert_eq!(deadline.outcome(), Some(DeadlineOutcome::Expired));
    }

    #[tokio::test(start_paused = true)]
    async fn resolved_slot_is_left_alone() {
        let (slot, waiter) = CorrelationSlot::pair();
        let deadline = Deadline::arm(
            &pool(),
            slot.clone(),
            Instant::now(),
            Some(Duration::from_millis(50)),
            None,
        );
        assert!(slot.resolve(7_u32));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(deadline.outcome(), None);
        assert_eq!(waiter.wait().expect("resolved"), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_deadline_never_fires() {
        let (slot, _waiter) = CorrelationSlot::<u32>::pair();
        let mut deadline = Deadline::arm(
            &pool(),
            slot.clone(),
            Instant::now(),
            Some(Duration::from_millis(50)),
            None,
        );
        deadline.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(slot.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn caller_token_wins_with_cancelled() {
        let (slot, waiter) = CorrelationSlot::<u32>::pair();
        let token = CancellationToken::new();
        let deadline = Deadline::arm(&pool(), slot, Instant::now(), None, Some(token.clone()));
        token.cancel();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(deadline.outcome(), Some(DeadlineOutcome::Cancelled));
        assert!(matches!(waiter.wait(), Err(BridgeError::Cancelled)));
    }
}
