//! Blocking request/reply front-end.
//!
//! A [`Producer`] talks to one destination through at most one live
//! [`Session`]. Calls park the calling thread on a correlation slot while the
//! I/O pool performs the connect, the write and the read; the caller wakes
//! once the reply arrives, the deadline fires, the peer hangs up or the
//! caller's token is cancelled.
//!
//! Producer methods block and must not be called from inside an async task.

use std::{
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;

use crate::{
    codec::Codec,
    config::EndpointConfig,
    correlation::{CorrelationSlot, SlotWaiter},
    deadline::Deadline,
    dispatcher::ResponseDispatcher,
    envelope::{Envelope, ExchangePattern},
    error::BridgeError,
    io_pool::IoPool,
    metrics,
    session::{Session, SessionOptions, SessionState},
    transport::Transport,
};

mod builder;

pub use builder::ProducerBuilder;

type Registration<F> = (Session<F>, CorrelationSlot<F>, SlotWaiter<F>);

/// What happens to the session once an exchange settles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Teardown {
    Keep,
    Flush,
    Abort,
}

/// Blocking client for one destination.
pub struct Producer<C: Codec> {
    address: String,
    codec: C,
    config: EndpointConfig,
    transport: Arc<dyn Transport>,
    pool: IoPool,
    current: Mutex<Option<Session<C::Frame>>>,
    stopped: AtomicBool,
}

impl<C: Codec> std::fmt::Debug for Producer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("address", &self.address)
            .field("config", &self.config)
            .field("session_state", &self.session_state())
            .finish_non_exhaustive()
    }
}

impl<C: Codec> Producer<C> {
    /// Start building a producer for `address` using `codec`.
    #[must_use]
    pub fn builder(address: impl Into<String>, codec: C) -> ProducerBuilder<C> {
        ProducerBuilder::new(address, codec)
    }

    /// Destination address.
    #[must_use]
    pub fn address(&self) -> &str { &self.address }

    /// Endpoint configuration in effect.
    #[must_use]
    pub fn config(&self) -> &EndpointConfig { &self.config }

    /// The most recent session, if one was ever opened.
    #[must_use]
    pub fn session(&self) -> Option<Session<C::Frame>> { self.lock().clone() }

    /// State of the most recent session; `Idle` before the first open.
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.lock()
            .as_ref()
            .map_or(SessionState::Idle, Session::state)
    }

    /// Write a payload without waiting for a reply.
    ///
    /// The write claims the session's correlation slot like a request does,
    /// so it never interleaves with another caller's exchange; the busy
    /// policy applies while the slot is taken. Returns once the frame is
    /// queued. When the exchange closes the session afterwards, this waits
    /// for the queued frame to be flushed and the transport released.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::ConnectFailed`] if no session could be opened;
    /// - [`BridgeError::Busy`] or [`BridgeError::Timeout`] if the slot could
    ///   not be claimed under the busy policy;
    /// - [`BridgeError::SessionClosed`] if the session closed before the
    ///   write was queued.
    pub fn send(&self, envelope: Envelope<C::Frame>) -> Result<(), BridgeError> {
        let span = tracing::info_span!("producer.send", address = %self.address);
        let _enter = span.enter();
        let started = Instant::now();
        let timeout = self.timeout_for(&envelope);
        let close_after = self.close_after(&envelope);

        let (session, slot, _waiter) = self.register(started, timeout)?;
        let outcome = session.write(envelope.into_payload());
        let teardown = match &outcome {
            Ok(()) if close_after => Teardown::Flush,
            Ok(()) => Teardown::Keep,
            Err(_) => Teardown::Abort,
        };
        self.finish(&session, slot.id(), teardown);
        match &outcome {
            Ok(()) => metrics::inc_requests("sent"),
            Err(e) => metrics::inc_requests(e.kind()),
        }
        outcome
    }

    /// Write a payload and block until its reply arrives.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Timeout`] when no reply arrives within the deadline;
    /// - [`BridgeError::NoResponse`] when the peer hangs up first;
    /// - [`BridgeError::Io`] on a transport or decode failure;
    /// - [`BridgeError::ConnectFailed`] when the session cannot be opened;
    /// - [`BridgeError::Busy`] when the session is occupied and the busy
    ///   policy rejects.
    pub fn request(&self, envelope: Envelope<C::Frame>) -> Result<C::Frame, BridgeError> {
        self.exchange(envelope, None)
    }

    /// Like [`request`](Self::request), but `cancel` may abandon the wait.
    ///
    /// A cancellation that wins the slot yields [`BridgeError::Cancelled`]
    /// and is treated like an unanswered request for disconnect purposes.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub fn request_with_cancel(
        &self,
        envelope: Envelope<C::Frame>,
        cancel: &CancellationToken,
    ) -> Result<C::Frame, BridgeError> {
        self.exchange(envelope, Some(cancel.clone()))
    }

    /// Dispatch on the envelope's pattern.
    ///
    /// A request/reply envelope returns `Some(reply)`. One-way envelopes and
    /// endpoints configured with `sync = false` return `None`.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send) and [`request`](Self::request).
    pub fn process(&self, envelope: Envelope<C::Frame>) -> Result<Option<C::Frame>, BridgeError> {
        if self.config.sync && envelope.pattern() == ExchangePattern::RequestReply {
            self.request(envelope).map(Some)
        } else {
            self.send(envelope).map(|()| None)
        }
    }

    /// Close the current session and wait for the transport to be released.
    ///
    /// Later calls fail with [`BridgeError::Stopped`].
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let session = self.lock().clone();
        if let Some(session) = session {
            session.close().wait();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session<C::Frame>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close_after(&self, envelope: &Envelope<C::Frame>) -> bool {
        envelope
            .close_override()
            .unwrap_or(self.config.disconnect_after_complete)
    }

    fn timeout_for(&self, envelope: &Envelope<C::Frame>) -> Option<Duration> {
        match envelope.timeout_override() {
            Some(timeout) => (!timeout.is_zero()).then_some(timeout),
            None => self.config.request_timeout(),
        }
    }

    fn exchange(
        &self,
        envelope: Envelope<C::Frame>,
        cancel: Option<CancellationToken>,
    ) -> Result<C::Frame, BridgeError> {
        let span = tracing::info_span!("producer.request", address = %self.address);
        let _enter = span.enter();
        let started = Instant::now();
        let timeout = self.timeout_for(&envelope);
        let close_after = self.close_after(&envelope);
        if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(BridgeError::Cancelled);
        }

        let (session, slot, waiter) = self.register(started, timeout)?;
        let mut deadline = Deadline::arm(
            &self.pool,
            slot.clone(),
            tokio::time::Instant::from_std(Instant::now()),
            timeout,
            cancel,
        );
        if let Err(e) = session.write(envelope.into_payload()) {
            slot.fail(e);
        }
        let outcome = waiter.wait();
        deadline.cancel();

        let teardown = match &outcome {
            Ok(_) if close_after => Teardown::Flush,
            Ok(_) => Teardown::Keep,
            Err(BridgeError::Timeout(_) | BridgeError::Cancelled) => {
                if self.config.disconnect_on_no_reply {
                    Teardown::Abort
                } else {
                    Teardown::Keep
                }
            }
            Err(e) if e.breaks_session() => Teardown::Abort,
            Err(_) if close_after => Teardown::Flush,
            Err(_) => Teardown::Keep,
        };
        self.finish(&session, slot.id(), teardown);
        match &outcome {
            Ok(_) => metrics::inc_requests("ok"),
            Err(e) => {
                metrics::inc_requests(e.kind());
                tracing::debug!(error = %e, elapsed_ms = started.elapsed().as_millis(), "request failed");
            }
        }
        outcome
    }

    /// Acquire a session and claim its correlation slot.
    ///
    /// A queued caller waits at most `timeout`, measured from `started`.
    fn register(
        &self,
        started: Instant,
        timeout: Option<Duration>,
    ) -> Result<Registration<C::Frame>, BridgeError> {
        loop {
            let session = self.acquire_session()?;
            let wait_limit = timeout.map(|t| t.saturating_sub(started.elapsed()));
            match session.register(self.config.busy_policy, wait_limit) {
                Ok((slot, waiter)) => return Ok((session, slot, waiter)),
                // Closed under us: wait for teardown and open a fresh one.
                Err(BridgeError::SessionClosed) => {}
                Err(BridgeError::Timeout(_)) => {
                    return Err(BridgeError::Timeout(timeout.unwrap_or_default()));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Apply the disconnect policy once the slot has settled.
    ///
    /// The session is closed before the slot is released so that a queued
    /// caller never claims a session that is about to go away.
    fn finish(&self, session: &Session<C::Frame>, slot_id: u64, teardown: Teardown) {
        let completion = match teardown {
            Teardown::Keep => None,
            Teardown::Flush => Some(session.close()),
            // The request may still be stuck in the writer; skip the flush.
            Teardown::Abort => Some(session.abort()),
        };
        session.release(slot_id);
        if let Some(completion) = completion {
            completion.wait();
        }
    }

    /// Return the open session, opening a new one when needed.
    ///
    /// A session still closing is waited on first, so a caller never
    /// proceeds while the previous transport is being torn down.
    pub(crate) fn acquire_session(&self) -> Result<Session<C::Frame>, BridgeError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(BridgeError::Stopped);
        }
        let mut current = self.lock();
        if let Some(session) = current.as_ref() {
            match session.state() {
                SessionState::Open => return Ok(session.clone()),
                SessionState::Closing => session.close_completion().wait(),
                SessionState::Idle | SessionState::Connecting | SessionState::Closed => {}
            }
        }

        let transport = Arc::clone(&self.transport);
        let address = self.address.clone();
        let codec = self.codec.clone();
        let options = SessionOptions::from(&self.config);
        let session = self.pool.run_blocking(async move {
            Session::open(
                transport.as_ref(),
                address,
                &codec,
                Arc::new(ResponseDispatcher),
                options,
            )
            .await
        });
        match session {
            Ok(session) => {
                *current = Some(session.clone());
                Ok(session)
            }
            Err(e) => {
                log::warn!("failed to open session: address={}, error={e}", self.address);
                Err(e)
            }
        }
    }
}

impl<C: Codec> Drop for Producer<C> {
    fn drop(&mut self) {
        if let Some(session) = self.lock().take() {
            let _ = session.close();
        }
    }
}
