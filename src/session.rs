//! Producer sessions over one transport connection.
//!
//! A [`Session`] owns a connection's lifecycle and its single correlation
//! slot. After connecting, three tasks run on the I/O pool:
//!
//! - the **reader** decodes inbound frames and reports them to the session's
//!   [`InboundHandler`](crate::dispatcher::InboundHandler);
//! - the **writer** drains the outbound queue through the codec's encoder;
//! - the **supervisor** waits for both and marks the session `Closed`.
//!
//! A close flushes queued writes for at most the drain timeout;
//! [`Session::abort`] skips the flush.
//!
//! `close()` is idempotent: the first call starts teardown and every call
//! returns a clone of the same [`CloseCompletion`].

use std::{
    fmt,
    net::SocketAddr,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    codec::Codec,
    completion::CloseCompletion,
    config::{BusyPolicy, EndpointConfig},
    correlation::{CorrelationSlot, SlotWaiter},
    dispatcher::InboundHandler,
    error::BridgeError,
    metrics,
    transport::Transport,
};

mod state;
mod tasks;

pub use state::{SessionId, SessionState};

/// Options applied when a session connects.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    /// Upper bound on the transport connect.
    pub connect_timeout: Duration,
    /// Upper bound on flushing queued writes once a close starts.
    pub drain_timeout: Duration,
    /// Log every frame written and received.
    pub trace_frames: bool,
}

impl From<&EndpointConfig> for SessionOptions {
    fn from(config: &EndpointConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            drain_timeout: config.connect_timeout,
            trace_frames: config.trace_frames,
        }
    }
}

struct Shared<F> {
    state: SessionState,
    slot: Option<CorrelationSlot<F>>,
    writer: Option<mpsc::UnboundedSender<F>>,
    peer_addr: Option<SocketAddr>,
}

pub(crate) struct SessionInner<F> {
    id: SessionId,
    address: String,
    shared: Mutex<Shared<F>>,
    slot_free: Condvar,
    closed: CloseCompletion,
    closing: CancellationToken,
    shutdown: CancellationToken,
}

impl<F> SessionInner<F> {
    fn lock(&self) -> MutexGuard<'_, Shared<F>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn mark_closed(&self) {
        let mut shared = self.lock();
        let was_open = shared.peer_addr.is_some() && shared.state != SessionState::Closed;
        shared.state = SessionState::Closed;
        shared.writer = None;
        drop(shared);
        self.slot_free.notify_all();
        if was_open {
            metrics::dec_sessions_open();
        }
        self.closed.complete();
    }
}

impl<F> Drop for SessionInner<F> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.mark_closed();
    }
}

/// Handle to one transport connection and its correlation slot.
///
/// Handles are cheap to clone. Dropping the last handle tears the transport
/// down.
pub struct Session<F> {
    inner: Arc<SessionInner<F>>,
}

impl<F> Clone for Session<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F> fmt::Debug for Session<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("address", &self.inner.address)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<F> Session<F> {
    /// Create an idle session for `address`.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: SessionId::next(),
                address: address.into(),
                shared: Mutex::new(Shared {
                    state: SessionState::Idle,
                    slot: None,
                    writer: None,
                    peer_addr: None,
                }),
                slot_free: Condvar::new(),
                closed: CloseCompletion::new(),
                closing: CancellationToken::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<SessionInner<F>>) -> Self { Self { inner } }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> SessionId { self.inner.id }

    /// Destination address.
    #[must_use]
    pub fn address(&self) -> &str { &self.inner.address }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState { self.inner.lock().state }

    /// Remote address once connected.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.inner.lock().peer_addr }

    /// Completion that fires once the session reaches `Closed`.
    #[must_use]
    pub fn close_completion(&self) -> CloseCompletion { self.inner.closed.clone() }

    /// Queue a frame for writing. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SessionClosed`] unless the session is open.
    pub fn write(&self, frame: F) -> Result<(), BridgeError> {
        let shared = self.inner.lock();
        match (&shared.state, &shared.writer) {
            (SessionState::Open, Some(writer)) => {
                writer.send(frame).map_err(|_| BridgeError::SessionClosed)
            }
            _ => Err(BridgeError::SessionClosed),
        }
    }

    /// Register the session's single correlation slot.
    ///
    /// When another request still occupies the slot, `policy` decides
    /// between failing with [`BridgeError::Busy`] and waiting for it to be
    /// released. Waiting is bounded by `wait_limit`; expiry yields
    /// [`BridgeError::Timeout`].
    ///
    /// The slot stays registered until its owner calls
    /// [`release`](Self::release), even after it has been resolved.
    ///
    /// # Errors
    ///
    /// [`BridgeError::SessionClosed`] if the session is not open,
    /// [`BridgeError::Busy`] or [`BridgeError::Timeout`] as described above.
    pub fn register(
        &self,
        policy: BusyPolicy,
        wait_limit: Option<Duration>,
    ) -> Result<(CorrelationSlot<F>, SlotWaiter<F>), BridgeError> {
        let deadline = wait_limit.map(|limit| Instant::now() + limit);
        let mut shared = self.inner.lock();
        loop {
            if shared.state != SessionState::Open {
                return Err(BridgeError::SessionClosed);
            }
            if shared.slot.is_none() {
                let (slot, waiter) = CorrelationSlot::pair();
                shared.slot = Some(slot.clone());
                return Ok((slot, waiter));
            }
            if policy == BusyPolicy::Reject {
                return Err(BridgeError::Busy);
            }
            shared = match deadline {
                None => self
                    .inner
                    .slot_free
                    .wait(shared)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(BridgeError::Timeout(wait_limit.unwrap_or_default()));
                    }
                    self.inner
                        .slot_free
                        .wait_timeout(shared, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Release the slot registered under `slot_id`, waking queued callers.
    ///
    /// Releasing a slot that is no longer registered is a no-op.
    pub fn release(&self, slot_id: u64) {
        let mut shared = self.inner.lock();
        if shared.slot.as_ref().is_some_and(|slot| slot.id() == slot_id) {
            shared.slot = None;
            drop(shared);
            self.inner.slot_free.notify_all();
        }
    }

    /// The registered slot, if it is still waiting for an outcome.
    #[must_use]
    pub fn pending_slot(&self) -> Option<CorrelationSlot<F>> {
        self.inner
            .lock()
            .slot
            .as_ref()
            .filter(|slot| slot.is_pending())
            .cloned()
    }

    /// Start closing the session and return its completion handle.
    ///
    /// Queued writes are flushed before the transport is shut down; a flush
    /// still running after the session's drain timeout is abandoned. A
    /// request still waiting on the slot fails with
    /// [`BridgeError::SessionClosed`]. Closing an idle or closed session
    /// completes immediately; repeated calls return the same completion and
    /// never tear the transport down twice.
    pub fn close(&self) -> CloseCompletion {
        let _span = tracing::debug_span!("session.close", session = self.inner.id.as_u64()).entered();
        let mut shared = self.inner.lock();
        match shared.state {
            SessionState::Idle => {
                shared.state = SessionState::Closed;
                drop(shared);
                self.inner.closed.complete();
            }
            SessionState::Connecting => {
                shared.state = SessionState::Closing;
            }
            SessionState::Open => {
                shared.state = SessionState::Closing;
                // Dropping the sender lets the writer drain and exit.
                let writer = shared.writer.take();
                let pending = shared.slot.clone();
                drop(shared);
                self.inner.closing.cancel();
                if writer.is_none() {
                    self.inner.shutdown.cancel();
                    self.inner.mark_closed();
                }
                if let Some(slot) = pending {
                    slot.fail(BridgeError::SessionClosed);
                }
                tracing::debug!("session closing");
            }
            SessionState::Closing | SessionState::Closed => {}
        }
        self.inner.slot_free.notify_all();
        self.inner.closed.clone()
    }

    /// Close the session without flushing queued writes.
    ///
    /// Both I/O tasks stop at once and the transport is dropped, so a peer
    /// that stopped reading cannot hold the close open. Shares the
    /// completion of any close already under way.
    pub fn abort(&self) -> CloseCompletion {
        let completion = self.close();
        self.inner.shutdown.cancel();
        completion
    }

    /// Connect an idle session and start its I/O tasks.
    ///
    /// Must run inside the I/O pool runtime.
    ///
    /// # Errors
    ///
    /// [`BridgeError::ConnectFailed`] if the transport cannot connect within
    /// `options.connect_timeout`; [`BridgeError::SessionClosed`] if the
    /// session was closed before or while connecting.
    pub async fn connect<C>(
        &self,
        transport: &dyn Transport,
        codec: &C,
        inbound: Arc<dyn InboundHandler<F>>,
        options: SessionOptions,
    ) -> Result<(), BridgeError>
    where
        C: Codec<Frame = F>,
        F: fmt::Debug + Send + 'static,
    {
        {
            let mut shared = self.inner.lock();
            if shared.state != SessionState::Idle {
                return Err(BridgeError::SessionClosed);
            }
            shared.state = SessionState::Connecting;
        }

        let address = self.inner.address.clone();
        let connected =
            match tokio::time::timeout(options.connect_timeout, transport.connect(&address)).await {
                Ok(result) => result,
                Err(_) => Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timed out",
                )),
            };
        let connection = match connected {
            Ok(connection) => connection,
            Err(source) => {
                self.inner.mark_closed();
                return Err(BridgeError::ConnectFailed { address, source });
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut shared = self.inner.lock();
            if shared.state != SessionState::Connecting {
                drop(shared);
                drop(connection);
                self.inner.mark_closed();
                return Err(BridgeError::SessionClosed);
            }
            shared.state = SessionState::Open;
            shared.writer = Some(tx);
            shared.peer_addr = Some(connection.peer_addr);
        }
        metrics::inc_sessions_opened();
        tracing::debug!(
            session = self.inner.id.as_u64(),
            peer = %connection.peer_addr,
            "session open"
        );
        tasks::spawn(&self.inner, connection, codec, inbound, rx, options);
        Ok(())
    }

    /// Create and connect a session in one step.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect).
    pub async fn open<C>(
        transport: &dyn Transport,
        address: impl Into<String>,
        codec: &C,
        inbound: Arc<dyn InboundHandler<F>>,
        options: SessionOptions,
    ) -> Result<Self, BridgeError>
    where
        C: Codec<Frame = F>,
        F: fmt::Debug + Send + 'static,
    {
        let session = Self::new(address);
        session.connect(transport, codec, inbound, options).await?;
        Ok(session)
    }

    /// An open session with no transport, for exercising slot handling.
    #[cfg(test)]
    pub(crate) fn detached(address: &str) -> Self {
        let session = Self::new(address);
        session.inner.lock().state = SessionState::Open;
        session
    }
}
