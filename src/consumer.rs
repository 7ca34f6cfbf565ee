//! Event-driven front-end.
//!
//! A [`Consumer`] listens on an address and serves every accepted connection
//! on its own task: each decoded frame is passed to the [`Handler`], and with
//! `sync = true` the reply is written back before the session reads its
//! next frame.
//!
//! Consumers run on the ambient Tokio runtime; `bind` must be awaited from
//! inside it.

use std::{net::SocketAddr, sync::Arc};

use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{codec::Codec, config::EndpointConfig, error::BridgeError, session::SessionId};

mod accept;
mod backoff;
mod builder;
mod connection;
mod handler;
mod registry;

pub use backoff::BackoffConfig;
pub use builder::ConsumerBuilder;
use connection::ConsumerContext;
pub use handler::{ExceptionHandler, Handler, HandlerError, NoFaultReply, Request};

/// A bound listener dispatching inbound frames to a handler.
///
/// Dropping the consumer stops accepting and asks every session to close;
/// use [`shutdown`](Self::shutdown) to also wait for them.
pub struct Consumer<C: Codec> {
    local_addr: SocketAddr,
    context: Arc<ConsumerContext<C>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl<C: Codec> std::fmt::Debug for Consumer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("local_addr", &self.local_addr)
            .field("config", &self.context.config)
            .finish_non_exhaustive()
    }
}

impl<C: Codec> Consumer<C> {
    /// Start configuring a consumer that frames with `codec`.
    #[must_use]
    pub fn builder(codec: C) -> ConsumerBuilder<C> { ConsumerBuilder::new(codec) }

    /// Bind `address` over TCP with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Io`] if the address cannot be bound.
    pub async fn bind(
        address: &str,
        codec: C,
        handler: impl Handler<C::Frame>,
    ) -> Result<Self, BridgeError> {
        Self::builder(codec).bind(address, handler).await
    }

    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr { self.local_addr }

    /// Endpoint configuration in effect.
    #[must_use]
    pub fn config(&self) -> &EndpointConfig { &self.context.config }

    /// Sessions currently being served, in ascending order.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<SessionId> { self.context.registry.ids() }

    /// Remote address of a live session.
    #[must_use]
    pub fn session_peer(&self, id: SessionId) -> Option<SocketAddr> {
        self.context.registry.peer_addr(id)
    }

    /// Close one session once its current frame is done. Returns `false` if
    /// the session is unknown.
    pub fn close_session(&self, id: SessionId) -> bool { self.context.registry.close(id) }

    /// Stop accepting, close every session and wait for their tasks.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::debug!(local_addr = %self.local_addr, "consumer stopped");
    }
}

impl<C: Codec> Drop for Consumer<C> {
    fn drop(&mut self) { self.shutdown.cancel(); }
}
