//! Builder for [`Consumer`].

use std::sync::Arc;

use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{
    BackoffConfig,
    Consumer,
    accept::accept_loop,
    connection::ConsumerContext,
    handler::{ExceptionHandler, Handler, NoFaultReply},
    registry::SessionRegistry,
};
use crate::{
    codec::Codec,
    config::EndpointConfig,
    error::BridgeError,
    transport::{TcpTransport, Transport},
};

/// Configures and binds a [`Consumer`].
///
/// # Examples
///
/// ```no_run
/// use wirebridge::{BoxError, Consumer, codec::TextLineCodec, consumer::Request};
///
/// # async fn run() -> Result<(), wirebridge::BridgeError> {
/// let consumer = Consumer::builder(TextLineCodec::new())
///     .bind("127.0.0.1:0", |request: Request<String>| {
///         Ok::<_, BoxError>(Some(format!("echo {}", request.payload)))
///     })
///     .await?;
/// consumer.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct ConsumerBuilder<C: Codec> {
    codec: C,
    config: EndpointConfig,
    transport: Arc<dyn Transport>,
    backoff: BackoffConfig,
    exceptions: Arc<dyn ExceptionHandler<C::Frame>>,
}

impl<C: Codec> ConsumerBuilder<C> {
    pub(super) fn new(codec: C) -> Self {
        Self {
            codec,
            config: EndpointConfig::default(),
            transport: Arc::new(TcpTransport::default()),
            backoff: BackoffConfig::default(),
            exceptions: Arc::new(NoFaultReply),
        }
    }

    /// Replace the endpoint configuration.
    #[must_use]
    pub fn config(mut self, config: EndpointConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept connections through `transport` instead of TCP.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Back-off applied to accept failures.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Route handler failures to `handler`, which may return a fault reply.
    #[must_use]
    pub fn exception_handler(mut self, handler: impl ExceptionHandler<C::Frame>) -> Self {
        self.exceptions = Arc::new(handler);
        self
    }

    /// Bind `address` and start accepting.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Io`] if the transport cannot listen.
    pub async fn bind(
        self,
        address: &str,
        handler: impl Handler<C::Frame>,
    ) -> Result<Consumer<C>, BridgeError> {
        let acceptor = self.transport.listen(address).await?;
        let local_addr = acceptor.local_addr()?;
        let context = Arc::new(ConsumerContext {
            codec: self.codec,
            config: self.config,
            handler: Arc::new(handler),
            exceptions: self.exceptions,
            registry: SessionRegistry::default(),
        });
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        tracker.spawn(accept_loop(
            acceptor,
            Arc::clone(&context),
            shutdown.clone(),
            tracker.clone(),
            self.backoff,
        ));
        tracing::debug!(%local_addr, "consumer bound");
        Ok(Consumer {
            local_addr,
            context,
            shutdown,
            tracker,
        })
    }
}
