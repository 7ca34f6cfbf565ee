//! Builder for [`Producer`].

use std::sync::{Arc, Mutex, atomic::AtomicBool};

use super::Producer;
use crate::{
    codec::Codec,
    config::EndpointConfig,
    error::BridgeError,
    io_pool::{IoPool, default_io_threads},
    transport::{TcpTransport, Transport},
};

/// Configures and builds a [`Producer`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use wirebridge::{EndpointConfig, Envelope, Producer, codec::TextLineCodec};
///
/// let producer = Producer::builder("127.0.0.1:7000", TextLineCodec::new())
///     .config(EndpointConfig::default().with_timeout(Duration::from_millis(500)))
///     .build()?;
/// let reply = producer.request(Envelope::request("ping".to_owned()))?;
/// # let _ = reply;
/// # Ok::<(), wirebridge::BridgeError>(())
/// ```
pub struct ProducerBuilder<C: Codec> {
    address: String,
    codec: C,
    config: EndpointConfig,
    transport: Option<Arc<dyn Transport>>,
    pool: Option<IoPool>,
    io_threads: Option<usize>,
}

impl<C: Codec> ProducerBuilder<C> {
    pub(super) fn new(address: impl Into<String>, codec: C) -> Self {
        Self {
            address: address.into(),
            codec,
            config: EndpointConfig::default(),
            transport: None,
            pool: None,
            io_threads: None,
        }
    }

    /// Replace the endpoint configuration.
    #[must_use]
    pub fn config(mut self, config: EndpointConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `transport` instead of TCP.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Drive sessions on an existing pool.
    #[must_use]
    pub fn io_pool(mut self, pool: IoPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Worker threads for the producer's own pool. Ignored with
    /// [`io_pool`](Self::io_pool).
    #[must_use]
    pub fn io_threads(mut self, threads: usize) -> Self {
        self.io_threads = Some(threads);
        self
    }

    /// Build the producer.
    ///
    /// With `lazy_session_creation = false` the session is opened here.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Io`] if the I/O pool cannot be created;
    /// [`BridgeError::ConnectFailed`] if an eager open fails.
    pub fn build(self) -> Result<Producer<C>, BridgeError> {
        let pool = match self.pool {
            Some(pool) => pool,
            None => IoPool::new(self.io_threads.unwrap_or_else(default_io_threads))?,
        };
        let producer = Producer {
            address: self.address,
            codec: self.codec,
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(TcpTransport::default())),
            config: self.config,
            pool,
            current: Mutex::new(None),
            stopped: AtomicBool::new(false),
        };
        if !producer.config.lazy_session_creation {
            producer.acquire_session()?;
        }
        Ok(producer)
    }
}
