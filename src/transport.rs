//! Transport abstraction consumed by sessions and consumers.
//!
//! A [`Transport`] opens outbound [`Connection`]s and binds [`Acceptor`]s for
//! inbound ones. A connection is handed over as independent read and write
//! halves so that a session can run its reader and writer on separate I/O
//! tasks.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

mod tcp;

pub use tcp::TcpTransport;

/// Read half of a transport connection.
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of a transport connection.
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An established connection split into halves.
pub struct Connection {
    /// Inbound byte stream.
    pub reader: BoxReader,
    /// Outbound byte stream.
    pub writer: BoxWriter,
    /// Address of the remote end.
    pub peer_addr: SocketAddr,
    /// Address of the local end.
    pub local_addr: SocketAddr,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.peer_addr)
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

/// Source of inbound connections for a consumer.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
pub trait Acceptor: Send + Sync {
    /// Wait for the next inbound connection.
    async fn accept(&self) -> io::Result<Connection>;

    /// Address the acceptor is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Connect and listen operations for one transport kind.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a connection to `address` (`host:port`).
    async fn connect(&self, address: &str) -> io::Result<Connection>;

    /// Bind an acceptor on `address` (`host:port`).
    async fn listen(&self, address: &str) -> io::Result<Box<dyn Acceptor>>;
}
