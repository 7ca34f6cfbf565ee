//! TCP transport built on Tokio sockets.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};

use super::{Acceptor, Connection, Transport};

/// Stream transport over TCP.
///
/// # Examples
///
/// ```
/// use wirebridge::transport::TcpTransport;
///
/// let transport = TcpTransport::default().nodelay(false);
/// assert!(!transport.nodelay_value());
/// ```
#[derive(Clone, Copy, Debug)]
pub struct TcpTransport {
    nodelay: bool,
}

impl Default for TcpTransport {
    fn default() -> Self { Self { nodelay: true } }
}

impl TcpTransport {
    /// Configure `TCP_NODELAY` on every connection.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }

    /// Whether `TCP_NODELAY` is applied.
    #[must_use]
    pub fn nodelay_value(&self) -> bool { self.nodelay }

    fn split(&self, stream: TcpStream) -> io::Result<Connection> {
        stream.set_nodelay(self.nodelay)?;
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        let (reader, writer) = stream.into_split();
        Ok(Connection {
            reader: Box::new(reader),
            writer: Box::new(writer),
            peer_addr,
            local_addr,
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, address: &str) -> io::Result<Connection> {
        let stream = TcpStream::connect(address).await?;
        self.split(stream)
    }

    async fn listen(&self, address: &str) -> io::Result<Box<dyn Acceptor>> {
        let listener = TcpListener::bind(address).await?;
        Ok(Box::new(TcpAcceptor {
            listener,
            transport: *self,
        }))
    }
}

struct TcpAcceptor {
    listener: TcpListener,
    transport: TcpTransport,
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    async fn accept(&self) -> io::Result<Connection> {
        let (stream, _) = self.listener.accept().await?;
        self.transport.split(stream)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { self.listener.local_addr() }
}
