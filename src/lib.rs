#![doc(html_root_url = "https://docs.rs/wirebridge/latest")]
//! Public API for the `wirebridge` library.
//!
//! This crate bridges blocking request/reply calls onto asynchronous,
//! callback-driven network sessions. A [`Producer`] parks the calling thread
//! on a single-shot correlation slot while an I/O pool connects, writes and
//! reads; a [`Consumer`] serves inbound frames through a handler and writes
//! replies back in order.

pub mod codec;
pub mod completion;
pub mod config;
pub mod consumer;
pub mod correlation;
pub mod deadline;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod io_pool;
pub mod metrics;
pub mod panic;
pub mod producer;
pub mod session;
pub mod transport;

pub use completion::{CloseCompletion, Completion};
pub use config::{BusyPolicy, EndpointConfig, LogLevel};
pub use consumer::Consumer;
pub use correlation::{CorrelationSlot, SlotStatus, SlotWaiter};
pub use envelope::{Envelope, ExchangePattern};
pub use error::{BoxError, BridgeError, Result};
pub use io_pool::IoPool;
pub use producer::Producer;
pub use session::{Session, SessionId, SessionState};
pub use transport::{TcpTransport, Transport};
