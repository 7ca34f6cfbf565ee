//! Error types surfaced by the bridge.
//!
//! Every blocking producer call returns [`BridgeError`]. The variants keep the
//! failure kinds a caller must be able to tell apart: a connection that could
//! not be opened, a deadline that fired, a peer that hung up without replying
//! and a transport that broke are all distinct.

use std::{io, time::Duration};

/// Boxed error type used for handler failures and other opaque sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias for bridge operations.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Errors emitted by [`crate::Producer`] and [`crate::Session`].
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The session could not be established.
    #[error("failed to connect to {address}: {source}")]
    ConnectFailed {
        /// Destination the producer attempted to reach.
        address: String,
        /// Underlying transport failure.
        #[source]
        source: io::Error,
    },
    /// The request deadline fired before a reply arrived.
    #[error("no reply received within {0:?}")]
    Timeout(Duration),
    /// The peer closed the session without writing a reply.
    #[error("peer closed the session without replying")]
    NoResponse,
    /// Transport or codec failure other than a clean close.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// A request/reply call found the session's correlation slot occupied.
    #[error("session already has an outstanding request")]
    Busy,
    /// The caller cancelled the request before it resolved.
    #[error("request cancelled by caller")]
    Cancelled,
    /// The session was closed while the call was using it.
    #[error("session closed")]
    SessionClosed,
    /// The producer has been stopped.
    #[error("producer stopped")]
    Stopped,
    /// A text codec was asked for an encoding it cannot handle.
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),
}

impl BridgeError {
    /// Whether the failure leaves the session transport unusable.
    ///
    /// Producers close the session after such failures so that no later
    /// frame can be read from a desynchronised stream.
    #[must_use]
    pub fn breaks_session(&self) -> bool {
        matches!(self, Self::Io(_) | Self::NoResponse | Self::SessionClosed)
    }

    /// Short label used for log fields and metric tags.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectFailed { .. } => "connect_failed",
            Self::Timeout(_) => "timeout",
            Self::NoResponse => "no_response",
            Self::Io(_) => "io",
            Self::Busy => "busy",
            Self::Cancelled => "cancelled",
            Self::SessionClosed => "session_closed",
            Self::Stopped => "stopped",
            Self::UnsupportedEncoding(_) => "unsupported_encoding",
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(BridgeError::Timeout(Duration::from_millis(250)), "timeout", false)]
    #[case(BridgeError::NoResponse, "no_response", true)]
    #[case(BridgeError::Io(io::Error::other("reset")), "io", true)]
    #[case(BridgeError::Busy, "busy", false)]
    #[case(BridgeError::Cancelled, "cancelled", false)]
    fn kind_and_session_impact(
        #[case] err: BridgeError,
        #[case] kind: &str,
        #[case] breaks: bool,
    ) {
        assert_eq!(err.kind(), kind);
        assert_eq!(err.breaks_session(), breaks);
    }

    #[test]
    fn connect_failed_names_address() {
        let err = BridgeError::ConnectFailed {
            address: "127.0.0.1:1".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert!(err.to_string().contains("127.0.0.1:1"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
