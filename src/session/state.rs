//! Session identity and lifecycle states.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier assigned to a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl From<u64> for SessionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl SessionId {
    /// Allocate the next process-unique identifier.
    #[must_use]
    pub fn next() -> Self { Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "SessionId({})", self.0) }
}

/// Lifecycle of a session.
///
/// ```text
/// Idle -> Connecting -> Open -> Closing -> Closed
/// ```
///
/// `Closed` is terminal. A close requested from `Idle` goes straight to
/// `Closed`; a failed connect also ends in `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not yet connected.
    Idle,
    /// Transport connect in progress.
    Connecting,
    /// Connected; requests may be written.
    Open,
    /// Teardown started; queued writes are being flushed.
    Closing,
    /// Transport released.
    Closed,
}

impl SessionState {
    /// Whether the state is terminal.
    #[must_use]
    pub const fn is_closed(self) -> bool { matches!(self, Self::Closed) }

    /// Label used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}
