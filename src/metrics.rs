//! Metric helpers for `wirebridge`.
//!
//! Thin wrappers over the [`metrics`](https://docs.rs/metrics) facade. With
//! the `metrics` feature disabled every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking open producer sessions.
pub const SESSIONS_OPEN: &str = "wirebridge_sessions_open";
/// Name of the gauge tracking active consumer connections.
pub const CONSUMER_SESSIONS_ACTIVE: &str = "wirebridge_consumer_sessions_active";
/// Name of the counter tracking completed request/reply exchanges.
pub const REQUESTS_TOTAL: &str = "wirebridge_requests_total";
/// Name of the counter tracking frames processed.
pub const FRAMES_PROCESSED: &str = "wirebridge_frames_processed_total";
/// Name of the counter tracking panics in consumer handlers.
pub const HANDLER_PANICS: &str = "wirebridge_handler_panics_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames read from the transport.
    Inbound,
    /// Frames written to the transport.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "only labels metrics"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the open sessions gauge.
pub fn inc_sessions_opened() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_OPEN).increment(1.0);
}

/// Decrement the open sessions gauge.
pub fn dec_sessions_open() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_OPEN).decrement(1.0);
}

/// Increment the consumer connections gauge.
pub fn inc_consumer_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(CONSUMER_SESSIONS_ACTIVE).increment(1.0);
}

/// Decrement the consumer connections gauge.
pub fn dec_consumer_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(CONSUMER_SESSIONS_ACTIVE).decrement(1.0);
}

/// Record a finished request labelled by its outcome.
pub fn inc_requests(outcome: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(REQUESTS_TOTAL, "outcome" => outcome).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}

/// Record a processed frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a panic caught in a consumer handler.
pub fn inc_handler_panics() {
    #[cfg(feature = "metrics")]
    counter!(HANDLER_PANICS).increment(1);
}
