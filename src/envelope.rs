//! Messages handed to a producer.

use std::{collections::BTreeMap, time::Duration};

/// How a producer treats an envelope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExchangePattern {
    /// Write the payload and return without waiting for a reply.
    FireAndForget,
    /// Write the payload and block for the correlated reply.
    #[default]
    RequestReply,
}

/// A payload plus the per-exchange settings that travel with it.
///
/// Headers are carried for the caller's benefit and never interpreted by the
/// bridge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope<F> {
    pattern: ExchangePattern,
    payload: F,
    headers: BTreeMap<String, String>,
    timeout: Option<Duration>,
    close_when_complete: Option<bool>,
}

impl<F> Envelope<F> {
    /// Create a request/reply envelope.
    #[must_use]
    pub fn request(payload: F) -> Self { Self::with_pattern(ExchangePattern::RequestReply, payload) }

    /// Create a fire-and-forget envelope.
    #[must_use]
    pub fn one_way(payload: F) -> Self { Self::with_pattern(ExchangePattern::FireAndForget, payload) }

    /// Create an envelope with an explicit pattern.
    #[must_use]
    pub fn with_pattern(pattern: ExchangePattern, payload: F) -> Self {
        Self {
            pattern,
            payload,
            headers: BTreeMap::new(),
            timeout: None,
            close_when_complete: None,
        }
    }

    /// Attach an opaque header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Override the endpoint's request timeout for this exchange.
    /// `Duration::ZERO` waits indefinitely.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override `disconnect_after_complete` for this exchange.
    #[must_use]
    pub fn close_when_complete(mut self, close: bool) -> Self {
        self.close_when_complete = Some(close);
        self
    }

    /// Exchange pattern.
    #[must_use]
    pub fn pattern(&self) -> ExchangePattern { self.pattern }

    /// Borrow the payload.
    #[must_use]
    pub fn payload(&self) -> &F { &self.payload }

    /// Consume the envelope, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> F { self.payload }

    /// Opaque headers.
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> { &self.headers }

    /// Per-exchange timeout override.
    #[must_use]
    pub fn timeout_override(&self) -> Option<Duration> { self.timeout }

    /// Per-exchange close override.
    #[must_use]
    pub fn close_override(&self) -> Option<bool> { self.close_when_complete }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_default_to_none() {
        let envelope = Envelope::request("400".to_owned()).header("trace-id", "abc");
        assert_eq!(envelope.pattern(), ExchangePattern::RequestReply);
        assert_eq!(envelope.timeout_override(), None);
        assert_eq!(envelope.close_override(), None);
        assert_eq!(envelope.headers().get("trace-id").map(String::as_str), Some("abc"));

        let envelope = Envelope::one_way(1_u8)
            .with_timeout(Duration::from_millis(5))
            .close_when_complete(true);
        assert_eq!(envelope.pattern(), ExchangePattern::FireAndForget);
        assert_eq!(envelope.timeout_override(), Some(Duration::from_millis(5)));
        assert_eq!(envelope.close_override(), Some(true));
        assert_eq!(envelope.into_payload(), 1);
    }
}
