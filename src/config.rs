//! Resolved endpoint configuration.
//!
//! [`EndpointConfig`] carries the options the bridge consumes. Parsing and
//! validating endpoint URIs is left to the surrounding application; the
//! bridge accepts the fully resolved struct, either built in code through the
//! `with_*` methods or deserialised with `serde` (camelCase keys, durations in
//! milliseconds).

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// Default request timeout (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// What a request/reply call does when its session already has an
/// outstanding request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Wait for the outstanding request to finish, bounded by the caller's
    /// own deadline.
    #[default]
    Queue,
    /// Fail immediately with [`BridgeError::Busy`](crate::BridgeError::Busy).
    Reject,
}

/// Level used for configurable log reports, with an explicit `Off`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Suppress the report.
    Off,
    /// Report at ERROR.
    Error,
    /// Report at WARN.
    #[default]
    Warn,
    /// Report at INFO.
    Info,
    /// Report at DEBUG.
    Debug,
    /// Report at TRACE.
    Trace,
}

impl LogLevel {
    /// Map onto a [`log::Level`], returning `None` for [`LogLevel::Off`].
    #[must_use]
    pub const fn to_level(self) -> Option<log::Level> {
        match self {
            Self::Off => None,
            Self::Error => Some(log::Level::Error),
            Self::Warn => Some(log::Level::Warn),
            Self::Info => Some(log::Level::Info),
            Self::Debug => Some(log::Level::Debug),
            Self::Trace => Some(log::Level::Trace),
        }
    }

    /// Emit `args` at this level.
    pub fn log(self, args: fmt::Arguments<'_>) {
        if let Some(level) = self.to_level() {
            log::log!(level, "{args}");
        }
    }
}

/// Fully resolved endpoint options consumed by producers and consumers.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use wirebridge::EndpointConfig;
///
/// let config = EndpointConfig::default()
///     .with_timeout(Duration::from_millis(250))
///     .with_disconnect_on_no_reply(false);
/// assert_eq!(config.request_timeout(), Some(Duration::from_millis(250)));
/// assert!(!config.disconnect_on_no_reply);
/// ```
#[expect(
    clippy::struct_excessive_bools,
    reason = "independent endpoint switches, each mapped from its own option"
)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointConfig {
    /// Request timeout. Zero disables the deadline.
    #[serde(with = "millis")]
    pub timeout: Duration,
    /// Upper bound on establishing a session, and on flushing queued writes
    /// while it closes.
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    /// Whether the exchange is request/reply (`true`) or one-way.
    pub sync: bool,
    /// Close a session whose request went unanswered.
    pub disconnect_on_no_reply: bool,
    /// Close the session after every completed exchange.
    #[serde(alias = "disconnect")]
    pub disconnect_after_complete: bool,
    /// Open the producer session on first use rather than at build time.
    pub lazy_session_creation: bool,
    /// Character encoding for text codecs; `None` means UTF-8.
    pub encoding: Option<String>,
    /// Log every frame written and received.
    #[serde(alias = "minaLogger")]
    pub trace_frames: bool,
    /// Level for "handler produced no reply" reports on consumers.
    pub no_reply_log_level: LogLevel,
    /// Level for consumer handler failures.
    pub handler_error_log_level: LogLevel,
    /// Behaviour when a session already has an outstanding request.
    pub busy_policy: BusyPolicy,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            sync: true,
            disconnect_on_no_reply: true,
            disconnect_after_complete: false,
            lazy_session_creation: true,
            encoding: None,
            trace_frames: false,
            no_reply_log_level: LogLevel::Warn,
            handler_error_log_level: LogLevel::Warn,
            busy_policy: BusyPolicy::Queue,
        }
    }
}

impl EndpointConfig {
    /// Effective request deadline, `None` when the timeout is zero.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }

    /// Set the request timeout. Zero means wait forever.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Select request/reply (`true`) or one-way (`false`) exchanges.
    #[must_use]
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Configure whether unanswered sessions are closed.
    #[must_use]
    pub fn with_disconnect_on_no_reply(mut self, enabled: bool) -> Self {
        self.disconnect_on_no_reply = enabled;
        self
    }

    /// Configure whether sessions are closed after each completed exchange.
    #[must_use]
    pub fn with_disconnect_after_complete(mut self, enabled: bool) -> Self {
        self.disconnect_after_complete = enabled;
        self
    }

    /// Configure lazy or eager session creation.
    #[must_use]
    pub fn with_lazy_session_creation(mut self, lazy: bool) -> Self {
        self.lazy_session_creation = lazy;
        self
    }

    /// Set the text encoding label.
    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Enable or disable per-frame logging.
    #[must_use]
    pub fn with_trace_frames(mut self, enabled: bool) -> Self {
        self.trace_frames = enabled;
        self
    }

    /// Set the level for consumer no-reply reports.
    #[must_use]
    pub fn with_no_reply_log_level(mut self, level: LogLevel) -> Self {
        self.no_reply_log_level = level;
        self
    }

    /// Set the level for consumer handler failures.
    #[must_use]
    pub fn with_handler_error_log_level(mut self, level: LogLevel) -> Self {
        self.handler_error_log_level = level;
        self
    }

    /// Choose how busy sessions are handled.
    #[must_use]
    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }
}

mod millis {
    //! Serialise [`Duration`] values as whole milliseconds.

    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EndpointConfig::default();
        assert_eq!(config.request_timeout(), Some(DEFAULT_TIMEOUT));
        assert!(config.sync);
        assert!(config.disconnect_on_no_reply);
        assert!(!config.disconnect_after_complete);
        assert!(config.lazy_session_creation);
        assert_eq!(config.busy_policy, BusyPolicy::Queue);
    }

    #[test]
    fn zero_timeout_is_infinite() {
        let config = EndpointConfig::default().with_timeout(Duration::ZERO);
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn deserialises_camel_case_and_aliases() {
        let json = r#"{
            "timeout": 250,
            "disconnect": true,
            "minaLogger": true,
            "disconnectOnNoReply": false,
            "noReplyLogLevel": "DEBUG",
            "busyPolicy": "reject"
        }"#;
        let config: EndpointConfig = serde_json::from_str(json).expect("valid config");
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert!(config.disconnect_after_complete);
        assert!(config.trace_frames);
        assert!(!config.disconnect_on_no_reply);
        assert_eq!(config.no_reply_log_level, LogLevel::Debug);
        assert_eq!(config.busy_policy, BusyPolicy::Reject);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn rejects_non_numeric_timeout() {
        let result = serde_json::from_str::<EndpointConfig>(r#"{"timeout": "soon"}"#);
        assert!(result.is_err());
    }

    #[rstest]
    #[case(LogLevel::Off, None)]
    #[case(LogLevel::Warn, Some(log::Level::Warn))]
    #[case(LogLevel::Trace, Some(log::Level::Trace))]
    fn log_level_mapping(#[case] level: LogLevel, #[case] expected: Option<log::Level>) {
        assert_eq!(level.to_level(), expected);
    }
}
