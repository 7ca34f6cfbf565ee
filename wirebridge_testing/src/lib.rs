//! Test helpers for `wirebridge`.
//!
//! - [`SleepyConsumer`] serves the "sleep N ms, then reply" protocol used by
//!   the timing scenarios;
//! - [`spawn_peer`] runs a scripted raw TCP peer on a plain thread;
//! - [`logger`] and [`io_pool`] are `rstest` fixtures.

mod logging;
mod peer;
mod sleepy;

use rstest::fixture;
use wirebridge::IoPool;

pub use logging::{LoggerHandle, logger};
pub use peer::{read_line, spawn_peer};
pub use sleepy::{SleepyConsumer, sleepy_reply};

/// A two-thread I/O pool owned by the test.
#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn io_pool() -> IoPool { IoPool::new(2).expect("build I/O pool") }
