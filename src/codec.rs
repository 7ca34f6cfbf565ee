//! Pluggable framing codecs.
//!
//! A [`Codec`] turns the raw byte stream of a session into application
//! frames and back. The bridge never looks inside a frame; it only needs a
//! Tokio decoder for the reader task and an encoder for the writer task.
//!
//! Two codecs ship with the crate: [`TextLineCodec`] for delimiter-terminated
//! text and [`LengthPrefixedCodec`] for 4-byte big-endian length-prefixed
//! binary frames.

use std::{fmt, io};

use tokio_util::codec::{Decoder, Encoder};

mod length_prefixed;
mod text_line;

pub use length_prefixed::LengthPrefixedCodec;
pub use text_line::{TextLineCodec, TextLineDelimiter};

/// Minimum frame length in bytes.
pub const MIN_FRAME_LENGTH: usize = 64;

/// Maximum frame length in bytes (16 MiB).
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

/// Trait for frame codecs consumed by sessions and consumers.
///
/// Implementors pick their own `Frame` type and hand out fresh decoder and
/// encoder instances for every session, so codec state is never shared
/// between connections.
pub trait Codec: Send + Sync + Clone + 'static {
    /// Frame type produced by decoding and accepted for encoding.
    type Frame: fmt::Debug + Send + 'static;
    /// Decoder type for this codec.
    type Decoder: Decoder<Item = Self::Frame, Error = io::Error> + Send + Unpin + 'static;
    /// Encoder type for this codec.
    type Encoder: Encoder<Self::Frame, Error = io::Error> + Send + Unpin + 'static;

    /// Create a Tokio decoder for one session.
    fn decoder(&self) -> Self::Decoder;

    /// Create a Tokio encoder for one session.
    fn encoder(&self) -> Self::Encoder;
}
