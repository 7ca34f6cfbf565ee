//! Length-prefixed binary frames.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use super::{Codec, clamp_frame_length};

/// Codec using `tokio_util`'s [`LengthDelimitedCodec`].
///
/// Frames are prefixed with a 4-byte big-endian length. Frames longer than
/// the configured maximum are rejected with [`io::ErrorKind::InvalidData`].
///
/// # Examples
///
/// ```
/// use wirebridge::codec::LengthPrefixedCodec;
///
/// let codec = LengthPrefixedCodec::new(2048);
/// assert_eq!(codec.max_frame_length(), 2048);
/// ```
#[derive(Clone, Debug)]
pub struct LengthPrefixedCodec {
    max_frame_length: usize,
}

impl LengthPrefixedCodec {
    /// Construct a codec with a maximum frame length.
    ///
    /// The value is clamped to
    /// [`MIN_FRAME_LENGTH`](super::MIN_FRAME_LENGTH)..=[`MAX_FRAME_LENGTH`](super::MAX_FRAME_LENGTH).
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: clamp_frame_length(max_frame_length),
        }
    }

    /// Return the maximum frame length accepted by this codec.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }

    fn inner(&self) -> LengthDelimitedCodec {
        LengthDelimitedCodec::builder()
            .max_frame_length(self.max_frame_length)
            .new_codec()
    }
}

impl Default for LengthPrefixedCodec {
    fn default() -> Self {
        Self {
            max_frame_length: 1024,
        }
    }
}

#[doc(hidden)]
pub struct LengthPrefixedDecoder {
    inner: LengthDelimitedCodec,
}

impl Decoder for LengthPrefixedDecoder {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.inner.decode(src).map(|frame| frame.map(BytesMut::freeze))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A clean close lands on a frame boundary.
        if src.is_empty() {
            return Ok(None);
        }
        match self.inner.decode_eof(src) {
            Ok(Some(frame)) => Ok(Some(frame.freeze())),
            Ok(None) => Err(truncated(src.len())),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => Err(e),
            Err(_) => Err(truncated(src.len())),
        }
    }
}

fn truncated(received: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("connection closed mid-frame after {received} bytes"),
    )
}

#[doc(hidden)]
pub struct LengthPrefixedEncoder {
    inner: LengthDelimitedCodec,
}

impl Encoder<Bytes> for LengthPrefixedEncoder {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner.encode(item, dst)
    }
}

impl Codec for LengthPrefixedCodec {
    type Frame = Bytes;
    type Decoder = LengthPrefixedDecoder;
    type Encoder = LengthPrefixedEncoder;

    fn decoder(&self) -> Self::Decoder {
        LengthPrefixedDecoder {
            inner: self.inner(),
        }
    }

    fn encoder(&self) -> Self::Encoder {
        LengthPrefixedEncoder {
            inner: self.inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_big_endian_prefix() {
        let mut encoder = LengthPrefixedCodec::default().encoder();
        let mut buf = BytesMut::new();
        encoder
            .encode(Bytes::from_static(b"ping"), &mut buf)
            .expect("encode frame");
        assert_eq!(&buf[..], &[0, 0, 0, 4, b'p', b'i', b'n', b'g']);
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let mut decoder = LengthPrefixedCodec::default().decoder();
        let mut buf = BytesMut::from(&[0_u8, 0, 0, 4, b'p', b'i'][..]);
        assert!(decoder.decode(&mut buf).expect("decode").is_none());
        buf.extend_from_slice(b"ng");
        let frame = decoder.decode(&mut buf).expect("decode").expect("frame");
        assert_eq!(&frame[..], b"ping");
    }

    #[test]
    fn eof_mid_frame_is_an_error() {
        let mut decoder = LengthPrefixedCodec::default().decoder();
        let mut buf = BytesMut::from(&[0_u8, 0, 0, 9, b'x'][..]);
        let err = decoder.decode_eof(&mut buf).expect_err("truncated frame");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn oversized_frame_is_invalid_data() {
        let mut decoder = LengthPrefixedCodec::new(64).decoder();
        let mut buf = BytesMut::from(&[0_u8, 0, 1, 0][..]);
        let err = decoder.decode(&mut buf).expect_err("oversized frame");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
