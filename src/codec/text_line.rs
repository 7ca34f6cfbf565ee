//! Delimiter-terminated text frames.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, Encoder};

use super::Codec;
use crate::{config::EndpointConfig, error::BridgeError};

/// Delimiter terminating each text frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextLineDelimiter {
    /// `\n`; a preceding `\r` is stripped on decode.
    #[default]
    Line,
    /// A single NUL byte.
    Null,
}

impl TextLineDelimiter {
    const fn byte(self) -> u8 {
        match self {
            Self::Line => b'\n',
            Self::Null => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Charset {
    Utf8,
    Ascii,
}

/// Codec producing one `String` frame per delimited line.
///
/// # Examples
///
/// ```
/// use wirebridge::codec::{TextLineCodec, TextLineDelimiter};
///
/// let codec = TextLineCodec::new()
///     .delimiter(TextLineDelimiter::Null)
///     .max_line_length(512);
/// assert_eq!(codec.max_line_length_value(), 512);
/// assert!(TextLineCodec::for_encoding(Some("US-ASCII")).is_ok());
/// assert!(TextLineCodec::for_encoding(Some("EBCDIC")).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct TextLineCodec {
    delimiter: TextLineDelimiter,
    max_line_length: usize,
    charset: Charset,
}

impl Default for TextLineCodec {
    fn default() -> Self { Self::new() }
}

impl TextLineCodec {
    /// Line-delimited UTF-8 codec with a 1024 byte line limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            delimiter: TextLineDelimiter::Line,
            max_line_length: 1024,
            charset: Charset::Utf8,
        }
    }

    /// Build a codec for an encoding label such as `"UTF-8"` or `"US-ASCII"`.
    ///
    /// `None` selects UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnsupportedEncoding`] for any other label.
    pub fn for_encoding(label: Option<&str>) -> Result<Self, BridgeError> {
        let charset = match label.map(str::to_ascii_lowercase).as_deref() {
            None | Some("utf-8" | "utf8") => Charset::Utf8,
            Some("us-ascii" | "ascii") => Charset::Ascii,
            Some(_) => {
                return Err(BridgeError::UnsupportedEncoding(
                    label.unwrap_or_default().to_owned(),
                ));
            }
        };
        Ok(Self {
            charset,
            ..Self::new()
        })
    }

    /// Build a codec for the endpoint's configured encoding.
    ///
    /// # Errors
    ///
    /// See [`for_encoding`](Self::for_encoding).
    pub fn from_config(config: &EndpointConfig) -> Result<Self, BridgeError> {
        Self::for_encoding(config.encoding.as_deref())
    }

    /// Select the frame delimiter.
    #[must_use]
    pub fn delimiter(mut self, delimiter: TextLineDelimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the maximum accepted line length in bytes.
    #[must_use]
    pub fn max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max.max(1);
        self
    }

    /// Return the configured maximum line length.
    #[must_use]
    pub fn max_line_length_value(&self) -> usize { self.max_line_length }

    fn inner(&self) -> AnyDelimiterCodec {
        let delimiter = vec![self.delimiter.byte()];
        AnyDelimiterCodec::new_with_max_length(delimiter.clone(), delimiter, self.max_line_length)
    }
}

fn codec_error(err: AnyDelimiterCodecError) -> io::Error {
    match err {
        AnyDelimiterCodecError::Io(e) => e,
        AnyDelimiterCodecError::MaxChunkLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidData, "line exceeds maximum length")
        }
    }
}

#[doc(hidden)]
pub struct TextLineDecoder {
    inner: AnyDelimiterCodec,
    delimiter: TextLineDelimiter,
    charset: Charset,
}

impl TextLineDecoder {
    fn to_text(&self, chunk: Bytes) -> io::Result<String> {
        let mut bytes = chunk.as_ref();
        if self.delimiter == TextLineDelimiter::Line
            && let Some(stripped) = bytes.strip_suffix(b"\r")
        {
            bytes = stripped;
        }
        if self.charset == Charset::Ascii && !bytes.is_ascii() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "non-ASCII byte in US-ASCII frame",
            ));
        }
        String::from_utf8(bytes.to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl Decoder for TextLineDecoder {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src).map_err(codec_error)? {
            Some(chunk) => self.to_text(chunk).map(Some),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode_eof(src).map_err(codec_error)? {
            Some(chunk) => self.to_text(chunk).map(Some),
            None => Ok(None),
        }
    }
}

#[doc(hidden)]
pub struct TextLineEncoder {
    inner: AnyDelimiterCodec,
    charset: Charset,
}

impl Encoder<String> for TextLineEncoder {
    type Error = io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.charset == Charset::Ascii && !item.is_ascii() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "non-ASCII character in US-ASCII frame",
            ));
        }
        self.inner.encode(item, dst).map_err(codec_error)
    }
}

impl Codec for TextLineCodec {
    type Frame = String;
    type Decoder = TextLineDecoder;
    type Encoder = TextLineEncoder;

    fn decoder(&self) -> Self::Decoder {
        TextLineDecoder {
            inner: self.inner(),
            delimiter: self.delimiter,
            charset: self.charset,
        }
    }

    fn encoder(&self) -> Self::Encoder {
        TextLineEncoder {
            inner: self.inner(),
            charset: self.charset,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(TextLineDelimiter::Line, b"Slept 150 ms\r\nnext\n", "Slept 150 ms")]
    #[case(TextLineDelimiter::Null, b"hello\0rest", "hello")]
    fn decodes_first_line(
        #[case] delimiter: TextLineDelimiter,
        #[case] input: &[u8],
        #[case] expected: &str,
    ) {
        let mut decoder = TextLineCodec::new().delimiter(delimiter).decoder();
        let mut buf = BytesMut::from(input);
        let line = decoder.decode(&mut buf).expect("decode").expect("line");
        assert_eq!(line, expected);
    }

    #[test]
    fn encoder_appends_delimiter() {
        let mut encoder = TextLineCodec::new().encoder();
        let mut buf = BytesMut::new();
        encoder.encode("400".to_owned(), &mut buf).expect("encode");
        assert_eq!(&buf[..], b"400\n");
    }

    #[test]
    fn invalid_utf8_is_invalid_data() {
        let mut decoder = TextLineCodec::new().decoder();
        let mut buf = BytesMut::from(&[0xff_u8, 0xfe, b'\n'][..]);
        let err = decoder.decode(&mut buf).expect_err("invalid utf-8");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn ascii_codec_rejects_non_ascii_output() {
        let codec = TextLineCodec::for_encoding(Some("us-ascii")).expect("ascii codec");
        let mut buf = BytesMut::new();
        let err = codec
            .encoder()
            .encode("caf\u{e9}".to_owned(), &mut buf)
            .expect_err("non-ascii");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn overlong_line_is_invalid_data() {
        let mut decoder = TextLineCodec::new().max_line_length(4).decoder();
        let mut buf = BytesMut::from(&b"abcdefgh\n"[..]);
        let err = decoder.decode(&mut buf).expect_err("line too long");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
