//! Framed codec for native-messaging streams.
//!
//! Uses LengthDelimitedCodec for framing (4-byte length, native byte order, as
//! browsers expect) + serde_json for serialization. Works over any
//! AsyncRead/AsyncWrite (stdio pipes, unix sockets, in-memory duplex).

use std::io;
use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Default upper bound on a single frame (browsers cap host-bound messages at 64 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

/// Errors produced while turning bytes into messages or back.
///
/// Framing and schema errors are fatal to the connection: once a frame has been
/// misread the byte alignment of the stream cannot be recovered.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Stream ended mid-frame, frame too long, or bytes are not JSON.
    #[error("framing error: {0}")]
    Framing(String),

    /// Frame is valid JSON but does not have the expected shape.
    #[error("schema error: {0}")]
    Schema(String),

    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// True when the error came from the stream rather than from the bytes on it.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Codec that frames messages with a length prefix and serializes with JSON.
///
/// Wraps LengthDelimitedCodec and adds serde_json serialization. Decoding goes
/// through `serde_json::Value` first so that malformed JSON (framing) and a
/// well-formed frame of the wrong shape (schema) are reported separately.
pub struct JsonCodec<T> {
    inner: LengthDelimitedCodec,
    _phantom: PhantomData<T>,
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self::with_max_frame_length(DEFAULT_MAX_FRAME_LENGTH)
    }

    pub fn with_max_frame_length(max_frame_length: usize) -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(4)
                .native_endian()
                .max_frame_length(max_frame_length)
                .new_codec(),
            _phantom: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Decoder for JsonCodec<T> {
    type Item = T;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let bytes = match self.inner.decode(src) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(None),
            Err(e) => return Err(CodecError::Framing(e.to_string())),
        };

        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| CodecError::Framing(e.to_string()))?;
        let item = serde_json::from_value(value).map_err(|e| CodecError::Schema(e.to_string()))?;
        Ok(Some(item))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None if src.is_empty() => Ok(None),
            None => Err(CodecError::Framing(format!(
                "stream ended mid-frame ({} bytes buffered)",
                src.len()
            ))),
        }
    }
}

impl<T: Serialize> Encoder<T> for JsonCodec<T> {
    type Error = CodecError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item).map_err(|e| CodecError::Schema(e.to_string()))?;
        let json_len = json.len();
        tracing::trace!(json_size_bytes = json_len, "Encoding frame");
        if json_len > 1024 * 1024 {
            tracing::info!(
                json_size_bytes = json_len,
                json_size_kb = json_len / 1024,
                "Large frame being encoded"
            );
        }
        self.inner
            .encode(Bytes::from(json), dst)
            .map_err(|e| CodecError::Framing(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::{Envelope, Request, RequestId};
    use serde_json::json;

    fn frame(body: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&(body.len() as u32).to_ne_bytes());
        buf.extend_from_slice(body);
        buf
    }

    #[test]
    fn codec_roundtrip_request_envelope() {
        let mut codec = JsonCodec::<Envelope>::new();
        let mut buf = BytesMut::new();

        let req = Request::new(
            RequestId::from("42"),
            "tab.pin",
            json!({"tabIds": [1, 2]}).as_object().cloned().unwrap(),
        );
        codec.encode(Envelope::from(req), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        let req = decoded.into_request().unwrap();
        assert_eq!(req.id.as_str(), "42");
        assert_eq!(req.command, "tab.pin");
        assert_eq!(req.args["tabIds"], json!([1, 2]));
        assert!(buf.is_empty());
    }

    #[test]
    fn length_prefix_is_native_endian() {
        let mut codec = JsonCodec::<serde_json::Value>::new();
        let mut buf = BytesMut::new();
        codec.encode(json!({"id": "1"}), &mut buf).unwrap();

        let body = br#"{"id":"1"}"#;
        assert_eq!(&buf[..4], &(body.len() as u32).to_ne_bytes());
        assert_eq!(&buf[4..], body);
    }

    #[test]
    fn partial_frame_is_buffered_until_complete() {
        let mut codec = JsonCodec::<Envelope>::new();
        let full = frame(br#"{"id":"7","payload":{"command":"tab.list"}}"#);

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&full[..3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&full[3..20]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&full[20..]);

        let env = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(env.id.as_str(), "7");
        assert!(buf.is_empty());
    }

    #[test]
    fn consumes_exactly_one_frame_per_decode() {
        let mut codec = JsonCodec::<Envelope>::new();
        let mut buf = frame(br#"{"id":"a","payload":1}"#);
        buf.extend_from_slice(&frame(br#"{"id":"b","error":"nope"}"#));

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.id.as_str(), "a");
        assert!(!buf.is_empty());

        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.id.as_str(), "b");
        assert_eq!(second.error.as_deref(), Some("nope"));
        assert!(buf.is_empty());
    }

    #[test]
    fn eof_mid_frame_is_framing_error() {
        let mut codec = JsonCodec::<Envelope>::new();
        let full = frame(br#"{"id":"1","payload":null}"#);
        let mut buf = BytesMut::from(&full[..full.len() - 2]);

        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::Framing(_)), "got {err:?}");
    }

    #[test]
    fn clean_eof_yields_none() {
        let mut codec = JsonCodec::<Envelope>::new();
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn invalid_json_is_framing_error() {
        let mut codec = JsonCodec::<Envelope>::new();
        let mut buf = frame(b"{not json");

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::Framing(_)), "got {err:?}");
    }

    #[test]
    fn wrong_shape_is_schema_error() {
        let mut codec = JsonCodec::<Envelope>::new();
        let mut buf = frame(br#"{"payload":{"command":"tab.list"}}"#);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::Schema(_)), "got {err:?}");
    }

    #[test]
    fn oversized_frame_is_framing_error() {
        let mut codec = JsonCodec::<Envelope>::with_max_frame_length(16);
        let mut buf = frame(br#"{"id":"1","payload":"this is far too long"}"#);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::Framing(_)), "got {err:?}");
    }
}
