//! Frame Codec
//!
//! Turns wire frames into [`ServerMessage`]s and outbound messages into
//! frames.
//!
//! - **Text frames**: one JSON object, or a JSON array of objects
//! - **Binary frames**: gzip-compressed JSON; payloads without the gzip magic
//!   bytes are read as raw UTF-8 JSON
//!
//! Each element of an array is decoded independently, so a malformed
//! element only drops itself.

use std::sync::Arc;

use serde_json::Value;

use super::compression::{CompressionError, Compressor, is_gzip};
use super::messages::{ClientMessage, Envelope, ServerMessage};
use crate::application::ports::Frame;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary payload could not be decompressed.
    #[error("decompression error: {0}")]
    Compression(#[from] CompressionError),

    /// Raw binary payload is not UTF-8.
    #[error("invalid UTF-8 payload: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// A message element is not a JSON object.
    #[error("message is not a JSON object")]
    NotAnObject,

    /// A data update has neither `key` nor `symbol`.
    #[error("data update has no key or symbol")]
    MissingKey,
}

/// Messages decoded from one frame.
#[derive(Debug, Default)]
pub struct DecodedFrame {
    /// Well-formed messages in frame order.
    pub messages: Vec<ServerMessage>,
    /// Elements that were dropped.
    pub rejected: Vec<CodecError>,
}

/// JSON frame codec with optional compression.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    compressor: Arc<dyn Compressor>,
    token: Option<String>,
}

impl FrameCodec {
    /// Create a codec. `token` is attached to every control message.
    #[must_use]
    pub fn new(compressor: Arc<dyn Compressor>, token: Option<String>) -> Self {
        Self { compressor, token }
    }

    /// Encode a control message as a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_control(&self, message: &ClientMessage) -> Result<Frame, CodecError> {
        let envelope = Envelope::new(message, self.token.as_deref());
        Ok(Frame::Text(serde_json::to_string(&envelope)?))
    }

    /// Encode a caller payload, compressing it into a binary frame when the
    /// compressor accepts it.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_payload(&self, payload: &Value) -> Result<Frame, CodecError> {
        let text = serde_json::to_string(payload)?;

        if self.compressor.is_available()
            && let Some(compressed) = self.compressor.compress(text.as_bytes())
        {
            return Ok(Frame::Binary(compressed));
        }

        Ok(Frame::Text(text))
    }

    /// Decode a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the whole frame is unusable (bad compression,
    /// invalid JSON). Per-element problems are reported in
    /// [`DecodedFrame::rejected`] instead.
    pub fn decode(&self, frame: &Frame) -> Result<DecodedFrame, CodecError> {
        match frame {
            Frame::Text(text) => Self::decode_text(text),
            Frame::Binary(bytes) if is_gzip(bytes) => {
                let inflated = self.compressor.decompress(bytes)?;
                Self::decode_text(std::str::from_utf8(&inflated)?)
            }
            Frame::Binary(bytes) => Self::decode_text(std::str::from_utf8(bytes)?),
        }
    }

    fn decode_text(text: &str) -> Result<DecodedFrame, CodecError> {
        let value: Value = serde_json::from_str(text.trim())?;
        let mut decoded = DecodedFrame::default();

        let elements = match value {
            Value::Array(items) => items,
            other => vec![other],
        };

        for element in elements {
            match ServerMessage::from_value(element) {
                Ok(message) => decoded.messages.push(message),
                Err(e) => decoded.rejected.push(e),
            }
        }

        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::infrastructure::stream::compression::{GzipCompressor, NoopCompressor};

    fn gzip_codec() -> FrameCodec {
        FrameCodec::new(Arc::new(GzipCompressor::default()), None)
    }

    #[test]
    fn control_frames_are_text_with_token() {
        let codec = FrameCodec::new(Arc::new(GzipCompressor::new(0)), Some("t0k".into()));

        let frame = codec
            .encode_control(&ClientMessage::Subscribe {
                keys: vec!["AAPL".into()],
            })
            .unwrap();

        let Frame::Text(text) = frame else {
            panic!("control frames must be text");
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"type": "subscribe", "keys": ["AAPL"], "token": "t0k"})
        );
    }

    #[test]
    fn small_payload_is_text() {
        let frame = gzip_codec()
            .encode_payload(&json!({"type": "order", "qty": 1}))
            .unwrap();

        assert!(matches!(frame, Frame::Text(_)));
    }

    #[test]
    fn large_payload_is_compressed_and_decodable() {
        let codec = gzip_codec();
        let payload = json!({"key": "AAPL", "note": "x".repeat(4096)});

        let frame = codec.encode_payload(&payload).unwrap();

        assert!(matches!(&frame, Frame::Binary(bytes) if is_gzip(bytes)));
        let decoded = codec.decode(&frame).unwrap();
        assert_eq!(decoded.messages.len(), 1);
    }

    #[test]
    fn noop_compressor_always_sends_text() {
        let codec = FrameCodec::new(Arc::new(NoopCompressor), None);

        let frame = codec
            .encode_payload(&json!({"note": "x".repeat(4096)}))
            .unwrap();

        assert!(matches!(frame, Frame::Text(_)));
    }

    #[test]
    fn decodes_array_and_drops_bad_elements() {
        let frame = Frame::Text(
            r#"[{"key":"AAPL","price":1},{"price":2},{"type":"pong","timestamp":5}]"#.into(),
        );

        let decoded = gzip_codec().decode(&frame).unwrap();

        assert_eq!(decoded.messages.len(), 2);
        assert_eq!(decoded.rejected.len(), 1);
        assert!(matches!(
            decoded.messages[1],
            ServerMessage::Pong { timestamp: Some(5) }
        ));
    }

    #[test]
    fn raw_binary_json_is_accepted() {
        let frame = Frame::Binary(br#"{"symbol":"MSFT","price":3}"#.to_vec());

        let decoded = gzip_codec().decode(&frame).unwrap();

        assert_eq!(decoded.messages.len(), 1);
    }

    #[test]
    fn corrupt_gzip_drops_frame() {
        let frame = Frame::Binary(vec![0x1f, 0x8b, 0x08, 0x00, 0xde, 0xad]);

        assert!(matches!(
            gzip_codec().decode(&frame),
            Err(CodecError::Compression(_))
        ));
    }

    #[test]
    fn invalid_json_drops_frame() {
        assert!(matches!(
            gzip_codec().decode(&Frame::Text("{not json".into())),
            Err(CodecError::Json(_))
        ));
    }
}
