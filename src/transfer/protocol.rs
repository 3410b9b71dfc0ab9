//! Transfer wire codec
//!
//! `metadata` and `end` travel as JSON text envelopes:
//!
//! ```text
//! { "type": "metadata", "data": { "name": ..., "type": ..., "size": ... } }
//! { "type": "end" }
//! ```
//!
//! Chunks travel as raw binary messages. The legacy text form
//! `{ "type": "chunk", "data": [0-255, ...] }` is still decoded, and can be
//! produced with `ChunkFraming::LegacyJson` for older receivers.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::error::{Result, TransferError};
use super::types::{TransferMessage, TransferMetadata};

/// One message on the peer channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    Text(String),
    Binary(Bytes),
}

impl ChannelMessage {
    /// Payload length in bytes (what the channel buffers)
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How chunk payloads are framed on send
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChunkFraming {
    /// Raw binary message per chunk
    #[default]
    Binary,
    /// Text envelope with a decimal byte array
    LegacyJson,
}

#[derive(Serialize)]
struct OutgoingEnvelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

#[derive(Deserialize)]
struct IncomingEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a message for the channel
pub fn encode(message: &TransferMessage, framing: ChunkFraming) -> Result<ChannelMessage> {
    match message {
        TransferMessage::Metadata(metadata) => envelope(message.kind(), Some(metadata)),
        TransferMessage::Chunk(bytes) => match framing {
            ChunkFraming::Binary => Ok(ChannelMessage::Binary(bytes.clone())),
            ChunkFraming::LegacyJson => envelope(message.kind(), Some(bytes.as_ref())),
        },
        TransferMessage::End => envelope::<()>(message.kind(), None),
    }
}

fn envelope<T: Serialize>(kind: &str, data: Option<T>) -> Result<ChannelMessage> {
    serde_json::to_string(&OutgoingEnvelope { kind, data })
        .map(ChannelMessage::Text)
        .map_err(|e| TransferError::InvalidMessage(e.to_string()))
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a message received from the channel
pub fn decode(message: ChannelMessage) -> Result<TransferMessage> {
    let text = match message {
        ChannelMessage::Binary(bytes) => return Ok(TransferMessage::Chunk(bytes)),
        ChannelMessage::Text(text) => text,
    };

    let envelope: IncomingEnvelope = serde_json::from_str(&text)
        .map_err(|e| TransferError::InvalidMessage(e.to_string()))?;

    match envelope.kind.as_str() {
        "metadata" => serde_json::from_value::<TransferMetadata>(envelope.data)
            .map(TransferMessage::Metadata)
            .map_err(|e| TransferError::InvalidMessage(format!("bad metadata: {}", e))),
        "chunk" => decode_byte_array(&envelope.data).map(TransferMessage::Chunk),
        "end" => Ok(TransferMessage::End),
        other => Err(TransferError::InvalidMessage(format!(
            "unknown message type: {}",
            other
        ))),
    }
}

/// Decode a JSON array of 0-255 integers
fn decode_byte_array(value: &serde_json::Value) -> Result<Bytes> {
    let items = value
        .as_array()
        .ok_or_else(|| TransferError::MalformedChunk("payload is not a byte array".to_string()))?;

    let mut bytes = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let byte = item
            .as_u64()
            .filter(|b| *b <= u8::MAX as u64)
            .ok_or_else(|| {
                TransferError::MalformedChunk(format!("invalid byte {} at index {}", item, index))
            })?;
        bytes.push(byte as u8);
    }

    Ok(Bytes::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> ChannelMessage {
        ChannelMessage::Text(s.to_string())
    }

    #[test]
    fn test_metadata_envelope_shape() {
        let message = TransferMessage::Metadata(TransferMetadata::new("a.txt", "text/plain", 5));
        let encoded = encode(&message, ChunkFraming::Binary).unwrap();

        let ChannelMessage::Text(json) = &encoded else {
            panic!("metadata must be text");
        };
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "metadata", "data": {"name": "a.txt", "type": "text/plain", "size": 5}})
        );
        assert_eq!(decode(encoded).unwrap(), message);
    }

    #[test]
    fn test_end_envelope_shape() {
        assert_eq!(
            encode(&TransferMessage::End, ChunkFraming::Binary).unwrap(),
            text(r#"{"type":"end"}"#)
        );
        assert_eq!(decode(text(r#"{"type":"end"}"#)).unwrap(), TransferMessage::End);
    }

    #[test]
    fn test_binary_chunk() {
        let payload = Bytes::from_static(b"hello");
        let encoded = encode(&TransferMessage::Chunk(payload.clone()), ChunkFraming::Binary).unwrap();

        assert_eq!(encoded, ChannelMessage::Binary(payload.clone()));
        assert_eq!(decode(encoded).unwrap(), TransferMessage::Chunk(payload));
    }

    #[test]
    fn test_legacy_chunk() {
        let encoded = encode(
            &TransferMessage::Chunk(Bytes::from_static(&[104, 105])),
            ChunkFraming::LegacyJson,
        )
        .unwrap();

        assert_eq!(encoded, text(r#"{"type":"chunk","data":[104,105]}"#));
        assert_eq!(
            decode(text(r#"{"type":"chunk","data":[108,108,111]}"#)).unwrap(),
            TransferMessage::Chunk(Bytes::from_static(b"llo"))
        );
    }

    #[test]
    fn test_malformed_chunks() {
        for bad in [
            r#"{"type":"chunk","data":"aGVsbG8="}"#,
            r#"{"type":"chunk","data":[1,256]}"#,
            r#"{"type":"chunk","data":[1,-1]}"#,
            r#"{"type":"chunk","data":[1.5]}"#,
            r#"{"type":"chunk"}"#,
        ] {
            assert!(
                matches!(decode(text(bad)), Err(TransferError::MalformedChunk(_))),
                "expected malformed chunk for {}",
                bad
            );
        }
    }

    #[test]
    fn test_invalid_messages() {
        for bad in [
            "not json",
            r#"{"type":"bogus"}"#,
            r#"{"type":"metadata","data":{"name":"x"}}"#,
        ] {
            assert!(matches!(decode(text(bad)), Err(TransferError::InvalidMessage(_))));
        }
    }
}
