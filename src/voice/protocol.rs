//! Wire protocol for the voice streaming WebSocket.
//!
//! Every message is a JSON object with exactly one top-level key naming the
//! message kind. Both directions are modeled as closed enums so an unhandled
//! kind is a compile-time gap, not a silent runtime no-op; the only dynamic
//! escape hatch is [`decode_frame`], which drops frames that do not parse
//! (keepalives and other protocol noise).

use base64::Engine;
use serde::{Deserialize, Serialize};

// ── Transcript segments ────────────────────────────────────────────

/// One finalized or provisional piece of transcript.
///
/// Immutable once received. Concluded segments are appended in arrival
/// order and never reordered or deduplicated by content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    #[serde(rename = "startTime")]
    pub start_time: f64,
    #[serde(rename = "endTime")]
    pub end_time: f64,
    /// Per-segment language tag; carried on source segments in auto-detect
    /// mode, usually absent on target segments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

// ── Client → server messages ──────────────────────────────────────

/// Messages sent from the client to the streaming endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    /// One chunk of source audio, base64-encoded.
    SourceMediaChunk { data: String },
    /// The audio source is exhausted; the server should flush and finish.
    EndOfSourceMedia {},
}

impl ClientMessage {
    /// Wrap raw audio bytes into a `source_media_chunk` message.
    pub fn media_chunk(audio: &[u8]) -> Self {
        Self::SourceMediaChunk {
            data: base64::engine::general_purpose::STANDARD.encode(audio),
        }
    }
}

// ── Server → client messages ──────────────────────────────────────

/// A transcript update batch: finalized segments plus the current
/// provisional tail. Tentative text is display-only and never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptUpdate {
    /// Language of the update. On source updates this reflects detection
    /// (may change over the session in auto-detect mode); on target updates
    /// it names the target transcript to fold into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub concluded: Vec<TranscriptSegment>,
    #[serde(default)]
    pub tentative: Vec<TranscriptSegment>,
}

/// Messages received from the streaming endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMessage {
    SourceTranscriptUpdate(TranscriptUpdate),
    TargetTranscriptUpdate(TranscriptUpdate),
    EndOfSourceTranscript {},
    EndOfTargetTranscript {
        language: String,
    },
    /// Terminal success marker — the only path to a session result.
    EndOfStream {},
    Error {
        #[serde(rename = "requestType", default)]
        request_type: Option<String>,
        #[serde(rename = "errorCode", default)]
        error_code: Option<String>,
        #[serde(rename = "reasonCode", default)]
        reason_code: Option<String>,
        #[serde(rename = "errorMessage", default)]
        error_message: Option<String>,
    },
}

/// Decode one inbound text frame. `None` means protocol noise — the caller
/// drops the frame without treating it as an error.
pub fn decode_frame(raw: &str) -> Option<ServerMessage> {
    serde_json::from_str(raw).ok()
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_chunk_encodes_base64() {
        let msg = ClientMessage::media_chunk(&[0u8, 1, 2, 3]);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("source_media_chunk"));

        let ClientMessage::SourceMediaChunk { data } = &msg else {
            panic!("wrong variant");
        };
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(data)
            .unwrap();
        assert_eq!(decoded, [0u8, 1, 2, 3]);
    }

    #[test]
    fn end_of_source_media_is_single_key_object() {
        let json = serde_json::to_string(&ClientMessage::EndOfSourceMedia {}).unwrap();
        assert_eq!(json, r#"{"end_of_source_media":{}}"#);
    }

    #[test]
    fn decode_source_update() {
        let raw = r#"{"source_transcript_update":{"language":"en","concluded":[{"text":"hello","startTime":0.0,"endTime":0.8}],"tentative":[{"text":"wor","startTime":0.8,"endTime":1.1}]}}"#;
        let msg = decode_frame(raw).unwrap();
        let ServerMessage::SourceTranscriptUpdate(update) = msg else {
            panic!("wrong variant");
        };
        assert_eq!(update.language.as_deref(), Some("en"));
        assert_eq!(update.concluded.len(), 1);
        assert_eq!(update.concluded[0].text, "hello");
        assert_eq!(update.tentative.len(), 1);
    }

    #[test]
    fn decode_target_update() {
        let raw = r#"{"target_transcript_update":{"language":"de","concluded":[{"text":"hallo","startTime":0.0,"endTime":0.8}],"tentative":[]}}"#;
        let msg = decode_frame(raw).unwrap();
        assert!(matches!(
            msg,
            ServerMessage::TargetTranscriptUpdate(TranscriptUpdate { language: Some(ref l), .. }) if l == "de"
        ));
    }

    #[test]
    fn decode_end_of_stream() {
        let msg = decode_frame(r#"{"end_of_stream":{}}"#).unwrap();
        assert!(matches!(msg, ServerMessage::EndOfStream {}));
    }

    #[test]
    fn decode_error_message() {
        let raw = r#"{"error":{"requestType":"stream","errorCode":"quota_exceeded","reasonCode":"plan","errorMessage":"limit reached"}}"#;
        let msg = decode_frame(raw).unwrap();
        let ServerMessage::Error {
            error_code,
            error_message,
            ..
        } = msg
        else {
            panic!("wrong variant");
        };
        assert_eq!(error_code.as_deref(), Some("quota_exceeded"));
        assert_eq!(error_message.as_deref(), Some("limit reached"));
    }

    #[test]
    fn decode_noise_returns_none() {
        assert!(decode_frame("not json at all").is_none());
        assert!(decode_frame(r#"{"keepalive":{}}"#).is_none());
        assert!(decode_frame("{}").is_none());
    }

    #[test]
    fn update_fields_default_when_absent() {
        let raw = r#"{"target_transcript_update":{"language":"fr"}}"#;
        let msg = decode_frame(raw).unwrap();
        let ServerMessage::TargetTranscriptUpdate(update) = msg else {
            panic!("wrong variant");
        };
        assert!(update.concluded.is_empty());
        assert!(update.tentative.is_empty());
    }
}
