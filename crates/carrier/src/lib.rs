//! Carrier media-stream protocol
//!
//! The carrier speaks JSON frames over a WebSocket, each tagged with an
//! `event` field. Inbound frames are parsed into [`CarrierEvent`]; outbound
//! `media`/`mark` frames are built with the free functions at the bottom.
//!
//! Wire conventions: field names are camelCase, `sequenceNumber` is a
//! string-encoded decimal, and `media.payload` is base64 of 16-bit signed
//! little-endian mono PCM at the session sample rate.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;

/// Name of the synchronization mark emitted after a completed reply
pub const REPLY_DONE_MARK: &str = "assistant_reply_done";

/// Carrier protocol errors
#[derive(Error, Debug)]
pub enum CarrierError {
    #[error("Unparseable frame: {0}")]
    Parse(String),

    #[error("Invalid media payload: {0}")]
    Payload(String),
}

/// `media` payload of an inbound frame
#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    /// Base64-encoded PCM
    pub payload: String,
    /// `inbound` (caller audio) or `outbound` (echo of our own audio)
    #[serde(default)]
    pub track: Option<String>,
}

impl MediaPayload {
    /// Echoed copies of our own outbound audio must be discarded
    pub fn is_outbound_echo(&self) -> bool {
        self.track.as_deref() == Some("outbound")
    }

    /// Decode the base64 payload into raw PCM bytes
    pub fn decode(&self) -> Result<Vec<u8>, CarrierError> {
        BASE64
            .decode(&self.payload)
            .map_err(|e| CarrierError::Payload(e.to_string()))
    }
}

/// `start` payload carrying the stream identity and caller-supplied parameters
#[derive(Debug, Clone, Deserialize)]
pub struct StartPayload {
    #[serde(rename = "streamSid", default)]
    pub stream_sid: Option<String>,
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "customParameters", default)]
    pub custom_parameters: Option<HashMap<String, String>>,
}

/// `stop` payload
#[derive(Debug, Clone, Deserialize)]
pub struct StopPayload {
    #[serde(default)]
    pub reason: Option<String>,
}

/// `mark` payload
#[derive(Debug, Clone, Deserialize)]
pub struct MarkPayload {
    pub name: String,
}

/// One inbound carrier frame
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CarrierEvent {
    /// Transport established; may already carry the stream identity
    Connected {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        #[serde(rename = "customParameters", default)]
        custom_parameters: Option<HashMap<String, String>>,
    },
    /// Call started
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        #[serde(default)]
        start: Option<StartPayload>,
    },
    /// Caller (or echoed) audio
    Media {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        media: MediaPayload,
    },
    /// Call terminating
    Stop {
        #[serde(default)]
        stop: Option<StopPayload>,
    },
    /// Synchronization marker echoed back by the carrier
    Mark {
        #[serde(default)]
        mark: Option<MarkPayload>,
    },
    /// Barge-in: discard queued outbound audio, stop speaking
    Clear,
    /// Any event name this adapter does not know
    #[serde(other)]
    Unknown,
}

impl CarrierEvent {
    /// Stream identity carried by this frame, wherever the carrier put it
    pub fn stream_sid(&self) -> Option<&str> {
        match self {
            CarrierEvent::Connected { stream_sid, .. } => stream_sid.as_deref(),
            CarrierEvent::Start { stream_sid, start } => stream_sid
                .as_deref()
                .or_else(|| start.as_ref().and_then(|s| s.stream_sid.as_deref())),
            CarrierEvent::Media { stream_sid, .. } => stream_sid.as_deref(),
            _ => None,
        }
    }

    /// Custom parameters carried by this frame
    pub fn custom_parameters(&self) -> Option<&HashMap<String, String>> {
        match self {
            CarrierEvent::Connected {
                custom_parameters, ..
            } => custom_parameters.as_ref(),
            CarrierEvent::Start { start, .. } => {
                start.as_ref().and_then(|s| s.custom_parameters.as_ref())
            }
            _ => None,
        }
    }
}

/// Parse an inbound text frame
pub fn parse_event(text: &str) -> Result<CarrierEvent, CarrierError> {
    serde_json::from_str(text).map_err(|e| CarrierError::Parse(e.to_string()))
}

/// Base64-encode a PCM chunk for the wire
pub fn encode_payload(pcm: &[u8]) -> String {
    BASE64.encode(pcm)
}

/// Build an outbound `media` frame
pub fn media_frame(stream_sid: &str, sequence_number: u64, payload_b64: &str) -> String {
    json!({
        "event": "media",
        "streamSid": stream_sid,
        "sequenceNumber": sequence_number.to_string(),
        "media": { "payload": payload_b64 },
    })
    .to_string()
}

/// Build an outbound `mark` frame
pub fn mark_frame(stream_sid: &str, name: &str) -> String {
    json!({
        "event": "mark",
        "streamSid": stream_sid,
        "mark": { "name": name },
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connected_with_sid() {
        let event =
            parse_event(r#"{"event":"connected","streamSid":"S1","customParameters":{"voice":"nova"}}"#)
                .unwrap();
        assert_eq!(event.stream_sid(), Some("S1"));
        assert_eq!(
            event.custom_parameters().unwrap().get("voice").map(String::as_str),
            Some("nova")
        );
    }

    #[test]
    fn test_parse_start_nested_sid() {
        let event = parse_event(
            r#"{"event":"start","start":{"streamSid":"S2","callSid":"CA1","customParameters":{"greeting":"Hi."}}}"#,
        )
        .unwrap();
        assert_eq!(event.stream_sid(), Some("S2"));
        assert_eq!(
            event.custom_parameters().unwrap().get("greeting").map(String::as_str),
            Some("Hi.")
        );
    }

    #[test]
    fn test_parse_media_and_decode() {
        let payload = encode_payload(&[1, 0, 2, 0]);
        let raw = format!(
            r#"{{"event":"media","streamSid":"S1","media":{{"payload":"{}","track":"inbound"}}}}"#,
            payload
        );
        let event = parse_event(&raw).unwrap();
        match event {
            CarrierEvent::Media { media, .. } => {
                assert!(!media.is_outbound_echo());
                assert_eq!(media.decode().unwrap(), vec![1, 0, 2, 0]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_outbound_echo_detected() {
        let raw = r#"{"event":"media","media":{"payload":"","track":"outbound"}}"#;
        match parse_event(raw).unwrap() {
            CarrierEvent::Media { media, .. } => assert!(media.is_outbound_echo()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_clear_and_stop() {
        assert!(matches!(
            parse_event(r#"{"event":"clear"}"#).unwrap(),
            CarrierEvent::Clear
        ));
        match parse_event(r#"{"event":"stop","stop":{"reason":"hangup"}}"#).unwrap() {
            CarrierEvent::Stop { stop } => {
                assert_eq!(stop.unwrap().reason.as_deref(), Some("hangup"))
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_tolerated() {
        assert!(matches!(
            parse_event(r#"{"event":"dtmf","digit":"5"}"#).unwrap(),
            CarrierEvent::Unknown
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_event("not json").is_err());
        assert!(parse_event(r#"{"no_event":true}"#).is_err());
    }

    #[test]
    fn test_media_frame_shape() {
        let frame = media_frame("S1", 7, "QUJD");
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["event"], "media");
        assert_eq!(value["streamSid"], "S1");
        // Sequence numbers are string-encoded decimals on the wire
        assert_eq!(value["sequenceNumber"], "7");
        assert_eq!(value["media"]["payload"], "QUJD");
    }

    #[test]
    fn test_mark_frame_shape() {
        let frame = mark_frame("S1", REPLY_DONE_MARK);
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["event"], "mark");
        assert_eq!(value["mark"]["name"], "assistant_reply_done");
    }
}
