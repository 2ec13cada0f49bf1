use anyhow::{Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Event received from the media stream
///
/// Only `event` is required. Everything else is optional so that an
/// unfamiliar event still parses and can be reported as unrecognized.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub event: String,
    #[serde(default)]
    pub stream_sid: Option<String>,
    #[serde(default)]
    pub sequence_number: Option<String>,
    #[serde(default)]
    pub start: Option<StartMetadata>,
    #[serde(default)]
    pub media: Option<InboundMedia>,
}

/// Payload of a "start" event
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMetadata {
    #[serde(default)]
    pub stream_sid: Option<String>,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default)]
    pub media_format: Option<MediaFormat>,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Audio carried by an inbound "media" event
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMedia {
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Base64-encoded mu-law bytes
    pub payload: String,
}

impl InboundMedia {
    pub fn decode_payload(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.payload)
            .context("Invalid base64 media payload")
    }
}

/// Event tag of an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Connected,
    Start,
    Media,
    Stop,
    Unrecognized(String),
}

impl InboundMessage {
    /// Parse one text frame from the socket
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Malformed inbound message")
    }

    pub fn kind(&self) -> InboundEvent {
        match self.event.as_str() {
            "connected" => InboundEvent::Connected,
            "start" => InboundEvent::Start,
            "media" => InboundEvent::Media,
            "stop" => InboundEvent::Stop,
            other => InboundEvent::Unrecognized(other.to_string()),
        }
    }

    /// Stream identifier from the top level, falling back to the start block
    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid
            .as_deref()
            .or_else(|| self.start.as_ref().and_then(|s| s.stream_sid.as_deref()))
    }
}

/// Outbound "media" message carrying one encoded frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMedia {
    pub event: String,
    pub stream_sid: String,
    pub media: OutboundPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundPayload {
    pub payload: String, // Base64-encoded mu-law bytes
    pub track: String,
    pub chunk: String,
    pub timestamp: String, // Epoch milliseconds
}

impl OutboundMedia {
    pub fn new(stream_sid: &str, payload: &[u8], chunk: u64, timestamp_ms: i64) -> Self {
        Self {
            event: "media".to_string(),
            stream_sid: stream_sid.to_string(),
            media: OutboundPayload {
                payload: base64::engine::general_purpose::STANDARD.encode(payload),
                track: "outbound".to_string(),
                chunk: chunk.to_string(),
                timestamp: timestamp_ms.to_string(),
            },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize outbound media")
    }
}
