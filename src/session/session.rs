use super::config::SessionConfig;
use super::pacer::{Pacer, PacerHandle, PacerOutcome};
use super::stats::SessionStats;
use crate::audio::FrameSource;
use crate::media::{InboundEvent, InboundMessage, Transport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle of a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Connected, no stream identifier yet
    Idle,
    /// Stream identifier known
    Identified,
    /// A pacer run has been launched
    Streaming,
    /// Stopped or disconnected; terminal
    Closed,
}

/// What the connection reader should do after a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Continue,
    Close,
}

/// One media stream connection and the call it carries
pub struct CallSession {
    /// Registry key of the connection
    connection_id: Uuid,

    /// Streaming parameters
    config: Arc<SessionConfig>,

    /// Sending half of the connection, shared with the pacer
    transport: Arc<dyn Transport>,

    state: SessionState,

    stream_sid: Option<String>,

    call_sid: Option<String>,

    connected_at: DateTime<Utc>,

    inbound_media_frames: u64,

    inbound_media_bytes: u64,

    streams_started: u64,

    /// At most one pacer run per session
    pacer: Option<PacerHandle>,

    last_outcome: Option<PacerOutcome>,
}

impl CallSession {
    /// Create a session for a freshly accepted connection
    pub fn new(
        connection_id: Uuid,
        config: Arc<SessionConfig>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        info!("Media stream connection accepted: {}", connection_id);

        Self {
            connection_id,
            config,
            transport,
            state: SessionState::Idle,
            stream_sid: None,
            call_sid: None,
            connected_at: Utc::now(),
            inbound_media_frames: 0,
            inbound_media_bytes: 0,
            streams_started: 0,
            pacer: None,
            last_outcome: None,
        }
    }

    /// Handle one raw text frame from the connection
    ///
    /// Malformed payloads are logged and dropped; they never close the
    /// connection.
    pub async fn handle_text(&mut self, text: &str) -> Dispatch {
        if self.state == SessionState::Closed {
            debug!("Ignoring message on closed session {}", self.connection_id);
            return Dispatch::Close;
        }

        match InboundMessage::parse(text) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                warn!("Dropping inbound message on {}: {:#}", self.connection_id, e);
                Dispatch::Continue
            }
        }
    }

    /// Dispatch one parsed inbound event
    pub async fn handle_message(&mut self, message: InboundMessage) -> Dispatch {
        if self.state == SessionState::Closed {
            return Dispatch::Close;
        }

        self.capture_identifiers(&message);

        match message.kind() {
            InboundEvent::Connected => {
                info!("Media stream connected on {}", self.connection_id);
                Dispatch::Continue
            }
            InboundEvent::Start => {
                info!(
                    "Media stream started: stream={:?} call={:?}",
                    self.stream_sid, self.call_sid
                );
                self.start_streaming().await;
                Dispatch::Continue
            }
            InboundEvent::Media => {
                self.record_inbound_media(&message);
                Dispatch::Continue
            }
            InboundEvent::Stop => {
                info!("Media stream stopped: stream={:?}", self.stream_sid);
                self.close().await;
                Dispatch::Close
            }
            InboundEvent::Unrecognized(event) => {
                warn!("Unhandled event type on {}: {}", self.connection_id, event);
                Dispatch::Continue
            }
        }
    }

    /// Record identifiers the first time any message carries them
    fn capture_identifiers(&mut self, message: &InboundMessage) {
        if self.stream_sid.is_none() {
            if let Some(stream_sid) = message.stream_sid() {
                info!("StreamSid set: {}", stream_sid);
                self.stream_sid = Some(stream_sid.to_string());

                if self.state == SessionState::Idle {
                    self.state = SessionState::Identified;
                }
            }
        }

        if self.call_sid.is_none() {
            if let Some(call_sid) = message.start.as_ref().and_then(|s| s.call_sid.as_deref()) {
                info!("CallSid set: {}", call_sid);
                self.call_sid = Some(call_sid.to_string());
            }
        }
    }

    /// Inbound audio is decoded and counted; nothing consumes it yet
    fn record_inbound_media(&mut self, message: &InboundMessage) {
        self.inbound_media_frames += 1;

        let Some(media) = &message.media else {
            debug!("Media event without a payload on {}", self.connection_id);
            return;
        };

        match media.decode_payload() {
            Ok(bytes) => self.inbound_media_bytes += bytes.len() as u64,
            Err(e) => warn!("Undecodable inbound audio on {}: {:#}", self.connection_id, e),
        }
    }

    /// Launch a pacer run, replacing any run in progress
    async fn start_streaming(&mut self) {
        let Some(stream_sid) = self.stream_sid.clone() else {
            warn!(
                "Start event without a stream identifier on {}; not streaming",
                self.connection_id
            );
            return;
        };

        let source = match self.config.pcm.resolve().await {
            Ok(source) => source,
            Err(e) => {
                error!("Failed to load PCM source for stream {}: {:#}", stream_sid, e);
                return;
            }
        };

        let frames = match FrameSource::new(
            Arc::clone(&source.pcm),
            self.config.frame_samples,
            self.config.gain,
        ) {
            Ok(frames) => frames,
            Err(e) => {
                error!("Cannot frame PCM source for stream {}: {:#}", stream_sid, e);
                return;
            }
        };
        let pacer = Pacer::new(
            stream_sid,
            frames,
            self.config.frame_interval,
            Arc::clone(&self.transport),
        );

        let previous = match self.pacer.take() {
            Some(handle) if handle.is_finished() => {
                self.last_outcome = Some(handle.join().await);
                None
            }
            Some(handle) => {
                info!("Replacing running pacer on {}", self.connection_id);
                Some(handle)
            }
            None => None,
        };

        self.pacer = Some(pacer.spawn_after(previous));
        self.streams_started += 1;
        self.state = SessionState::Streaming;
    }

    /// Cancel any pacer run, close the transport and enter `Closed`
    ///
    /// Does not wait for the pacer; use `wait_for_pacer` for that.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        if let Some(pacer) = &self.pacer {
            pacer.cancel();
        }

        if let Err(e) = self.transport.close().await {
            debug!("Transport already gone on {}: {:#}", self.connection_id, e);
        }

        self.state = SessionState::Closed;
        info!("Session closed: {}", self.connection_id);
    }

    /// Wait for the current pacer run (if any) to end and record its outcome
    pub async fn wait_for_pacer(&mut self) -> Option<PacerOutcome> {
        let pacer = self.pacer.take()?;
        let outcome = pacer.join().await;
        self.last_outcome = Some(outcome.clone());
        Some(outcome)
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn call_sid(&self) -> Option<&str> {
        self.call_sid.as_deref()
    }

    /// Whether a pacer run is currently in progress
    pub fn is_streaming(&self) -> bool {
        self.pacer.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Get current session statistics
    pub fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.connected_at);

        let outbound_frames_sent = match (&self.pacer, &self.last_outcome) {
            (Some(pacer), _) => pacer.frames_sent(),
            (None, Some(outcome)) => outcome.frames_sent(),
            (None, None) => 0,
        };

        SessionStats {
            connection_id: self.connection_id,
            state: self.state,
            stream_sid: self.stream_sid.clone(),
            call_sid: self.call_sid.clone(),
            connected_at: self.connected_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            inbound_media_frames: self.inbound_media_frames,
            inbound_media_bytes: self.inbound_media_bytes,
            outbound_frames_sent,
            streams_started: self.streams_started,
            is_streaming: self.is_streaming(),
            last_outcome: self.last_outcome.clone(),
        }
    }
}
