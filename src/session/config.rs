use crate::audio::PcmLocator;
use std::time::Duration;

/// Per-session streaming parameters, shared by every session on the server
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Samples per outbound frame (160 = 20ms at 8kHz)
    pub frame_samples: usize,

    /// Wall-clock spacing between outbound frames
    pub frame_interval: Duration,

    /// Linear gain applied to every sample before encoding
    pub gain: f32,

    /// Where the outbound audio comes from
    pub pcm: PcmLocator,
}

impl SessionConfig {
    pub fn new(pcm: PcmLocator) -> Self {
        Self {
            frame_samples: 160,                        // 20ms at 8kHz
            frame_interval: Duration::from_millis(20), // Media stream cadence
            gain: 1.0,
            pcm,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(PcmLocator::file("audio/outbound.raw", 8000))
    }
}
