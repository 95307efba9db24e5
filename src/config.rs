//! Client configuration
//!
//! Every field has a default so an empty environment yields a working
//! client pointed at a local gateway.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint of the chat gateway.
    pub server_url: String,
    /// Sample rate for the uplink, in Hz. The gateway expects 16 kHz.
    pub target_sample_rate: u32,
    /// Samples per outbound audio frame.
    pub frame_samples: usize,
    /// Capture blocks buffered between the audio callback and the pump.
    pub capture_queue_blocks: usize,
    /// Audio clips buffered ahead of the playback thread.
    pub playback_queue_clips: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8001/ws/chat".to_string(),
            target_sample_rate: 16_000,
            frame_samples: 4096,
            capture_queue_blocks: 32,
            playback_queue_clips: 16,
        }
    }
}

impl ClientConfig {
    /// Build a config from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("VOXLINK_SERVER_URL") {
            if !url.is_empty() {
                config.server_url = url;
            }
        }
        if let Some(rate) = parse_env("VOXLINK_SAMPLE_RATE") {
            config.target_sample_rate = rate;
        }
        if let Some(frame) = parse_env("VOXLINK_FRAME_SAMPLES") {
            config.frame_samples = frame;
        }
        if let Some(blocks) = parse_env("VOXLINK_CAPTURE_QUEUE_BLOCKS") {
            config.capture_queue_blocks = blocks;
        }
        if let Some(clips) = parse_env("VOXLINK_PLAYBACK_QUEUE_CLIPS") {
            config.playback_queue_clips = clips;
        }

        config
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    match std::env::var(name) {
        Ok(value) => match value.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                log::warn!("Ignoring invalid {}: {:?}", name, value);
                None
            }
        },
        Err(_) => None,
    }
}
