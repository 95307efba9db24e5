//! Wire protocol types for the voice chat gateway
//!
//! The gateway speaks a small mixed protocol over a single WebSocket:
//!
//! - Client → server: raw UTF-8 text for a typed chat message, raw binary
//!   frames of PCM16 audio, and one JSON control message (`end_audio`)
//!   marking the end of an utterance.
//! - Server → client: JSON messages carrying the agent's final reply
//!   (`text`) or a live partial transcript (`transcription`), and raw
//!   binary WAV clips with the spoken reply.

use serde::{Deserialize, Serialize};

/// Control messages sent from the client to the gateway.
///
/// Chat text and audio frames are not control messages; they go over the
/// wire as plain text/binary frames without a JSON envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ClientControl {
    /// The user stopped speaking; the gateway should finalize the utterance.
    #[serde(rename = "end_audio")]
    EndAudio,
}

/// Structured text messages received from the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Final agent reply; supersedes any pending transcription preview.
    #[serde(rename = "text")]
    Text { content: String },

    /// Live partial transcript of the user's speech, replaced in place.
    #[serde(rename = "transcription")]
    Transcription { content: String },

    /// Catch-all for message types we don't handle.
    /// Prevents deserialization failures for unknown discriminants.
    #[serde(other)]
    Unknown,
}
