//! Inbound message routing
//!
//! Dispatches each message from the gateway: JSON text frames drive the
//! chat surface, binary frames go to the playback queue. Routing is
//! synchronous per message so the server's ordering is preserved.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::connection::InboundMessage;
use crate::protocol::ServerMessage;
use crate::ui::{ChatUi, Speaker};

pub struct ProtocolRouter {
    ui: Arc<dyn ChatUi>,
    playback_tx: mpsc::Sender<Vec<u8>>,
}

impl ProtocolRouter {
    pub fn new(ui: Arc<dyn ChatUi>, playback_tx: mpsc::Sender<Vec<u8>>) -> Self {
        Self { ui, playback_tx }
    }

    pub fn route(&self, message: InboundMessage) {
        match message {
            InboundMessage::Text(text) => self.route_text(&text),
            InboundMessage::Binary(clip) => {
                if self.playback_tx.try_send(clip).is_err() {
                    log::warn!("Playback queue full, dropping audio clip");
                }
            }
        }
    }

    fn route_text(&self, text: &str) {
        let parsed: ServerMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                log::debug!("Ignoring malformed server message: {}", e);
                return;
            }
        };

        match parsed {
            ServerMessage::Text { content } => {
                // A final reply supersedes any live transcription preview.
                self.ui.clear_transcription_preview();
                self.ui.append_message(&content, Speaker::Agent);
            }
            ServerMessage::Transcription { content } => {
                self.ui.update_transcription_preview(&content);
            }
            ServerMessage::Unknown => {
                log::debug!("Ignoring server message with unknown type");
            }
        }
    }
}
