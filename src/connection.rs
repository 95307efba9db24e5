//! WebSocket connection to the chat gateway
//!
//! One connection carries everything: outbound chat text and PCM16 audio
//! frames, inbound JSON events and binary audio clips. Inbound messages
//! are delivered in arrival order through a single channel so text and
//! audio never reorder relative to each other.
//!
//! Sends are realtime-biased: once the socket is no longer open, or the
//! outbound queue is full, messages are dropped instead of buffered.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::ClientControl;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
const OUTBOUND_QUEUE: usize = 100;
const INBOUND_QUEUE: usize = 100;

/// Connection lifecycle. Transitions are one-way:
/// Connecting -> Open -> Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

const STATE_CONNECTING: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_CLOSED: u8 = 2;

fn state_from_u8(v: u8) -> ConnectionState {
    match v {
        STATE_CONNECTING => ConnectionState::Connecting,
        STATE_OPEN => ConnectionState::Open,
        _ => ConnectionState::Closed,
    }
}

/// A message received from the gateway, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// UTF-8 text frame carrying a JSON server event.
    Text(String),
    /// Binary frame carrying a complete audio clip.
    Binary(Vec<u8>),
}

#[derive(Debug)]
pub enum ConnectionError {
    ConnectFailed(String),
    Timeout,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectFailed(msg) => {
                write!(f, "Failed to connect to server: {}", msg)
            }
            ConnectionError::Timeout => write!(f, "Connection attempt timed out"),
        }
    }
}

impl std::error::Error for ConnectionError {}

enum OutboundFrame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// Handle to a live gateway connection.
///
/// Cloneable via `Arc`; all senders observe the same state. Dropping the
/// handle aborts the reader and writer tasks.
pub struct Connection {
    state: Arc<AtomicU8>,
    outbound_tx: mpsc::Sender<OutboundFrame>,
    reader_task: tokio::task::JoinHandle<()>,
    writer_task: tokio::task::JoinHandle<()>,
}

impl Connection {
    /// Connect to the gateway and start the reader and writer tasks.
    ///
    /// Returns the connection handle plus the inbound message stream.
    pub async fn connect(
        url: &str,
    ) -> Result<(Self, mpsc::Receiver<InboundMessage>), ConnectionError> {
        let state = Arc::new(AtomicU8::new(STATE_CONNECTING));

        log::info!("Connecting to {}", url);

        let (ws_stream, _response) =
            tokio::time::timeout(CONNECTION_TIMEOUT, connect_async(url))
                .await
                .map_err(|_| ConnectionError::Timeout)?
                .map_err(|e| ConnectionError::ConnectFailed(e.to_string()))?;

        state.store(STATE_OPEN, Ordering::SeqCst);
        log::info!("Connected to {}", url);

        let (mut ws_sink, mut ws_source) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_QUEUE);
        let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(INBOUND_QUEUE);

        let writer_state = state.clone();
        let writer_task = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let result = match frame {
                    OutboundFrame::Text(text) => ws_sink.send(Message::Text(text)).await,
                    OutboundFrame::Binary(bytes) => ws_sink.send(Message::Binary(bytes)).await,
                    OutboundFrame::Close => {
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                };
                if let Err(e) = result {
                    log::warn!("WebSocket send failed: {}", e);
                    writer_state.store(STATE_CLOSED, Ordering::SeqCst);
                    break;
                }
            }
        });

        let reader_state = state.clone();
        let reader_task = tokio::spawn(async move {
            loop {
                match ws_source.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if inbound_tx.send(InboundMessage::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        if inbound_tx
                            .send(InboundMessage::Binary(bytes))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        log::info!("Server closed the connection: {:?}", frame);
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong handled by tungstenite
                    }
                    Some(Err(e)) => {
                        log::warn!("WebSocket receive error: {}", e);
                        break;
                    }
                    None => {
                        log::info!("WebSocket stream ended");
                        break;
                    }
                }
            }
            reader_state.store(STATE_CLOSED, Ordering::SeqCst);
        });

        Ok((
            Self {
                state,
                outbound_tx,
                reader_task,
                writer_task,
            },
            inbound_rx,
        ))
    }

    pub fn state(&self) -> ConnectionState {
        state_from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Send a chat message as a raw text frame.
    pub fn send_text(&self, text: &str) {
        self.enqueue(OutboundFrame::Text(text.to_string()), "text");
    }

    /// Send one PCM16 audio frame as little-endian bytes.
    pub fn send_audio_frame(&self, samples: &[i16]) {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        self.enqueue(OutboundFrame::Binary(bytes), "audio frame");
    }

    /// Send a JSON control message.
    pub fn send_control(&self, control: &ClientControl) {
        match serde_json::to_string(control) {
            Ok(json) => self.enqueue(OutboundFrame::Text(json), "control"),
            Err(e) => log::error!("Failed to serialize control message: {}", e),
        }
    }

    fn enqueue(&self, frame: OutboundFrame, kind: &str) {
        if !self.is_open() {
            log::debug!("Dropping {} send: connection not open", kind);
            return;
        }
        if self.outbound_tx.try_send(frame).is_err() {
            log::warn!("Dropping {} send: outbound queue full or closed", kind);
        }
    }

    /// Close the connection. Subsequent sends are dropped silently.
    pub fn close(&self) {
        if self.state.swap(STATE_CLOSED, Ordering::SeqCst) != STATE_CLOSED {
            log::info!("Closing connection");
            let _ = self.outbound_tx.try_send(OutboundFrame::Close);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}
