//! Effect execution
//!
//! Executes the effects produced by the state machine: microphone
//! acquisition and teardown, the capture-to-gateway audio pump, the
//! end-of-audio control message, and user alerts. Completion feeds back
//! into the session loop as events.
//!
//! Teardown and end-of-audio are serialized through one uplink command
//! queue: a stop drains the pump before the next command runs, so the
//! end-of-audio message always trails the final audio frame. `drain`
//! waits for every queued command to finish, which lets shutdown hold
//! the socket open until the end-of-audio has been handed to the writer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use uuid::Uuid;

use crate::capture::{downsample, CaptureEngine, CaptureError, CaptureSession, FrameChunker};
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::protocol::ClientControl;
use crate::state_machine::{Effect, Event};
use crate::ui::ChatUi;

const UPLINK_COMMAND_QUEUE: usize = 16;

/// Executes effects and reports outcomes back as events.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);
}

/// A live capture: the device session plus its pump task.
///
/// The session is absent only while a startup race resolves; the pump is
/// always present and is what the stop path waits on.
struct ActiveCapture {
    session: Option<CaptureSession>,
    pump: tokio::task::JoinHandle<()>,
}

enum UplinkCommand {
    Stop { capture_id: Uuid },
    EndAudio,
    Drain(oneshot::Sender<()>),
}

/// Production runner backed by CPAL capture and the gateway connection.
pub struct CaptureEffectRunner {
    connection: Arc<Connection>,
    ui: Arc<dyn ChatUi>,
    config: ClientConfig,
    captures: Arc<Mutex<HashMap<Uuid, ActiveCapture>>>,
    uplink_tx: mpsc::Sender<UplinkCommand>,
}

impl CaptureEffectRunner {
    /// Must be called from within a tokio runtime; spawns the uplink
    /// command worker.
    pub fn new(connection: Arc<Connection>, ui: Arc<dyn ChatUi>, config: ClientConfig) -> Self {
        let captures: Arc<Mutex<HashMap<Uuid, ActiveCapture>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let (uplink_tx, mut uplink_rx) = mpsc::channel::<UplinkCommand>(UPLINK_COMMAND_QUEUE);
        let worker_captures = captures.clone();
        let worker_connection = connection.clone();
        tokio::spawn(async move {
            while let Some(command) = uplink_rx.recv().await {
                match command {
                    UplinkCommand::Stop { capture_id } => {
                        let active = worker_captures.lock().await.remove(&capture_id);
                        match active {
                            Some(ActiveCapture { session, pump }) => {
                                if let Some(mut session) = session {
                                    // stop() joins the audio thread; keep
                                    // it off the runtime.
                                    let _ =
                                        tokio::task::spawn_blocking(move || session.stop())
                                            .await;
                                }
                                // The pump drains queued blocks and exits
                                // once the capture side drops its sender.
                                let _ = pump.await;
                            }
                            None => {
                                log::debug!("No active capture session for {}", capture_id);
                            }
                        }
                    }
                    UplinkCommand::EndAudio => {
                        worker_connection.send_control(&ClientControl::EndAudio);
                    }
                    UplinkCommand::Drain(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self {
            connection,
            ui,
            config,
            captures,
            uplink_tx,
        }
    }

    /// Wait until every uplink command enqueued so far has completed.
    pub async fn drain(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .uplink_tx
            .send(UplinkCommand::Drain(ack_tx))
            .await
            .is_ok()
        {
            let _ = ack_rx.await;
        }
    }

    fn start_capture(&self, capture_id: Uuid, tx: mpsc::Sender<Event>) {
        let connection = self.connection.clone();
        let captures = self.captures.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            let (block_tx, block_rx) = mpsc::channel::<Vec<i16>>(config.capture_queue_blocks);

            // Device acquisition blocks; keep it off the runtime.
            let error_tx = tx.clone();
            let start_result = tokio::task::spawn_blocking(move || {
                let engine = CaptureEngine::new()?;
                engine.start(block_tx, move |error| {
                    let _ = error_tx.try_send(Event::CaptureFailed { capture_id, error });
                })
            })
            .await;

            let session = match start_result {
                Ok(Ok(session)) => session,
                Ok(Err(error)) => {
                    let _ = tx.send(Event::CaptureStartFail { capture_id, error }).await;
                    return;
                }
                Err(e) => {
                    let _ = tx
                        .send(Event::CaptureStartFail {
                            capture_id,
                            error: CaptureError::Unknown(format!("capture task failed: {}", e)),
                        })
                        .await;
                    return;
                }
            };

            let pump = spawn_pump(
                connection,
                block_rx,
                session.sample_rate(),
                config.target_sample_rate,
                config.frame_samples,
            );
            captures.lock().await.insert(
                capture_id,
                ActiveCapture {
                    session: Some(session),
                    pump,
                },
            );

            let _ = tx.send(Event::CaptureStartOk { capture_id }).await;
        });
    }

    fn enqueue_uplink(&self, command: UplinkCommand) {
        if self.uplink_tx.try_send(command).is_err() {
            log::warn!("Uplink command queue full or closed, command dropped");
        }
    }
}

/// Pump: device-rate blocks in, fixed-size 16 kHz frames out.
fn spawn_pump(
    connection: Arc<Connection>,
    mut block_rx: mpsc::Receiver<Vec<i16>>,
    source_rate: u32,
    target_rate: u32,
    frame_samples: usize,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut chunker = FrameChunker::new(frame_samples);
        while let Some(block) = block_rx.recv().await {
            let resampled = downsample(&block, source_rate, target_rate);
            for frame in chunker.push(&resampled) {
                connection.send_audio_frame(&frame);
            }
        }
        // A trailing partial frame is dropped; only complete frames go
        // to the gateway.
        log::debug!("Audio pump finished ({} samples unsent)", chunker.pending());
    })
}

impl EffectRunner for CaptureEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::StartCapture { capture_id } => self.start_capture(capture_id, tx),
            Effect::StopCapture { capture_id } => {
                self.enqueue_uplink(UplinkCommand::Stop { capture_id });
            }
            Effect::SendEndOfAudio => {
                self.enqueue_uplink(UplinkCommand::EndAudio);
            }
            Effect::AlertUser { message } => {
                self.ui.alert_user(&message);
            }
            Effect::NotifyUi => {
                // Handled inline by the session loop; nothing to do here.
            }
        }
    }
}

/// Test runner that records effects instead of executing them.
#[cfg(test)]
pub struct StubEffectRunner {
    pub effects: std::sync::Mutex<Vec<Effect>>,
}

#[cfg(test)]
impl StubEffectRunner {
    pub fn new() -> Self {
        Self {
            effects: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
impl EffectRunner for StubEffectRunner {
    fn spawn(&self, effect: Effect, _tx: mpsc::Sender<Event>) {
        self.effects.lock().unwrap().push(effect);
    }
}
