//! Session wiring
//!
//! Brings up one chat session: the gateway connection, the playback
//! thread, the inbound router task, and the state loop that owns the
//! microphone state machine. Everything funnels through a single event
//! channel into the reducer (single-writer state).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionError};
use crate::effects::{CaptureEffectRunner, EffectRunner};
use crate::playback::PlaybackController;
use crate::router::ProtocolRouter;
use crate::state_machine::{reduce, Effect, Event, State};
use crate::ui::ChatUi;

const EVENT_QUEUE: usize = 32;

pub struct SessionContext {
    connection: Arc<Connection>,
    event_tx: mpsc::Sender<Event>,
    runner: Arc<CaptureEffectRunner>,
    playback: PlaybackController,
    cancel: CancellationToken,
    router_task: tokio::task::JoinHandle<()>,
    state_task: tokio::task::JoinHandle<()>,
}

impl SessionContext {
    /// Connect to the gateway and start all session tasks.
    pub async fn start(
        config: ClientConfig,
        ui: Arc<dyn ChatUi>,
    ) -> Result<Self, ConnectionError> {
        let (connection, mut inbound_rx) = Connection::connect(&config.server_url).await?;
        let connection = Arc::new(connection);

        let playback = PlaybackController::spawn(config.playback_queue_clips);
        let router = ProtocolRouter::new(ui.clone(), playback.sender());

        let cancel = CancellationToken::new();
        let router_cancel = cancel.clone();
        let router_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = router_cancel.cancelled() => break,
                    message = inbound_rx.recv() => match message {
                        Some(message) => router.route(message),
                        None => {
                            log::info!("Inbound stream closed");
                            break;
                        }
                    },
                }
            }
        });

        let (event_tx, event_rx) = mpsc::channel::<Event>(EVENT_QUEUE);
        let runner = Arc::new(CaptureEffectRunner::new(
            connection.clone(),
            ui.clone(),
            config,
        ));
        let loop_runner: Arc<dyn EffectRunner> = runner.clone();
        let state_task = tokio::spawn(run_state_loop(
            event_rx,
            event_tx.clone(),
            loop_runner,
            ui,
        ));

        Ok(Self {
            connection,
            event_tx,
            runner,
            playback,
            cancel,
            router_task,
            state_task,
        })
    }

    /// Sender for feeding user and capture events into the state loop.
    pub fn events(&self) -> mpsc::Sender<Event> {
        self.event_tx.clone()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Tear the session down in order: state loop first (so a live
    /// capture stops and end-of-audio goes out), then the socket, then
    /// playback.
    pub async fn shutdown(self) {
        let SessionContext {
            connection,
            event_tx,
            runner,
            mut playback,
            cancel,
            router_task,
            state_task,
        } = self;

        let _ = event_tx.send(Event::Shutdown).await;
        let _ = state_task.await;
        // Wait for the queued stop and end-of-audio to complete before
        // the socket closes; closing earlier would drop the end-of-audio
        // a live recording still owed the gateway.
        runner.drain().await;

        cancel.cancel();
        let _ = router_task.await;
        connection.close();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Joining the playback thread waits for queued audio.
        let _ = tokio::task::spawn_blocking(move || playback.shutdown()).await;

        log::info!("Session shut down");
    }
}

/// Single-writer state loop: applies each event through the reducer and
/// dispatches the resulting effects.
async fn run_state_loop(
    mut event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    runner: Arc<dyn EffectRunner>,
    ui: Arc<dyn ChatUi>,
) {
    let mut state = State::Idle;

    while let Some(event) = event_rx.recv().await {
        let shutting_down = matches!(event, Event::Shutdown);

        let (next_state, effects) = reduce(&state, event);
        if std::mem::discriminant(&state) != std::mem::discriminant(&next_state) {
            log::info!("State transition: {:?} -> {:?}", state, next_state);
        }
        state = next_state;

        for effect in effects {
            match effect {
                // UI refresh stays on the loop so the indicator always
                // reflects the state the reducer just produced.
                Effect::NotifyUi => ui.set_recording_indicator(state.is_recording()),
                other => runner.spawn(other, event_tx.clone()),
            }
        }

        if shutting_down {
            break;
        }
    }

    log::debug!("State loop exiting");
}
