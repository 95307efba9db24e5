//! Microphone session state machine
//!
//! Pure reducer: `reduce` consumes the current state plus one event and
//! returns the next state plus the effects to run. All side effects
//! (starting and stopping capture, sending end-of-audio, alerting the
//! user) are described as [`Effect`] values and executed elsewhere.
//!
//! Each capture attempt gets a fresh id; events carrying a stale id are
//! dropped so a slow failure from an abandoned attempt cannot disturb a
//! newer one.

use std::time::Instant;

use uuid::Uuid;

use crate::capture::CaptureError;

#[derive(Debug, Clone)]
pub enum State {
    /// Microphone off, nothing in flight.
    Idle,
    /// Capture requested, waiting for the device to come up.
    Requesting { capture_id: Uuid },
    /// Microphone live, audio streaming to the gateway.
    Recording {
        capture_id: Uuid,
        started_at: Instant,
    },
}

impl State {
    pub fn is_recording(&self) -> bool {
        matches!(self, State::Recording { .. })
    }

    fn capture_id(&self) -> Option<Uuid> {
        match self {
            State::Idle => None,
            State::Requesting { capture_id } | State::Recording { capture_id, .. } => {
                Some(*capture_id)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    /// User pressed the mic toggle.
    MicToggle,
    /// Capture startup succeeded for the given attempt.
    CaptureStartOk { capture_id: Uuid },
    /// Capture startup failed for the given attempt.
    CaptureStartFail {
        capture_id: Uuid,
        error: CaptureError,
    },
    /// A live capture died mid-recording.
    CaptureFailed {
        capture_id: Uuid,
        error: CaptureError,
    },
    /// Session is shutting down.
    Shutdown,
}

impl Event {
    fn capture_id(&self) -> Option<Uuid> {
        match self {
            Event::MicToggle | Event::Shutdown => None,
            Event::CaptureStartOk { capture_id }
            | Event::CaptureStartFail { capture_id, .. }
            | Event::CaptureFailed { capture_id, .. } => Some(*capture_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Acquire the microphone and start streaming under this id.
    StartCapture { capture_id: Uuid },
    /// Tear down the capture session with this id, if it exists.
    StopCapture { capture_id: Uuid },
    /// Tell the gateway the utterance is complete.
    SendEndOfAudio,
    /// Show an error to the user.
    AlertUser { message: String },
    /// Recording indicator may have changed; refresh the UI.
    NotifyUi,
}

/// Apply one event to the state.
pub fn reduce(state: &State, event: Event) -> (State, Vec<Effect>) {
    // Capture lifecycle events must match the in-flight attempt.
    if let Some(event_id) = event.capture_id() {
        if state.capture_id() != Some(event_id) {
            log::debug!("Dropping stale capture event {:?}", event);
            return (state.clone(), vec![]);
        }
    }

    match (state, event) {
        (State::Idle, Event::MicToggle) => {
            let capture_id = Uuid::new_v4();
            (
                State::Requesting { capture_id },
                vec![Effect::StartCapture { capture_id }, Effect::NotifyUi],
            )
        }

        // Toggling while the device is still coming up is ignored; the
        // user can toggle again once the attempt resolves.
        (State::Requesting { .. }, Event::MicToggle) => {
            log::debug!("Mic toggle ignored while capture is starting");
            (state.clone(), vec![])
        }

        (State::Requesting { capture_id }, Event::CaptureStartOk { .. }) => (
            State::Recording {
                capture_id: *capture_id,
                started_at: Instant::now(),
            },
            vec![Effect::NotifyUi],
        ),

        (State::Requesting { capture_id }, Event::CaptureStartFail { error, .. }) => {
            log::warn!("Capture failed to start: {}", error);
            (
                State::Idle,
                vec![
                    // The engine may have partially acquired the device.
                    Effect::StopCapture {
                        capture_id: *capture_id,
                    },
                    Effect::AlertUser {
                        message: error.to_string(),
                    },
                    Effect::NotifyUi,
                ],
            )
        }

        (State::Recording { capture_id, .. }, Event::MicToggle) => (
            State::Idle,
            vec![
                Effect::StopCapture {
                    capture_id: *capture_id,
                },
                Effect::SendEndOfAudio,
                Effect::NotifyUi,
            ],
        ),

        // The stream error callback can fire between stream startup and
        // the CaptureStartOk event; the attempt is already dead, so abort
        // it instead of letting the late CaptureStartOk arm a dead stream.
        (State::Requesting { capture_id }, Event::CaptureFailed { error, .. }) => {
            log::warn!("Capture died before startup completed: {}", error);
            (
                State::Idle,
                vec![
                    Effect::StopCapture {
                        capture_id: *capture_id,
                    },
                    Effect::AlertUser {
                        message: error.to_string(),
                    },
                    Effect::NotifyUi,
                ],
            )
        }

        (State::Recording { capture_id, .. }, Event::CaptureFailed { error, .. }) => {
            log::warn!("Capture failed while recording: {}", error);
            (
                State::Idle,
                vec![
                    Effect::StopCapture {
                        capture_id: *capture_id,
                    },
                    // Audio was already streamed; close out the utterance
                    // so the gateway processes what it has.
                    Effect::SendEndOfAudio,
                    Effect::AlertUser {
                        message: error.to_string(),
                    },
                    Effect::NotifyUi,
                ],
            )
        }

        (state, Event::Shutdown) => {
            let mut effects = vec![];
            if let Some(capture_id) = state.capture_id() {
                effects.push(Effect::StopCapture { capture_id });
                if state.is_recording() {
                    effects.push(Effect::SendEndOfAudio);
                }
            }
            (State::Idle, effects)
        }

        (state, event) => {
            log::debug!("Event {:?} has no transition in current state", event);
            (state.clone(), vec![])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_ok(id: Uuid) -> Event {
        Event::CaptureStartOk { capture_id: id }
    }

    fn requesting_id(state: &State) -> Uuid {
        match state {
            State::Requesting { capture_id } => *capture_id,
            other => panic!("expected Requesting, got {:?}", other),
        }
    }

    #[test]
    fn toggle_from_idle_starts_capture() {
        let (state, effects) = reduce(&State::Idle, Event::MicToggle);
        let id = requesting_id(&state);
        assert_eq!(
            effects,
            vec![Effect::StartCapture { capture_id: id }, Effect::NotifyUi]
        );
    }

    #[test]
    fn successful_start_moves_to_recording() {
        let (state, _) = reduce(&State::Idle, Event::MicToggle);
        let id = requesting_id(&state);

        let (state, effects) = reduce(&state, start_ok(id));
        assert!(state.is_recording());
        assert_eq!(effects, vec![Effect::NotifyUi]);
    }

    #[test]
    fn failed_start_returns_to_idle_with_alert_and_no_end_audio() {
        let (state, _) = reduce(&State::Idle, Event::MicToggle);
        let id = requesting_id(&state);

        let (state, effects) = reduce(
            &state,
            Event::CaptureStartFail {
                capture_id: id,
                error: CaptureError::PermissionDenied,
            },
        );
        assert!(matches!(state, State::Idle));
        assert!(effects.contains(&Effect::StopCapture { capture_id: id }));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::AlertUser { .. })));
        assert!(!effects.contains(&Effect::SendEndOfAudio));
    }

    #[test]
    fn toggle_while_recording_stops_and_sends_end_audio() {
        let (state, _) = reduce(&State::Idle, Event::MicToggle);
        let id = requesting_id(&state);
        let (state, _) = reduce(&state, start_ok(id));

        let (state, effects) = reduce(&state, Event::MicToggle);
        assert!(matches!(state, State::Idle));
        assert_eq!(
            effects,
            vec![
                Effect::StopCapture { capture_id: id },
                Effect::SendEndOfAudio,
                Effect::NotifyUi,
            ]
        );
    }

    #[test]
    fn toggle_while_requesting_is_ignored() {
        let (state, _) = reduce(&State::Idle, Event::MicToggle);
        let id = requesting_id(&state);

        let (state, effects) = reduce(&state, Event::MicToggle);
        assert_eq!(requesting_id(&state), id);
        assert!(effects.is_empty());
    }

    #[test]
    fn stale_capture_events_are_dropped() {
        let (state, _) = reduce(&State::Idle, Event::MicToggle);
        let id = requesting_id(&state);
        let stale = Uuid::new_v4();

        let (state, effects) = reduce(&state, start_ok(stale));
        assert_eq!(requesting_id(&state), id);
        assert!(effects.is_empty());

        let (state, effects) = reduce(
            &state,
            Event::CaptureFailed {
                capture_id: stale,
                error: CaptureError::DeviceBusy,
            },
        );
        assert_eq!(requesting_id(&state), id);
        assert!(effects.is_empty());
    }

    #[test]
    fn failure_during_requesting_aborts_attempt_and_drops_late_start_ok() {
        let (state, _) = reduce(&State::Idle, Event::MicToggle);
        let id = requesting_id(&state);

        let (state, effects) = reduce(
            &state,
            Event::CaptureFailed {
                capture_id: id,
                error: CaptureError::DeviceBusy,
            },
        );
        assert!(matches!(state, State::Idle));
        assert!(effects.contains(&Effect::StopCapture { capture_id: id }));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::AlertUser { .. })));
        assert!(!effects.contains(&Effect::SendEndOfAudio));

        // The startup success event may still arrive afterwards; it must
        // not resurrect the dead attempt.
        let (state, effects) = reduce(&state, start_ok(id));
        assert!(matches!(state, State::Idle));
        assert!(effects.is_empty());
    }

    #[test]
    fn mid_recording_failure_tears_down_with_end_audio_and_alert() {
        let (state, _) = reduce(&State::Idle, Event::MicToggle);
        let id = requesting_id(&state);
        let (state, _) = reduce(&state, start_ok(id));

        let (state, effects) = reduce(
            &state,
            Event::CaptureFailed {
                capture_id: id,
                error: CaptureError::DeviceBusy,
            },
        );
        assert!(matches!(state, State::Idle));
        assert_eq!(effects[0], Effect::StopCapture { capture_id: id });
        assert_eq!(effects[1], Effect::SendEndOfAudio);
        assert!(matches!(effects[2], Effect::AlertUser { .. }));
    }

    #[test]
    fn shutdown_while_recording_stops_and_finalizes() {
        let (state, _) = reduce(&State::Idle, Event::MicToggle);
        let id = requesting_id(&state);
        let (state, _) = reduce(&state, start_ok(id));

        let (state, effects) = reduce(&state, Event::Shutdown);
        assert!(matches!(state, State::Idle));
        assert_eq!(
            effects,
            vec![Effect::StopCapture { capture_id: id }, Effect::SendEndOfAudio]
        );
    }

    #[test]
    fn shutdown_from_idle_is_a_no_op() {
        let (state, effects) = reduce(&State::Idle, Event::Shutdown);
        assert!(matches!(state, State::Idle));
        assert!(effects.is_empty());
    }

    #[test]
    fn consecutive_attempts_get_distinct_ids() {
        let (state, _) = reduce(&State::Idle, Event::MicToggle);
        let first = requesting_id(&state);
        let (state, _) = reduce(&state, start_ok(first));
        let (state, _) = reduce(&state, Event::MicToggle);

        let (state, _) = reduce(&state, Event::MicToggle);
        assert_ne!(requesting_id(&state), first);
    }
}
