//! Chat surface abstraction
//!
//! The session core talks to the user through this trait so the
//! terminal frontend and test doubles plug in the same way.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Agent,
}

/// What the session needs from a chat surface.
///
/// Implementations must tolerate calls from multiple tasks.
pub trait ChatUi: Send + Sync {
    /// Append a finished message to the transcript.
    fn append_message(&self, content: &str, speaker: Speaker);

    /// Show or replace the live transcription preview for the current
    /// utterance.
    fn update_transcription_preview(&self, content: &str);

    /// Remove the transcription preview, if any.
    fn clear_transcription_preview(&self);

    /// Reflect whether the microphone is live.
    fn set_recording_indicator(&self, recording: bool);

    /// Surface an error prominently to the user.
    fn alert_user(&self, message: &str);
}

/// Line-oriented terminal frontend.
pub struct TerminalUi;

impl ChatUi for TerminalUi {
    fn append_message(&self, content: &str, speaker: Speaker) {
        match speaker {
            Speaker::User => println!("you: {}", content),
            Speaker::Agent => println!("agent: {}", content),
        }
    }

    fn update_transcription_preview(&self, content: &str) {
        println!("(you said) {}", content);
    }

    fn clear_transcription_preview(&self) {
        // Lines already printed stand; nothing to erase in a scrollback UI.
    }

    fn set_recording_indicator(&self, recording: bool) {
        if recording {
            println!("[mic on]");
        } else {
            println!("[mic off]");
        }
    }

    fn alert_user(&self, message: &str) {
        eprintln!("error: {}", message);
    }
}
