//! voxlink: realtime voice and text chat client
//!
//! Streams microphone audio and chat text to a gateway over a single
//! WebSocket and plays back the synthesized audio replies. The core is
//! a pure state machine for the microphone lifecycle; capture, network
//! and playback run as effects around it.

pub mod capture;
pub mod config;
pub mod connection;
pub mod effects;
pub mod playback;
pub mod protocol;
pub mod router;
pub mod session;
pub mod state_machine;
pub mod ui;

pub use config::ClientConfig;
pub use connection::{Connection, ConnectionError, ConnectionState, InboundMessage};
pub use session::SessionContext;
pub use state_machine::{Event, State};
pub use ui::{ChatUi, Speaker, TerminalUi};
