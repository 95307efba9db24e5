//! Microphone capture for voxlink
//!
//! Captures audio from the default input device with CPAL, converts it to
//! PCM16 and hands fixed-size blocks to an async pump over a bounded
//! channel. Blocks are dropped, never buffered, when the consumer falls
//! behind; stale audio has no value in a realtime session.

mod chunker;
pub mod engine;

pub use chunker::{downsample, FrameChunker};
pub use engine::{pcm16_from_f32, CaptureEngine, CaptureSession};

/// User-facing diagnostic categories for microphone acquisition failures.
///
/// Classification is best-effort: CPAL reports most platform failures as
/// backend-specific strings, so unmatched errors land in `Unknown` with
/// the original message preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The platform refused microphone access.
    PermissionDenied,
    /// No input device is present.
    DeviceNotFound,
    /// The device exists but another application holds it.
    DeviceBusy,
    /// The platform requires a secure transport context for capture.
    InsecureContext,
    /// A security policy blocks capture outright.
    SecurityBlocked,
    /// Anything we could not classify.
    Unknown(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::PermissionDenied => write!(
                f,
                "Microphone permission denied. Please enable microphone access for this application."
            ),
            CaptureError::DeviceNotFound => write!(f, "No microphone found on this device."),
            CaptureError::DeviceBusy => {
                write!(f, "Microphone is already in use by another application.")
            }
            CaptureError::InsecureContext => {
                write!(f, "Microphone access requires a secure transport context.")
            }
            CaptureError::SecurityBlocked => {
                write!(f, "Microphone access is blocked by a security policy.")
            }
            CaptureError::Unknown(e) => write!(f, "Could not access microphone: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Classify a backend error message into a diagnostic category.
pub fn classify_capture_error(message: &str) -> CaptureError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("denied") || lower.contains("not allowed") || lower.contains("permission") {
        CaptureError::PermissionDenied
    } else if lower.contains("busy") || lower.contains("in use") {
        CaptureError::DeviceBusy
    } else if lower.contains("not found") || lower.contains("no device") || lower.contains("no input")
    {
        CaptureError::DeviceNotFound
    } else if lower.contains("insecure") || lower.contains("secure context") {
        CaptureError::InsecureContext
    } else if lower.contains("security") {
        CaptureError::SecurityBlocked
    } else {
        CaptureError::Unknown(message.to_string())
    }
}
