//! Audio clip playback
//!
//! The gateway replies with complete WAV clips. Clips are decoded with
//! hound and appended to a single rodio sink, which plays them strictly
//! in arrival order with no overlap. The rodio output stream is not
//! `Send`, so the whole pipeline lives on a dedicated playback thread
//! fed through a bounded channel.

use std::fmt;
use std::io::Cursor;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use tokio::sync::mpsc;

use crate::capture::pcm16_from_f32;

#[derive(Debug)]
pub enum PlaybackError {
    Decode(String),
    Output(String),
}

impl fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackError::Decode(msg) => write!(f, "Failed to decode audio clip: {}", msg),
            PlaybackError::Output(msg) => write!(f, "Audio output unavailable: {}", msg),
        }
    }
}

impl std::error::Error for PlaybackError {}

/// Decode a WAV clip into a rodio source.
///
/// Accepts 16-bit integer and 32-bit float PCM; float samples are
/// quantized with the same conversion the uplink uses.
pub fn decode_clip(bytes: &[u8]) -> Result<SamplesBuffer<i16>, PlaybackError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| PlaybackError::Decode(e.to_string()))?;
    let spec = reader.spec();

    let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .collect::<Result<_, _>>()
            .map_err(|e| PlaybackError::Decode(e.to_string()))?,
        (hound::SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .map(|s| s.map(pcm16_from_f32))
            .collect::<Result<_, _>>()
            .map_err(|e| PlaybackError::Decode(e.to_string()))?,
        (format, bits) => {
            return Err(PlaybackError::Decode(format!(
                "unsupported WAV format: {:?} {} bit",
                format, bits
            )))
        }
    };

    Ok(SamplesBuffer::new(
        spec.channels,
        spec.sample_rate,
        samples,
    ))
}

/// Handle to the playback thread.
///
/// Clips queue behind each other in arrival order; a clip that fails to
/// decode is logged and skipped without disturbing the queue.
pub struct PlaybackController {
    clip_tx: Option<mpsc::Sender<Vec<u8>>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl PlaybackController {
    /// Spawn the playback thread.
    ///
    /// If no output device is available, playback degrades to draining
    /// and discarding clips so the rest of the session keeps working.
    pub fn spawn(queue_clips: usize) -> Self {
        let (clip_tx, mut clip_rx) = mpsc::channel::<Vec<u8>>(queue_clips);

        let thread = std::thread::Builder::new()
            .name("voxlink-playback".to_string())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        log::warn!("No audio output device, discarding clips: {}", e);
                        while clip_rx.blocking_recv().is_some() {}
                        return;
                    }
                };

                let sink = match Sink::try_new(&handle) {
                    Ok(sink) => sink,
                    Err(e) => {
                        log::warn!("Failed to create audio sink, discarding clips: {}", e);
                        while clip_rx.blocking_recv().is_some() {}
                        return;
                    }
                };

                while let Some(clip) = clip_rx.blocking_recv() {
                    match decode_clip(&clip) {
                        Ok(source) => {
                            log::debug!("Queueing clip for playback ({} bytes)", clip.len());
                            sink.append(source);
                        }
                        Err(e) => {
                            log::warn!("Skipping clip: {}", e);
                        }
                    }
                }

                // Channel closed; let anything already queued finish.
                sink.sleep_until_end();
                log::debug!("Playback thread exiting");
            })
            .ok();

        if thread.is_none() {
            log::error!("Failed to spawn playback thread");
        }

        Self {
            clip_tx: Some(clip_tx),
            thread,
        }
    }

    /// Sender for raw clip bytes, used by the inbound router.
    pub fn sender(&self) -> mpsc::Sender<Vec<u8>> {
        self.clip_tx
            .clone()
            .expect("playback sender taken after shutdown")
    }

    /// Stop accepting clips and wait for queued audio to finish.
    pub fn shutdown(&mut self) {
        self.clip_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Playback thread panicked during teardown");
            }
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        // Drop the sender without joining; joining in drop could block
        // the runtime behind queued audio.
        self.clip_tx.take();
    }
}
