//! Audio capture engine using CPAL
//!
//! Captures from the default input device and delivers converted PCM16
//! blocks to a bounded channel. The CPAL stream is not `Send`, so each
//! capture session runs on a dedicated audio thread that owns the stream
//! for its whole lifetime; the returned [`CaptureSession`] handle is a
//! plain `Send` controller.
//!
//! Block delivery uses `try_send`: if the pump falls behind, blocks are
//! dropped rather than queued.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BuildStreamError, Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig,
};
use tokio::sync::mpsc;

use super::{classify_capture_error, CaptureError};

/// How long to wait for the audio thread to report stream startup.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Convert a floating-point sample in [-1, 1] to PCM16.
///
/// Out-of-range input is clamped first; the scaled value is truncated
/// toward zero, matching the gateway's expected quantization.
pub fn pcm16_from_f32(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

fn sample_to_i16<T>(sample: T) -> i16
where
    T: Sample,
    f32: FromSample<T>,
{
    pcm16_from_f32(f32::from_sample(sample))
}

/// Capture engine bound to the default input device.
///
/// Device and format selection happen at construction so acquisition
/// failures surface before any session starts.
pub struct CaptureEngine {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
}

impl CaptureEngine {
    /// Probe the default input device and its default configuration.
    pub fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or(CaptureError::DeviceNotFound)?;

        log::info!("Using audio input device: {:?}", device.name());

        let supported_config = device
            .default_input_config()
            .map_err(|e| classify_default_config_error(&e))?;

        log::info!(
            "Capture config: {} Hz, {} channels, {:?}",
            supported_config.sample_rate().0,
            supported_config.channels(),
            supported_config.sample_format()
        );

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        Ok(Self {
            device,
            config,
            sample_format,
        })
    }

    /// Sample rate the device delivers; the pump downsamples from here.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Start capturing. Blocks until the stream is live or failed.
    ///
    /// Converted PCM16 blocks (channel 0 only) go to `block_tx`;
    /// `on_error` fires at most once if the stream dies mid-capture.
    pub fn start(
        &self,
        block_tx: mpsc::Sender<Vec<i16>>,
        on_error: impl Fn(CaptureError) + Send + 'static,
    ) -> Result<CaptureSession, CaptureError> {
        let active = Arc::new(AtomicBool::new(true));
        let dropped_blocks = Arc::new(AtomicU64::new(0));
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<(), CaptureError>>(1);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let device = self.device.clone();
        let config = self.config.clone();
        let sample_format = self.sample_format;
        let sample_rate = self.sample_rate();
        let active_for_thread = active.clone();
        let dropped_for_thread = dropped_blocks.clone();

        let thread = std::thread::Builder::new()
            .name("voxlink-capture".to_string())
            .spawn(move || {
                let stream = match build_stream(
                    &device,
                    &config,
                    sample_format,
                    block_tx,
                    active_for_thread,
                    dropped_for_thread,
                    on_error,
                ) {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(CaptureError::Unknown(e.to_string())));
                    return;
                }

                let _ = ready_tx.send(Ok(()));

                // Park until stop() is called or the session handle drops.
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("Capture thread exiting");
            })
            .map_err(|e| CaptureError::Unknown(format!("capture thread spawn failed: {}", e)))?;

        match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(())) => {
                log::info!("Capture started ({} Hz)", sample_rate);
                Ok(CaptureSession {
                    active,
                    stop_tx: Some(stop_tx),
                    thread: Some(thread),
                    sample_rate,
                    dropped_blocks,
                })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                // Thread never reported; release it and give up.
                drop(stop_tx);
                Err(CaptureError::Unknown(
                    "Timed out waiting for the audio stream to start".to_string(),
                ))
            }
        }
    }
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    block_tx: mpsc::Sender<Vec<i16>>,
    active: Arc<AtomicBool>,
    dropped_blocks: Arc<AtomicU64>,
    on_error: impl Fn(CaptureError) + Send + 'static,
) -> Result<Stream, CaptureError> {
    match sample_format {
        SampleFormat::I16 => {
            build_stream_typed::<i16>(device, config, block_tx, active, dropped_blocks, on_error)
        }
        SampleFormat::U16 => {
            build_stream_typed::<u16>(device, config, block_tx, active, dropped_blocks, on_error)
        }
        SampleFormat::F32 => {
            build_stream_typed::<f32>(device, config, block_tx, active, dropped_blocks, on_error)
        }
        other => Err(CaptureError::Unknown(format!(
            "Unsupported sample format {:?}",
            other
        ))),
    }
}

fn build_stream_typed<T>(
    device: &Device,
    config: &StreamConfig,
    block_tx: mpsc::Sender<Vec<i16>>,
    active: Arc<AtomicBool>,
    dropped_blocks: Arc<AtomicU64>,
    on_error: impl Fn(CaptureError) + Send + 'static,
) -> Result<Stream, CaptureError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let error_reported = AtomicBool::new(false);

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !active.load(Ordering::SeqCst) {
                    return;
                }

                // Interleaved input; keep channel 0 only (mono uplink).
                let block: Vec<i16> = data
                    .iter()
                    .step_by(channels)
                    .map(|&s| sample_to_i16(s))
                    .collect();

                if block_tx.try_send(block).is_err() {
                    // Pump is behind or gone; drop rather than queue.
                    dropped_blocks.fetch_add(1, Ordering::Relaxed);
                }
            },
            move |err| {
                if !error_reported.swap(true, Ordering::SeqCst) {
                    log::error!("Audio stream error: {}", err);
                    on_error(classify_capture_error(&err.to_string()));
                }
            },
            None,
        )
        .map_err(|e| classify_build_error(&e))?;

    Ok(stream)
}

fn classify_build_error(e: &BuildStreamError) -> CaptureError {
    match e {
        BuildStreamError::DeviceNotAvailable => CaptureError::DeviceNotFound,
        BuildStreamError::BackendSpecific { err } => classify_capture_error(&err.description),
        other => CaptureError::Unknown(other.to_string()),
    }
}

fn classify_default_config_error(e: &cpal::DefaultStreamConfigError) -> CaptureError {
    match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => CaptureError::DeviceNotFound,
        cpal::DefaultStreamConfigError::BackendSpecific { err } => {
            classify_capture_error(&err.description)
        }
        other => CaptureError::Unknown(other.to_string()),
    }
}

/// Handle to an active capture session.
///
/// `stop()` is idempotent and performs each teardown step independently:
/// silence the callback, wake the audio thread, join it. Dropping the
/// handle stops the session the same way.
pub struct CaptureSession {
    active: Arc<AtomicBool>,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
    sample_rate: u32,
    dropped_blocks: Arc<AtomicU64>,
}

impl CaptureSession {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stop capturing and release the microphone.
    ///
    /// The callback is silenced before the stream is torn down, so no
    /// block produced after this call is ever delivered.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Capture thread panicked during teardown");
            }

            let dropped = self.dropped_blocks.load(Ordering::Relaxed);
            if dropped > 0 {
                log::debug!("Capture dropped {} blocks (pump backpressure)", dropped);
            }
            log::info!("Capture stopped, microphone released");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_conversion_scales_and_truncates() {
        assert_eq!(pcm16_from_f32(0.0), 0);
        assert_eq!(pcm16_from_f32(1.0), 32767);
        assert_eq!(pcm16_from_f32(-1.0), -32767);
        // Truncation toward zero, not rounding
        assert_eq!(pcm16_from_f32(0.5), 16383);
        assert_eq!(pcm16_from_f32(-0.5), -16383);
    }

    #[test]
    fn pcm16_conversion_clamps_out_of_range() {
        assert_eq!(pcm16_from_f32(2.0), 32767);
        assert_eq!(pcm16_from_f32(-2.0), -32767);
        assert_eq!(pcm16_from_f32(f32::INFINITY), 32767);
        assert_eq!(pcm16_from_f32(f32::NEG_INFINITY), -32767);
    }

    #[test]
    fn pcm16_conversion_is_monotonic() {
        let inputs = [-1.5f32, -1.0, -0.7, -0.1, 0.0, 0.1, 0.3, 0.9, 1.0, 1.5];
        let outputs: Vec<i16> = inputs.iter().map(|&s| pcm16_from_f32(s)).collect();
        for pair in outputs.windows(2) {
            assert!(pair[0] <= pair[1], "not monotonic: {:?}", outputs);
        }
    }

    #[test]
    fn pcm16_conversion_stable_on_representable_values() {
        // Values that already map exactly survive a round trip.
        for q in [-32767i16, -16384, -1, 0, 1, 16384, 32767] {
            let f = q as f32 / 32767.0;
            let back = pcm16_from_f32(f);
            assert!((back - q).abs() <= 1, "q={} back={}", q, back);
            // And converting the reconstructed float again changes nothing.
            assert_eq!(pcm16_from_f32(back as f32 / 32767.0), back);
        }
    }

    #[test]
    fn integer_samples_convert_through_float() {
        assert_eq!(sample_to_i16(0i16), 0);
        assert!(sample_to_i16(i16::MAX) >= 32766);
        assert!(sample_to_i16(i16::MIN) <= -32766);
    }

    #[test]
    #[ignore] // Requires an audio input device
    fn engine_probes_default_device() {
        let engine = CaptureEngine::new().expect("no input device");
        assert!(engine.sample_rate() > 0);
    }
}
