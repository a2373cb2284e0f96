//! Audio output via `cpal`.
//!
//! [`CpalBackend`] implements [`AudioBackend`] on top of one persistent
//! output stream.  `cpal::Stream` is not `Send` on every platform, so the
//! stream lives on a dedicated audio thread for the lifetime of the
//! backend; the engine only ever touches `Send + Sync` handles.
//!
//! # Playback model
//!
//! The stream callback reads from a single shared *active span* slot.
//! Starting a span installs it in the slot (displacing whatever was
//! there — the engine guarantees at most one audible source anyway), and
//! the returned [`CpalVoice`] clears the slot on stop.  Span identity is
//! tracked with a monotonically increasing id, so a stale voice can never
//! silence a span it does not own.
//!
//! Assets are converted to the device's sample rate and channel count at
//! load time ([`adapt_to_device`]), which makes span start a cheap index
//! computation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::backend::{AudioAsset, AudioBackend, AudioData, BackendError, Voice};
use super::resample::adapt_to_device;

// ---------------------------------------------------------------------------
// Active span slot
// ---------------------------------------------------------------------------

/// The one span the output callback is currently rendering.
struct ActiveSpan {
    /// Device-format interleaved samples of the owning asset.
    samples: Arc<Vec<f32>>,
    /// Read position within `samples` (interleaved index).
    pos: usize,
    /// One past the last sample of the span.
    end: usize,
    /// Frozen in place; the callback emits silence while set.
    paused: bool,
    /// Identity of the voice that installed this span.
    span_id: u64,
}

type SpanSlot = Arc<Mutex<Option<ActiveSpan>>>;

// ---------------------------------------------------------------------------
// CpalBackend
// ---------------------------------------------------------------------------

/// Production audio backend built on the system default audio host.
pub struct CpalBackend {
    slot: SpanSlot,
    next_span_id: Arc<AtomicU64>,
    sample_rate: u32,
    channels: u16,
    volume: f32,
    /// Dropping this sender wakes the audio thread and tears the stream
    /// down.
    _shutdown_tx: mpsc::Sender<()>,
}

impl CpalBackend {
    /// Open an output stream on `device_name` (or the system default) and
    /// start the audio thread.
    ///
    /// `volume` is a linear gain in `[0.0, 1.0]` applied in the callback.
    ///
    /// # Errors
    ///
    /// [`BackendError::NoDevice`] when no matching output device exists,
    /// [`BackendError::Stream`] when the platform rejects the stream
    /// configuration (including non-f32 sample formats).
    pub fn new(device_name: Option<&str>, volume: f32) -> Result<Self, BackendError> {
        let slot: SpanSlot = Arc::new(Mutex::new(None));
        let volume = volume.clamp(0.0, 1.0);

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, u16), BackendError>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_slot = Arc::clone(&slot);
        let thread_device = device_name.map(str::to_owned);

        std::thread::Builder::new()
            .name("storytap-audio-out".into())
            .spawn(move || {
                audio_thread(thread_device, volume, thread_slot, ready_tx, shutdown_rx);
            })
            .map_err(|e| BackendError::Stream(format!("failed to spawn audio thread: {e}")))?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .map_err(|_| BackendError::Stream("audio thread exited during startup".into()))??;

        log::info!("audio output ready ({sample_rate} Hz, {channels} ch, volume {volume:.2})");

        Ok(Self {
            slot,
            next_span_id: Arc::new(AtomicU64::new(1)),
            sample_rate,
            channels,
            volume,
            _shutdown_tx: shutdown_tx,
        })
    }

    /// Device sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Device channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Linear output gain in `[0.0, 1.0]`.
    pub fn volume(&self) -> f32 {
        self.volume
    }
}

impl AudioBackend for CpalBackend {
    fn load(&self, name: &str, data: AudioData) -> Result<Arc<dyn AudioAsset>, BackendError> {
        if data.sample_rate == 0 || data.channels == 0 {
            return Err(BackendError::BadData(format!(
                "asset {name}: sample rate and channel count must be non-zero"
            )));
        }

        let samples = adapt_to_device(&data, self.sample_rate, self.channels);
        let duration_ms = data.duration_ms();
        log::debug!(
            "loaded asset {name}: {duration_ms} ms, {} device samples",
            samples.len()
        );

        Ok(Arc::new(CpalAsset {
            samples: Arc::new(samples),
            duration_ms,
            sample_rate: self.sample_rate,
            channels: self.channels,
            slot: Arc::clone(&self.slot),
            next_span_id: Arc::clone(&self.next_span_id),
        }))
    }
}

// ---------------------------------------------------------------------------
// Audio thread
// ---------------------------------------------------------------------------

/// Owns the `cpal::Stream`.  Reports the negotiated format (or the setup
/// error) once over `ready_tx`, then blocks until the backend is dropped.
fn audio_thread(
    device_name: Option<String>,
    volume: f32,
    slot: SpanSlot,
    ready_tx: mpsc::Sender<Result<(u32, u16), BackendError>>,
    shutdown_rx: mpsc::Receiver<()>,
) {
    let setup = || -> Result<(cpal::Stream, u32, u16), BackendError> {
        let host = cpal::default_host();

        let device = match &device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| BackendError::Stream(e.to_string()))?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or(BackendError::NoDevice)?,
            None => host.default_output_device().ok_or(BackendError::NoDevice)?,
        };

        let supported = device
            .default_output_config()
            .map_err(|e| BackendError::Stream(e.to_string()))?;

        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(BackendError::Stream(format!(
                "unsupported output sample format {:?}",
                supported.sample_format()
            )));
        }

        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        let callback_slot = Arc::clone(&slot);
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render(&callback_slot, volume, data);
                },
                |err: cpal::StreamError| {
                    log::error!("cpal stream error: {err}");
                },
                None, // no timeout
            )
            .map_err(|e| BackendError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| BackendError::Stream(e.to_string()))?;

        Ok((stream, sample_rate, channels))
    };

    match setup() {
        Ok((stream, sample_rate, channels)) => {
            let _ = ready_tx.send(Ok((sample_rate, channels)));
            // Block until the backend drops its shutdown sender.
            let _ = shutdown_rx.recv();
            drop(stream);
            log::debug!("audio output thread shutting down");
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    }
}

/// Fill one output buffer from the active span, or silence.
///
/// Uses `try_lock` so the realtime callback never blocks on the engine
/// thread; a contended lock renders one buffer of silence instead.
fn render(slot: &SpanSlot, volume: f32, data: &mut [f32]) {
    let mut guard = match slot.try_lock() {
        Ok(guard) => guard,
        Err(_) => {
            data.fill(0.0);
            return;
        }
    };

    let mut exhausted = false;
    match guard.as_mut() {
        Some(span) if !span.paused => {
            for out in data.iter_mut() {
                if span.pos < span.end {
                    *out = span.samples[span.pos] * volume;
                    span.pos += 1;
                } else {
                    *out = 0.0;
                    exhausted = true;
                }
            }
        }
        _ => data.fill(0.0),
    }

    if exhausted {
        // The span ran out of samples before the engine's stop timer
        // fired (sub-buffer rounding); free the slot early.
        *guard = None;
    }
}

// ---------------------------------------------------------------------------
// CpalAsset
// ---------------------------------------------------------------------------

struct CpalAsset {
    samples: Arc<Vec<f32>>,
    duration_ms: u64,
    sample_rate: u32,
    channels: u16,
    slot: SpanSlot,
    next_span_id: Arc<AtomicU64>,
}

impl AudioAsset for CpalAsset {
    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn play_span(&self, start_ms: u64, duration_ms: u64) -> Result<Box<dyn Voice>, BackendError> {
        // Millisecond offsets are converted to whole frames before the
        // channel multiply; rates that do not divide by 1000 (44.1 kHz)
        // would otherwise drift early by the truncated remainder.
        let rate = self.sample_rate as u64;
        let ch = self.channels as usize;

        let start = (start_ms * rate / 1000) as usize * ch;
        if start >= self.samples.len() {
            return Err(BackendError::SpanOutOfRange {
                start_ms,
                asset_ms: self.duration_ms,
            });
        }
        let end = ((start_ms + duration_ms) * rate / 1000) as usize * ch;
        let end = end.min(self.samples.len());

        let span_id = self.next_span_id.fetch_add(1, Ordering::Relaxed);

        *self.slot.lock().unwrap() = Some(ActiveSpan {
            samples: Arc::clone(&self.samples),
            pos: start,
            end,
            paused: false,
            span_id,
        });

        Ok(Box::new(CpalVoice {
            slot: Arc::clone(&self.slot),
            span_id,
            stopped: false,
        }))
    }
}

// ---------------------------------------------------------------------------
// CpalVoice
// ---------------------------------------------------------------------------

/// Handle to one installed span.  Clears the slot on stop or drop, but
/// only while the slot still holds its own span.
struct CpalVoice {
    slot: SpanSlot,
    span_id: u64,
    stopped: bool,
}

impl Voice for CpalVoice {
    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        let mut guard = self.slot.lock().unwrap();
        if matches!(guard.as_ref(), Some(span) if span.span_id == self.span_id) {
            *guard = None;
        }
    }

    fn pause(&mut self) {
        if self.stopped {
            return;
        }
        let mut guard = self.slot.lock().unwrap();
        if let Some(span) = guard.as_mut() {
            if span.span_id == self.span_id {
                span.paused = true;
            }
        }
    }

    fn is_active(&self) -> bool {
        !self.stopped
    }
}

impl Drop for CpalVoice {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // Opening a real output stream is not possible in CI; these tests
    // exercise the span arithmetic and slot discipline directly.

    fn asset_with(samples: usize) -> CpalAsset {
        CpalAsset {
            samples: Arc::new(vec![0.5; samples]),
            duration_ms: samples as u64 / 48, // 48 samples per ms mono
            sample_rate: 48_000,
            channels: 1,
            slot: Arc::new(Mutex::new(None)),
            next_span_id: Arc::new(AtomicU64::new(1)),
        }
    }

    #[test]
    fn play_span_installs_active_span() {
        let asset = asset_with(48_000); // 1 s
        let _voice = asset.play_span(250, 500).unwrap();

        let guard = asset.slot.lock().unwrap();
        let span = guard.as_ref().expect("span installed");
        assert_eq!(span.pos, 250 * 48);
        assert_eq!(span.end, 750 * 48);
        assert!(!span.paused);
    }

    #[test]
    fn play_span_is_frame_exact_at_44100() {
        // 44 100 does not divide by 1000; a samples-per-ms shortcut
        // truncates to 44 and lands 0.23% early.
        let asset = CpalAsset {
            samples: Arc::new(vec![0.5; 44_100 * 2 * 120]), // 2 min stereo
            duration_ms: 120_000,
            sample_rate: 44_100,
            channels: 2,
            slot: Arc::new(Mutex::new(None)),
            next_span_id: Arc::new(AtomicU64::new(1)),
        };
        let _voice = asset.play_span(60_000, 1500).unwrap();

        let guard = asset.slot.lock().unwrap();
        let span = guard.as_ref().expect("span installed");
        assert_eq!(span.pos, 60_000 * 441 / 10 * 2); // 2_646_000 frames in
        assert_eq!(span.end, 61_500 * 441 / 10 * 2);
        assert_eq!(span.pos % 2, 0, "start must sit on a frame boundary");
    }

    #[test]
    fn play_span_past_end_is_rejected() {
        let asset = asset_with(48_000);
        assert!(matches!(
            asset.play_span(5000, 100),
            Err(BackendError::SpanOutOfRange { .. })
        ));
    }

    #[test]
    fn span_end_is_clamped_to_asset_length() {
        let asset = asset_with(48_000);
        let _voice = asset.play_span(900, 5000).unwrap();
        let guard = asset.slot.lock().unwrap();
        assert_eq!(guard.as_ref().unwrap().end, 48_000);
    }

    #[test]
    fn voice_stop_clears_only_its_own_span() {
        let asset = asset_with(48_000);
        let mut first = asset.play_span(0, 100).unwrap();
        let _second = asset.play_span(200, 100).unwrap(); // displaces first

        first.stop(); // stale — must not clear the second span
        assert!(asset.slot.lock().unwrap().is_some());
    }

    #[test]
    fn voice_drop_releases_slot() {
        let asset = asset_with(48_000);
        {
            let _voice = asset.play_span(0, 100).unwrap();
            assert!(asset.slot.lock().unwrap().is_some());
        }
        assert!(asset.slot.lock().unwrap().is_none());
    }

    #[test]
    fn pause_freezes_span_in_place() {
        let asset = asset_with(48_000);
        let mut voice = asset.play_span(0, 100).unwrap();
        voice.pause();

        let guard = asset.slot.lock().unwrap();
        assert!(guard.as_ref().unwrap().paused);
    }

    #[test]
    fn render_advances_position_and_applies_volume() {
        let slot: SpanSlot = Arc::new(Mutex::new(Some(ActiveSpan {
            samples: Arc::new(vec![1.0; 1000]),
            pos: 0,
            end: 1000,
            paused: false,
            span_id: 1,
        })));

        let mut buf = vec![0.0f32; 64];
        render(&slot, 0.5, &mut buf);

        assert!(buf.iter().all(|&s| (s - 0.5).abs() < 1e-6));
        assert_eq!(slot.lock().unwrap().as_ref().unwrap().pos, 64);
    }

    #[test]
    fn render_paused_span_emits_silence() {
        let slot: SpanSlot = Arc::new(Mutex::new(Some(ActiveSpan {
            samples: Arc::new(vec![1.0; 1000]),
            pos: 10,
            end: 1000,
            paused: true,
            span_id: 1,
        })));

        let mut buf = vec![1.0f32; 64];
        render(&slot, 1.0, &mut buf);

        assert!(buf.iter().all(|&s| s == 0.0));
        // Position must not advance while paused.
        assert_eq!(slot.lock().unwrap().as_ref().unwrap().pos, 10);
    }

    #[test]
    fn render_exhausted_span_frees_slot() {
        let slot: SpanSlot = Arc::new(Mutex::new(Some(ActiveSpan {
            samples: Arc::new(vec![1.0; 32]),
            pos: 0,
            end: 32,
            paused: false,
            span_id: 1,
        })));

        let mut buf = vec![0.0f32; 64];
        render(&slot, 1.0, &mut buf);

        assert!(slot.lock().unwrap().is_none());
    }
}
