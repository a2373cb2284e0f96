//! Audio backend abstraction.
//!
//! # Overview
//!
//! The engine never talks to a platform audio facility directly.  It goes
//! through three object-safe traits:
//!
//! * [`AudioBackend`] — loads decoded PCM ([`AudioData`]) into playable
//!   [`AudioAsset`] handles.  One backend per process.
//! * [`AudioAsset`] — one per distinct audio file; can start playback of
//!   any `[start, start + duration)` span.
//! * [`Voice`] — a single sounding span.  Dropping a voice releases the
//!   platform resource; [`Voice::stop`] is idempotent.
//!
//! [`CpalBackend`](crate::audio::CpalBackend) is the production adapter.
//! [`SilentBackend`] is a no-audio implementation used headless and as a
//! graceful fallback when no output device exists.  [`MockBackend`]
//! (test-only) records every span request for assertions.
//!
//! The traits deliberately have no completion callbacks: span end is
//! driven by the engine's own timers, which keeps every lifecycle decision
//! in one single-threaded place.

use std::sync::Arc;
#[cfg(test)]
use std::sync::Mutex;

use thiserror::Error;

// ---------------------------------------------------------------------------
// AudioData
// ---------------------------------------------------------------------------

/// Decoded PCM audio as handed over by the content loader.
///
/// Samples are interleaved `f32` in the range `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Interleaved PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 44100, 48000).
    pub sample_rate: u32,
    /// Number of interleaved channels (1 = mono, 2 = stereo, …).
    pub channels: u16,
}

impl AudioData {
    /// Total length in milliseconds (frames / sample rate).
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }
}

// ---------------------------------------------------------------------------
// BackendError
// ---------------------------------------------------------------------------

/// Errors that can occur while loading assets or starting playback.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// No output device is available on the audio host.
    #[error("no output device found on the default audio host")]
    NoDevice,

    /// The platform rejected the stream configuration.
    #[error("failed to open output stream: {0}")]
    Stream(String),

    /// The supplied PCM data cannot be played (zero rate / zero channels).
    #[error("unplayable audio data: {0}")]
    BadData(String),

    /// A span request lies outside the asset (start beyond the end).
    #[error("span start {start_ms} ms is past the end of the asset ({asset_ms} ms)")]
    SpanOutOfRange { start_ms: u64, asset_ms: u64 },
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Loads decoded audio into playable asset handles.
pub trait AudioBackend: Send + Sync {
    /// Prepare `data` for playback under the given asset `name`.
    ///
    /// Implementations may convert the PCM to the device format here so
    /// that starting a span later is cheap.
    fn load(&self, name: &str, data: AudioData) -> Result<Arc<dyn AudioAsset>, BackendError>;
}

/// A loaded, playable audio asset.
pub trait AudioAsset: Send + Sync {
    /// Total asset length in milliseconds.
    fn duration_ms(&self) -> u64;

    /// Start producing sound for `[start_ms, start_ms + duration_ms)`.
    ///
    /// The returned [`Voice`] keeps the span sounding; the caller is
    /// responsible for stopping it when its scheduled duration elapses.
    /// Spans that extend past the asset end simply play to the end.
    fn play_span(&self, start_ms: u64, duration_ms: u64) -> Result<Box<dyn Voice>, BackendError>;
}

/// One sounding span.  At most one voice is audible at a time by engine
/// invariant; the backend does not enforce this itself.
pub trait Voice: Send + Sync {
    /// Stop producing sound and release the platform resource.  Idempotent.
    fn stop(&mut self);

    /// Freeze the span in place without releasing it.  A paused voice can
    /// only be stopped; the engine restarts loops from the range start
    /// rather than resuming mid-span.
    fn pause(&mut self);

    /// `true` until the voice has been stopped.
    fn is_active(&self) -> bool;
}

// Compile-time assertions: the traits must stay object-safe.
const _: fn() = || {
    fn _assert_object_safe(_: &dyn AudioBackend, _: &dyn AudioAsset, _: Box<dyn Voice>) {}
};

// ---------------------------------------------------------------------------
// SilentBackend
// ---------------------------------------------------------------------------

/// A backend that produces no sound.
///
/// Used when no output device is available (the demo binary degrades to it
/// rather than refusing to start) and for headless operation.  Voices
/// track their active/paused state faithfully so all engine invariants
/// remain observable without audio hardware.
#[derive(Debug, Default)]
pub struct SilentBackend;

impl SilentBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for SilentBackend {
    fn load(&self, _name: &str, data: AudioData) -> Result<Arc<dyn AudioAsset>, BackendError> {
        if data.sample_rate == 0 || data.channels == 0 {
            return Err(BackendError::BadData(
                "sample rate and channel count must be non-zero".into(),
            ));
        }
        Ok(Arc::new(SilentAsset {
            duration_ms: data.duration_ms(),
        }))
    }
}

struct SilentAsset {
    duration_ms: u64,
}

impl AudioAsset for SilentAsset {
    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn play_span(&self, start_ms: u64, _duration_ms: u64) -> Result<Box<dyn Voice>, BackendError> {
        if start_ms > self.duration_ms {
            return Err(BackendError::SpanOutOfRange {
                start_ms,
                asset_ms: self.duration_ms,
            });
        }
        Ok(Box::new(SilentVoice { active: true }))
    }
}

struct SilentVoice {
    active: bool,
}

impl Voice for SilentVoice {
    fn stop(&mut self) {
        self.active = false;
    }

    fn pause(&mut self) {
        // Nothing is sounding; pausing only matters for state tracking.
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

// ---------------------------------------------------------------------------
// MockBackend  (test-only)
// ---------------------------------------------------------------------------

/// Test double that records every span request.
///
/// Shared between the test and the engine via `Arc`; call
/// [`MockBackend::spans`] to inspect what was played.
#[cfg(test)]
#[derive(Default)]
pub struct MockBackend {
    spans: Arc<Mutex<Vec<SpanRecord>>>,
}

/// One recorded `play_span` call.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct SpanRecord {
    pub asset: String,
    pub start_ms: u64,
    pub duration_ms: u64,
}

#[cfg(test)]
impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// All span requests issued so far, in call order.
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl AudioBackend for MockBackend {
    fn load(&self, name: &str, data: AudioData) -> Result<Arc<dyn AudioAsset>, BackendError> {
        Ok(Arc::new(MockAsset {
            name: name.to_string(),
            duration_ms: data.duration_ms(),
            spans: Arc::clone(&self.spans),
        }))
    }
}

#[cfg(test)]
struct MockAsset {
    name: String,
    duration_ms: u64,
    spans: Arc<Mutex<Vec<SpanRecord>>>,
}

#[cfg(test)]
impl AudioAsset for MockAsset {
    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn play_span(&self, start_ms: u64, duration_ms: u64) -> Result<Box<dyn Voice>, BackendError> {
        self.spans.lock().unwrap().push(SpanRecord {
            asset: self.name.clone(),
            start_ms,
            duration_ms,
        });
        Ok(Box::new(SilentVoice { active: true }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
