//! Audio stack — decoded assets → sprite index → span playback.
//!
//! # Pipeline
//!
//! ```text
//! AudioData (decoded file) → AudioBackend::load → adapt_to_device
//!          → Arc<dyn AudioAsset> → play_span(start_ms, duration_ms)
//!          → Box<dyn Voice> (stop / pause handle)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use storytap::audio::{AudioBackend, AudioData, SilentBackend};
//!
//! let backend = SilentBackend;
//! let data = AudioData { samples: vec![0.0; 44_100], sample_rate: 44_100, channels: 1 };
//! let asset = backend.load("page1.wav", data).unwrap();
//! let mut voice = asset.play_span(250, 1_500).unwrap(); // 0.25s..1.75s
//! voice.stop();
//! ```

pub mod backend;
pub mod output;
pub mod player;
pub mod resample;
pub mod sprite;

pub use backend::{AudioAsset, AudioBackend, AudioData, BackendError, SilentBackend, Voice};
pub use output::CpalBackend;
pub use player::{PlayStarted, PlayerError, SpriteAudioPlayer};
pub use resample::{adapt_to_device, downmix_to_mono, resample};
pub use sprite::{Sprite, SpriteIndex};

#[cfg(test)]
pub(crate) use backend::MockBackend;
