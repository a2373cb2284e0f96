//! Loading book bundles from disk.
//!
//! A bundle is a directory holding `book.json` (the manifest, a
//! serialised [`Book`]) next to the PDF and the WAV narration files the
//! manifest references.  [`DirBookSource`] is the production source;
//! the [`BookSource`] trait keeps the engine loadable from anywhere a
//! frontend wants (bundled resources, downloads, test fixtures).
//!
//! Audio decode failures are **not** fatal: the book still opens and
//! only hotspots on the broken file stop working.  Failures are
//! reported in [`LoadedBook::failures`] so the frontend can tell the
//! reader.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::AudioData;

use super::model::{Book, BookError};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read book bundle: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed book manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] BookError),
}

/// One audio file that could not be decoded.
#[derive(Debug, Clone)]
pub struct AssetFailure {
    pub file: String,
    pub reason: String,
}

/// A validated book plus its decoded narration audio.
#[derive(Debug)]
pub struct LoadedBook {
    pub book: Book,
    /// Decoded audio keyed by manifest file name.
    pub assets: HashMap<String, AudioData>,
    /// Files the manifest references that failed to decode.
    pub failures: Vec<AssetFailure>,
}

/// Anything a book bundle can be loaded from.
#[async_trait]
pub trait BookSource: Send + Sync {
    async fn load(&self) -> Result<LoadedBook, SourceError>;
}

// ---------------------------------------------------------------------------
// DirBookSource
// ---------------------------------------------------------------------------

/// Loads a bundle from a plain directory.
pub struct DirBookSource {
    dir: PathBuf,
}

impl DirBookSource {
    pub const MANIFEST: &'static str = "book.json";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl BookSource for DirBookSource {
    async fn load(&self) -> Result<LoadedBook, SourceError> {
        let manifest_path = self.dir.join(Self::MANIFEST);
        let manifest = tokio::fs::read_to_string(&manifest_path).await?;
        let book: Book = serde_json::from_str(&manifest)?;
        book.validate()?;

        log::info!(
            "loading book '{}': {} hotspots",
            book.title,
            book.hotspots.len()
        );

        let mut assets = HashMap::new();
        let mut failures = Vec::new();
        for file in book.audio_files() {
            let path = self.dir.join(&file);
            // hound is synchronous; keep decoding off the runtime.
            let decoded =
                tokio::task::spawn_blocking(move || decode_wav(&path))
                    .await
                    .unwrap_or_else(|e| Err(format!("decode task failed: {e}")));
            match decoded {
                Ok(data) => {
                    log::debug!("decoded {file}: {} ms", data.duration_ms());
                    assets.insert(file, data);
                }
                Err(reason) => {
                    log::warn!("audio file {file} unusable: {reason}");
                    failures.push(AssetFailure { file, reason });
                }
            }
        }

        Ok(LoadedBook {
            book,
            assets,
            failures,
        })
    }
}

/// Decode one WAV file to interleaved f32.
///
/// Integer formats are normalised to `[-1.0, 1.0]`.
fn decode_wav(path: &Path) -> Result<AudioData, String> {
    let mut reader = hound::WavReader::open(path).map_err(|e| e.to_string())?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| e.to_string())?,
        hound::SampleFormat::Int => {
            let scale = (1u32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| e.to_string())?
        }
    };

    Ok(AudioData {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
