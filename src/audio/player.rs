//! Sprite playback for one audio asset.
//!
//! One [`SpriteAudioPlayer`] exists per distinct audio asset a book
//! references.  It owns the asset's sprite map and at most one sounding
//! voice, and it is the single place that decides which terminal outcome a
//! `play_segment` call gets:
//!
//! * natural completion — the engine's elapsed timer comes back with a
//!   matching `play_id` and [`segment_elapsed`](SpriteAudioPlayer::segment_elapsed)
//!   reports the ended hotspot;
//! * preemption — [`stop`](SpriteAudioPlayer::stop) reports the
//!   interrupted hotspot, and the now-stale timer is ignored when it
//!   fires.
//!
//! A `play_id` is issued per `play_segment` call, so no segment can ever
//! receive two terminal outcomes and no outcome is ever attributed to a
//! segment this player did not start.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::backend::{AudioAsset, BackendError, Voice};
use super::sprite::Sprite;

// ---------------------------------------------------------------------------
// PlayerError
// ---------------------------------------------------------------------------

/// Errors from a sprite playback request.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The hotspot id is not present in this asset's sprite map.  This is
    /// a programming-contract violation when requests are routed through
    /// the sprite index, not a user-facing error.
    #[error("unknown segment {hotspot_id} for asset {asset}")]
    UnknownSegment { hotspot_id: String, asset: String },

    /// The backend refused to start the span.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

// ---------------------------------------------------------------------------
// PlayStarted
// ---------------------------------------------------------------------------

/// Receipt for a successfully started segment.
///
/// The caller schedules a timer for `duration` and hands `play_id` back to
/// [`SpriteAudioPlayer::segment_elapsed`] when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayStarted {
    /// Identifies this particular `play_segment` call.
    pub play_id: u64,
    /// Sprite length; the segment ends naturally after this long.
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// SpriteAudioPlayer
// ---------------------------------------------------------------------------

struct ActiveSegment {
    hotspot_id: String,
    play_id: u64,
    voice: Box<dyn Voice>,
}

/// Plays named sprites of a single audio asset, one at a time.
pub struct SpriteAudioPlayer {
    asset_name: String,
    asset: Arc<dyn AudioAsset>,
    sprites: HashMap<String, Sprite>,
    active: Option<ActiveSegment>,
    next_play_id: u64,
}

impl SpriteAudioPlayer {
    /// Wrap a loaded asset together with its sprite map.
    pub fn new(
        asset_name: impl Into<String>,
        asset: Arc<dyn AudioAsset>,
        sprites: HashMap<String, Sprite>,
    ) -> Self {
        Self {
            asset_name: asset_name.into(),
            asset,
            sprites,
            active: None,
            next_play_id: 0,
        }
    }

    /// Begin playback of the sprite registered under `hotspot_id`.
    ///
    /// Callers that care about the previous segment's interrupted outcome
    /// must call [`stop`](Self::stop) first; any voice still held here is
    /// released without an observable event.
    ///
    /// # Errors
    ///
    /// [`PlayerError::UnknownSegment`] when the id has no sprite, or a
    /// backend error when the span cannot be started.  Neither leaves a
    /// voice behind.
    pub fn play_segment(&mut self, hotspot_id: &str) -> Result<PlayStarted, PlayerError> {
        let sprite = self.sprites.get(hotspot_id).copied().ok_or_else(|| {
            PlayerError::UnknownSegment {
                hotspot_id: hotspot_id.to_string(),
                asset: self.asset_name.clone(),
            }
        })?;

        if let Some(mut leftover) = self.active.take() {
            log::warn!(
                "player {}: replacing active segment {} without stop()",
                self.asset_name,
                leftover.hotspot_id
            );
            leftover.voice.stop();
        }

        let voice = self.asset.play_span(sprite.start_ms, sprite.duration_ms)?;

        self.next_play_id += 1;
        let play_id = self.next_play_id;
        self.active = Some(ActiveSegment {
            hotspot_id: hotspot_id.to_string(),
            play_id,
            voice,
        });

        log::debug!(
            "player {}: started segment {} (play {play_id}, {} ms)",
            self.asset_name,
            hotspot_id,
            sprite.duration_ms
        );

        Ok(PlayStarted {
            play_id,
            duration: Duration::from_millis(sprite.duration_ms),
        })
    }

    /// Report that the elapsed timer for `play_id` fired.
    ///
    /// Returns the naturally-ended hotspot id, or `None` when the timer is
    /// stale — the segment was stopped or superseded in the meantime and
    /// already received its terminal outcome.
    pub fn segment_elapsed(&mut self, play_id: u64) -> Option<String> {
        match self.active.take() {
            Some(mut active) if active.play_id == play_id => {
                active.voice.stop();
                Some(active.hotspot_id)
            }
            other => {
                self.active = other;
                None
            }
        }
    }

    /// Stop the active segment, if any, and report it as interrupted.
    ///
    /// Idempotent: returns `None` and does nothing when idle.
    pub fn stop(&mut self) -> Option<String> {
        let mut active = self.active.take()?;
        active.voice.stop();
        log::debug!(
            "player {}: interrupted segment {}",
            self.asset_name,
            active.hotspot_id
        );
        Some(active.hotspot_id)
    }

    /// `true` while a segment is sounding.
    pub fn is_playing(&self) -> bool {
        self.active.is_some()
    }

    /// The hotspot id of the sounding segment, if any.
    pub fn current_hotspot(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.hotspot_id.as_str())
    }

    /// The asset filename this player is bound to.
    pub fn asset_name(&self) -> &str {
        &self.asset_name
    }

    /// The underlying asset handle.  The repeat-loop controller borrows
    /// this to create its own ephemeral voices over the same PCM data.
    pub fn asset(&self) -> Arc<dyn AudioAsset> {
        Arc::clone(&self.asset)
    }

    /// `true` when `hotspot_id` has a playable sprite in this asset.
    pub fn has_sprite(&self, hotspot_id: &str) -> bool {
        self.sprites.contains_key(hotspot_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::{AudioBackend, AudioData, MockBackend};

    fn make_player(backend: &MockBackend) -> SpriteAudioPlayer {
        let data = AudioData {
            samples: vec![0.0; 160_000], // 10 s @ 16 kHz mono
            sample_rate: 16_000,
            channels: 1,
        };
        let asset = backend.load("a.wav", data).unwrap();

        let mut sprites = HashMap::new();
        sprites.insert(
            "h1".to_string(),
            Sprite {
                start_ms: 2000,
                duration_ms: 2500,
            },
        );
        sprites.insert(
            "h2".to_string(),
            Sprite {
                start_ms: 5000,
                duration_ms: 1000,
            },
        );
        SpriteAudioPlayer::new("a.wav", asset, sprites)
    }

    // ---- play_segment ------------------------------------------------------

    #[test]
    fn play_known_segment_starts_voice() {
        let backend = MockBackend::new();
        let mut player = make_player(&backend);

        let started = player.play_segment("h1").unwrap();
        assert_eq!(started.duration, Duration::from_millis(2500));
        assert!(player.is_playing());
        assert_eq!(player.current_hotspot(), Some("h1"));

        let spans = backend.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start_ms, 2000);
        assert_eq!(spans[0].duration_ms, 2500);
    }

    #[test]
    fn play_unknown_segment_fails_without_side_effects() {
        let backend = MockBackend::new();
        let mut player = make_player(&backend);

        let err = player.play_segment("nope").unwrap_err();
        assert!(matches!(err, PlayerError::UnknownSegment { .. }));
        assert!(!player.is_playing());
        assert!(backend.spans().is_empty());
    }

    #[test]
    fn play_ids_are_unique_per_call() {
        let backend = MockBackend::new();
        let mut player = make_player(&backend);

        let first = player.play_segment("h1").unwrap();
        player.stop();
        let second = player.play_segment("h1").unwrap();
        assert_ne!(first.play_id, second.play_id);
    }

    // ---- Terminal outcomes -------------------------------------------------

    #[test]
    fn elapsed_with_matching_play_id_ends_segment() {
        let backend = MockBackend::new();
        let mut player = make_player(&backend);

        let started = player.play_segment("h1").unwrap();
        let ended = player.segment_elapsed(started.play_id);
        assert_eq!(ended.as_deref(), Some("h1"));
        assert!(!player.is_playing());
    }

    #[test]
    fn elapsed_with_stale_play_id_is_ignored() {
        let backend = MockBackend::new();
        let mut player = make_player(&backend);

        let first = player.play_segment("h1").unwrap();
        player.stop(); // terminal outcome: interrupted
        let second = player.play_segment("h2").unwrap();

        // First segment's timer fires late — must not end h2.
        assert!(player.segment_elapsed(first.play_id).is_none());
        assert!(player.is_playing());
        assert_eq!(player.current_hotspot(), Some("h2"));

        // The live timer still works.
        assert_eq!(player.segment_elapsed(second.play_id).as_deref(), Some("h2"));
    }

    #[test]
    fn elapsed_when_idle_is_ignored() {
        let backend = MockBackend::new();
        let mut player = make_player(&backend);
        assert!(player.segment_elapsed(42).is_none());
    }

    #[test]
    fn exactly_one_terminal_outcome_per_play() {
        let backend = MockBackend::new();
        let mut player = make_player(&backend);

        let started = player.play_segment("h1").unwrap();
        assert_eq!(player.stop().as_deref(), Some("h1")); // interrupted

        // Neither the late timer nor a second stop may report again.
        assert!(player.segment_elapsed(started.play_id).is_none());
        assert!(player.stop().is_none());
    }

    // ---- stop --------------------------------------------------------------

    #[test]
    fn stop_is_idempotent() {
        let backend = MockBackend::new();
        let mut player = make_player(&backend);

        assert!(player.stop().is_none());

        player.play_segment("h1").unwrap();
        assert_eq!(player.stop().as_deref(), Some("h1"));
        assert!(player.stop().is_none());
        assert!(!player.is_playing());
    }

    // ---- Sprite lookup helper ----------------------------------------------

    #[test]
    fn has_sprite_reflects_map() {
        let backend = MockBackend::new();
        let player = make_player(&backend);
        assert!(player.has_sprite("h1"));
        assert!(!player.has_sprite("dropped"));
    }
}
