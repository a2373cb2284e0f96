//! Hotspot activation and playback exclusivity.
//!
//! [`PlaybackCoordinator`] owns one [`SpriteAudioPlayer`] per loaded
//! audio file plus the sequential-mode FIFO queue.  It enforces the
//! single-voice rule: before any segment starts, everything else is
//! stopped, across all players.
//!
//! Activation validates before it mutates.  A tap on a hotspot whose
//! audio file never loaded, or whose segment has no sprite, is rejected
//! without touching current playback or the queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::audio::{AudioAsset, PlayerError, SpriteAudioPlayer};
use crate::book::Hotspot;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ActivationError {
    /// The hotspot points at an audio file that is not loaded.
    #[error("no audio loaded for {audio_file}")]
    MissingAudioAsset { audio_file: String },

    /// The hotspot's segment is not in the sprite index.  With a
    /// validated book this indicates a zero-length segment that was
    /// dropped at index build time.
    #[error("no sprite for hotspot {hotspot_id} in {asset}")]
    UnknownSegment { hotspot_id: String, asset: String },

    /// The backend refused to start the span.  Anything that was
    /// playing has already been stopped; `interrupted` lists it.
    #[error("failed to start {hotspot_id}: {source}")]
    Failed {
        hotspot_id: String,
        interrupted: Vec<String>,
        #[source]
        source: PlayerError,
    },
}

/// A segment that just started playing.
#[derive(Debug)]
pub struct StartedSegment {
    pub hotspot_id: String,
    pub asset: String,
    pub play_id: u64,
    pub duration: Duration,
}

/// What a tap did.
#[derive(Debug)]
pub enum ActivationOutcome {
    /// The segment is now playing; `interrupted` lists whatever it cut
    /// off.
    Started {
        started: StartedSegment,
        interrupted: Vec<String>,
    },
    /// Sequential mode deferred the tap to the back of the queue.
    Queued,
}

/// Result of a segment playing through to the end of its span.
#[derive(Debug)]
pub struct SegmentCompletion {
    /// Hotspot whose segment finished.
    pub completed: String,
    /// Next queue entry that started, when draining.
    pub next: Option<StartedSegment>,
    /// Queue entries skipped because they failed to start.
    pub failed: Vec<(String, ActivationError)>,
}

// ---------------------------------------------------------------------------
// PlaybackCoordinator
// ---------------------------------------------------------------------------

pub struct PlaybackCoordinator {
    /// One player per loaded audio file, keyed by file name.
    players: HashMap<String, SpriteAudioPlayer>,
    /// Taps deferred by sequential mode, oldest first.  Duplicates are
    /// allowed; a reader tapping the same word twice hears it twice.
    queue: VecDeque<Hotspot>,
}

impl PlaybackCoordinator {
    pub fn new(players: HashMap<String, SpriteAudioPlayer>) -> Self {
        Self {
            players,
            queue: VecDeque::new(),
        }
    }

    /// Handle a tap in normal or sequential mode.
    ///
    /// Validation happens before any side effect: a rejected tap leaves
    /// current playback and the queue exactly as they were.
    pub fn activate(
        &mut self,
        hotspot: &Hotspot,
        sequential: bool,
    ) -> Result<ActivationOutcome, ActivationError> {
        self.resolve(hotspot)?;

        if sequential && self.is_any_playing() {
            log::debug!("queueing {} behind current segment", hotspot.id);
            self.queue.push_back(hotspot.clone());
            return Ok(ActivationOutcome::Queued);
        }

        let interrupted = self.stop_all();
        let started = self.start_segment(hotspot, &interrupted)?;
        Ok(ActivationOutcome::Started {
            started,
            interrupted,
        })
    }

    /// A span timer fired for (`asset`, `play_id`).
    ///
    /// Returns `None` when the timer is stale (the segment was already
    /// stopped or replaced).  With `drain_queue` set, the next playable
    /// queue entry is started; entries that fail to start are skipped
    /// and reported, not retried.
    pub fn segment_elapsed(
        &mut self,
        asset: &str,
        play_id: u64,
        drain_queue: bool,
    ) -> Option<SegmentCompletion> {
        let completed = self.players.get_mut(asset)?.segment_elapsed(play_id)?;

        let mut next = None;
        let mut failed = Vec::new();
        if drain_queue {
            while let Some(hotspot) = self.queue.pop_front() {
                match self
                    .resolve(&hotspot)
                    .and_then(|()| self.start_segment(&hotspot, &[]))
                {
                    Ok(started) => {
                        next = Some(started);
                        break;
                    }
                    Err(e) => {
                        log::warn!("skipping queued hotspot {}: {e}", hotspot.id);
                        failed.push((hotspot.id, e));
                    }
                }
            }
        }

        Some(SegmentCompletion {
            completed,
            next,
            failed,
        })
    }

    /// Stop every player.  Returns the hotspot ids that were cut off
    /// (at most one, given the single-voice rule).
    pub fn stop_all(&mut self) -> Vec<String> {
        let mut interrupted = Vec::new();
        for player in self.players.values_mut() {
            if let Some(id) = player.stop() {
                interrupted.push(id);
            }
        }
        interrupted
    }

    /// Discard all deferred taps.
    pub fn clear_queue(&mut self) {
        if !self.queue.is_empty() {
            log::debug!("discarding {} queued taps", self.queue.len());
            self.queue.clear();
        }
    }

    pub fn is_any_playing(&self) -> bool {
        self.players.values().any(SpriteAudioPlayer::is_playing)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Backend asset handle for `audio_file`, for the repeat loop.
    pub fn asset_handle(&self, audio_file: &str) -> Option<Arc<dyn AudioAsset>> {
        self.players.get(audio_file).map(SpriteAudioPlayer::asset)
    }

    // ── internals ────────────────────────────────────────────────────────

    /// Check that `hotspot` can be played, with no side effects.
    fn resolve(&self, hotspot: &Hotspot) -> Result<(), ActivationError> {
        let player = self.players.get(&hotspot.audio_file).ok_or_else(|| {
            ActivationError::MissingAudioAsset {
                audio_file: hotspot.audio_file.clone(),
            }
        })?;
        if !player.has_sprite(&hotspot.id) {
            return Err(ActivationError::UnknownSegment {
                hotspot_id: hotspot.id.clone(),
                asset: hotspot.audio_file.clone(),
            });
        }
        Ok(())
    }

    /// Start `hotspot`'s segment.  Callers have already resolved it and
    /// stopped other playback.
    fn start_segment(
        &mut self,
        hotspot: &Hotspot,
        interrupted: &[String],
    ) -> Result<StartedSegment, ActivationError> {
        let player = self
            .players
            .get_mut(&hotspot.audio_file)
            .ok_or_else(|| ActivationError::MissingAudioAsset {
                audio_file: hotspot.audio_file.clone(),
            })?;

        let started = player
            .play_segment(&hotspot.id)
            .map_err(|source| ActivationError::Failed {
                hotspot_id: hotspot.id.clone(),
                interrupted: interrupted.to_vec(),
                source,
            })?;

        Ok(StartedSegment {
            hotspot_id: hotspot.id.clone(),
            asset: hotspot.audio_file.clone(),
            play_id: started.play_id,
            duration: started.duration,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioBackend, MockBackend, Sprite};

    fn hotspot(id: &str, file: &str, start: f64, end: f64) -> Hotspot {
        Hotspot {
            id: id.into(),
            page_number: 1,
            x: 0.0,
            y: 0.0,
            width: 0.1,
            height: 0.1,
            audio_file: file.into(),
            audio_start: start,
            audio_end: end,
        }
    }

    /// Coordinator over two assets: page1.wav with h1/h2, page2.wav with h3.
    fn coordinator(backend: &MockBackend) -> PlaybackCoordinator {
        let mut players = HashMap::new();
        for (file, ids) in [("page1.wav", vec!["h1", "h2"]), ("page2.wav", vec!["h3"])] {
            let data = crate::audio::AudioData {
                samples: vec![0.0; 44_100 * 10],
                sample_rate: 44_100,
                channels: 1,
            };
            let asset = backend.load(file, data).unwrap();
            let sprites = ids
                .into_iter()
                .enumerate()
                .map(|(i, id)| {
                    (
                        id.to_string(),
                        Sprite {
                            start_ms: i as u64 * 2000,
                            duration_ms: 1000,
                        },
                    )
                })
                .collect();
            players.insert(file.to_string(), SpriteAudioPlayer::new(file, asset, sprites));
        }
        PlaybackCoordinator::new(players)
    }

    // ---- activation ---------------------------------------------------------

    #[test]
    fn normal_tap_starts_playback() {
        let backend = MockBackend::new();
        let mut coord = coordinator(&backend);

        let outcome = coord.activate(&hotspot("h1", "page1.wav", 0.0, 1.0), false);
        match outcome.unwrap() {
            ActivationOutcome::Started {
                started,
                interrupted,
            } => {
                assert_eq!(started.hotspot_id, "h1");
                assert_eq!(started.asset, "page1.wav");
                assert!(interrupted.is_empty());
            }
            other => panic!("expected Started, got {other:?}"),
        }
        assert!(coord.is_any_playing());
    }

    #[test]
    fn new_tap_interrupts_across_assets() {
        let backend = MockBackend::new();
        let mut coord = coordinator(&backend);

        coord
            .activate(&hotspot("h1", "page1.wav", 0.0, 1.0), false)
            .unwrap();
        let outcome = coord
            .activate(&hotspot("h3", "page2.wav", 0.0, 1.0), false)
            .unwrap();

        match outcome {
            ActivationOutcome::Started { interrupted, .. } => {
                assert_eq!(interrupted, vec!["h1".to_string()]);
            }
            other => panic!("expected Started, got {other:?}"),
        }
    }

    #[test]
    fn missing_asset_is_rejected_without_side_effects() {
        let backend = MockBackend::new();
        let mut coord = coordinator(&backend);

        coord
            .activate(&hotspot("h1", "page1.wav", 0.0, 1.0), false)
            .unwrap();

        let err = coord
            .activate(&hotspot("h9", "missing.wav", 0.0, 1.0), false)
            .unwrap_err();
        assert!(matches!(err, ActivationError::MissingAudioAsset { .. }));

        // The first segment is still playing untouched.
        assert!(coord.is_any_playing());
        assert_eq!(backend.spans().len(), 1);
    }

    #[test]
    fn unknown_segment_is_rejected_without_side_effects() {
        let backend = MockBackend::new();
        let mut coord = coordinator(&backend);

        coord
            .activate(&hotspot("h1", "page1.wav", 0.0, 1.0), false)
            .unwrap();

        // page2.wav exists but has no sprite "h1".
        let err = coord
            .activate(&hotspot("h1", "page2.wav", 0.0, 1.0), false)
            .unwrap_err();
        assert!(matches!(err, ActivationError::UnknownSegment { .. }));
        assert!(coord.is_any_playing());
    }

    // ---- sequential queue ---------------------------------------------------

    #[test]
    fn sequential_taps_queue_in_fifo_order() {
        let backend = MockBackend::new();
        let mut coord = coordinator(&backend);

        let first = coord
            .activate(&hotspot("h1", "page1.wav", 0.0, 1.0), true)
            .unwrap();
        let play_id = match first {
            ActivationOutcome::Started { started, .. } => started.play_id,
            other => panic!("expected Started, got {other:?}"),
        };
        assert!(matches!(
            coord
                .activate(&hotspot("h2", "page1.wav", 2.0, 3.0), true)
                .unwrap(),
            ActivationOutcome::Queued
        ));
        assert!(matches!(
            coord
                .activate(&hotspot("h3", "page2.wav", 0.0, 1.0), true)
                .unwrap(),
            ActivationOutcome::Queued
        ));
        assert_eq!(coord.queue_len(), 2);

        // h1 finishes; h2 must start first.
        let completion = coord.segment_elapsed("page1.wav", play_id, true).unwrap();
        assert_eq!(completion.completed, "h1");
        assert_eq!(completion.next.as_ref().unwrap().hotspot_id, "h2");
        assert_eq!(coord.queue_len(), 1);
    }

    #[test]
    fn duplicate_sequential_taps_both_queue() {
        let backend = MockBackend::new();
        let mut coord = coordinator(&backend);

        coord
            .activate(&hotspot("h1", "page1.wav", 0.0, 1.0), true)
            .unwrap();
        let h2 = hotspot("h2", "page1.wav", 2.0, 3.0);
        coord.activate(&h2, true).unwrap();
        coord.activate(&h2, true).unwrap();
        assert_eq!(coord.queue_len(), 2);
    }

    #[test]
    fn sequential_tap_while_idle_plays_immediately() {
        let backend = MockBackend::new();
        let mut coord = coordinator(&backend);

        let outcome = coord
            .activate(&hotspot("h1", "page1.wav", 0.0, 1.0), true)
            .unwrap();
        assert!(matches!(outcome, ActivationOutcome::Started { .. }));
        assert_eq!(coord.queue_len(), 0);
    }

    #[test]
    fn stale_elapsed_does_not_advance_the_queue() {
        let backend = MockBackend::new();
        let mut coord = coordinator(&backend);

        coord
            .activate(&hotspot("h1", "page1.wav", 0.0, 1.0), true)
            .unwrap();
        coord
            .activate(&hotspot("h2", "page1.wav", 2.0, 3.0), true)
            .unwrap();

        assert!(coord.segment_elapsed("page1.wav", 999, true).is_none());
        assert_eq!(coord.queue_len(), 1);
    }

    #[test]
    fn queue_drain_skips_entries_that_fail() {
        let backend = MockBackend::new();
        let mut coord = coordinator(&backend);

        let play_id = match coord
            .activate(&hotspot("h1", "page1.wav", 0.0, 1.0), true)
            .unwrap()
        {
            ActivationOutcome::Started { started, .. } => started.play_id,
            other => panic!("expected Started, got {other:?}"),
        };
        // Force a bad entry into the queue, then a good one.
        coord.queue.push_back(hotspot("ghost", "page1.wav", 0.0, 1.0));
        coord.queue.push_back(hotspot("h3", "page2.wav", 0.0, 1.0));

        let completion = coord.segment_elapsed("page1.wav", play_id, true).unwrap();

        assert_eq!(completion.failed.len(), 1);
        assert_eq!(completion.failed[0].0, "ghost");
        assert_eq!(completion.next.unwrap().hotspot_id, "h3");
    }

    #[test]
    fn clear_queue_discards_deferred_taps() {
        let backend = MockBackend::new();
        let mut coord = coordinator(&backend);

        coord
            .activate(&hotspot("h1", "page1.wav", 0.0, 1.0), true)
            .unwrap();
        coord
            .activate(&hotspot("h2", "page1.wav", 2.0, 3.0), true)
            .unwrap();
        coord.clear_queue();
        assert_eq!(coord.queue_len(), 0);
    }

    // ---- stop_all -----------------------------------------------------------

    #[test]
    fn stop_all_reports_the_interrupted_segment() {
        let backend = MockBackend::new();
        let mut coord = coordinator(&backend);

        coord
            .activate(&hotspot("h1", "page1.wav", 0.0, 1.0), false)
            .unwrap();
        assert_eq!(coord.stop_all(), vec!["h1".to_string()]);
        assert!(!coord.is_any_playing());
        assert!(coord.stop_all().is_empty());
    }

    #[test]
    fn asset_handle_resolves_loaded_files_only() {
        let backend = MockBackend::new();
        let coord = coordinator(&backend);
        assert!(coord.asset_handle("page1.wav").is_some());
        assert!(coord.asset_handle("missing.wav").is_none());
    }
}
