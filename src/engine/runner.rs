//! Playback engine task — routes taps, timers and mode switches.
//!
//! [`PlaybackEngine`] owns every piece of playback state and processes
//! one [`EngineMessage`] at a time, so no transition ever races another.
//!
//! # Message flow
//!
//! ```text
//! EngineCommand::HotspotTapped
//!   ├─ Normal / Sequential ─▶ coordinator.activate ─▶ schedule span timer
//!   ├─ RepeatSelecting     ─▶ selector.tap ─▶ (range complete) loop.start
//!   └─ Repeating           ─▶ loop.stop, restart selection with this tap
//!
//! timer ─▶ EngineMessage::{SegmentElapsed, LoopStopElapsed, LoopGapElapsed}
//!   └─ generation mismatch? drop.  otherwise advance queue / loop.
//! ```
//!
//! Timers are spawned `tokio::time::sleep` tasks that send back into the
//! engine's own channel stamped with the session generation at scheduling
//! time.  Any transition that invalidates pending timers (entering or
//! leaving repeat mode, a new loop range, pausing, shutdown) bumps the
//! generation, so a late timer can never act on state it no longer owns.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::audio::{AudioBackend, AudioData, SpriteAudioPlayer, SpriteIndex};
use crate::book::Book;
use crate::config::ReaderConfig;

use super::command::{EngineCommand, EngineEvent, EngineMessage};
use super::coordinator::{
    ActivationError, ActivationOutcome, PlaybackCoordinator, StartedSegment,
};
use super::repeat::{LoopAction, LoopError, LoopState, RepeatLoopController};
use super::selector::{RepeatRangeSelector, SelectorError, TapOutcome};
use super::session::{PlaybackMode, PlaybackSession, SessionSnapshot, SharedSnapshot};

// ---------------------------------------------------------------------------
// EngineHandle
// ---------------------------------------------------------------------------

/// Cheap clonable handle for talking to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    msg_tx: mpsc::Sender<EngineMessage>,
    snapshot: SharedSnapshot,
}

impl EngineHandle {
    /// Send a command.  Returns `false` when the engine has shut down.
    pub async fn send(&self, command: EngineCommand) -> bool {
        self.msg_tx
            .send(EngineMessage::Command(command))
            .await
            .is_ok()
    }

    /// Current session state, refreshed after every message the engine
    /// handles.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// PlaybackEngine
// ---------------------------------------------------------------------------

/// Drives all hotspot playback for one book.
///
/// Create with [`PlaybackEngine::new`], then call [`run`](Self::run)
/// inside a tokio task:
///
/// ```rust,no_run
/// use std::collections::HashMap;
/// use storytap::audio::SilentBackend;
/// use storytap::book::Book;
/// use storytap::config::ReaderConfig;
/// use storytap::engine::PlaybackEngine;
///
/// # async fn example(book: Book, assets: HashMap<String, storytap::audio::AudioData>) {
/// let (events_tx, mut events_rx) = tokio::sync::mpsc::channel(64);
/// let (engine, handle) =
///     PlaybackEngine::new(&book, &SilentBackend, assets, &ReaderConfig::default(), events_tx);
/// tokio::spawn(engine.run());
/// # }
/// ```
pub struct PlaybackEngine {
    session: PlaybackSession,
    coordinator: PlaybackCoordinator,
    selector: RepeatRangeSelector,
    repeat: RepeatLoopController,
    snapshot: SharedSnapshot,
    events_tx: mpsc::Sender<EngineEvent>,
    msg_tx: mpsc::Sender<EngineMessage>,
    msg_rx: mpsc::Receiver<EngineMessage>,
}

impl PlaybackEngine {
    /// Build an engine for `book`, loading `assets` through `backend`.
    ///
    /// Per-file load failures are logged and skipped; hotspots on a
    /// skipped file are simply rejected at tap time.
    pub fn new(
        book: &Book,
        backend: &dyn AudioBackend,
        assets: HashMap<String, AudioData>,
        config: &ReaderConfig,
        events_tx: mpsc::Sender<EngineEvent>,
    ) -> (Self, EngineHandle) {
        let mut loaded = HashSet::new();
        let mut handles = HashMap::new();
        for (file, data) in assets {
            match backend.load(&file, data) {
                Ok(asset) => {
                    loaded.insert(file.clone());
                    handles.insert(file, asset);
                }
                Err(e) => log::warn!("skipping audio file {file}: {e}"),
            }
        }

        let index = SpriteIndex::build(book, &loaded);
        log::info!(
            "engine ready: {} assets, {} sprites",
            index.asset_count(),
            index.sprite_count()
        );

        let players = handles
            .into_iter()
            .map(|(file, asset)| {
                let sprites = index.sprites_for(&file).cloned().unwrap_or_default();
                let player = SpriteAudioPlayer::new(file.as_str(), asset, sprites);
                (file, player)
            })
            .collect();

        let (msg_tx, msg_rx) = mpsc::channel(64);
        let snapshot: SharedSnapshot = Arc::new(Mutex::new(SessionSnapshot::idle()));

        let handle = EngineHandle {
            msg_tx: msg_tx.clone(),
            snapshot: Arc::clone(&snapshot),
        };
        let engine = Self {
            session: PlaybackSession::new(),
            coordinator: PlaybackCoordinator::new(players),
            selector: RepeatRangeSelector::new(),
            repeat: RepeatLoopController::new(Duration::from_millis(config.repeat.gap_ms)),
            snapshot,
            events_tx,
            msg_tx,
            msg_rx,
        };
        (engine, handle)
    }

    /// Process messages until shutdown or until every handle is dropped.
    ///
    /// This is an `async fn` and should be spawned as a tokio task.
    pub async fn run(mut self) {
        self.publish_snapshot();
        while let Some(msg) = self.msg_rx.recv().await {
            let keep_running = self.handle_message(msg).await;
            self.publish_snapshot();
            if !keep_running {
                return;
            }
        }
        log::info!("engine: command channel closed, shutting down");
        self.teardown().await;
        self.publish_snapshot();
    }

    // ── message dispatch ─────────────────────────────────────────────────

    async fn handle_message(&mut self, msg: EngineMessage) -> bool {
        match msg {
            EngineMessage::Command(command) => return self.handle_command(command).await,
            EngineMessage::SegmentElapsed {
                asset,
                play_id,
                generation,
            } => {
                if generation != self.session.generation {
                    log::debug!("dropping stale segment timer for {asset}");
                } else {
                    self.on_segment_elapsed(&asset, play_id).await;
                }
            }
            EngineMessage::LoopStopElapsed { generation } => {
                if generation == self.session.generation {
                    if let Some(action) = self.repeat.on_stop_timer() {
                        self.schedule_loop(action);
                    }
                }
            }
            EngineMessage::LoopGapElapsed { generation } => {
                if generation == self.session.generation {
                    match self.repeat.on_gap_timer() {
                        Some(Ok(action)) => self.schedule_loop(action),
                        Some(Err(e)) => self.fail_loop(e).await,
                        None => {}
                    }
                }
            }
        }
        true
    }

    async fn handle_command(&mut self, command: EngineCommand) -> bool {
        match command {
            EngineCommand::HotspotTapped(hotspot) => match self.session.mode {
                PlaybackMode::Normal | PlaybackMode::Sequential => {
                    self.handle_playback_tap(hotspot).await;
                }
                PlaybackMode::RepeatSelecting => {
                    self.handle_selection_tap(hotspot).await;
                }
                PlaybackMode::Repeating => {
                    // A tap during the loop means "new range": drop the
                    // loop and use this tap as the first endpoint.
                    self.session.bump_generation();
                    self.repeat.stop();
                    self.session.clear_repeat();
                    self.set_mode(PlaybackMode::RepeatSelecting).await;
                    self.emit(EngineEvent::LoopStopped).await;
                    self.handle_selection_tap(hotspot).await;
                }
            },

            EngineCommand::EnterSequentialMode => {
                if self.session.mode.is_repeat() {
                    self.exit_repeat().await;
                }
                if self.session.mode != PlaybackMode::Sequential {
                    self.set_mode(PlaybackMode::Sequential).await;
                }
            }

            EngineCommand::ExitSequentialMode => {
                if self.session.mode.is_sequential() {
                    // Current playback finishes; only the backlog goes.
                    self.coordinator.clear_queue();
                    self.set_mode(PlaybackMode::Normal).await;
                }
            }

            EngineCommand::EnterRepeatMode => {
                if self.session.mode.is_repeat() {
                    // Re-entering restarts selection from scratch; a
                    // stale first endpoint must not survive the toggle.
                    self.exit_repeat().await;
                    if self.session.mode != PlaybackMode::RepeatSelecting {
                        self.set_mode(PlaybackMode::RepeatSelecting).await;
                    }
                } else {
                    self.session.bump_generation();
                    self.coordinator.clear_queue();
                    let interrupted = self.coordinator.stop_all();
                    self.session.current_hotspot = None;
                    for hotspot_id in interrupted {
                        self.emit(EngineEvent::SegmentInterrupted { hotspot_id }).await;
                    }
                    self.selector.reset();
                    self.set_mode(PlaybackMode::RepeatSelecting).await;
                }
            }

            EngineCommand::ExitRepeatMode => {
                if self.session.mode.is_repeat() {
                    self.exit_repeat().await;
                    self.set_mode(PlaybackMode::Normal).await;
                }
            }

            EngineCommand::PauseRepeat => {
                if self.repeat.pause() {
                    // Pending loop timers belong to the paused iteration.
                    self.session.bump_generation();
                    self.session.repeat_paused = true;
                    self.emit(EngineEvent::LoopPaused).await;
                }
            }

            EngineCommand::ResumeRepeat => match self.repeat.resume() {
                Some(Ok(action)) => {
                    self.session.repeat_paused = false;
                    self.emit(EngineEvent::LoopResumed).await;
                    self.schedule_loop(action);
                }
                Some(Err(e)) => self.fail_loop(e).await,
                None => {}
            },

            EngineCommand::Shutdown => {
                log::info!("engine: shutdown requested");
                self.teardown().await;
                return false;
            }
        }
        true
    }

    // ── taps ─────────────────────────────────────────────────────────────

    async fn handle_playback_tap(&mut self, hotspot: crate::book::Hotspot) {
        let sequential = self.session.mode.is_sequential();
        match self.coordinator.activate(&hotspot, sequential) {
            Ok(ActivationOutcome::Started {
                started,
                interrupted,
            }) => {
                for hotspot_id in interrupted {
                    self.emit(EngineEvent::SegmentInterrupted { hotspot_id }).await;
                }
                self.start_segment(started).await;
            }
            Ok(ActivationOutcome::Queued) => {
                self.emit(EngineEvent::HotspotQueued {
                    hotspot_id: hotspot.id,
                })
                .await;
            }
            Err(e @ ActivationError::UnknownSegment { .. }) => {
                // A validated book cannot produce this from real taps;
                // not worth alarming the reader over.
                log::warn!("{e}");
            }
            Err(e @ ActivationError::MissingAudioAsset { .. }) => {
                self.emit(EngineEvent::ActivationFailed {
                    hotspot_id: hotspot.id,
                    message: e.to_string(),
                })
                .await;
            }
            Err(ActivationError::Failed {
                hotspot_id,
                interrupted,
                source,
            }) => {
                for id in interrupted {
                    self.emit(EngineEvent::SegmentInterrupted { hotspot_id: id })
                        .await;
                }
                self.session.current_hotspot = None;
                self.emit(EngineEvent::ActivationFailed {
                    hotspot_id,
                    message: source.to_string(),
                })
                .await;
            }
        }
    }

    async fn handle_selection_tap(&mut self, hotspot: crate::book::Hotspot) {
        // Endpoints must be playable before they can anchor a range.
        if self.coordinator.asset_handle(&hotspot.audio_file).is_none() {
            self.emit(EngineEvent::ActivationFailed {
                hotspot_id: hotspot.id,
                message: format!("no audio loaded for {}", hotspot.audio_file),
            })
            .await;
            return;
        }

        match self.selector.tap(hotspot) {
            Ok(TapOutcome::StartSet) => {
                let hotspot_id = self
                    .selector
                    .pending_start()
                    .unwrap_or_default()
                    .to_string();
                self.session.repeat_start = Some(hotspot_id.clone());
                self.emit(EngineEvent::RangeStartSet { hotspot_id }).await;
            }
            Ok(TapOutcome::RangeComplete { range }) => self.start_loop(range).await,
            Err(e @ SelectorError::IncompatibleRange { .. }) => {
                self.emit(EngineEvent::RangeRejected {
                    message: e.to_string(),
                })
                .await;
            }
            Err(e @ SelectorError::InvalidRepeatRange { .. }) => {
                self.session.repeat_start = None;
                self.emit(EngineEvent::RangeRejected {
                    message: e.to_string(),
                })
                .await;
            }
        }
    }

    // ── loop control ─────────────────────────────────────────────────────

    async fn start_loop(&mut self, range: crate::book::RepeatRange) {
        let asset = match self.coordinator.asset_handle(&range.start.audio_file) {
            Some(asset) => asset,
            // Both endpoints were asset-checked at tap time.
            None => return,
        };

        self.session.bump_generation();
        // Yield exclusive audio control to the loop.
        for hotspot_id in self.coordinator.stop_all() {
            self.emit(EngineEvent::SegmentInterrupted { hotspot_id }).await;
        }
        self.session.current_hotspot = None;
        let start_id = range.start.id.clone();
        let end_id = range.end.id.clone();

        match self.repeat.start(asset, range) {
            Ok(action) => {
                self.session.repeat_start = Some(start_id.clone());
                self.session.repeat_end = Some(end_id.clone());
                self.session.repeat_paused = false;
                self.set_mode(PlaybackMode::Repeating).await;
                self.emit(EngineEvent::LoopStarted { start_id, end_id }).await;
                self.schedule_loop(action);
            }
            Err(e) => {
                self.session.clear_repeat();
                self.emit(EngineEvent::RangeRejected {
                    message: e.to_string(),
                })
                .await;
            }
        }
    }

    /// Drop the loop and selection state.  Callers set the follow-up mode.
    async fn exit_repeat(&mut self) {
        self.session.bump_generation();
        let was_active = self.repeat.state() != LoopState::Stopped;
        self.repeat.stop();
        self.selector.reset();
        self.session.clear_repeat();
        if was_active {
            self.emit(EngineEvent::LoopStopped).await;
        }
    }

    /// A loop iteration failed to start; give up on the loop.
    async fn fail_loop(&mut self, err: LoopError) {
        log::error!("repeat loop failed: {err}");
        self.session.bump_generation();
        self.repeat.stop();
        self.session.clear_repeat();
        self.emit(EngineEvent::LoopStopped).await;
        self.set_mode(PlaybackMode::Normal).await;
    }

    // ── timers & segments ────────────────────────────────────────────────

    async fn on_segment_elapsed(&mut self, asset: &str, play_id: u64) {
        let drain = self.session.mode.is_sequential();
        let Some(completion) = self.coordinator.segment_elapsed(asset, play_id, drain) else {
            return;
        };

        self.session.current_hotspot = None;
        self.emit(EngineEvent::SegmentEnded {
            hotspot_id: completion.completed,
        })
        .await;

        for (hotspot_id, err) in completion.failed {
            self.emit(EngineEvent::ActivationFailed {
                hotspot_id,
                message: err.to_string(),
            })
            .await;
        }

        if let Some(next) = completion.next {
            self.start_segment(next).await;
        }
    }

    async fn start_segment(&mut self, started: StartedSegment) {
        self.session.current_hotspot = Some(started.hotspot_id.clone());
        self.emit(EngineEvent::SegmentStarted {
            hotspot_id: started.hotspot_id.clone(),
        })
        .await;
        self.schedule_segment(&started);
    }

    fn schedule_segment(&self, started: &StartedSegment) {
        let msg = EngineMessage::SegmentElapsed {
            asset: started.asset.clone(),
            play_id: started.play_id,
            generation: self.session.generation,
        };
        self.schedule(started.duration, msg);
    }

    fn schedule_loop(&self, action: LoopAction) {
        let generation = self.session.generation;
        match action {
            LoopAction::ScheduleStop(duration) => {
                self.schedule(duration, EngineMessage::LoopStopElapsed { generation });
            }
            LoopAction::ScheduleGap(duration) => {
                self.schedule(duration, EngineMessage::LoopGapElapsed { generation });
            }
        }
    }

    /// Arm one timer: sleep, then deliver `msg` through the engine's own
    /// inbox.  A send failure just means the engine is gone.
    fn schedule(&self, duration: Duration, msg: EngineMessage) {
        let msg_tx = self.msg_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = msg_tx.send(msg).await;
        });
    }

    // ── teardown & bookkeeping ───────────────────────────────────────────

    async fn teardown(&mut self) {
        self.session.bump_generation();
        let interrupted = self.coordinator.stop_all();
        self.session.current_hotspot = None;
        for hotspot_id in interrupted {
            self.emit(EngineEvent::SegmentInterrupted { hotspot_id }).await;
        }
        self.coordinator.clear_queue();
        if self.repeat.state() != LoopState::Stopped {
            self.repeat.stop();
            self.emit(EngineEvent::LoopStopped).await;
        }
        self.session.clear_repeat();
        self.session.mode = PlaybackMode::Normal;
    }

    async fn set_mode(&mut self, mode: PlaybackMode) {
        if self.session.mode != mode {
            log::info!("mode: {} -> {}", self.session.mode.label(), mode.label());
            self.session.mode = mode;
            self.emit(EngineEvent::ModeChanged { mode }).await;
        }
    }

    async fn emit(&self, event: EngineEvent) {
        if self.events_tx.send(event).await.is_err() {
            log::debug!("event receiver dropped");
        }
    }

    fn publish_snapshot(&self) {
        *self.snapshot.lock().unwrap() =
            self.session.snapshot(self.coordinator.queue_len() > 0);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
