//! Engine-side session state.
//!
//! [`PlaybackSession`] is the single source of truth the engine task
//! mutates; frontends observe it through a [`SessionSnapshot`] behind a
//! mutex, refreshed after every message the engine handles.
//!
//! The `generation` counter is the stale-timer guard: every transition
//! that invalidates outstanding timers (entering or leaving repeat mode,
//! starting a new loop range, pausing, teardown) bumps it, and timer
//! messages carrying an older generation are dropped on receipt.

use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// PlaybackMode
// ---------------------------------------------------------------------------

/// Top-level mode of the playback engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Taps interrupt whatever is playing and start immediately.
    Normal,
    /// Taps during playback queue and play back in order.
    Sequential,
    /// Waiting for the reader to tap the endpoints of a repeat range.
    RepeatSelecting,
    /// A repeat loop is running (or paused) over a chosen range.
    Repeating,
}

impl PlaybackMode {
    /// Short lowercase label for logs and status lines.
    pub fn label(&self) -> &'static str {
        match self {
            PlaybackMode::Normal => "normal",
            PlaybackMode::Sequential => "sequential",
            PlaybackMode::RepeatSelecting => "repeat-selecting",
            PlaybackMode::Repeating => "repeating",
        }
    }

    /// True in either repeat phase (selecting or looping).
    pub fn is_repeat(&self) -> bool {
        matches!(self, PlaybackMode::RepeatSelecting | PlaybackMode::Repeating)
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self, PlaybackMode::Sequential)
    }
}

// ---------------------------------------------------------------------------
// PlaybackSession
// ---------------------------------------------------------------------------

/// Mutable engine state, owned exclusively by the engine task.
#[derive(Debug)]
pub(crate) struct PlaybackSession {
    pub mode: PlaybackMode,
    /// Hotspot whose segment is currently audible, if any.
    pub current_hotspot: Option<String>,
    /// Endpoint ids of the active repeat range.
    pub repeat_start: Option<String>,
    pub repeat_end: Option<String>,
    pub repeat_paused: bool,
    /// Bumped whenever outstanding timers become invalid.
    pub generation: u64,
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self {
            mode: PlaybackMode::Normal,
            current_hotspot: None,
            repeat_start: None,
            repeat_end: None,
            repeat_paused: false,
            generation: 0,
        }
    }

    /// Invalidate every timer scheduled under the current generation.
    pub fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Forget any repeat-range bookkeeping.
    pub fn clear_repeat(&mut self) {
        self.repeat_start = None;
        self.repeat_end = None;
        self.repeat_paused = false;
    }

    /// `queue_pending` lives in the coordinator, not here; the engine
    /// fills it in when publishing.
    pub fn snapshot(&self, queue_pending: bool) -> SessionSnapshot {
        SessionSnapshot {
            mode: self.mode,
            current_hotspot: self.current_hotspot.clone(),
            queue_pending,
            repeat_start: self.repeat_start.clone(),
            repeat_end: self.repeat_end.clone(),
            repeat_paused: self.repeat_paused,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// Read-only copy of the session for frontends.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub mode: PlaybackMode,
    pub current_hotspot: Option<String>,
    /// `true` while sequential-mode taps are waiting their turn.
    pub queue_pending: bool,
    pub repeat_start: Option<String>,
    pub repeat_end: Option<String>,
    pub repeat_paused: bool,
}

impl SessionSnapshot {
    pub fn idle() -> Self {
        Self {
            mode: PlaybackMode::Normal,
            current_hotspot: None,
            queue_pending: false,
            repeat_start: None,
            repeat_end: None,
            repeat_paused: false,
        }
    }
}

/// Snapshot shared between the engine task and frontends.
pub type SharedSnapshot = Arc<Mutex<SessionSnapshot>>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
