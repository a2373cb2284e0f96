//! Repeat-loop playback.
//!
//! [`RepeatLoopController`] replays one audio span over and over with a
//! short gap between iterations.  It is deliberately timer-free: each
//! call returns a [`LoopAction`] telling the engine task what to
//! schedule next, which keeps every transition synchronous and directly
//! testable.
//!
//! ```text
//! start ─▶ Looping ──span elapses──▶ (gap) ──gap elapses──▶ Looping ──▶ …
//!             │                                                │
//!           pause ─▶ Paused ──resume (from range start)────────┘
//! ```
//!
//! At most one voice exists per iteration; the controller drops it when
//! the span elapses and asks the asset for a fresh one after the gap.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::audio::{AudioAsset, BackendError, Voice};
use crate::book::RepeatRange;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Looping,
    Paused,
}

#[derive(Debug, Error)]
pub enum LoopError {
    /// The range spans no audio.
    #[error("repeat range spans no audio ({span_secs:.3} s)")]
    InvalidRepeatRange { span_secs: f64 },

    /// The backend refused to start an iteration.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Timer the engine task should arm after a controller call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// The iteration is audible; wake again when its span elapses.
    ScheduleStop(Duration),
    /// The iteration finished; wake again when the gap elapses.
    ScheduleGap(Duration),
}

// ---------------------------------------------------------------------------
// RepeatLoopController
// ---------------------------------------------------------------------------

pub struct RepeatLoopController {
    state: LoopState,
    /// Silence between iterations.
    gap: Duration,
    range: Option<RepeatRange>,
    asset: Option<Arc<dyn AudioAsset>>,
    /// Voice of the current iteration, absent during the gap.
    voice: Option<Box<dyn Voice>>,
}

impl RepeatLoopController {
    pub fn new(gap: Duration) -> Self {
        Self {
            state: LoopState::Stopped,
            gap,
            range: None,
            asset: None,
            voice: None,
        }
    }

    /// Begin looping `range` on `asset`, replacing any previous loop.
    pub fn start(
        &mut self,
        asset: Arc<dyn AudioAsset>,
        range: RepeatRange,
    ) -> Result<LoopAction, LoopError> {
        let duration_ms = range.duration_ms().ok_or(LoopError::InvalidRepeatRange {
            span_secs: range.span_secs(),
        })?;

        self.release_voice();
        let voice = asset.play_span(range.start_ms(), duration_ms)?;

        log::info!(
            "loop started: {}..={} ({duration_ms} ms, {} ms gap)",
            range.start.id,
            range.end.id,
            self.gap.as_millis()
        );

        self.voice = Some(voice);
        self.asset = Some(asset);
        self.range = Some(range);
        self.state = LoopState::Looping;
        Ok(LoopAction::ScheduleStop(Duration::from_millis(duration_ms)))
    }

    /// The iteration's span elapsed; silence the voice and begin the gap.
    ///
    /// `None` when no iteration is running (stale timer).
    pub fn on_stop_timer(&mut self) -> Option<LoopAction> {
        if self.state != LoopState::Looping || self.voice.is_none() {
            return None;
        }
        self.release_voice();
        Some(LoopAction::ScheduleGap(self.gap))
    }

    /// The gap elapsed; start the next iteration from the range start.
    ///
    /// `None` when the loop is no longer running (stale timer).
    pub fn on_gap_timer(&mut self) -> Option<Result<LoopAction, LoopError>> {
        if self.state != LoopState::Looping {
            return None;
        }
        Some(self.start_iteration())
    }

    /// Freeze the loop in place.  Only a running loop can pause.
    pub fn pause(&mut self) -> bool {
        if self.state != LoopState::Looping {
            return false;
        }
        if let Some(voice) = self.voice.as_mut() {
            voice.pause();
        }
        self.state = LoopState::Paused;
        log::debug!("loop paused");
        true
    }

    /// Resume a paused loop.  The paused iteration is discarded and the
    /// loop restarts from the beginning of its range.
    pub fn resume(&mut self) -> Option<Result<LoopAction, LoopError>> {
        if self.state != LoopState::Paused {
            return None;
        }
        self.release_voice();
        self.state = LoopState::Looping;
        log::debug!("loop resumed from range start");
        Some(self.start_iteration())
    }

    /// End the loop and release everything.  Idempotent.
    pub fn stop(&mut self) {
        if self.state == LoopState::Stopped {
            return;
        }
        self.release_voice();
        self.range = None;
        self.asset = None;
        self.state = LoopState::Stopped;
        log::debug!("loop stopped");
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Endpoint ids of the active range.
    pub fn range_ids(&self) -> Option<(&str, &str)> {
        self.range
            .as_ref()
            .map(|r| (r.start.id.as_str(), r.end.id.as_str()))
    }

    // ── internals ────────────────────────────────────────────────────────

    fn start_iteration(&mut self) -> Result<LoopAction, LoopError> {
        let (range, asset) = match (self.range.as_ref(), self.asset.as_ref()) {
            (Some(range), Some(asset)) => (range, asset),
            _ => {
                // start() validated both; unreachable outside Stopped.
                return Err(LoopError::InvalidRepeatRange { span_secs: 0.0 });
            }
        };
        let duration_ms = range.duration_ms().ok_or(LoopError::InvalidRepeatRange {
            span_secs: range.span_secs(),
        })?;
        let voice = asset.play_span(range.start_ms(), duration_ms)?;
        self.voice = Some(voice);
        Ok(LoopAction::ScheduleStop(Duration::from_millis(duration_ms)))
    }

    fn release_voice(&mut self) {
        if let Some(mut voice) = self.voice.take() {
            voice.stop();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
