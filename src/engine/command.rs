//! Message types exchanged with the playback engine.
//!
//! The UI (or any frontend) sends [`EngineCommand`]s in and receives
//! [`EngineEvent`]s out.  Internally the engine multiplexes commands with
//! its own timer wake-ups on a single channel of [`EngineMessage`]s, so
//! every state transition happens on the engine task and nothing else
//! ever touches playback state.

use crate::book::Hotspot;

use super::session::PlaybackMode;

// ---------------------------------------------------------------------------
// EngineCommand — frontend → engine
// ---------------------------------------------------------------------------

/// Commands sent from the frontend to the playback engine.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// The reader tapped a hotspot; routing depends on the current mode.
    HotspotTapped(Hotspot),
    /// Switch to sequential mode (taps queue instead of interrupting).
    EnterSequentialMode,
    /// Leave sequential mode; pending queue entries are discarded.
    ExitSequentialMode,
    /// Begin repeat-range selection (next two taps pick the range).
    EnterRepeatMode,
    /// Abandon repeat selection or a running loop and return to normal.
    ExitRepeatMode,
    /// Freeze a running repeat loop in place.
    PauseRepeat,
    /// Resume a paused repeat loop from the start of its range.
    ResumeRepeat,
    /// Stop all playback and end the engine task.
    Shutdown,
}

// ---------------------------------------------------------------------------
// EngineEvent — engine → frontend
// ---------------------------------------------------------------------------

/// Events delivered from the engine to the frontend.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A hotspot's segment started playing.
    SegmentStarted { hotspot_id: String },
    /// A segment played through to the end of its span.
    SegmentEnded { hotspot_id: String },
    /// A segment was cut off before its span ended.
    SegmentInterrupted { hotspot_id: String },
    /// Sequential mode deferred a tap; it will play when the current
    /// segment and any earlier queue entries finish.
    HotspotQueued { hotspot_id: String },
    /// Repeat selection accepted the first endpoint.
    RangeStartSet { hotspot_id: String },
    /// A repeat loop began over the inclusive range `start_id..=end_id`.
    LoopStarted { start_id: String, end_id: String },
    /// The running loop was frozen in place.
    LoopPaused,
    /// The paused loop restarted from the beginning of its range.
    LoopResumed,
    /// The loop ended (exit command or teardown).
    LoopStopped,
    /// A repeat-selection tap was rejected; selection state is unchanged
    /// or reset as described by `message`.
    RangeRejected { message: String },
    /// A tap could not start playback (missing asset or backend failure).
    ActivationFailed { hotspot_id: String, message: String },
    /// The engine switched modes.
    ModeChanged { mode: PlaybackMode },
}

// ---------------------------------------------------------------------------
// EngineMessage — the engine task's single inbox
// ---------------------------------------------------------------------------

/// Everything the engine task can be woken by: frontend commands plus its
/// own timer expirations.  Timer variants carry the session generation at
/// the time they were scheduled; a mismatch on receipt means the timer is
/// stale and must be dropped.
#[derive(Debug)]
pub(crate) enum EngineMessage {
    Command(EngineCommand),
    /// A normal/sequential segment's span elapsed.
    SegmentElapsed {
        asset: String,
        play_id: u64,
        generation: u64,
    },
    /// A loop iteration's span elapsed; the gap begins.
    LoopStopElapsed { generation: u64 },
    /// The inter-iteration gap elapsed; the next iteration begins.
    LoopGapElapsed { generation: u64 },
}
